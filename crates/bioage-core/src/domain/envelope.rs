//! ScoringMessage - キューに流すメッセージ
//!
//! キューにはワーカーがタスクを見つけるための情報だけを載せる。正本はタスクの行。
//! `features` は診断用のスナップショットで、
//! ワーカーは保存済みの回答を読み直して再検証する。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::assessment::Answers;
use super::ids::TaskId;

/// ワイヤ形式: JSON の `{"task_id", "features", "model", "timestamp"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringMessage {
    pub task_id: TaskId,
    pub features: Answers,

    /// モデル名（id ではない）
    pub model: String,

    pub timestamp: DateTime<Utc>,
}

impl ScoringMessage {
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
