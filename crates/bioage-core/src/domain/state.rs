//! State - タスクの状態
//!
//! # 状態遷移
//! - CREATED → VALIDATED → PROCESSING → DONE / FAILED
//! - 検証に失敗したタスクは CREATED に留まる（入力を直して再投入できる）
//! - DONE / FAILED は終端（以降の遷移は受け付けない）

use serde::{Deserialize, Serialize};
use std::fmt;

/// スコアリングタスクのライフサイクル状態
///
/// SCREAMING_SNAKE_CASE（`"CREATED"`, `"DONE"`, ...）でシリアライズする。
/// クライアントがポーリングで見る形。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// 下書き。回答はまだ変更できる。検証失敗後の戻り先でもある
    Created,

    /// 検証を通過し、キューに投入済み
    Validated,

    /// ワーカーが受け取り、スコア計算中
    Processing,

    /// スコア計算と課金が完了
    Done,

    /// 失敗。課金なし
    Failed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Created,
        TaskStatus::Validated,
        TaskStatus::Processing,
        TaskStatus::Done,
        TaskStatus::Failed,
    ];

    /// 終端状態か（これ以上遷移しない）
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Created => "CREATED",
            TaskStatus::Validated => "VALIDATED",
            TaskStatus::Processing => "PROCESSING",
            TaskStatus::Done => "DONE",
            TaskStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
