//! DeliveryQueue port - 配送キュー（ブローカー または InMemory）
//!
//! キューは `ScoringMessage` を JSON バイト列のまま運びます。
//! デコードは受け取った側（ワーカー）の責任です。
//!
//! # 配送保証
//! - at-least-once: ack されなかった配送は visibility timeout 後に再配送される
//! - 順序保証なし
//! - `nack(requeue = false)` は dead-letter 扱い（再配送しない）

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::{DeliveryId, ErrorKind};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    /// キューが追跡していない配送への ack/nack
    /// （タイムアウトして別のワーカーに渡った場合など）
    #[error("unknown delivery {0}")]
    UnknownDelivery(DeliveryId),
}

impl QueueError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Infrastructure
    }
}

/// 受信したメッセージ 1 件。保持者は必ず `ack` か `nack` する
#[async_trait]
pub trait Delivery: Send {
    fn delivery_id(&self) -> DeliveryId;

    fn payload(&self) -> &[u8];

    /// 以前にも配送されたメッセージか
    fn redelivered(&self) -> bool;

    async fn ack(self: Box<Self>) -> Result<(), QueueError>;

    async fn nack(self: Box<Self>, requeue: bool) -> Result<(), QueueError>;
}

#[async_trait]
pub trait DeliveryQueue: Send + Sync {
    async fn publish(&self, payload: Vec<u8>) -> Result<(), QueueError>;

    /// 最大 `timeout` 待つ。タイムアウト時は `Ok(None)`
    async fn receive(&self, timeout: Duration) -> Result<Option<Box<dyn Delivery>>, QueueError>;

    async fn depth(&self) -> Result<QueueDepth, QueueError>;
}

/// キューのスナップショット
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDepth {
    pub ready: usize,
    pub in_flight: usize,
    pub dead: usize,
}
