//! Status - タスク数とキューの深さ
//!
//! 運用時に「どこで詰まっているか」を見るためのスナップショット。

use serde::Serialize;

use crate::domain::ErrorKind;
use crate::ports::{DeliveryQueue, QueueDepth, QueueError, TaskCounts, TaskStore};
use crate::domain::StoreError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub tasks: TaskCounts,
    pub queue: QueueDepth,
}

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl StatusError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Infrastructure
    }
}

impl StatusReport {
    pub async fn collect(
        tasks: &dyn TaskStore,
        queue: &dyn DeliveryQueue,
    ) -> Result<Self, StatusError> {
        Ok(Self {
            tasks: tasks.counts_by_status().await?,
            queue: queue.depth().await?,
        })
    }

    /// 終端でもユーザー入力待ちでもないタスクの数
    pub fn pending(&self) -> usize {
        self.tasks.validated + self.tasks.processing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{InMemoryDeliveryQueue, InMemoryStore};
    use std::time::Duration;

    #[tokio::test]
    async fn empty_system_reports_zeroes() {
        let store = InMemoryStore::new();
        let queue = InMemoryDeliveryQueue::new("q", Duration::from_secs(1));
        queue.publish(b"x".to_vec()).await.unwrap();

        let report = StatusReport::collect(&store, &queue).await.unwrap();
        assert_eq!(report.tasks.total(), 0);
        assert_eq!(report.queue.ready, 1);
        assert_eq!(report.pending(), 0);
    }
}
