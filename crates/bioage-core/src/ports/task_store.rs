//! TaskStore port - タスクの正本（source of truth）
//!
//! # 設計原則
//! - 状態遷移の永続化は「期待する状態」と version 付きの条件付き更新
//!   （別の書き込みが先に入っていたら `StoreError::Conflict`）
//! - get 系は常に最新の状態を返す（キャッシュしない）
//! - 課金を伴う DONE への遷移は `LedgerStore::settle_task` が担当

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{NewTask, ScoringTask, StoreError, TaskId, TaskKey, TaskStatus, UserId};

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// CREATED のタスクを挿入し、`TaskKey` を割り当てる
    async fn create_task(&self, new: NewTask) -> Result<ScoringTask, StoreError>;

    async fn get_task(&self, key: TaskKey) -> Result<Option<ScoringTask>, StoreError>;

    async fn get_task_by_external_id(&self, id: TaskId)
    -> Result<Option<ScoringTask>, StoreError>;

    /// 保存済みの行が `expected` 状態で、かつ `task` と同じ version のときだけ書き込む。
    ///
    /// 古いコピー（読んだ後に別の書き込みが入った）は `StoreError::Conflict`。
    /// 戻り値は保存されたコピー（version と `updated_at` を更新済み）。
    async fn update_task(
        &self,
        task: &ScoringTask,
        expected: TaskStatus,
    ) -> Result<ScoringTask, StoreError>;

    /// 所有者のタスク（新しい順）
    async fn list_tasks_by_owner(&self, owner: UserId) -> Result<Vec<ScoringTask>, StoreError>;

    async fn counts_by_status(&self) -> Result<TaskCounts, StoreError>;
}

/// 状態ごとのタスク数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub created: usize,
    pub validated: usize,
    pub processing: usize,
    pub done: usize,
    pub failed: usize,
}

impl TaskCounts {
    pub fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Created => self.created += 1,
            TaskStatus::Validated => self.validated += 1,
            TaskStatus::Processing => self.processing += 1,
            TaskStatus::Done => self.done += 1,
            TaskStatus::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.created + self.validated + self.processing + self.done + self.failed
    }
}

impl FromIterator<TaskStatus> for TaskCounts {
    fn from_iter<I: IntoIterator<Item = TaskStatus>>(iter: I) -> Self {
        let mut counts = TaskCounts::default();
        for status in iter {
            counts.record(status);
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_collect_from_statuses() {
        let counts: TaskCounts = [
            TaskStatus::Done,
            TaskStatus::Done,
            TaskStatus::Failed,
            TaskStatus::Created,
        ]
        .into_iter()
        .collect();
        assert_eq!(counts.done, 2);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.created, 1);
        assert_eq!(counts.total(), 4);
    }
}
