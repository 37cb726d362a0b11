//! TaskProcessor - 1 メッセージを冪等に処理する
//!
//! # フロー
//! 1. external id でタスクを取得（なければ drop して ack）
//! 2. 終端状態（DONE / FAILED）なら何もせず ack（冪等性ゲート）
//! 3. モデルを解決し直す（なければ FAILED）
//! 4. 現在の回答を再検証する（キュー投入前の検証は信用しない）
//! 5. 残高チェック（足りなければ FAILED、課金なし）
//! 6. VALIDATED → PROCESSING を永続化
//! 7. 予測（blocking pool 上で実行、失敗は FAILED）
//! 8-9. DONE と課金を `settle` で 1 つの原子単位として書く
//!
//! ドメイン上の失敗はすべて ack。分類できないエラー（ストア障害など）は
//! タスクを FAILED にできればしてから、requeue なしで nack する。
//! 同じメッセージを同時に処理しても、条件付き更新で負けた側は
//! `Verdict::Superseded` になり、課金は 1 回だけ。

use std::sync::Arc;

use serde::Serialize;

use crate::domain::{
    Credits, ErrorKind, FieldError, LedgerError, ScoringMessage, ScoringTask, StoreError,
    TaskError, TaskId, TaskStatus,
};
use crate::ports::TaskStore;
use crate::scoring::{ModelResolver, ScoringError, ScoringStrategy};

use super::ledger::WalletLedger;

pub const REASON_MODEL_NOT_FOUND: &str = "model not found";
pub const REASON_VALIDATION_FAILED: &str = "validation failed in worker";
pub const REASON_INSUFFICIENT_FUNDS: &str = "insufficient funds";

/// タスクに何が起きたか（いずれも ack する）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Verdict {
    /// スコア計算と課金が完了
    Completed { charged: Credits },

    /// 既に DONE / FAILED。副作用なし
    AlreadyFinal,

    /// タスクが存在しない。メッセージは破棄
    Dropped,

    /// 別のワーカーが先に確定させた
    Superseded,

    /// この理由で FAILED にした。課金なし
    Failed(String),
}

/// コンシューマーへの ack / nack 指示
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Disposition {
    Ack(Verdict),
    Nack { requeue: bool, error: String },
}

impl Disposition {
    pub fn verdict(&self) -> Option<&Verdict> {
        match self {
            Disposition::Ack(verdict) => Some(verdict),
            Disposition::Nack { .. } => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("undecodable message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Task(#[from] TaskError),
}

impl ProcessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessError::Decode(_) => ErrorKind::UserInput,
            ProcessError::Store(e) => e.kind(),
            ProcessError::Ledger(e) => e.kind(),
            ProcessError::Task(e) => e.kind(),
        }
    }
}

pub struct TaskProcessor {
    tasks: Arc<dyn TaskStore>,
    ledger: WalletLedger,
    models: ModelResolver,
    worker_id: String,
}

impl TaskProcessor {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        ledger: WalletLedger,
        models: ModelResolver,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            tasks,
            ledger,
            models,
            worker_id: worker_id.into(),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// キューのペイロードをデコードして処理
    pub async fn process_payload(&self, payload: &[u8]) -> Disposition {
        match ScoringMessage::decode(payload) {
            Ok(message) => self.process(&message).await,
            Err(e) => {
                let err = ProcessError::from(e);
                tracing::error!(worker_id = %self.worker_id, error = %err, "dropping message");
                Disposition::Nack {
                    requeue: false,
                    error: err.to_string(),
                }
            }
        }
    }

    pub async fn process(&self, message: &ScoringMessage) -> Disposition {
        let task_id = message.task_id;
        match self.try_process(message).await {
            Ok(verdict) => {
                tracing::info!(%task_id, worker_id = %self.worker_id, ?verdict, "message processed");
                Disposition::Ack(verdict)
            }
            Err(err) => {
                tracing::error!(
                    %task_id,
                    worker_id = %self.worker_id,
                    kind = ?err.kind(),
                    error = %err,
                    "processing failed"
                );
                self.recover(task_id, &err).await;
                Disposition::Nack {
                    requeue: false,
                    error: err.to_string(),
                }
            }
        }
    }

    async fn try_process(&self, message: &ScoringMessage) -> Result<Verdict, ProcessError> {
        let task_id = message.task_id;

        // 1
        let Some(task) = self.tasks.get_task_by_external_id(task_id).await? else {
            tracing::warn!(%task_id, "task not found, dropping message");
            return Ok(Verdict::Dropped);
        };

        // 2
        if task.status().is_terminal() {
            tracing::debug!(%task_id, status = %task.status(), "already final");
            return Ok(Verdict::AlreadyFinal);
        }

        // 3
        let Some(model) = self.models.resolve(task.model_id).await? else {
            return self.finish_failed(task, REASON_MODEL_NOT_FOUND, None).await;
        };
        if model.name() != message.model {
            tracing::warn!(
                %task_id,
                queued = %message.model,
                stored = %model.name(),
                "message names a different model than the task"
            );
        }

        // 4
        let report = model.validate(task.answers());
        if !report.ok {
            return self
                .finish_failed(task, REASON_VALIDATION_FAILED, Some(report.errors))
                .await;
        }

        // 5
        let price = model.price();
        if !self.ledger.can_pay(task.owner, price).await? {
            return self
                .finish_failed(task, REASON_INSUFFICIENT_FUNDS, None)
                .await;
        }

        // 6
        // PROCESSING のまま再配送された場合（前のワーカーが途中で落ちた）は続きから
        let mut task = task;
        if task.status() == TaskStatus::Validated {
            task.begin_processing()?;
            task.stamp_worker(&self.worker_id);
            task = match self.tasks.update_task(&task, TaskStatus::Validated).await {
                Ok(stored) => stored,
                Err(e) if e.is_conflict() => return Ok(Verdict::Superseded),
                Err(e) => return Err(e.into()),
            };
        }

        // 7
        let answers = task.answers().clone();
        let strategy = model.clone();
        let predicted = tokio::task::spawn_blocking(move || strategy.predict(&answers))
            .await
            .unwrap_or_else(|join| Err(ScoringError::Crashed(join.to_string())));
        let result = match predicted {
            Ok(result) => result,
            Err(e) => {
                let reason = format!("prediction failed: {e}");
                return self.finish_failed(task, &reason, None).await;
            }
        };

        // 8-9
        let mut done = task.clone();
        done.complete(result, price)?;
        done.stamp_worker(&self.worker_id);
        match self.ledger.settle(&done, price).await {
            Ok((_, transaction)) => {
                tracing::info!(
                    %task_id,
                    owner = %done.owner,
                    charged = price,
                    transaction = ?transaction.map(|t| t.id),
                    "task completed"
                );
                Ok(Verdict::Completed { charged: price })
            }
            Err(LedgerError::InsufficientFunds { .. }) => {
                // 残高チェック後に別のタスクが先に課金した
                self.finish_failed(task, REASON_INSUFFICIENT_FUNDS, None)
                    .await
            }
            Err(LedgerError::Store(e)) if e.is_conflict() => Ok(Verdict::Superseded),
            Err(e) => Err(e.into()),
        }
    }

    /// `task` を FAILED にし、現在の状態を条件に保存
    async fn finish_failed(
        &self,
        mut task: ScoringTask,
        reason: &str,
        errors: Option<Vec<FieldError>>,
    ) -> Result<Verdict, ProcessError> {
        let expected = task.status();
        match errors {
            Some(errors) => task.fail_validation(errors, reason)?,
            None => task.fail(reason)?,
        }
        task.stamp_worker(&self.worker_id);

        match self.tasks.update_task(&task, expected).await {
            Ok(_) => {
                tracing::warn!(task_id = %task.external_id, owner = %task.owner, reason, "task failed");
                Ok(Verdict::Failed(reason.to_string()))
            }
            Err(e) if e.is_conflict() => Ok(Verdict::Superseded),
            Err(e) => Err(e.into()),
        }
    }

    /// 分類できないエラーをタスクに記録する（ベストエフォート）
    async fn recover(&self, task_id: TaskId, err: &ProcessError) {
        let task = match self.tasks.get_task_by_external_id(task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(%task_id, error = %e, "cannot load task to record failure");
                return;
            }
        };
        if task.status().is_terminal() {
            return;
        }
        if let Err(e) = self.finish_failed(task, &err.to_string(), None).await {
            tracing::error!(%task_id, error = %e, "cannot record failure");
        }
    }
}
