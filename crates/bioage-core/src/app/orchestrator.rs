//! TaskOrchestrator - 下書き → 検証 → キュー投入
//!
//! # 責務
//! - 下書き（CREATED）の作成と更新
//! - 投入前の高速検証。失敗はエラーではなくデータ（FieldError）として返す
//! - 検証済みタスクのメッセージをキューに流す
//! - 同期実行（run_now）: キューを通さずワーカーと同じ処理をその場で実行
//! - 参照系（所有者チェック付き）
//!
//! 残高はここでは見ない。課金可否の最終判断はワーカーが行う。

use std::sync::Arc;

use crate::domain::{
    Answers, ErrorKind, FieldError, ModelId, NewTask, ScoringMessage, ScoringTask, StoreError,
    TaskError, TaskId, TaskStatus, UserId,
};
use crate::ports::{Clock, DeliveryQueue, IdGenerator, QueueError, TaskStore};
use crate::scoring::{ModelResolver, RuntimeModel, ScoringStrategy};

use super::processor::{Disposition, REASON_MODEL_NOT_FOUND, TaskProcessor};

/// リクエストの主体。Admin は全タスクを参照できる
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requester {
    User(UserId),
    Admin,
}

impl Requester {
    fn may_see(&self, task: &ScoringTask) -> bool {
        match self {
            Requester::User(user) => *user == task.owner,
            Requester::Admin => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// 検証済み、キューに投入した
    Queued(ScoringTask),

    /// 回答が不正。タスクはエラー付きで CREATED のまま
    ValidationFailed {
        task: ScoringTask,
        errors: Vec<FieldError>,
    },

    /// 既に DONE / FAILED。変更せずに返す
    AlreadyFinal(ScoringTask),

    /// ワーカーが処理中
    InFlight(ScoringTask),

    /// `run_now` のみ: その場で処理済み（終端状態）
    Processed(ScoringTask),
}

impl SubmitOutcome {
    pub fn task(&self) -> &ScoringTask {
        match self {
            SubmitOutcome::Queued(task)
            | SubmitOutcome::ValidationFailed { task, .. }
            | SubmitOutcome::AlreadyFinal(task)
            | SubmitOutcome::InFlight(task)
            | SubmitOutcome::Processed(task) => task,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    #[error("task {0} belongs to another user")]
    Forbidden(TaskId),

    #[error("{0} not found")]
    ModelNotFound(ModelId),

    #[error("cannot encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("processing failed: {0}")]
    Processing(String),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl OrchestratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::TaskNotFound(_) | OrchestratorError::ModelNotFound(_) => {
                ErrorKind::NotFound
            }
            OrchestratorError::Forbidden(_) => ErrorKind::BusinessRule,
            OrchestratorError::Encode(_) | OrchestratorError::Processing(_) => {
                ErrorKind::Infrastructure
            }
            OrchestratorError::Task(e) => e.kind(),
            OrchestratorError::Store(e) => e.kind(),
            OrchestratorError::Queue(e) => e.kind(),
        }
    }
}

/// 下書きの検証結果
enum Checked {
    /// VALIDATED にして保存済み
    Valid(ScoringTask, RuntimeModel),
    Rejected(SubmitOutcome),
}

pub struct TaskOrchestrator {
    tasks: Arc<dyn TaskStore>,
    models: ModelResolver,
    queue: Arc<dyn DeliveryQueue>,
    processor: Arc<TaskProcessor>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl TaskOrchestrator {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        models: ModelResolver,
        queue: Arc<dyn DeliveryQueue>,
        processor: Arc<TaskProcessor>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            tasks,
            models,
            queue,
            processor,
            clock,
            ids,
        }
    }

    /// CREATED のタスクを保存する。モデルの存在確認は submit 時に行う
    pub async fn create_draft(
        &self,
        owner: UserId,
        model_id: ModelId,
        answers: Answers,
    ) -> Result<ScoringTask, OrchestratorError> {
        let task = self
            .tasks
            .create_task(NewTask {
                external_id: self.ids.generate_task_id(),
                owner,
                model_id,
                answers,
                created_at: self.clock.now(),
            })
            .await?;
        tracing::info!(task_id = %task.external_id, %owner, %model_id, "draft created");
        Ok(task)
    }

    /// CREATED の下書きに回答をマージ
    pub async fn update_draft(
        &self,
        requester: Requester,
        task_id: TaskId,
        answers: Answers,
    ) -> Result<ScoringTask, OrchestratorError> {
        let mut task = self.get_task(requester, task_id).await?;
        task.add_answers(answers)?;
        Ok(self.tasks.update_task(&task, TaskStatus::Created).await?)
    }

    /// 検証してキューに投入
    ///
    /// VALIDATED のタスクは再送する（publish が失われた場合の回復手段。
    /// ワーカーは冪等なので二重送信でも問題ない）
    pub async fn submit(
        &self,
        requester: Requester,
        task_id: TaskId,
    ) -> Result<SubmitOutcome, OrchestratorError> {
        let task = self.get_task(requester, task_id).await?;
        let (task, model) = match self.check(task).await? {
            Checked::Valid(task, model) => (task, model),
            Checked::Rejected(outcome) => return Ok(outcome),
        };

        let message = self.message_for(&task, &model);
        if let Err(e) = self.queue.publish(message.encode()?).await {
            // タスクは VALIDATED のまま。再 submit で再送できる
            tracing::error!(%task_id, error = %e, "publish failed");
            return Err(e.into());
        }
        tracing::info!(%task_id, model = %model.name(), "task queued");
        Ok(SubmitOutcome::Queued(task))
    }

    /// 下書き作成と submit を一度に行う
    pub async fn predict(
        &self,
        owner: UserId,
        model_id: ModelId,
        answers: Answers,
    ) -> Result<SubmitOutcome, OrchestratorError> {
        let draft = self.create_draft(owner, model_id, answers).await?;
        self.submit(Requester::User(owner), draft.external_id).await
    }

    /// キューを通さず、検証してその場で処理
    pub async fn run_now(
        &self,
        requester: Requester,
        task_id: TaskId,
    ) -> Result<SubmitOutcome, OrchestratorError> {
        let task = self.get_task(requester, task_id).await?;
        let (task, model) = match self.check(task).await? {
            Checked::Valid(task, model) => (task, model),
            Checked::Rejected(outcome) => return Ok(outcome),
        };

        let message = self.message_for(&task, &model);
        if let Disposition::Nack { error, .. } = self.processor.process(&message).await {
            return Err(OrchestratorError::Processing(error));
        }

        let task = self
            .tasks
            .get_task_by_external_id(task_id)
            .await?
            .ok_or(OrchestratorError::TaskNotFound(task_id))?;
        Ok(SubmitOutcome::Processed(task))
    }

    pub async fn get_task(
        &self,
        requester: Requester,
        task_id: TaskId,
    ) -> Result<ScoringTask, OrchestratorError> {
        let task = self
            .tasks
            .get_task_by_external_id(task_id)
            .await?
            .ok_or(OrchestratorError::TaskNotFound(task_id))?;
        if !requester.may_see(&task) {
            return Err(OrchestratorError::Forbidden(task_id));
        }
        Ok(task)
    }

    /// 所有者のタスク（新しい順）
    pub async fn history(&self, owner: UserId) -> Result<Vec<ScoringTask>, OrchestratorError> {
        Ok(self.tasks.list_tasks_by_owner(owner).await?)
    }

    fn message_for(&self, task: &ScoringTask, model: &RuntimeModel) -> ScoringMessage {
        ScoringMessage {
            task_id: task.external_id,
            features: task.answers().clone(),
            model: model.name().to_string(),
            timestamp: self.clock.now(),
        }
    }

    /// タスクを VALIDATED まで進める。進めない場合はその理由を返す
    async fn check(&self, task: ScoringTask) -> Result<Checked, OrchestratorError> {
        match task.status() {
            TaskStatus::Done | TaskStatus::Failed => {
                return Ok(Checked::Rejected(SubmitOutcome::AlreadyFinal(task)));
            }
            TaskStatus::Processing => return Ok(Checked::Rejected(SubmitOutcome::InFlight(task))),
            TaskStatus::Created | TaskStatus::Validated => {}
        }

        let Some(model) = self.models.resolve(task.model_id).await? else {
            let model_id = task.model_id;
            let expected = task.status();
            let mut task = task;
            task.fail(REASON_MODEL_NOT_FOUND)?;
            self.tasks.update_task(&task, expected).await?;
            tracing::warn!(task_id = %task.external_id, %model_id, "model not found");
            return Err(OrchestratorError::ModelNotFound(model_id));
        };

        if task.status() == TaskStatus::Validated {
            return Ok(Checked::Valid(task, model));
        }

        let report = model.validate(task.answers());
        let mut task = task;
        task.record_validation(report.ok, report.errors.clone())?;
        let task = self.tasks.update_task(&task, TaskStatus::Created).await?;

        if report.ok {
            Ok(Checked::Valid(task, model))
        } else {
            tracing::info!(
                task_id = %task.external_id,
                errors = report.errors.len(),
                "validation failed"
            );
            Ok(Checked::Rejected(SubmitOutcome::ValidationFailed {
                task,
                errors: report.errors,
            }))
        }
    }
}
