//! ScoringTask - タスクのレコードと状態機械
//!
//! # 設計
//! - 状態の変更はすべて、現在の状態を先に確認するメソッド経由
//! - 状態機械が守るフィールドは private。読み取りはアクセサ経由
//! - 永続化はここの責務ではない。メソッドはメモリ上の値を変えるだけで、
//!   呼び出し側が状態と version を条件に保存する（`TaskStore` 参照）
//! - Serialize のみ。外部データからタスクを復元しないので、
//!   下の遷移が作らない状態は存在しない

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::assessment::{Answers, Assessment, FieldError};
use super::errors::TaskError;
use super::ids::{ModelId, TaskId, TaskKey, UserId};
use super::state::TaskStatus;
use super::wallet::Credits;

/// タスク挿入に必要な情報（`TaskKey` はストアが割り当てる）
#[derive(Debug, Clone)]
pub struct NewTask {
    pub external_id: TaskId,
    pub owner: UserId,
    pub model_id: ModelId,
    pub answers: Answers,
    pub created_at: DateTime<Utc>,
}

/// スコア計算のリクエスト 1 件。ライフサイクルを通して追跡する
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoringTask {
    pub key: TaskKey,
    pub external_id: TaskId,
    pub owner: UserId,
    pub model_id: ModelId,

    answers: Answers,
    validation_errors: Vec<FieldError>,
    status: TaskStatus,
    result: Option<Assessment>,
    charged_amount: Option<Credits>,
    error_message: Option<String>,

    /// 最後に触ったワーカー（診断用）
    worker_id: Option<String>,

    /// 保存のたびに 1 増える。古いコピーでの上書きを検出する
    version: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScoringTask {
    pub fn from_new(key: TaskKey, new: NewTask) -> Self {
        Self {
            key,
            external_id: new.external_id,
            owner: new.owner,
            model_id: new.model_id,
            answers: new.answers,
            validation_errors: Vec::new(),
            status: TaskStatus::Created,
            result: None,
            charged_amount: None,
            error_message: None,
            worker_id: None,
            version: 0,
            created_at: new.created_at,
            updated_at: new.created_at,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn answers(&self) -> &Answers {
        &self.answers
    }

    pub fn validation_errors(&self) -> &[FieldError] {
        &self.validation_errors
    }

    pub fn result(&self) -> Option<&Assessment> {
        self.result.as_ref()
    }

    pub fn charged_amount(&self) -> Option<Credits> {
        self.charged_amount
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn worker_id(&self) -> Option<&str> {
        self.worker_id.as_deref()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// ストアがこのコピーを保存するときに呼ぶ
    pub fn mark_stored(&mut self, at: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = at;
    }

    pub fn stamp_worker(&mut self, worker_id: &str) {
        self.worker_id = Some(worker_id.to_string());
    }

    fn require(&self, allowed: &[TaskStatus], action: &'static str) -> Result<(), TaskError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(TaskError::InvalidState {
                action,
                status: self.status,
            })
        }
    }

    /// 回答フィールドを 1 つ追加または上書き（CREATED のみ）
    pub fn add_answer(
        &mut self,
        field: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<(), TaskError> {
        self.require(&[TaskStatus::Created], "add answers to")?;
        self.answers.insert(field.into(), value);
        Ok(())
    }

    /// 複数フィールドをまとめてマージ（CREATED のみ）
    ///
    /// 古い検証エラーは捨てる（前の回答に対するものなので）
    pub fn add_answers(&mut self, answers: Answers) -> Result<(), TaskError> {
        self.require(&[TaskStatus::Created], "add answers to")?;
        self.answers.extend(answers);
        self.validation_errors.clear();
        Ok(())
    }

    /// 検証結果を記録（CREATED のみ）
    ///
    /// 有効なら VALIDATED にしてエラーを消す。無効なら CREATED のままエラーを記録
    pub fn record_validation(
        &mut self,
        is_valid: bool,
        errors: Vec<FieldError>,
    ) -> Result<(), TaskError> {
        self.require(&[TaskStatus::Created], "record validation for")?;
        if is_valid {
            self.validation_errors.clear();
            self.status = TaskStatus::Validated;
        } else {
            self.validation_errors = errors;
        }
        Ok(())
    }

    /// VALIDATED → PROCESSING
    pub fn begin_processing(&mut self) -> Result<(), TaskError> {
        self.require(&[TaskStatus::Validated], "begin processing")?;
        self.status = TaskStatus::Processing;
        Ok(())
    }

    /// PROCESSING → DONE（結果と課金額を記録）
    pub fn complete(&mut self, result: Assessment, charged_amount: Credits) -> Result<(), TaskError> {
        self.require(&[TaskStatus::Processing], "complete")?;
        if charged_amount == 0 {
            return Err(TaskError::ZeroCharge);
        }
        self.result = Some(result);
        self.charged_amount = Some(charged_amount);
        self.status = TaskStatus::Done;
        Ok(())
    }

    /// 終端以外の状態 → FAILED
    ///
    /// 終端状態のタスクは上書きしない（`InvalidState` を返す）
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), TaskError> {
        self.require(
            &[
                TaskStatus::Created,
                TaskStatus::Validated,
                TaskStatus::Processing,
            ],
            "fail",
        )?;
        self.error_message = Some(message.into());
        self.status = TaskStatus::Failed;
        Ok(())
    }

    /// 後段の検証で回答が拒否されたため失敗にする（エラーは保持）
    pub fn fail_validation(
        &mut self,
        errors: Vec<FieldError>,
        message: impl Into<String>,
    ) -> Result<(), TaskError> {
        self.fail(message)?;
        self.validation_errors = errors;
        Ok(())
    }
}
