//! Scoring - 入力検証と予測のプラグイン
//!
//! # 構成
//! - **ScoringStrategy**: validate + predict（ワーカーとオーケストレーターが使う面）
//! - **Predictor**: 予測だけを担う差し替え可能な部品（Stub / Linear）
//! - **FeatureValidator**: 必須特徴量の存在と数値型をチェック
//! - **PredictorRegistry**: モデル名 → Predictor
//! - **RuntimeModel**: モデルのメタデータ + Validator + Predictor
//!
//! Scoring is synchronous CPU work; callers in async code move it onto the
//! blocking pool.

pub mod predictors;
pub mod registry;
pub mod runtime;
pub mod validator;

pub use predictors::{LinearArtifact, LinearPredictor, StubPredictor, select_predictor};
pub use registry::{PredictorRegistry, RegistryError};
pub use runtime::{ModelResolver, RuntimeModel};
pub use validator::FeatureValidator;

use serde::{Deserialize, Serialize};

use crate::domain::{Answers, Assessment, ErrorKind, FieldError};

/// Outcome of validating one questionnaire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub errors: Vec<FieldError>,
}

impl ValidationReport {
    pub fn from_errors(errors: Vec<FieldError>) -> Self {
        Self {
            ok: errors.is_empty(),
            errors,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoringError {
    #[error("missing feature '{0}'")]
    MissingFeature(String),

    #[error("feature '{0}' is not a number")]
    NotANumber(String),

    #[error("score is not a finite number")]
    NonFinite,

    #[error("model artifact: {0}")]
    Artifact(String),

    #[error("predictor crashed: {0}")]
    Crashed(String),
}

impl ScoringError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScoringError::MissingFeature(_) | ScoringError::NotANumber(_) => ErrorKind::UserInput,
            ScoringError::NonFinite | ScoringError::Crashed(_) => ErrorKind::BusinessRule,
            ScoringError::Artifact(_) => ErrorKind::Infrastructure,
        }
    }
}

/// Produces an assessment from answers. Must tolerate extra keys.
pub trait Predictor: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &str;

    fn predict(&self, answers: &Answers) -> Result<Assessment, ScoringError>;
}

/// What the task lifecycle needs from a model.
pub trait ScoringStrategy: Send + Sync {
    fn validate(&self, answers: &Answers) -> ValidationReport;

    fn predict(&self, answers: &Answers) -> Result<Assessment, ScoringError>;
}

/// Round to one decimal, the precision scores are reported in.
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_is_ok_without_errors() {
        assert!(ValidationReport::from_errors(vec![]).ok);
        let report = ValidationReport::from_errors(vec![FieldError::new("age", "field is required")]);
        assert!(!report.ok);
    }

    #[test]
    fn rounding_keeps_one_decimal() {
        assert_eq!(round1(41.549), 41.5);
        assert_eq!(round1(41.56), 41.6);
    }
}
