//! Predictors - Stub と学習済み線形モデル
//!
//! - **StubPredictor**: 固定式。学習済みモデルがない環境（開発・テスト）用
//! - **LinearPredictor**: 学習スクリプトが書き出す JSON メタデータ
//!   （features / coefficients / intercept）から読み込む線形モデル
//!
//! 起動時に `select_predictor` がどちらを使うか決める。

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::domain::{Answers, Assessment, Factor, FactorGroup};

use super::{Predictor, ScoringError, round1};

const STUB_DEFAULT_AGE: f64 = 40.0;
const STUB_DEFAULT_BMI: f64 = 25.0;
const STUB_DEFAULT_GLUCOSE: f64 = 5.2;
const STUB_REFERENCE_BMI: f64 = 22.0;

/// Contribution (in years) below which a linear factor counts as neutral.
const NEUTRAL_BAND: f64 = 0.5;

fn number_or(answers: &Answers, field: &str, default: f64) -> f64 {
    answers
        .get(field)
        .and_then(serde_json::Value::as_f64)
        .unwrap_or(default)
}

/// Deterministic formula: `age + (bmi - 22) * 0.5`.
///
/// Missing or non-numeric inputs fall back to defaults, so it never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubPredictor;

impl Predictor for StubPredictor {
    fn name(&self) -> &str {
        "stub"
    }

    fn predict(&self, answers: &Answers) -> Result<Assessment, ScoringError> {
        let age = number_or(answers, "age", STUB_DEFAULT_AGE);
        let bmi = number_or(answers, "bmi", STUB_DEFAULT_BMI);
        let glucose = number_or(answers, "glucose", STUB_DEFAULT_GLUCOSE);

        let score = age + (bmi - STUB_REFERENCE_BMI) * 0.5;

        Ok(Assessment::new(round1(score))
            .with_factor(Factor::new(
                "bmi",
                bmi,
                FactorGroup::Neutral,
                "BMI within normal range",
            ))
            .with_factor(Factor::new(
                "glucose",
                glucose,
                FactorGroup::Positive,
                "glucose is optimal",
            )))
    }
}

/// JSON metadata written by the training pipeline.
///
/// `means` / `scales` describe the standardisation applied before the
/// regression; absent entries mean 0 and 1.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LinearArtifact {
    pub features: Vec<String>,
    pub coefficients: BTreeMap<String, f64>,

    #[serde(default)]
    pub intercept: f64,

    #[serde(default)]
    pub means: BTreeMap<String, f64>,

    #[serde(default)]
    pub scales: BTreeMap<String, f64>,

    #[serde(default)]
    pub model_type: Option<String>,

    #[serde(default)]
    pub target: Option<String>,

    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

#[derive(Debug, Clone)]
struct Term {
    feature: String,
    coefficient: f64,
    mean: f64,
    scale: f64,
}

/// `intercept + Σ coef * (x - mean) / scale`, one factor per feature.
#[derive(Debug, Clone)]
pub struct LinearPredictor {
    label: String,
    intercept: f64,
    terms: Vec<Term>,
}

impl LinearPredictor {
    pub fn from_artifact(artifact: LinearArtifact) -> Result<Self, ScoringError> {
        if artifact.features.is_empty() {
            return Err(ScoringError::Artifact("no features".into()));
        }

        let mut terms = Vec::with_capacity(artifact.features.len());
        for feature in &artifact.features {
            let coefficient = *artifact
                .coefficients
                .get(feature)
                .ok_or_else(|| ScoringError::Artifact(format!("no coefficient for '{feature}'")))?;
            let scale = artifact.scales.get(feature).copied().unwrap_or(1.0);
            if scale == 0.0 || !scale.is_finite() {
                return Err(ScoringError::Artifact(format!(
                    "invalid scale for '{feature}'"
                )));
            }
            terms.push(Term {
                feature: feature.clone(),
                coefficient,
                mean: artifact.means.get(feature).copied().unwrap_or(0.0),
                scale,
            });
        }

        Ok(Self {
            label: artifact
                .model_type
                .unwrap_or_else(|| "linear".to_string()),
            intercept: artifact.intercept,
            terms,
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, ScoringError> {
        let artifact: LinearArtifact =
            serde_json::from_str(raw).map_err(|e| ScoringError::Artifact(e.to_string()))?;
        Self::from_artifact(artifact)
    }

    pub fn from_file(path: &Path) -> Result<Self, ScoringError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ScoringError::Artifact(format!("{}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    pub fn features(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(|t| t.feature.as_str())
    }
}

impl Predictor for LinearPredictor {
    fn name(&self) -> &str {
        &self.label
    }

    fn predict(&self, answers: &Answers) -> Result<Assessment, ScoringError> {
        let mut score = self.intercept;
        let mut factors = Vec::with_capacity(self.terms.len());

        for term in &self.terms {
            let raw = answers
                .get(&term.feature)
                .ok_or_else(|| ScoringError::MissingFeature(term.feature.clone()))?;
            let value = raw
                .as_f64()
                .ok_or_else(|| ScoringError::NotANumber(term.feature.clone()))?;

            let contribution = term.coefficient * (value - term.mean) / term.scale;
            score += contribution;

            let group = if contribution > NEUTRAL_BAND {
                FactorGroup::Negative
            } else if contribution < -NEUTRAL_BAND {
                FactorGroup::Positive
            } else {
                FactorGroup::Neutral
            };
            factors.push(Factor::new(
                term.feature.as_str(),
                value,
                group,
                format!("{contribution:+.1} years"),
            ));
        }

        if !score.is_finite() {
            return Err(ScoringError::NonFinite);
        }
        Ok(Assessment {
            score: round1(score),
            factors,
        })
    }
}

/// Use the trained artifact at `path` when it exists and loads, else the stub.
pub fn select_predictor(path: Option<&Path>) -> Arc<dyn Predictor> {
    let Some(path) = path else {
        tracing::info!("no model artifact configured, using stub predictor");
        return Arc::new(StubPredictor);
    };
    if !path.exists() {
        tracing::info!(path = %path.display(), "model artifact not found, using stub predictor");
        return Arc::new(StubPredictor);
    }
    match LinearPredictor::from_file(path) {
        Ok(predictor) => {
            tracing::info!(path = %path.display(), model = predictor.name(), "loaded model artifact");
            Arc::new(predictor)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot load model artifact, using stub predictor");
            Arc::new(StubPredictor)
        }
    }
}
