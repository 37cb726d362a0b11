//! ScoringModel - モデルのメタデータ（価格と必須特徴量）

use serde::{Deserialize, Serialize};

use super::errors::ErrorKind;
use super::ids::ModelId;
use super::wallet::Credits;

/// モデル登録用のメタデータ（id はカタログが割り当てる）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewModel {
    pub name: String,
    pub price: Credits,
    pub feature_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringModel {
    pub id: ModelId,

    /// 一意な名前。キューメッセージにも載る
    pub name: String,

    /// 成功したタスク 1 件あたりの課金額
    pub price: Credits,

    /// 必須の入力特徴量（Predictor が期待する順）
    pub feature_names: Vec<String>,
}

/// 不正なモデルメタデータ
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelMetaError {
    #[error("model '{0}' has no required features")]
    NoFeatures(String),

    #[error("model '{0}' must cost more than 0 credits")]
    FreeModel(String),
}

impl ModelMetaError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::UserInput
    }
}

impl NewModel {
    pub fn new(name: impl Into<String>, price: Credits, feature_names: &[&str]) -> Self {
        Self {
            name: name.into(),
            price,
            feature_names: feature_names.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn validate_meta(&self) -> Result<(), ModelMetaError> {
        if self.feature_names.is_empty() {
            return Err(ModelMetaError::NoFeatures(self.name.clone()));
        }
        if self.price == 0 {
            return Err(ModelMetaError::FreeModel(self.name.clone()));
        }
        Ok(())
    }

    pub fn into_model(self, id: ModelId) -> ScoringModel {
        ScoringModel {
            id,
            name: self.name,
            price: self.price,
            feature_names: self.feature_names,
        }
    }
}

impl ScoringModel {
    pub fn validate_meta(&self) -> Result<(), ModelMetaError> {
        NewModel {
            name: self.name.clone(),
            price: self.price,
            feature_names: self.feature_names.clone(),
        }
        .validate_meta()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_requires_features_and_price() {
        assert!(NewModel::new("bioage", 25, &["age", "bmi"]).validate_meta().is_ok());
        assert_eq!(
            NewModel::new("empty", 25, &[]).validate_meta(),
            Err(ModelMetaError::NoFeatures("empty".into()))
        );
        assert_eq!(
            NewModel::new("free", 0, &["age"]).validate_meta(),
            Err(ModelMetaError::FreeModel("free".into()))
        );
    }

    #[test]
    fn into_model_keeps_feature_order() {
        let model = NewModel::new("bioage", 25, &["glucose", "age"]).into_model(ModelId(3));
        assert_eq!(model.id, ModelId(3));
        assert_eq!(model.feature_names, vec!["glucose", "age"]);
        assert!(model.validate_meta().is_ok());
    }
}
