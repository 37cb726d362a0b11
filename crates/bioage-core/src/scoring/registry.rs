//! PredictorRegistry - モデル名 → Predictor
//!
//! # 内部実装
//! - HashMap<String, Arc<dyn Predictor>> で管理
//! - 名前で見つからなければ default にフォールバック（設定されていれば）

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::ErrorKind;

use super::Predictor;

#[derive(Default, Clone)]
pub struct PredictorRegistry {
    predictors: HashMap<String, Arc<dyn Predictor>>,
    default: Option<Arc<dyn Predictor>>,
}

/// RegistryError は PredictorRegistry の操作エラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Predictor for model '{0}' is already registered")]
    AlreadyRegistered(String),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::BusinessRule
    }
}

impl PredictorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        model_name: impl Into<String>,
        predictor: Arc<dyn Predictor>,
    ) -> Result<(), RegistryError> {
        let model_name = model_name.into();
        if self.predictors.contains_key(&model_name) {
            return Err(RegistryError::AlreadyRegistered(model_name));
        }
        self.predictors.insert(model_name, predictor);
        Ok(())
    }

    /// Predictor for models that were not registered by name.
    pub fn set_default(&mut self, predictor: Arc<dyn Predictor>) {
        self.default = Some(predictor);
    }

    pub fn get(&self, model_name: &str) -> Option<Arc<dyn Predictor>> {
        self.predictors
            .get(model_name)
            .or(self.default.as_ref())
            .cloned()
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub fn registered_names(&self) -> Vec<String> {
        self.predictors.keys().cloned().collect()
    }
}

impl std::fmt::Debug for PredictorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictorRegistry")
            .field("models", &self.registered_names())
            .field("default", &self.default.as_ref().map(|p| p.name().to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::StubPredictor;

    #[test]
    fn test_register_and_get() {
        let mut registry = PredictorRegistry::new();
        registry.register("bioage", Arc::new(StubPredictor)).unwrap();

        assert!(registry.get("bioage").is_some());
        assert!(registry.get("other").is_none());
        assert_eq!(registry.registered_names(), vec!["bioage".to_string()]);
    }

    #[test]
    fn test_double_registration() {
        let mut registry = PredictorRegistry::new();
        registry.register("bioage", Arc::new(StubPredictor)).unwrap();
        let result = registry.register("bioage", Arc::new(StubPredictor));
        assert_eq!(
            result,
            Err(RegistryError::AlreadyRegistered("bioage".into()))
        );
    }

    #[test]
    fn test_default_fallback() {
        let mut registry = PredictorRegistry::new();
        assert!(!registry.has_default());
        registry.set_default(Arc::new(StubPredictor));
        assert_eq!(registry.get("anything").map(|p| p.name().to_string()), Some("stub".into()));
    }
}
