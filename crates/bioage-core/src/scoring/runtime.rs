//! RuntimeModel - メタデータに振る舞いを足したもの
//!
//! ストアにはメタデータ（ScoringModel）しかない。
//! 実行時に必須特徴量から FeatureValidator を作り、Predictor と組み合わせる。

use std::sync::Arc;

use crate::domain::{Answers, Assessment, Credits, ModelId, ScoringModel, StoreError};
use crate::ports::ModelCatalog;

use super::{
    FeatureValidator, Predictor, PredictorRegistry, ScoringError, ScoringStrategy,
    ValidationReport,
};

#[derive(Clone)]
pub struct RuntimeModel {
    meta: ScoringModel,
    validator: FeatureValidator,
    predictor: Arc<dyn Predictor>,
}

impl RuntimeModel {
    pub fn new(meta: ScoringModel, predictor: Arc<dyn Predictor>) -> Self {
        let validator = FeatureValidator::new(meta.feature_names.iter().cloned());
        Self {
            meta,
            validator,
            predictor,
        }
    }

    pub fn id(&self) -> ModelId {
        self.meta.id
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn price(&self) -> Credits {
        self.meta.price
    }

    pub fn meta(&self) -> &ScoringModel {
        &self.meta
    }

    pub fn predictor_name(&self) -> &str {
        self.predictor.name()
    }
}

impl ScoringStrategy for RuntimeModel {
    fn validate(&self, answers: &Answers) -> ValidationReport {
        self.validator.validate(answers)
    }

    fn predict(&self, answers: &Answers) -> Result<Assessment, ScoringError> {
        self.predictor.predict(answers)
    }
}

impl std::fmt::Debug for RuntimeModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeModel")
            .field("meta", &self.meta)
            .field("predictor", &self.predictor.name())
            .finish()
    }
}

/// Looks up model metadata and attaches its predictor.
#[derive(Clone)]
pub struct ModelResolver {
    catalog: Arc<dyn ModelCatalog>,
    registry: Arc<PredictorRegistry>,
}

impl ModelResolver {
    pub fn new(catalog: Arc<dyn ModelCatalog>, registry: Arc<PredictorRegistry>) -> Self {
        Self { catalog, registry }
    }

    /// `None` when the model does not exist or no predictor serves it.
    pub async fn resolve(&self, id: ModelId) -> Result<Option<RuntimeModel>, StoreError> {
        let Some(meta) = self.catalog.get_model(id).await? else {
            return Ok(None);
        };
        Ok(self.attach(meta))
    }

    pub async fn resolve_by_name(&self, name: &str) -> Result<Option<RuntimeModel>, StoreError> {
        let Some(meta) = self.catalog.get_model_by_name(name).await? else {
            return Ok(None);
        };
        Ok(self.attach(meta))
    }

    fn attach(&self, meta: ScoringModel) -> Option<RuntimeModel> {
        match self.registry.get(&meta.name) {
            Some(predictor) => Some(RuntimeModel::new(meta, predictor)),
            None => {
                tracing::warn!(model = %meta.name, "model has no predictor");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewModel;
    use crate::impls::InMemoryStore;
    use crate::scoring::StubPredictor;
    use serde_json::json;

    #[test]
    fn runtime_model_validates_against_its_features() {
        let meta = NewModel::new("bioage", 25, &["age", "bmi"]).into_model(ModelId(1));
        let model = RuntimeModel::new(meta, Arc::new(StubPredictor));

        let answers: Answers = serde_json::from_value(json!({"age": 40})).unwrap();
        let report = model.validate(&answers);
        assert!(!report.ok);
        assert_eq!(report.errors[0].field_name, "bmi");
        assert_eq!(model.price(), 25);
    }

    #[tokio::test]
    async fn resolver_needs_both_metadata_and_predictor() {
        let store = Arc::new(InMemoryStore::new());
        let known = store
            .insert_model(NewModel::new("bioage", 25, &["age"]))
            .await
            .unwrap();
        let orphan = store
            .insert_model(NewModel::new("orphan", 10, &["age"]))
            .await
            .unwrap();

        let mut registry = PredictorRegistry::new();
        registry.register("bioage", Arc::new(StubPredictor)).unwrap();
        let resolver = ModelResolver::new(store, Arc::new(registry));

        let model = resolver.resolve(known.id).await.unwrap().unwrap();
        assert_eq!(model.name(), "bioage");
        assert_eq!(model.predictor_name(), "stub");

        assert!(resolver.resolve(orphan.id).await.unwrap().is_none());
        assert!(resolver.resolve(ModelId(999)).await.unwrap().is_none());
        assert!(resolver.resolve_by_name("bioage").await.unwrap().is_some());
    }
}
