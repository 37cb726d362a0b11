//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 開発体験の改善（明確なエラーメッセージ）

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::{AppConfig, ConfigError};
use crate::domain::{ErrorKind, ModelMetaError, NewModel, ScoringModel, StoreError};
use crate::impls::{InMemoryDeliveryQueue, InMemoryStore};
use crate::ports::{Clock, IdGenerator, ModelCatalog, SystemClock, UlidGenerator};
use crate::scoring::{ModelResolver, Predictor, PredictorRegistry, RegistryError, select_predictor};

use super::ledger::WalletLedger;
use super::orchestrator::TaskOrchestrator;
use super::processor::TaskProcessor;
use super::status::{StatusError, StatusReport};
use super::worker_loop::{WorkerGroup, WorkerLoop};

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new(config)
///     .register_predictor("bioage", Arc::new(StubPredictor))
///     .seed_model(NewModel::new("bioage", 25, &["age", "bmi"]))
///     .expect_models(&["bioage"])
///     .build()
///     .await?;
/// ```
///
/// # Fail-fast 設計
/// - expect_models() で期待されるモデル名を登録
/// - build() 時に「期待集合 ⊆ Predictor 登録済み集合」をチェック
/// - 不足があれば BuildError を返す
pub struct AppBuilder {
    config: AppConfig,
    predictors: Vec<(String, Arc<dyn Predictor>)>,
    default_predictor: Option<Arc<dyn Predictor>>,
    models: Vec<NewModel>,
    expected_models: Option<Vec<String>>,
    clock: Option<Arc<dyn Clock>>,
    store: Option<Arc<InMemoryStore>>,
    queue: Option<Arc<InMemoryDeliveryQueue>>,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing predictors for models: {0:?}. These models were expected but have no predictor.")]
    MissingPredictors(Vec<String>),

    #[error(transparent)]
    InvalidModel(#[from] ModelMetaError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BuildError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BuildError::MissingPredictors(_) => ErrorKind::UserInput,
            BuildError::InvalidModel(e) => e.kind(),
            BuildError::Config(e) => e.kind(),
            BuildError::Registry(e) => e.kind(),
            BuildError::Store(e) => e.kind(),
        }
    }
}

impl AppBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            predictors: Vec::new(),
            default_predictor: None,
            models: Vec::new(),
            expected_models: None,
            clock: None,
            store: None,
            queue: None,
        }
    }

    /// モデル名に対応する Predictor を登録
    pub fn register_predictor(
        mut self,
        model_name: impl Into<String>,
        predictor: Arc<dyn Predictor>,
    ) -> Self {
        self.predictors.push((model_name.into(), predictor));
        self
    }

    /// 専用の Predictor を持たないモデル用のフォールバック。
    /// 未指定なら `model_artifact_path` から選ぶ
    pub fn with_default_predictor(mut self, predictor: Arc<dyn Predictor>) -> Self {
        self.default_predictor = Some(predictor);
        self
    }

    /// build() 時にカタログへ登録するモデル
    pub fn seed_model(mut self, model: NewModel) -> Self {
        self.models.push(model);
        self
    }

    /// 名前で Predictor が登録されていなければならないモデル
    pub fn expect_models(mut self, names: &[&str]) -> Self {
        self.expected_models = Some(names.iter().map(|n| n.to_string()).collect());
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_store(mut self, store: Arc<InMemoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_queue(mut self, queue: Arc<InMemoryDeliveryQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// AppBuilder を構築して App を生成
    ///
    /// # 検証
    /// - config.validate() で設定を検証
    /// - expect_models() のモデル名が全て Predictor として登録されているか
    /// - seed するモデルのメタデータ（特徴量あり・有料）
    pub async fn build(self) -> Result<App, BuildError> {
        self.config.validate()?;

        let mut registry = PredictorRegistry::new();
        for (name, predictor) in self.predictors {
            registry.register(name, predictor)?;
        }

        if let Some(expected) = &self.expected_models {
            let registered: BTreeSet<String> = registry.registered_names().into_iter().collect();
            let missing: Vec<String> = expected
                .iter()
                .filter(|name| !registered.contains(*name))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingPredictors(missing));
            }
        }

        let default = match self.default_predictor {
            Some(predictor) => predictor,
            None => select_predictor(self.config.model_artifact_path.as_deref()),
        };
        registry.set_default(default);

        for model in &self.models {
            model.validate_meta()?;
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryStore::with_clock(clock.clone())));
        let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(clock.clone()));
        let queue = match self.queue {
            Some(queue) => queue,
            None => Arc::new(
                InMemoryDeliveryQueue::new(&self.config.queue_name, self.config.visibility_timeout())
                    .with_id_generator(ids.clone()),
            ),
        };

        let mut models = Vec::with_capacity(self.models.len());
        for model in self.models {
            let model = store.insert_model(model).await?;
            tracing::info!(model = %model.name, price = model.price, "model seeded");
            models.push(model);
        }

        let registry = Arc::new(registry);
        let resolver = ModelResolver::new(store.clone(), registry);
        let ledger = WalletLedger::new(store.clone());
        let processor = Arc::new(TaskProcessor::new(
            store.clone(),
            ledger.clone(),
            resolver.clone(),
            self.config.worker_id.clone(),
        ));
        let orchestrator = Arc::new(TaskOrchestrator::new(
            store.clone(),
            resolver,
            queue.clone(),
            processor.clone(),
            clock,
            ids,
        ));

        Ok(App {
            config: Arc::new(self.config),
            store,
            queue,
            ledger,
            orchestrator,
            processor,
            models,
        })
    }
}

/// App はアプリケーションのランタイム
pub struct App {
    pub config: Arc<AppConfig>,
    pub store: Arc<InMemoryStore>,
    pub queue: Arc<InMemoryDeliveryQueue>,
    pub ledger: WalletLedger,
    pub orchestrator: Arc<TaskOrchestrator>,
    pub processor: Arc<TaskProcessor>,

    /// build() で登録したモデル（id 割り当て済み）
    pub models: Vec<ScoringModel>,
}

impl App {
    /// アプリのキューに `config.worker_count` 本のワーカーを起動
    pub fn spawn_workers(&self) -> WorkerGroup {
        WorkerGroup::start(
            self.config.worker_count,
            self.queue.clone(),
            self.processor.clone(),
            &self.config,
        )
    }

    /// 手動でキューを回すための単体ワーカー
    pub fn worker_loop(&self) -> WorkerLoop {
        WorkerLoop::new(
            self.config.worker_id.clone(),
            self.queue.clone(),
            self.processor.clone(),
            self.config.receive_timeout(),
            self.config.reconnect_backoff(),
        )
    }

    pub async fn status(&self) -> Result<StatusReport, StatusError> {
        StatusReport::collect(self.store.as_ref(), self.queue.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::StubPredictor;

    fn config() -> AppConfig {
        AppConfig {
            worker_id: "test".into(),
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn test_build_success() {
        let app = AppBuilder::new(config())
            .register_predictor("bioage", Arc::new(StubPredictor))
            .seed_model(NewModel::new("bioage", 25, &["age", "bmi"]))
            .expect_models(&["bioage"])
            .build()
            .await
            .unwrap();

        assert_eq!(app.models.len(), 1);
        assert_eq!(app.models[0].name, "bioage");
        assert_eq!(app.processor.worker_id(), "test");
        assert_eq!(app.status().await.unwrap(), StatusReport::default());
    }

    #[tokio::test]
    async fn test_build_missing_predictors() {
        let app = AppBuilder::new(config())
            .register_predictor("bioage", Arc::new(StubPredictor))
            .expect_models(&["bioage", "frailty"])
            .build()
            .await;
        assert!(matches!(
            app,
            Err(BuildError::MissingPredictors(missing)) if missing == vec!["frailty".to_string()]
        ));
    }

    #[tokio::test]
    async fn test_build_no_expect_models() {
        let app = AppBuilder::new(config())
            .seed_model(NewModel::new("bioage", 25, &["age"]))
            .build()
            .await;
        assert!(app.is_ok());
    }

    #[tokio::test]
    async fn test_build_rejects_free_model() {
        let err = AppBuilder::new(config())
            .seed_model(NewModel::new("free", 0, &["age"]))
            .build()
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BuildError::InvalidModel(ModelMetaError::FreeModel(_))));
        assert_eq!(err.kind(), ErrorKind::UserInput);
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_config() {
        let err = AppBuilder::new(AppConfig {
            worker_count: 0,
            ..config()
        })
        .build()
        .await
        .err()
        .unwrap();
        assert!(matches!(err, BuildError::Config(_)));
    }

    #[tokio::test]
    async fn test_build_rejects_duplicate_predictor() {
        let err = AppBuilder::new(config())
            .register_predictor("bioage", Arc::new(StubPredictor))
            .register_predictor("bioage", Arc::new(StubPredictor))
            .build()
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BuildError::Registry(RegistryError::AlreadyRegistered(_))));
    }
}
