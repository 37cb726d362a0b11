//! ModelCatalog port - スコアリングモデルのメタデータ

use async_trait::async_trait;

use crate::domain::{ModelId, NewModel, ScoringModel, StoreError};

#[async_trait]
pub trait ModelCatalog: Send + Sync {
    /// モデルを登録。名前は一意（重複は `StoreError::Duplicate`）
    async fn insert_model(&self, new: NewModel) -> Result<ScoringModel, StoreError>;

    async fn get_model(&self, id: ModelId) -> Result<Option<ScoringModel>, StoreError>;

    async fn get_model_by_name(&self, name: &str) -> Result<Option<ScoringModel>, StoreError>;

    /// 全モデル（id 順）
    async fn list_models(&self) -> Result<Vec<ScoringModel>, StoreError>;
}
