//! InMemoryStore - 開発用の正本（tasks / wallets / transactions / models）
//!
//! # 実装詳細
//! - すべての表を 1 つの `tokio::sync::Mutex` で守る
//! - 1 メソッド呼び出し = 1 原子単位（ロックを握ったまま await しない）
//! - 残高チェック → 減算 → 取引の追記 が同じクリティカルセクションで完結する
//!
//! 障害注入（`set_unavailable` / `fail_settlements`）はワーカーの
//! インフラ障害パスを試すためのもの。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{
    BalanceChange, Credits, LedgerError, ModelId, NewModel, NewTask, ScoringModel, ScoringTask,
    StoreError, TaskId, TaskKey, TaskStatus, Transaction, TransactionId, UserId, Wallet,
};
use crate::ports::{Clock, LedgerStore, ModelCatalog, SystemClock, TaskCounts, TaskStore};

#[derive(Default)]
struct StoreState {
    tasks: BTreeMap<TaskKey, ScoringTask>,
    by_external_id: HashMap<TaskId, TaskKey>,
    wallets: HashMap<UserId, Wallet>,

    /// Append-only ledger.
    transactions: Vec<Transaction>,

    models: BTreeMap<ModelId, ScoringModel>,

    next_task_key: u64,
    next_transaction_id: u64,
    next_model_id: u64,

    unavailable: bool,
    fail_settlements: bool,
}

impl StoreState {
    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("in-memory store is offline".into()));
        }
        Ok(())
    }

    fn allocate_task_key(&mut self) -> TaskKey {
        self.next_task_key += 1;
        TaskKey(self.next_task_key)
    }

    fn allocate_model_id(&mut self) -> ModelId {
        self.next_model_id += 1;
        ModelId(self.next_model_id)
    }

    /// Peek only: the id is consumed by `append` once the change succeeded.
    fn pending_transaction_id(&self) -> TransactionId {
        TransactionId(self.next_transaction_id + 1)
    }

    fn append(&mut self, transaction: Transaction) {
        self.next_transaction_id = transaction.id.get();
        self.transactions.push(transaction);
    }
}

pub struct InMemoryStore {
    state: Mutex<StoreState>,
    clock: Arc<dyn Clock>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            clock,
        }
    }

    /// Make every operation fail with `StoreError::Unavailable`.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }

    /// Make only `settle_task` fail with `StoreError::Unavailable`.
    pub async fn fail_settlements(&self, fail: bool) {
        self.state.lock().await.fail_settlements = fail;
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn stale(task: &ScoringTask, stored: &ScoringTask) -> StoreError {
    StoreError::Conflict(format!(
        "{} was written by someone else (version {} expected {})",
        task.key,
        stored.version(),
        task.version()
    ))
}

#[async_trait]
impl TaskStore for InMemoryStore {
    async fn create_task(&self, new: NewTask) -> Result<ScoringTask, StoreError> {
        let mut state = self.state.lock().await;
        state.check_available()?;

        if state.by_external_id.contains_key(&new.external_id) {
            return Err(StoreError::Duplicate(new.external_id.to_string()));
        }
        let key = state.allocate_task_key();
        let task = ScoringTask::from_new(key, new);
        state.by_external_id.insert(task.external_id, key);
        state.tasks.insert(key, task.clone());
        Ok(task)
    }

    async fn get_task(&self, key: TaskKey) -> Result<Option<ScoringTask>, StoreError> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state.tasks.get(&key).cloned())
    }

    async fn get_task_by_external_id(
        &self,
        id: TaskId,
    ) -> Result<Option<ScoringTask>, StoreError> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state
            .by_external_id
            .get(&id)
            .and_then(|key| state.tasks.get(key))
            .cloned())
    }

    async fn update_task(
        &self,
        task: &ScoringTask,
        expected: TaskStatus,
    ) -> Result<ScoringTask, StoreError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.check_available()?;

        // DONE carries a charge, so it is only written by settle_task.
        if task.status() == TaskStatus::Done {
            return Err(StoreError::Conflict(format!(
                "{} must be settled, not updated",
                task.key
            )));
        }

        let stored = state
            .tasks
            .get_mut(&task.key)
            .ok_or_else(|| StoreError::Missing(task.key.to_string()))?;
        if stored.status() != expected {
            return Err(StoreError::Conflict(format!(
                "{} is {} (expected {expected})",
                task.key,
                stored.status()
            )));
        }
        if stored.version() != task.version() {
            return Err(stale(task, stored));
        }

        let mut next = task.clone();
        next.mark_stored(now);
        *stored = next.clone();
        Ok(next)
    }

    async fn list_tasks_by_owner(&self, owner: UserId) -> Result<Vec<ScoringTask>, StoreError> {
        let state = self.state.lock().await;
        state.check_available()?;
        let mut tasks: Vec<ScoringTask> = state
            .tasks
            .values()
            .filter(|t| t.owner == owner)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.key.cmp(&a.key)));
        Ok(tasks)
    }

    async fn counts_by_status(&self) -> Result<TaskCounts, StoreError> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state.tasks.values().map(ScoringTask::status).collect())
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn open_wallet(&self, owner: UserId, initial: Credits) -> Result<Wallet, LedgerError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.check_available()?;

        if state.wallets.contains_key(&owner) {
            return Err(LedgerError::WalletAlreadyExists(owner));
        }
        let mut wallet = Wallet::new(owner);
        if initial > 0 {
            let change = BalanceChange::credit(initial)?;
            let id = state.pending_transaction_id();
            let transaction = wallet.apply(&change, id, now)?;
            state.append(transaction);
        }
        state.wallets.insert(owner, wallet.clone());
        Ok(wallet)
    }

    async fn wallet(&self, owner: UserId) -> Result<Option<Wallet>, StoreError> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state.wallets.get(&owner).cloned())
    }

    async fn apply_change(
        &self,
        owner: UserId,
        change: BalanceChange,
    ) -> Result<(Wallet, Transaction), LedgerError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.check_available()?;

        let id = state.pending_transaction_id();
        let wallet = state
            .wallets
            .get_mut(&owner)
            .ok_or(LedgerError::WalletNotFound(owner))?;
        let transaction = wallet.apply(&change, id, now)?;
        let wallet = wallet.clone();
        state.append(transaction.clone());
        Ok((wallet, transaction))
    }

    async fn settle_task(
        &self,
        task: &ScoringTask,
        price: Credits,
    ) -> Result<(ScoringTask, Option<Transaction>), LedgerError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.check_available()?;
        if state.fail_settlements {
            return Err(StoreError::Unavailable("settlement aborted".into()).into());
        }

        if task.status() != TaskStatus::Done {
            return Err(StoreError::Conflict(format!(
                "{} is {} (settling requires DONE)",
                task.key,
                task.status()
            ))
            .into());
        }

        let stored = state
            .tasks
            .get(&task.key)
            .ok_or_else(|| StoreError::Missing(task.key.to_string()))?;
        if stored.status() != TaskStatus::Processing {
            return Err(StoreError::Conflict(format!(
                "{} is {} (expected {})",
                task.key,
                stored.status(),
                TaskStatus::Processing
            ))
            .into());
        }
        if stored.version() != task.version() {
            return Err(stale(task, stored).into());
        }

        let mut transaction = None;
        if stored.charged_amount().is_none() {
            let change = BalanceChange::debit(price, task.key)?;
            let id = state.pending_transaction_id();
            let wallet = state
                .wallets
                .get_mut(&task.owner)
                .ok_or(LedgerError::WalletNotFound(task.owner))?;
            // 残高不足ならここで抜ける（何も書かない）
            transaction = Some(wallet.apply(&change, id, now)?);
        }

        let mut next = task.clone();
        next.mark_stored(now);
        state.tasks.insert(task.key, next.clone());
        if let Some(transaction) = &transaction {
            state.append(transaction.clone());
        }
        Ok((next, transaction))
    }

    async fn transactions(&self, owner: UserId) -> Result<Vec<Transaction>, StoreError> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.owner == owner)
            .cloned()
            .collect())
    }

    async fn all_transactions(&self) -> Result<Vec<Transaction>, StoreError> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state.transactions.clone())
    }
}

#[async_trait]
impl ModelCatalog for InMemoryStore {
    async fn insert_model(&self, new: NewModel) -> Result<ScoringModel, StoreError> {
        let mut state = self.state.lock().await;
        state.check_available()?;

        if state.models.values().any(|m| m.name == new.name) {
            return Err(StoreError::Duplicate(format!("model '{}'", new.name)));
        }
        let id = state.allocate_model_id();
        let model = new.into_model(id);
        state.models.insert(id, model.clone());
        Ok(model)
    }

    async fn get_model(&self, id: ModelId) -> Result<Option<ScoringModel>, StoreError> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state.models.get(&id).cloned())
    }

    async fn get_model_by_name(&self, name: &str) -> Result<Option<ScoringModel>, StoreError> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state.models.values().find(|m| m.name == name).cloned())
    }

    async fn list_models(&self) -> Result<Vec<ScoringModel>, StoreError> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state.models.values().cloned().collect())
    }
}
