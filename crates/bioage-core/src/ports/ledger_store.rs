//! LedgerStore port - ウォレットと取引履歴
//!
//! 残高の変更と取引の追記は必ず同じ原子単位で行う。
//! 実装はロック（またはトランザクション）の中で `Wallet::apply` を呼び、
//! 返ってきた `Transaction` をそのまま追記する。

use async_trait::async_trait;

use crate::domain::{
    BalanceChange, Credits, LedgerError, ScoringTask, StoreError, Transaction, UserId, Wallet,
};

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// ユーザーのウォレットを作成。`initial` が正なら TOPUP として記録
    async fn open_wallet(&self, owner: UserId, initial: Credits) -> Result<Wallet, LedgerError>;

    async fn wallet(&self, owner: UserId) -> Result<Option<Wallet>, StoreError>;

    /// 残高変更 1 件の適用と取引の追記を原子的に行う
    async fn apply_change(
        &self,
        owner: UserId,
        change: BalanceChange,
    ) -> Result<(Wallet, Transaction), LedgerError>;

    /// DONE のタスクの保存と所有者からの `price` の引き落としを 1 つの原子単位で行う
    ///
    /// - 保存済みのタスクが `task` と同じ version の PROCESSING でなければ
    ///   `StoreError::Conflict`（別のワーカーが先に進めた）
    /// - 引き落としはタスクを参照し、保存済みのタスクに課金額がまだないときだけ行う
    /// - エラー時は何も書かない（引き落としも取引もなし、タスクも変わらない）
    async fn settle_task(
        &self,
        task: &ScoringTask,
        price: Credits,
    ) -> Result<(ScoringTask, Option<Transaction>), LedgerError>;

    /// ユーザーの取引（追記順）
    async fn transactions(&self, owner: UserId) -> Result<Vec<Transaction>, StoreError>;

    /// 全取引（追記順）
    async fn all_transactions(&self) -> Result<Vec<Transaction>, StoreError>;
}
