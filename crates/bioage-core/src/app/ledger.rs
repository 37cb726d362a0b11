//! WalletLedger - 残高と取引履歴の窓口
//!
//! 残高を変える唯一の経路は `LedgerStore` 経由の `Wallet::apply` で、
//! 変更には必ず取引（TOPUP / CHARGE）が 1 件対応する。

use std::sync::Arc;

use serde::Serialize;

use crate::domain::wallet::replay;
use crate::domain::{
    BalanceChange, Credits, LedgerError, ScoringTask, TaskKey, Transaction, UserId, Wallet,
};
use crate::ports::LedgerStore;

/// 取引履歴を再生した結果と保存済み残高の比較
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedgerAudit {
    pub balance: Credits,

    /// 再生の途中で負になった場合は `None`
    pub replayed: Option<Credits>,

    pub consistent: bool,
}

#[derive(Clone)]
pub struct WalletLedger {
    store: Arc<dyn LedgerStore>,
}

impl WalletLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn open_wallet(&self, owner: UserId, initial: Credits) -> Result<Wallet, LedgerError> {
        let wallet = self.store.open_wallet(owner, initial).await?;
        tracing::info!(%owner, initial, "wallet opened");
        Ok(wallet)
    }

    async fn wallet(&self, owner: UserId) -> Result<Wallet, LedgerError> {
        self.store
            .wallet(owner)
            .await?
            .ok_or(LedgerError::WalletNotFound(owner))
    }

    pub async fn balance(&self, owner: UserId) -> Result<Credits, LedgerError> {
        Ok(self.wallet(owner).await?.balance())
    }

    /// 読み取りだけのチェック。実際の引き落としはストアのロック内で再確認する
    pub async fn can_pay(&self, owner: UserId, amount: Credits) -> Result<bool, LedgerError> {
        Ok(self.wallet(owner).await?.can_pay(amount))
    }

    pub async fn credit(&self, owner: UserId, amount: Credits) -> Result<Transaction, LedgerError> {
        let change = BalanceChange::credit(amount)?;
        let (wallet, transaction) = self.store.apply_change(owner, change).await?;
        tracing::info!(%owner, amount, balance = wallet.balance(), "wallet topped up");
        Ok(transaction)
    }

    pub async fn debit(
        &self,
        owner: UserId,
        amount: Credits,
        task: TaskKey,
    ) -> Result<Transaction, LedgerError> {
        let change = BalanceChange::debit(amount, task)?;
        let (wallet, transaction) = self.store.apply_change(owner, change).await?;
        tracing::info!(%owner, amount, %task, balance = wallet.balance(), "wallet charged");
        Ok(transaction)
    }

    /// DONE のタスクと課金を一緒に永続化
    pub async fn settle(
        &self,
        task: &ScoringTask,
        price: Credits,
    ) -> Result<(ScoringTask, Option<Transaction>), LedgerError> {
        self.store.settle_task(task, price).await
    }

    /// ユーザーの取引（新しい順）
    pub async fn transactions(&self, owner: UserId) -> Result<Vec<Transaction>, LedgerError> {
        let mut transactions = self.store.transactions(owner).await?;
        transactions.reverse();
        Ok(transactions)
    }

    /// 全取引（新しい順）
    pub async fn all_transactions(&self) -> Result<Vec<Transaction>, LedgerError> {
        let mut transactions = self.store.all_transactions().await?;
        transactions.reverse();
        Ok(transactions)
    }

    pub async fn audit(&self, owner: UserId) -> Result<LedgerAudit, LedgerError> {
        let balance = self.balance(owner).await?;
        let transactions = self.store.transactions(owner).await?;
        let replayed = replay(&transactions);
        Ok(LedgerAudit {
            balance,
            replayed,
            consistent: replayed == Some(balance),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TransactionKind;
    use crate::impls::InMemoryStore;

    fn ledger() -> WalletLedger {
        WalletLedger::new(Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn credit_and_debit_keep_ledger_consistent() {
        let ledger = ledger();
        ledger.open_wallet(UserId(1), 0).await.unwrap();
        ledger.credit(UserId(1), 50).await.unwrap();
        ledger.debit(UserId(1), 25, TaskKey(1)).await.unwrap();

        assert_eq!(ledger.balance(UserId(1)).await.unwrap(), 25);
        let txs = ledger.transactions(UserId(1)).await.unwrap();
        assert_eq!(txs[0].kind, TransactionKind::Charge);
        assert_eq!(txs[1].kind, TransactionKind::Topup);

        let audit = ledger.audit(UserId(1)).await.unwrap();
        assert!(audit.consistent);
        assert_eq!(audit.replayed, Some(25));
    }

    #[tokio::test]
    async fn debit_beyond_balance_is_rejected() {
        let ledger = ledger();
        ledger.open_wallet(UserId(1), 10).await.unwrap();

        let err = ledger.debit(UserId(1), 25, TaskKey(1)).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(ledger.balance(UserId(1)).await.unwrap(), 10);
        assert_eq!(ledger.transactions(UserId(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn zero_amounts_and_unknown_wallets_fail() {
        let ledger = ledger();
        assert_eq!(
            ledger.credit(UserId(1), 0).await,
            Err(LedgerError::InvalidAmount(0))
        );
        assert_eq!(
            ledger.balance(UserId(9)).await,
            Err(LedgerError::WalletNotFound(UserId(9)))
        );
        assert_eq!(
            ledger.can_pay(UserId(9), 1).await,
            Err(LedgerError::WalletNotFound(UserId(9)))
        );
    }

    #[tokio::test]
    async fn can_pay_is_inclusive() {
        let ledger = ledger();
        ledger.open_wallet(UserId(1), 25).await.unwrap();
        assert!(ledger.can_pay(UserId(1), 25).await.unwrap());
        assert!(!ledger.can_pay(UserId(1), 26).await.unwrap());
    }

    #[tokio::test]
    async fn parallel_debits_never_go_negative() {
        let ledger = ledger();
        ledger.open_wallet(UserId(1), 100).await.unwrap();

        let mut joins = Vec::new();
        for i in 0..10u64 {
            let ledger = ledger.clone();
            joins.push(tokio::spawn(async move {
                ledger.debit(UserId(1), 25, TaskKey(i)).await
            }));
        }
        let mut ok = 0;
        for join in joins {
            if join.await.unwrap().is_ok() {
                ok += 1;
            }
        }

        assert_eq!(ok, 4);
        assert_eq!(ledger.balance(UserId(1)).await.unwrap(), 0);
        assert!(ledger.audit(UserId(1)).await.unwrap().consistent);
    }
}
