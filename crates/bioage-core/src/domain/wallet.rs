//! Wallet - ウォレットと台帳エントリ
//!
//! ルールは 1 つ: 残高は [`Wallet::apply`] の中でだけ変わり、
//! `apply` は必ずその変更を記録する [`Transaction`] を返す。
//! 返された取引をウォレットと同じ原子単位で保存すれば、
//! 台帳は再生可能なまま保たれる。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::LedgerError;
use super::ids::{TaskKey, TransactionId, UserId};

/// 整数のクレジット。残高と価格は小数にも負にもならない
pub type Credits = u64;

/// 外部から受け取った（負かもしれない）金額をクレジットに変換
pub fn credits_from_signed(amount: i64) -> Result<Credits, LedgerError> {
    Credits::try_from(amount).map_err(|_| LedgerError::InvalidAmount(amount))
}

/// TOPUP は加算、CHARGE は減算
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Topup,
    Charge,
}

/// 不変の台帳エントリ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub owner: UserId,
    pub kind: TransactionKind,
    pub amount: Credits,

    /// 支払い対象のタスク（CHARGE では必ずある）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskKey>,

    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// 残高への符号付きの影響
    pub fn delta(&self) -> i128 {
        match self.kind {
            TransactionKind::Topup => i128::from(self.amount),
            TransactionKind::Charge => -i128::from(self.amount),
        }
    }
}

/// 残高変更の要求。コンストラクタは 0 を拒否する
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceChange {
    Credit { amount: Credits },
    Debit { amount: Credits, task: TaskKey },
}

impl BalanceChange {
    pub fn credit(amount: Credits) -> Result<Self, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount(0));
        }
        Ok(BalanceChange::Credit { amount })
    }

    pub fn debit(amount: Credits, task: TaskKey) -> Result<Self, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount(0));
        }
        Ok(BalanceChange::Debit { amount, task })
    }

    pub fn amount(&self) -> Credits {
        match *self {
            BalanceChange::Credit { amount } | BalanceChange::Debit { amount, .. } => amount,
        }
    }
}

/// ユーザーのクレジット残高（ユーザーごとに 1 つ）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    owner: UserId,
    balance: Credits,
}

impl Wallet {
    /// 新しいウォレットは 0 から始まる。初期残高も通常の TOPUP
    pub fn new(owner: UserId) -> Self {
        Self { owner, balance: 0 }
    }

    pub fn owner(&self) -> UserId {
        self.owner
    }

    pub fn balance(&self) -> Credits {
        self.balance
    }

    pub fn can_pay(&self, amount: Credits) -> bool {
        self.balance >= amount
    }

    /// 変更を適用し、台帳エントリを生成する
    ///
    /// エラー時はウォレットを変更しない
    pub fn apply(
        &mut self,
        change: &BalanceChange,
        id: TransactionId,
        at: DateTime<Utc>,
    ) -> Result<Transaction, LedgerError> {
        let (kind, amount, task, balance) = match *change {
            BalanceChange::Credit { amount } => {
                let balance = self
                    .balance
                    .checked_add(amount)
                    .ok_or(LedgerError::BalanceOverflow {
                        owner: self.owner,
                        balance: self.balance,
                        amount,
                    })?;
                (TransactionKind::Topup, amount, None, balance)
            }
            BalanceChange::Debit { amount, task } => {
                if !self.can_pay(amount) {
                    return Err(LedgerError::InsufficientFunds {
                        owner: self.owner,
                        balance: self.balance,
                        requested: amount,
                    });
                }
                (TransactionKind::Charge, amount, Some(task), self.balance - amount)
            }
        };

        self.balance = balance;
        Ok(Transaction {
            id,
            owner: self.owner,
            kind,
            amount,
            task,
            created_at: at,
        })
    }
}

/// 台帳を 0 から再生する。途中で負になったら `None`
pub fn replay<'a>(entries: impl IntoIterator<Item = &'a Transaction>) -> Option<Credits> {
    let mut balance: i128 = 0;
    for entry in entries {
        balance += entry.delta();
        if balance < 0 {
            return None;
        }
    }
    Credits::try_from(balance).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(wallet: &mut Wallet, change: BalanceChange, id: u64) -> Result<Transaction, LedgerError> {
        wallet.apply(&change, TransactionId(id), Utc::now())
    }

    #[test]
    fn credit_then_debit_is_recorded() {
        let mut wallet = Wallet::new(UserId(1));
        let topup = apply(&mut wallet, BalanceChange::credit(50).unwrap(), 1).unwrap();
        let charge = apply(&mut wallet, BalanceChange::debit(25, TaskKey(9)).unwrap(), 2).unwrap();

        assert_eq!(wallet.balance(), 25);
        assert_eq!(topup.kind, TransactionKind::Topup);
        assert_eq!(charge.kind, TransactionKind::Charge);
        assert_eq!(charge.task, Some(TaskKey(9)));
        assert_eq!(replay([&topup, &charge]), Some(25));
    }

    #[test]
    fn debit_beyond_balance_leaves_wallet_untouched() {
        let mut wallet = Wallet::new(UserId(1));
        apply(&mut wallet, BalanceChange::credit(10).unwrap(), 1).unwrap();

        let err = apply(&mut wallet, BalanceChange::debit(25, TaskKey(1)).unwrap(), 2).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                owner: UserId(1),
                balance: 10,
                requested: 25
            }
        );
        assert_eq!(wallet.balance(), 10);
    }

    #[test]
    fn zero_and_negative_amounts_are_rejected() {
        assert_eq!(BalanceChange::credit(0), Err(LedgerError::InvalidAmount(0)));
        assert_eq!(
            BalanceChange::debit(0, TaskKey(1)),
            Err(LedgerError::InvalidAmount(0))
        );
        assert_eq!(credits_from_signed(-5), Err(LedgerError::InvalidAmount(-5)));
        assert_eq!(credits_from_signed(5), Ok(5));
    }

    #[test]
    fn credit_overflow_reports_the_requested_amount() {
        let mut wallet = Wallet::new(UserId(1));
        apply(&mut wallet, BalanceChange::credit(Credits::MAX - 1).unwrap(), 1).unwrap();

        let err = apply(&mut wallet, BalanceChange::credit(5).unwrap(), 2).unwrap_err();
        assert_eq!(
            err,
            LedgerError::BalanceOverflow {
                owner: UserId(1),
                balance: Credits::MAX - 1,
                amount: 5
            }
        );
        assert_eq!(wallet.balance(), Credits::MAX - 1);
    }

    #[test]
    fn can_pay_exact_balance() {
        let mut wallet = Wallet::new(UserId(1));
        apply(&mut wallet, BalanceChange::credit(25).unwrap(), 1).unwrap();
        assert!(wallet.can_pay(25));
        assert!(wallet.can_pay(0));
        assert!(!wallet.can_pay(26));
    }
}
