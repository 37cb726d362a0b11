//! Errors - エラー型と分類
//!
//! crate 内のすべてのエラーは [`ErrorKind`] を返せる。呼び出し側はこれで分岐する
//! （回復する / 404 を返す / タスクを失敗にする / インフラの問題として扱う）。

use thiserror::Error;

use super::ids::UserId;
use super::state::TaskStatus;

/// ErrorKind は運用上の分類
///
/// - UserInput: 入力の誤り。タスクは CREATED に戻り、利用者が直せる
/// - NotFound: モデル・タスク・ウォレットが存在しない
/// - BusinessRule: 残高不足・不正な状態遷移など。タスクは FAILED、リトライしない
/// - Infrastructure: ストア・キューの障害。コアはリトライしない
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UserInput,
    NotFound,
    BusinessRule,
    Infrastructure,
}

/// 拒否されたタスクの状態遷移
///
/// 実行時にこれが出たら呼び出し側がガードを飛ばしている。
/// ユーザー向けのエラーではなくロジックのバグ。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("cannot {action} a task in status {status}")]
    InvalidState {
        action: &'static str,
        status: TaskStatus,
    },

    #[error("charged amount must be > 0")]
    ZeroCharge,
}

impl TaskError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::BusinessRule
    }
}

/// ストアの失敗
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// ストアに到達できない、または処理単位が中断された
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// 読んだ後に行が変わった（状態または version の前提が崩れた）
    #[error("conflicting update: {0}")]
    Conflict(String),

    /// 存在しない行の更新
    #[error("missing row: {0}")]
    Missing(String),

    #[error("duplicate key: {0}")]
    Duplicate(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Infrastructure
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// ウォレット / 台帳のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("{0} has no wallet")]
    WalletNotFound(UserId),

    #[error("{0} already has a wallet")]
    WalletAlreadyExists(UserId),

    #[error("invalid amount {0}: must be > 0")]
    InvalidAmount(i64),

    #[error("crediting {amount} would overflow the balance of {owner} ({balance})")]
    BalanceOverflow {
        owner: UserId,
        balance: u64,
        amount: u64,
    },

    #[error("insufficient funds for {owner}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        owner: UserId,
        balance: u64,
        requested: u64,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::WalletNotFound(_) => ErrorKind::NotFound,
            LedgerError::WalletAlreadyExists(_)
            | LedgerError::InvalidAmount(_)
            | LedgerError::BalanceOverflow { .. }
            | LedgerError::InsufficientFunds { .. } => ErrorKind::BusinessRule,
            LedgerError::Store(e) => e.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_errors_are_classified() {
        assert_eq!(
            LedgerError::WalletNotFound(UserId(1)).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            LedgerError::InsufficientFunds {
                owner: UserId(1),
                balance: 10,
                requested: 25
            }
            .kind(),
            ErrorKind::BusinessRule
        );
        assert_eq!(
            LedgerError::from(StoreError::Unavailable("down".into())).kind(),
            ErrorKind::Infrastructure
        );
    }

    #[test]
    fn invalid_state_message_names_action_and_status() {
        let err = TaskError::InvalidState {
            action: "add answers to",
            status: TaskStatus::Done,
        };
        assert_eq!(err.to_string(), "cannot add answers to a task in status DONE");
    }
}
