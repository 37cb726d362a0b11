//! Domain - ドメインモデル（ID、タスクの状態機械、ウォレット、スコアの形、エラー）
//!
//! I/O には触れない。ports と app はこれらの型の上に組み立てる。

pub mod assessment;
pub mod envelope;
pub mod errors;
pub mod ids;
pub mod model;
pub mod state;
pub mod task;
pub mod wallet;

pub use assessment::{Answers, Assessment, Factor, FactorGroup, FieldError};
pub use envelope::ScoringMessage;
pub use errors::{ErrorKind, LedgerError, StoreError, TaskError};
pub use ids::{DeliveryId, IdParseError, ModelId, TaskId, TaskKey, TransactionId, UserId};
pub use model::{ModelMetaError, NewModel, ScoringModel};
pub use state::TaskStatus;
pub use task::{NewTask, ScoringTask};
pub use wallet::{BalanceChange, Credits, Transaction, TransactionKind, Wallet};
