//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（トランザクショナルなストア、メッセージブローカー）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - ストアが source of truth（正本）
//! - キューは task_id を中心とした通知に過ぎない（状態はストアから読み直す）

pub mod clock;
pub mod delivery_queue;
pub mod id_generator;
pub mod ledger_store;
pub mod model_catalog;
pub mod task_store;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::delivery_queue::{Delivery, DeliveryQueue, QueueDepth, QueueError};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::ledger_store::LedgerStore;
pub use self::model_catalog::ModelCatalog;
pub use self::task_store::{TaskCounts, TaskStore};
