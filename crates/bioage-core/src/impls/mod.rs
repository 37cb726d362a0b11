//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryStore**: TaskStore + LedgerStore + ModelCatalog（1 ロック = 1 トランザクション）
//! - **InMemoryDeliveryQueue**: visibility timeout 付きの配送キュー
//!
//! 本番用の実装（RDB, メッセージブローカー）は別クレートに置く想定です。

pub mod inmem_delivery;
pub mod inmem_store;

pub use self::inmem_delivery::InMemoryDeliveryQueue;
pub use self::inmem_store::InMemoryStore;
