//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: アプリケーションの構築とワイヤリング
//! - **TaskOrchestrator**: ドラフト作成 → 提出 → キュー投入（または同期実行）
//! - **TaskProcessor**: 1 メッセージ分の処理（冪等・課金は 1 回だけ）
//! - **WorkerLoop / WorkerGroup**: キュー消費ループ
//! - **WalletLedger**: 残高と取引履歴
//! - **StatusReport**: タスク数とキューの深さ

pub mod builder;
pub mod ledger;
pub mod orchestrator;
pub mod processor;
pub mod status;
pub mod worker_loop;

// 主要な型を再エクスポート
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::ledger::{LedgerAudit, WalletLedger};
pub use self::orchestrator::{OrchestratorError, Requester, SubmitOutcome, TaskOrchestrator};
pub use self::processor::{Disposition, ProcessError, TaskProcessor, Verdict};
pub use self::status::{StatusError, StatusReport};
pub use self::worker_loop::{WorkerGroup, WorkerLoop};
