//! bioage-core
//!
//! Paid scoring tasks: questionnaire drafts, queued scoring and a wallet
//! ledger that charges each completed task exactly once.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, task, wallet, model, envelope, errors）
//! - **ports**: 抽象化レイヤー（TaskStore, LedgerStore, ModelCatalog, DeliveryQueue, Clock, IdGenerator）
//! - **scoring**: 入力検証と Predictor（Stub / Linear）
//! - **impls**: 実装（InMemoryStore, InMemoryDeliveryQueue など開発用）
//! - **app**: アプリケーションロジック（builder, orchestrator, processor, worker_loop, ledger）
//! - **config**: AppConfig（環境変数 / JSON ファイル）

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod scoring;

pub use app::{App, AppBuilder};
pub use config::AppConfig;
