//! Domain IDs - 型付き識別子
//!
//! 2 種類の識別子がある:
//!
//! - **ULID の不透明 ID** (`Id<T>`): クライアントに渡す外部タスク ID と、キューメッセージの配送 ID。
//!   調整なしで生成し、再利用しない
//! - **ストレージキー** (`UserId`, `ModelId`, `TaskKey`, `TransactionId`): ストアが割り当てる数値キー。
//!   台帳エントリ内の参照以外でサービスの外に出ない
//!
//! ## Phantom Type パターン
//! `Id<T>` は共通実装を一つにまとめつつ、`T` をマーカー型としてだけ使うことで
//! `TaskId` と `DeliveryId` をコンパイル時に区別します。

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"task-", "delivery-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ULID ベースの汎用識別子
///
/// ワイヤ形式と表示形式は `{prefix}{ulid}`（例: `task-01HZX3J6V9M6Q1W8T2N4B7C5D0`）。
/// パース時は prefix なしの ULID も受け付ける。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// 文字列が識別子として不正なときのエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid identifier '{0}'")]
pub struct IdParseError(pub String);

impl<T: IdMarker> FromStr for Id<T> {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw)
            .map(Self::from_ulid)
            .map_err(|_| IdParseError(s.to_string()))
    }
}

impl<T: IdMarker> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de, T: IdMarker> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Task のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "task-"
    }
}

/// Delivery のマーカー型（キュー上の 1 配送）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Delivery {}

impl IdMarker for Delivery {
    fn prefix() -> &'static str {
        "delivery-"
    }
}

/// スコアリングタスクの外部識別子
pub type TaskId = Id<Task>;

/// キューメッセージ 1 回分の配送 ID（再配送では新しい ID になる）
pub type DeliveryId = Id<Delivery>;

// ========================================
// Storage keys
// ========================================

macro_rules! storage_key {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

storage_key!(
    /// ウォレット・タスク・取引の所有者
    UserId,
    "user"
);
storage_key!(
    /// スコアリングモデルのメタデータ行
    ModelId,
    "model"
);
storage_key!(
    /// タスクの内部キー（台帳エントリはこれを参照する）
    TaskKey,
    "task"
);
storage_key!(
    /// 台帳エントリのキー（追記順に割り当て）
    TransactionId,
    "tx"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let task = TaskId::from_ulid(Ulid::new());
        let delivery = DeliveryId::from_ulid(Ulid::new());

        assert!(task.to_string().starts_with("task-"));
        assert!(delivery.to_string().starts_with("delivery-"));

        // let _: TaskId = delivery; // <- does not compile
    }

    #[test]
    fn task_id_serializes_as_prefixed_string() {
        let task = TaskId::from_ulid(Ulid::new());
        let json = serde_json::to_value(task).unwrap();
        assert_eq!(json, serde_json::Value::String(task.to_string()));

        let back: TaskId = serde_json::from_value(json).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn parse_accepts_bare_ulid_and_rejects_garbage() {
        let ulid = Ulid::new();
        let parsed: TaskId = ulid.to_string().parse().unwrap();
        assert_eq!(parsed.as_ulid(), ulid);

        let err = "task-not-a-ulid".parse::<TaskId>().unwrap_err();
        assert_eq!(err, IdParseError("task-not-a-ulid".to_string()));
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;
        assert_eq!(size_of::<TaskId>(), size_of::<Ulid>());
    }

    #[test]
    fn storage_keys_display_with_kind() {
        assert_eq!(UserId(7).to_string(), "user#7");
        assert_eq!(TaskKey(3).to_string(), "task#3");
        assert_eq!(serde_json::to_string(&ModelId(1)).unwrap(), "1");
    }
}
