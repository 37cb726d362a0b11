//! Assessment - 回答を入力に、スコアと要因を出力する
//!
//! キュー・ワーカー・永続化を前提としない。
//! スコア計算が生成し、タスクが記録する形だけを定義する。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 回答（フィールド名 → 生の JSON 値）
///
/// 順序付き（保存やキューメッセージのシリアライズ結果を決定的にする）
pub type Answers = BTreeMap<String, serde_json::Value>;

/// 要因がスコアをどちらに動かすか
///
/// NEGATIVE / NEUTRAL / POSITIVE としてシリアライズ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FactorGroup {
    Negative,
    Neutral,
    Positive,
}

/// スコアに寄与したバイオマーカー 1 つ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    pub name: String,
    pub value: f64,
    pub group: FactorGroup,
    pub description: String,
}

impl Factor {
    pub fn new(
        name: impl Into<String>,
        value: f64,
        group: FactorGroup,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value,
            group,
            description: description.into(),
        }
    }
}

/// 予測成功時の結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    /// 算出スコア（推定生物学的年齢、単位は年）
    pub score: f64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub factors: Vec<Factor>,
}

impl Assessment {
    pub fn new(score: f64) -> Self {
        Self {
            score,
            factors: Vec::new(),
        }
    }

    pub fn with_factor(mut self, factor: Factor) -> Self {
        self.factors.push(factor);
        self
    }
}

/// 回答フィールド 1 つに紐づく検証エラー
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldError {
    pub field_name: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field '{}': {}", self.field_name, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factor_group_serializes_as_required_names() {
        let s = serde_json::to_string(&FactorGroup::Negative).unwrap();
        assert_eq!(s, "\"NEGATIVE\"");
        let s = serde_json::to_string(&FactorGroup::Positive).unwrap();
        assert_eq!(s, "\"POSITIVE\"");
    }

    #[test]
    fn assessment_without_factors_omits_the_field() {
        let v = serde_json::to_value(Assessment::new(41.5)).unwrap();
        assert_eq!(v, serde_json::json!({ "score": 41.5 }));
    }

    #[test]
    fn field_error_display() {
        let e = FieldError::new("bmi", "must be a number");
        assert_eq!(e.to_string(), "field 'bmi': must be a number");
    }
}
