//! FeatureValidator - 必須特徴量のチェック

use crate::domain::{Answers, FieldError};

use super::ValidationReport;

pub const MSG_REQUIRED: &str = "field is required";
pub const MSG_NOT_A_NUMBER: &str = "must be a number";

/// Checks that every required feature is present and numeric.
///
/// Errors come out in the order of `required`. Extra keys are ignored.
/// JSON booleans are not numbers here: `true` for `age` is a typo, not 1.
#[derive(Debug, Clone, Default)]
pub struct FeatureValidator {
    required: Vec<String>,
}

impl FeatureValidator {
    pub fn new(required: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            required: required.into_iter().map(Into::into).collect(),
        }
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    pub fn validate(&self, answers: &Answers) -> ValidationReport {
        let errors = self
            .required
            .iter()
            .filter_map(|field| match answers.get(field) {
                None => Some(FieldError::new(field.as_str(), MSG_REQUIRED)),
                Some(value) if !value.is_number() => {
                    Some(FieldError::new(field.as_str(), MSG_NOT_A_NUMBER))
                }
                Some(_) => None,
            })
            .collect();
        ValidationReport::from_errors(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::{Value, json};

    fn answers(pairs: &[(&str, Value)]) -> Answers {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[rstest]
    #[case::all_numbers(&[("age", json!(40)), ("bmi", json!(23.5))], vec![])]
    #[case::missing(&[("age", json!(40))], vec![("bmi", MSG_REQUIRED)])]
    #[case::string(&[("age", json!("forty")), ("bmi", json!(23.5))], vec![("age", MSG_NOT_A_NUMBER)])]
    #[case::bool_is_not_a_number(&[("age", json!(true)), ("bmi", json!(1))], vec![("age", MSG_NOT_A_NUMBER)])]
    #[case::null(&[("age", Value::Null)], vec![("age", MSG_NOT_A_NUMBER), ("bmi", MSG_REQUIRED)])]
    #[case::extra_keys_ignored(&[("age", json!(40)), ("bmi", json!(22)), ("note", json!("x"))], vec![])]
    fn validates_required_numeric_features(
        #[case] input: &[(&str, Value)],
        #[case] expected: Vec<(&str, &str)>,
    ) {
        let validator = FeatureValidator::new(["age", "bmi"]);
        let report = validator.validate(&answers(input));

        let got: Vec<(&str, &str)> = report
            .errors
            .iter()
            .map(|e| (e.field_name.as_str(), e.message.as_str()))
            .collect();
        assert_eq!(got, expected);
        assert_eq!(report.ok, expected.is_empty());
    }

    #[test]
    fn no_required_features_always_passes() {
        let validator = FeatureValidator::default();
        assert!(validator.validate(&Answers::new()).ok);
    }
}
