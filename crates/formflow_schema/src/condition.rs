//! Conditional requirements.
//!
//! A condition never makes a field optional: it can only add a requirement on
//! top of `is_required`. A condition whose dependency was not submitted, or
//! does not parse under the dependency's type, evaluates to false.

use crate::coercion::{RawValue, TypedValue};
use formflow_db::{ConditionOperator, FieldCondition, FormField};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Apply `operator` to an actual (submitted) value and the comparison literal.
pub fn apply_operator(operator: ConditionOperator, actual: &TypedValue, expected: &TypedValue) -> bool {
    match operator {
        ConditionOperator::Equals => actual == expected,
        ConditionOperator::NotEquals => actual != expected,
        ConditionOperator::GreaterThan => actual.compare(expected) == Some(Ordering::Greater),
        ConditionOperator::LessThan => actual.compare(expected) == Some(Ordering::Less),
        ConditionOperator::GreaterOrEqual => {
            matches!(actual.compare(expected), Some(Ordering::Greater | Ordering::Equal))
        }
        ConditionOperator::LessOrEqual => {
            matches!(actual.compare(expected), Some(Ordering::Less | Ordering::Equal))
        }
        ConditionOperator::Contains => match (actual.as_text(), expected.as_text()) {
            (Some(haystack), Some(needle)) => haystack.to_lowercase().contains(&needle.to_lowercase()),
            _ => false,
        },
    }
}

/// Resolves required-ness of fields against one submission's raw values.
pub struct ConditionEvaluator<'a> {
    by_key: HashMap<&'a str, &'a FormField>,
}

impl<'a> ConditionEvaluator<'a> {
    /// Build an evaluator over a form's complete field list.
    pub fn new(fields: &'a [FormField]) -> Self {
        Self {
            by_key: fields.iter().map(|f| (f.field_key.as_str(), f)).collect(),
        }
    }

    /// Whether `field` must be present in this submission.
    pub fn is_required(&self, field: &FormField, submitted: &HashMap<String, RawValue>) -> bool {
        match &field.condition {
            None => field.is_required,
            Some(condition) => field.is_required || self.evaluate(condition, submitted),
        }
    }

    /// Evaluate a single condition; total and side-effect free.
    pub fn evaluate(&self, condition: &FieldCondition, submitted: &HashMap<String, RawValue>) -> bool {
        let Some(dependency) = self.by_key.get(condition.depends_on.as_str()) else {
            return false;
        };

        let Some(raw) = submitted
            .get(&condition.depends_on)
            .filter(|raw| !raw.is_empty())
            .and_then(RawValue::as_text)
        else {
            return false;
        };

        let (Ok(actual), Ok(expected)) = (
            TypedValue::parse(dependency.field_type, raw),
            TypedValue::parse(dependency.field_type, &condition.value),
        ) else {
            return false;
        };

        apply_operator(condition.operator, &actual, &expected)
    }
}
