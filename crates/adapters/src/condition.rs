//! Predicate evaluation shared by `transform.filter`, `flow.route` and
//! `flow.filter`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::path::{as_f64, lookup, to_display_string};
use crate::NodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Gt,
    Gte,
    Lt,
    Lte,
    Exists,
    NotExists,
    IsEmpty,
    IsNotEmpty,
}

/// `field` is a dotted path into the subject; empty means the subject itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(default)]
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchMode {
    #[default]
    All,
    Any,
}

impl Condition {
    pub fn evaluate(&self, subject: &Value) -> bool {
        let actual = lookup(subject, &self.field);
        match self.operator {
            Operator::Exists => actual.is_some_and(|v| !v.is_null()),
            Operator::NotExists => actual.is_none_or(Value::is_null),
            Operator::IsEmpty => actual.is_none_or(is_empty),
            Operator::IsNotEmpty => actual.is_some_and(|v| !is_empty(v)),
            Operator::Equals => actual.is_some_and(|v| loosely_equal(v, &self.value)),
            Operator::NotEquals => !actual.is_some_and(|v| loosely_equal(v, &self.value)),
            Operator::Contains => actual.is_some_and(|v| contains(v, &self.value)),
            Operator::NotContains => !actual.is_some_and(|v| contains(v, &self.value)),
            Operator::StartsWith => actual.is_some_and(|v| {
                to_display_string(v).starts_with(&to_display_string(&self.value))
            }),
            Operator::EndsWith => actual.is_some_and(|v| {
                to_display_string(v).ends_with(&to_display_string(&self.value))
            }),
            Operator::Gt => compare(actual, &self.value, |a, b| a > b),
            Operator::Gte => compare(actual, &self.value, |a, b| a >= b),
            Operator::Lt => compare(actual, &self.value, |a, b| a < b),
            Operator::Lte => compare(actual, &self.value, |a, b| a <= b),
        }
    }
}

/// Evaluate a condition list under `mode`. An empty list matches.
pub fn evaluate_all(conditions: &[Condition], mode: MatchMode, subject: &Value) -> bool {
    match mode {
        MatchMode::All => conditions.iter().all(|c| c.evaluate(subject)),
        MatchMode::Any => conditions.is_empty() || conditions.iter().any(|c| c.evaluate(subject)),
    }
}

/// Parse a `conditions` field that may arrive as an array or JSON text.
pub fn parse_conditions(value: &Value) -> Result<Vec<Condition>, NodeError> {
    let items = crate::path::coerce_array(value)
        .ok_or_else(|| NodeError::InvalidConfig("'conditions' must be an array".into()))?;
    items
        .into_iter()
        .map(|item| {
            serde_json::from_value(item)
                .map_err(|e| NodeError::InvalidConfig(format!("invalid condition: {e}")))
        })
        .collect()
}

pub fn parse_match_mode(value: Option<&Value>) -> Result<MatchMode, NodeError> {
    match value {
        None | Some(Value::Null) => Ok(MatchMode::All),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|_| NodeError::InvalidConfig("'match' must be \"all\" or \"any\"".into())),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Numbers compare numerically even when one side is a numeric string;
/// everything else compares by display string.
fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    if let (Some(a), Some(b)) = (as_f64(actual), as_f64(expected)) {
        if matches!(actual, Value::Number(_)) || matches!(expected, Value::Number(_)) {
            return a == b;
        }
    }
    to_display_string(actual) == to_display_string(expected)
}

fn contains(actual: &Value, needle: &Value) -> bool {
    match actual {
        Value::Array(items) => items.iter().any(|item| loosely_equal(item, needle)),
        Value::Object(map) => map.contains_key(&to_display_string(needle)),
        other => to_display_string(other).contains(&to_display_string(needle)),
    }
}

fn compare(actual: Option<&Value>, expected: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (actual.and_then(as_f64), as_f64(expected)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}
