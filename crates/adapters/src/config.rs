//! Typed accessors over an interpolated node configuration.
//!
//! After interpolation most scalar fields are strings, so numeric and
//! boolean accessors accept their textual forms too.

use serde_json::{Map, Value};

use crate::path::{as_f64, coerce_array, coerce_object};
use crate::NodeError;

#[derive(Debug, Clone, Copy)]
pub struct ConfigView<'a> {
    value: &'a Value,
}

impl<'a> ConfigView<'a> {
    pub fn new(value: &'a Value) -> Self {
        Self { value }
    }

    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.value.get(key).filter(|v| !v.is_null())
    }

    /// Non-empty string field.
    pub fn str(&self, key: &str) -> Option<&'a str> {
        self.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    pub fn required_str(&self, key: &str) -> Result<&'a str, NodeError> {
        self.str(key)
            .ok_or_else(|| NodeError::InvalidConfig(format!("'{key}' is required")))
    }

    pub fn f64(&self, key: &str) -> Result<Option<f64>, NodeError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(v) => as_f64(v)
                .map(Some)
                .ok_or_else(|| NodeError::InvalidConfig(format!("'{key}' must be a number"))),
        }
    }

    pub fn u64(&self, key: &str) -> Result<Option<u64>, NodeError> {
        match self.f64(key)? {
            None => Ok(None),
            Some(n) if n >= 0.0 && n.fract() == 0.0 => Ok(Some(n as u64)),
            Some(_) => Err(NodeError::InvalidConfig(format!(
                "'{key}' must be a non-negative integer"
            ))),
        }
    }

    pub fn bool(&self, key: &str) -> Result<Option<bool>, NodeError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::String(s)) => match s.trim() {
                "" => Ok(None),
                "true" => Ok(Some(true)),
                "false" => Ok(Some(false)),
                _ => Err(NodeError::InvalidConfig(format!("'{key}' must be a boolean"))),
            },
            Some(_) => Err(NodeError::InvalidConfig(format!("'{key}' must be a boolean"))),
        }
    }

    pub fn array(&self, key: &str) -> Result<Option<Vec<Value>>, NodeError> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => coerce_array(v)
                .map(Some)
                .ok_or_else(|| NodeError::InvalidConfig(format!("'{key}' must be an array"))),
        }
    }

    pub fn object(&self, key: &str) -> Result<Option<Map<String, Value>>, NodeError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(v) => coerce_object(v)
                .map(Some)
                .ok_or_else(|| NodeError::InvalidConfig(format!("'{key}' must be an object"))),
        }
    }

    /// A list of addresses given as an array or a comma-separated string.
    pub fn string_list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect(),
            Some(Value::String(s)) => match coerce_array(&Value::String(s.clone())) {
                Some(items) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect(),
                None => s
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
                    .collect(),
            },
            _ => Vec::new(),
        }
    }
}
