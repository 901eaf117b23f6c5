//! The result envelope every adapter call produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::NodeError;

/// Outcome of a single adapter call. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
    pub metadata: OperationMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationMetadata {
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Control decision for the scheduler (flow adapter only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<FlowDecision>,
    /// Provider-specific extras (status codes, token usage, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// What a flow primitive asks the scheduler to do next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FlowDecision {
    /// Run the loop body once per item.
    Iterate { items: Vec<Value> },
    /// Close the innermost loop; `collected` is this iteration's value.
    EndIterate { collected: Value },
    /// Only successors wired to `handle` stay eligible.
    Route { handle: Option<String> },
    /// When `passed` is false no successor runs.
    Filter { passed: bool },
    /// Merge these keys into the run's variable store.
    SetVariables { variables: Map<String, Value> },
}

impl OperationResult {
    pub fn ok(started_at: DateTime<Utc>, output: Value) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
            metadata: OperationMetadata::finished(started_at),
        }
    }

    pub fn failed(
        started_at: DateTime<Utc>,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(OperationError {
                message: message.into(),
                code: Some(code.into()),
            }),
            metadata: OperationMetadata::finished(started_at),
        }
    }

    /// Fold an adapter-internal outcome into the boundary envelope.
    pub fn from_outcome(started_at: DateTime<Utc>, outcome: Result<Value, NodeError>) -> Self {
        match outcome {
            Ok(output) => Self::ok(started_at, output),
            Err(err) => Self::failed(started_at, err.to_string(), err.code()),
        }
    }

    pub fn with_decision(mut self, decision: FlowDecision) -> Self {
        self.metadata.decision = Some(decision);
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.extra.insert(key.into(), value);
        self
    }

    /// The error message, if the call failed.
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }
}

impl OperationMetadata {
    fn finished(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: Some(Utc::now()),
            decision: None,
            extra: Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn node_error_becomes_failed_result_with_code() {
        let result = OperationResult::from_outcome(
            Utc::now(),
            Err(NodeError::Upstream { status: 502, message: "bad gateway".into() }),
        );
        assert!(!result.success);
        assert!(result.output.is_none());
        let error = result.error.unwrap();
        assert_eq!(error.code.as_deref(), Some("upstream_error"));
        assert!(error.message.contains("bad gateway"));
        assert!(result.metadata.finished_at.is_some());
    }

    #[test]
    fn serialises_camel_case_with_flattened_extras() {
        let result = OperationResult::ok(Utc::now(), json!({ "a": 1 }))
            .with_meta("statusCode", json!(200))
            .with_decision(FlowDecision::Filter { passed: true });
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["metadata"]["statusCode"], 200);
        assert_eq!(value["metadata"]["decision"]["kind"], "filter");
        assert!(value["metadata"]["startedAt"].is_string());
        assert!(value.get("error").is_none());
    }
}
