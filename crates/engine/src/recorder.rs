//! Execution Recorder: the append-only per-node log and the final run
//! envelope.
//!
//! Entry timestamps mark when a node's result became known (completion),
//! not when it was invoked.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    Error,
    /// The node was still in flight when the run deadline expired.
    Running,
    /// Not executed because no active incoming edge reached it.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLogEntry {
    pub node_id: String,
    pub node_type: String,
    pub status: LogStatus,
    /// The interpolated configuration the node ran with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionLogEntry {
    fn new(node_id: &str, node_type: &str, status: LogStatus) -> Self {
        Self {
            node_id: node_id.to_owned(),
            node_type: node_type.to_owned(),
            status,
            input: None,
            output: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn success(node_id: &str, node_type: &str, input: Value, output: Value) -> Self {
        Self {
            input: Some(input),
            output: Some(output),
            ..Self::new(node_id, node_type, LogStatus::Success)
        }
    }

    pub fn error(
        node_id: &str,
        node_type: &str,
        input: Option<Value>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            input,
            error: Some(error.into()),
            ..Self::new(node_id, node_type, LogStatus::Error)
        }
    }

    pub fn skipped(node_id: &str, node_type: &str) -> Self {
        Self::new(node_id, node_type, LogStatus::Skipped)
    }

    /// Stamp the entry with the adapter's completion time.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Run-level failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunErrorKind {
    /// Graph or node configuration problem (trigger count, cycle, unknown type).
    Configuration,
    /// A node returned a failed result.
    Node,
    /// The run's wall-clock budget expired.
    DeadlineExceeded,
    /// Unexpected failure inside the engine or an adapter.
    Internal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunFailure {
    pub kind: RunErrorKind,
    pub message: String,
}

impl RunFailure {
    pub fn new(kind: RunErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// The envelope returned to callers of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub execution_id: Uuid,
    pub workflow_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<RunErrorKind>,
    pub execution_log: Vec<ExecutionLogEntry>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Accumulates log entries for one run, in execution order.
#[derive(Debug)]
pub struct ExecutionRecorder {
    workflow_id: String,
    execution_id: Uuid,
    started_at: DateTime<Utc>,
    entries: Vec<ExecutionLogEntry>,
    in_flight: Option<ExecutionLogEntry>,
}

impl ExecutionRecorder {
    pub fn new(workflow_id: impl Into<String>, execution_id: Uuid) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            execution_id,
            started_at: Utc::now(),
            entries: Vec::new(),
            in_flight: None,
        }
    }

    /// Note the node about to be dispatched so an abandoned call can still
    /// be logged.
    pub fn begin(&mut self, node_id: &str, node_type: &str, input: Value) {
        self.in_flight = Some(ExecutionLogEntry {
            input: Some(input),
            ..ExecutionLogEntry::new(node_id, node_type, LogStatus::Running)
        });
    }

    pub fn append(&mut self, entry: ExecutionLogEntry) {
        if self
            .in_flight
            .as_ref()
            .is_some_and(|pending| pending.node_id == entry.node_id)
        {
            self.in_flight = None;
        }
        self.entries.push(entry);
    }

    /// Log the in-flight node (if any) with `status`, e.g. `Running` when
    /// the deadline cut it off.
    pub fn abandon_in_flight(&mut self, status: LogStatus, error: Option<String>) {
        if let Some(mut entry) = self.in_flight.take() {
            entry.status = status;
            entry.error = error;
            entry.timestamp = Utc::now();
            self.entries.push(entry);
        }
    }

    pub fn entries(&self) -> &[ExecutionLogEntry] {
        &self.entries
    }

    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    /// Close the log. Every appended entry is kept regardless of outcome.
    pub fn finalize(self, outcome: Result<Option<Value>, RunFailure>) -> RunResult {
        let (success, output, error, error_kind) = match outcome {
            Ok(output) => (true, output, None, None),
            Err(failure) => (false, None, Some(failure.message), Some(failure.kind)),
        };
        RunResult {
            execution_id: self.execution_id,
            workflow_id: self.workflow_id,
            success,
            output,
            error,
            error_kind,
            execution_log: self.entries,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}
