//! Engine-level error types.

use std::time::Duration;

use thiserror::Error;

/// Graph problems found while deriving the execution order. All of them
/// are configuration errors: the run fails before any node executes.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlanError {
    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// An edge references a node ID that doesn't exist in the graph.
    #[error("edge references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference {
        node_id: String,
        side: &'static str,
    },

    #[error("workflow has no trigger node")]
    NoTrigger,

    #[error("workflow has {} trigger nodes ({}); exactly one is required", .0.len(), .0.join(", "))]
    MultipleTriggers(Vec<String>),

    /// Topological sort left these nodes unvisited.
    #[error("workflow graph contains a cycle through: {}", .0.join(", "))]
    CycleDetected(Vec<String>),

    /// `flow.iterate` / `flow.endIterate` do not nest like brackets.
    #[error("unbalanced loop at node '{node_id}': {reason}")]
    UnbalancedLoop {
        node_id: String,
        reason: &'static str,
    },
}

/// Rejection at the trigger boundary; the run is never started.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AdmissionError {
    #[error("rate limit of {limit} invocations per minute exceeded for workflow '{workflow_id}'; retry in {retry_after:?}")]
    RateLimited {
        workflow_id: String,
        limit: u32,
        retry_after: Duration,
    },
}
