//! `engine` crate: graph model, node resolution, interpolation, order
//! derivation, the scheduler and the execution recorder.

pub mod admission;
pub mod config;
pub mod dag;
pub mod error;
pub mod executor;
pub mod interpolation;
pub mod models;
pub mod recorder;
pub mod resolver;
pub mod trigger;

pub use admission::RateLimiter;
pub use config::EngineConfig;
pub use dag::{build_plan, ExecutionPlan};
pub use error::{AdmissionError, PlanError};
pub use executor::{AdapterRegistry, NodeTestInput, NodeTestResult, WorkflowExecutor};
pub use interpolation::Interpolator;
pub use models::{Edge, Graph, Node};
pub use recorder::{ExecutionLogEntry, LogStatus, RunErrorKind, RunResult};
pub use resolver::{resolve, resolve_node, ResolveError, ResolvedNode};
pub use trigger::TriggerGateway;

#[cfg(test)]
mod executor_tests;
