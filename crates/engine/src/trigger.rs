//! Webhook-style entry point: admission control in front of a run.

use std::sync::Arc;

use adapters::CredentialLookup;
use serde_json::{Map, Value};
use tracing::info;

use crate::admission::RateLimiter;
use crate::executor::WorkflowExecutor;
use crate::models::Graph;
use crate::recorder::RunResult;
use crate::AdmissionError;

pub struct TriggerGateway {
    executor: Arc<WorkflowExecutor>,
    limiter: RateLimiter,
}

impl TriggerGateway {
    /// Gateway whose limit comes from the executor's `rate_limit_per_minute`.
    pub fn new(executor: Arc<WorkflowExecutor>) -> Self {
        let limiter = RateLimiter::per_minute(executor.config().rate_limit_per_minute);
        Self { executor, limiter }
    }

    pub fn with_limiter(executor: Arc<WorkflowExecutor>, limiter: RateLimiter) -> Self {
        Self { executor, limiter }
    }

    /// Admit and run one invocation. A missing body becomes `{}`. A
    /// rejected invocation never reaches the engine.
    pub async fn invoke(
        &self,
        workflow_id: &str,
        graph: &Graph,
        body: Option<Value>,
        credentials: &dyn CredentialLookup,
    ) -> Result<RunResult, AdmissionError> {
        self.limiter.try_acquire(workflow_id)?;
        let trigger_input = body.unwrap_or_else(|| Value::Object(Map::new()));
        info!(%workflow_id, "trigger admitted");
        Ok(self
            .executor
            .run(workflow_id, graph, trigger_input, credentials)
            .await)
    }
}
