//! The trigger node: emits the run's trigger payload as its output.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::{
    CredentialBundle, ExecutionContext, NodeError, OperationId, OperationResult, Provider,
    ProviderAdapter,
};

pub struct TriggerAdapter;

#[async_trait]
impl ProviderAdapter for TriggerAdapter {
    fn provider(&self) -> Provider {
        Provider::Webhook
    }

    async fn execute(
        &self,
        operation: OperationId,
        _config: Value,
        _credentials: Option<&CredentialBundle>,
        ctx: &ExecutionContext,
    ) -> OperationResult {
        let started_at = Utc::now();
        let outcome = match operation {
            OperationId::WebhookTrigger => Ok(ctx.trigger_input().clone()),
            other => Err(NodeError::Unsupported(other)),
        };
        OperationResult::from_outcome(started_at, outcome)
    }
}
