//! `MockAdapter`: a test double for `ProviderAdapter`.
//!
//! Stands in for a real provider in engine tests so scheduling behaviour can
//! be checked without network access.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::{
    CredentialBundle, ExecutionContext, OperationId, OperationResult, Provider, ProviderAdapter,
};

/// Behaviour injected into `MockAdapter` at construction time.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Succeed with a fixed value.
    ReturnValue(Value),
    /// Fail with this message and the code `mock_failure`.
    Fail(String),
    /// Succeed with the (interpolated) config it was handed, unless the
    /// config carries a `fail` key, whose value becomes the error message.
    Echo,
    /// Panic inside `execute`.
    Panic(String),
    /// Sleep, then succeed with the value.
    Delay(Duration, Value),
}

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub operation: OperationId,
    pub config: Value,
    pub had_credentials: bool,
}

/// Records every call it receives and answers with the configured behaviour.
pub struct MockAdapter {
    provider: Provider,
    behaviour: MockBehaviour,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockAdapter {
    pub fn new(provider: Provider, behaviour: MockBehaviour) -> Self {
        Self {
            provider,
            behaviour,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always succeed with `value`.
    pub fn returning(provider: Provider, value: Value) -> Self {
        Self::new(provider, MockBehaviour::ReturnValue(value))
    }

    /// Always fail with `message`.
    pub fn failing(provider: Provider, message: impl Into<String>) -> Self {
        Self::new(provider, MockBehaviour::Fail(message.into()))
    }

    pub fn echoing(provider: Provider) -> Self {
        Self::new(provider, MockBehaviour::Echo)
    }

    /// All calls seen so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn execute(
        &self,
        operation: OperationId,
        config: Value,
        credentials: Option<&CredentialBundle>,
        _ctx: &ExecutionContext,
    ) -> OperationResult {
        let started_at = Utc::now();
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MockCall {
                operation,
                config: config.clone(),
                had_credentials: credentials.is_some(),
            });

        match &self.behaviour {
            MockBehaviour::ReturnValue(value) => OperationResult::ok(started_at, value.clone()),
            MockBehaviour::Fail(message) => {
                OperationResult::failed(started_at, message.clone(), "mock_failure")
            }
            MockBehaviour::Echo => match config.get("fail") {
                Some(reason) => OperationResult::failed(
                    started_at,
                    crate::path::to_display_string(reason),
                    "mock_failure",
                ),
                None => OperationResult::ok(started_at, json!({ "config": config })),
            },
            MockBehaviour::Panic(message) => panic!("{message}"),
            MockBehaviour::Delay(delay, value) => {
                tokio::time::sleep(*delay).await;
                OperationResult::ok(started_at, value.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use uuid::Uuid;

    #[tokio::test]
    async fn records_calls_and_echoes_config() {
        let ctx = ExecutionContext::new("wf", Uuid::new_v4(), json!({}), HashMap::new());
        let mock = MockAdapter::echoing(Provider::Http);

        let ok = mock
            .execute(OperationId::HttpRequest, json!({ "url": "u" }), None, &ctx)
            .await;
        let bad = mock
            .execute(OperationId::HttpRequest, json!({ "fail": "boom" }), None, &ctx)
            .await;

        assert_eq!(ok.output, Some(json!({ "config": { "url": "u" } })));
        assert_eq!(bad.error_message(), Some("boom"));
        assert_eq!(mock.call_count(), 2);
        assert_eq!(mock.calls()[0].operation, OperationId::HttpRequest);
    }
}
