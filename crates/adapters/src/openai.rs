//! Chat completion against an OpenAI-compatible API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::ConfigView;
use crate::http::{bearer_secret, send_json};
use crate::{
    CredentialBundle, ExecutionContext, NodeError, OperationId, OperationResult, Provider,
    ProviderAdapter,
};

const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Owns its HTTP client; nothing is shared process-wide, so one run's
/// credentials can never leak into another's request.
pub struct OpenAiAdapter {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl OpenAiAdapter {
    pub fn new(client: reqwest::Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            timeout,
        }
    }

    fn build_headers(&self, api_key: &str) -> Result<HeaderMap, NodeError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| NodeError::InvalidConfig(format!("unusable API key: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    fn build_payload(view: &ConfigView<'_>) -> Result<Value, NodeError> {
        let prompt = view.required_str("prompt")?;
        let mut messages = Vec::new();
        if let Some(system) = view.str("systemPrompt") {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));

        let mut payload = json!({
            "model": view.str("model").unwrap_or(DEFAULT_MODEL),
            "messages": messages,
        });
        if let Some(temperature) = view.f64("temperature")? {
            payload["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = view.u64("maxTokens")? {
            payload["max_tokens"] = json!(max_tokens);
        }
        Ok(payload)
    }

    fn parse_response(body: &Value) -> Result<Value, NodeError> {
        let choice = body
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .ok_or_else(|| NodeError::InvalidResponse("response has no choices".into()))?;
        let content = choice
            .pointer("/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::InvalidResponse("choice has no message content".into()))?;
        let usage = body.get("usage").cloned().unwrap_or(Value::Null);

        Ok(json!({
            "content": content,
            "model": body.get("model").and_then(Value::as_str).unwrap_or("unknown"),
            "finishReason": choice.get("finish_reason").cloned().unwrap_or(Value::Null),
            "usage": {
                "promptTokens": usage.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0),
                "completionTokens": usage.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0),
                "totalTokens": usage.get("total_tokens").and_then(Value::as_u64).unwrap_or(0),
            },
        }))
    }

    async fn chat(
        &self,
        config: &Value,
        credentials: Option<&CredentialBundle>,
    ) -> Result<Value, NodeError> {
        let api_key = bearer_secret(Provider::OpenAi, credentials)?;
        let view = ConfigView::new(config);
        let payload = Self::build_payload(&view)?;
        debug!(model = %payload["model"], "sending chat completion");

        let request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .headers(self.build_headers(api_key)?)
            .timeout(self.timeout)
            .json(&payload);
        let body = send_json(request, self.timeout).await?;
        Self::parse_response(&body)
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    async fn execute(
        &self,
        operation: OperationId,
        config: Value,
        credentials: Option<&CredentialBundle>,
        _ctx: &ExecutionContext,
    ) -> OperationResult {
        let started_at = Utc::now();
        let outcome = match operation {
            OperationId::OpenAiChat => self.chat(&config, credentials).await,
            other => Err(NodeError::Unsupported(other)),
        };
        OperationResult::from_outcome(started_at, outcome)
    }
}
