//! Transactional email through a Resend-compatible HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::ConfigView;
use crate::http::{bearer_secret, send_json};
use crate::path::to_display_string;
use crate::{
    CredentialBundle, ExecutionContext, NodeError, OperationId, OperationResult, Provider,
    ProviderAdapter,
};

pub struct EmailAdapter {
    client: reqwest::Client,
    base_url: String,
    default_from: Option<String>,
    timeout: Duration,
}

impl EmailAdapter {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        default_from: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            default_from,
            timeout,
        }
    }

    fn build_payload(&self, view: &ConfigView<'_>) -> Result<Value, NodeError> {
        let from = view
            .str("from")
            .map(str::to_owned)
            .or_else(|| self.default_from.clone())
            .ok_or_else(|| {
                NodeError::InvalidConfig("'from' is required when no default sender is set".into())
            })?;
        let to = view.string_list("to");
        if to.is_empty() {
            return Err(NodeError::InvalidConfig("'to' must name at least one recipient".into()));
        }
        let subject = view.required_str("subject")?;

        let mut payload = json!({ "from": from, "to": to, "subject": subject });
        if let Some(html) = view.get("html").map(to_display_string) {
            payload["html"] = json!(html);
        }
        let text = view.get("text").or_else(|| view.get("body")).map(to_display_string);
        match text {
            Some(text) => payload["text"] = json!(text),
            None if payload.get("html").is_none() => payload["text"] = json!(""),
            None => {}
        }
        for (key, field) in [("cc", "cc"), ("bcc", "bcc"), ("reply_to", "replyTo")] {
            let list = view.string_list(field);
            if !list.is_empty() {
                payload[key] = json!(list);
            }
        }
        Ok(payload)
    }

    async fn send(
        &self,
        config: &Value,
        credentials: Option<&CredentialBundle>,
    ) -> Result<Value, NodeError> {
        let api_key = bearer_secret(Provider::Email, credentials)?;
        let payload = self.build_payload(&ConfigView::new(config))?;
        debug!(to = %payload["to"], "sending email");

        let request = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .json(&payload);
        let response = send_json(request, self.timeout).await?;
        let id = response
            .get("id")
            .cloned()
            .ok_or_else(|| NodeError::InvalidResponse("response has no message id".into()))?;
        Ok(json!({ "id": id }))
    }
}

#[async_trait]
impl ProviderAdapter for EmailAdapter {
    fn provider(&self) -> Provider {
        Provider::Email
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
            OperationId::EmailSend => self.send(&config, credentials).await,
            other => Err(NodeError::Unsupported(other)),
        };
        OperationResult::from_outcome(started_at, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use std::collections::HashMap;
    use uuid::Uuid;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("wf", Uuid::new_v4(), json!({}), HashMap::new())
    }

    #[tokio::test]
    async fn sends_with_default_sender() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/emails")
            .match_header("authorization", "Bearer re_key")
            .match_body(Matcher::Json(json!({
                "from": "bot@example.com",
                "to": ["a@x.io", "b@x.io"],
                "subject": "Weekly report",
                "text": "42 signups"
            })))
            .with_status(200)
            .with_body(r#"{"id":"email_123"}"#)
            .create_async()
            .await;

        let adapter = EmailAdapter::new(
            reqwest::Client::new(),
            &server.url(),
            Some("bot@example.com".into()),
            Duration::from_secs(5),
        );
        let config = json!({ "to": "a@x.io, b@x.io", "subject": "Weekly report", "body": "42 signups" });
        let result = adapter
            .execute(OperationId::EmailSend, config, Some(&CredentialBundle::api_key("re_key")), &ctx())
            .await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.output, Some(json!({ "id": "email_123" })));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_sender_is_a_config_error() {
        let adapter =
            EmailAdapter::new(reqwest::Client::new(), "http://127.0.0.1:9", None, Duration::from_secs(1));
        let config = json!({ "to": "a@x.io", "subject": "s" });
        let result = adapter
            .execute(OperationId::EmailSend, config, Some(&CredentialBundle::api_key("k")), &ctx())
            .await;
        assert_eq!(result.error.unwrap().code.as_deref(), Some("invalid_config"));
    }

    #[tokio::test]
    async fn rejected_send_reports_upstream_status() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/emails")
            .with_status(422)
            .with_body(r#"{"message":"Invalid `to` field"}"#)
            .create_async()
            .await;

        let adapter = EmailAdapter::new(
            reqwest::Client::new(),
            &server.url(),
            Some("bot@example.com".into()),
            Duration::from_secs(5),
        );
        let config = json!({ "to": "nobody", "subject": "s", "html": "<p>x</p>" });
        let result = adapter
            .execute(OperationId::EmailSend, config, Some(&CredentialBundle::api_key("k")), &ctx())
            .await;

        let error = result.error.unwrap();
        assert_eq!(error.code.as_deref(), Some("upstream_error"));
        assert!(error.message.contains("Invalid `to` field"));
    }
}
