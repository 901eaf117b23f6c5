//! Shared plumbing for adapters that talk to third-party HTTP APIs.

use std::time::Duration;

use reqwest::{RequestBuilder, Response};
use serde_json::Value;

use crate::{CredentialBundle, NodeError, Provider};

/// Longest upstream error body kept in an error message.
const MAX_ERROR_BODY: usize = 512;

/// Build the client an adapter owns for its whole lifetime.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, NodeError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("flowrun/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| NodeError::Transport(e.to_string()))
}

/// Extract the bearer secret for `provider`, failing before any network
/// call when none is present.
pub fn bearer_secret(
    provider: Provider,
    credentials: Option<&CredentialBundle>,
) -> Result<&str, NodeError> {
    credentials
        .and_then(CredentialBundle::secret)
        .ok_or(NodeError::MissingCredentials(provider))
}

pub fn map_transport_error(err: reqwest::Error, timeout: Duration) -> NodeError {
    if err.is_timeout() {
        NodeError::Timeout(timeout)
    } else {
        NodeError::Transport(err.to_string())
    }
}

/// Send `request` and decode a JSON body, turning non-2xx statuses into
/// [`NodeError::Upstream`] with the upstream message preserved.
pub async fn send_json(request: RequestBuilder, timeout: Duration) -> Result<Value, NodeError> {
    let response = request
        .send()
        .await
        .map_err(|e| map_transport_error(e, timeout))?;
    let response = ensure_success(response, timeout).await?;
    let text = response
        .text()
        .await
        .map_err(|e| map_transport_error(e, timeout))?;
    if text.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(&text).map_err(|e| NodeError::InvalidResponse(e.to_string()))
}

/// Pass 2xx responses through; read the body of anything else into an error.
pub async fn ensure_success(response: Response, timeout: Duration) -> Result<Response, NodeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .map_err(|e| map_transport_error(e, timeout))?;
    Err(NodeError::Upstream {
        status: status.as_u16(),
        message: upstream_message(&body, status.canonical_reason().unwrap_or("error")),
    })
}

/// Prefer the `error.message` / `message` field of a JSON error body, then
/// the raw body, then the status reason.
pub fn upstream_message(body: &str, fallback: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        let message = json
            .pointer("/error/message")
            .or_else(|| json.get("message"))
            .or_else(|| json.get("error").filter(|e| e.is_string()))
            .and_then(Value::as_str);
        if let Some(message) = message {
            return message.to_owned();
        }
    }
    let body = body.trim();
    if body.is_empty() {
        return fallback.to_owned();
    }
    let mut end = body.len().min(MAX_ERROR_BODY);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_message_prefers_structured_error() {
        let body = r#"{"error":{"message":"Invalid API key","type":"auth"}}"#;
        assert_eq!(upstream_message(body, "Unauthorized"), "Invalid API key");
        assert_eq!(upstream_message(r#"{"message":"nope"}"#, "x"), "nope");
        assert_eq!(upstream_message("", "Bad Gateway"), "Bad Gateway");
        assert_eq!(upstream_message("plain text", "x"), "plain text");
    }

    #[test]
    fn missing_secret_is_reported_per_provider() {
        let err = bearer_secret(Provider::OpenAi, None).unwrap_err();
        assert!(matches!(err, NodeError::MissingCredentials(Provider::OpenAi)));
    }
}
