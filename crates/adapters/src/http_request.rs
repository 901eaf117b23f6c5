//! Generic outbound HTTP call (`http.request`).

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::config::ConfigView;
use crate::http::{ensure_success, map_transport_error};
use crate::path::to_display_string;
use crate::{
    CredentialBundle, ExecutionContext, NodeError, OperationId, OperationResult, Provider,
    ProviderAdapter,
};

pub struct HttpRequestAdapter {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpRequestAdapter {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn request(&self, config: &Value) -> Result<(Value, u16), NodeError> {
        let view = ConfigView::new(config);
        let url = parse_url(view.required_str("url")?)?;
        let method = view.str("method").unwrap_or("GET").trim().to_ascii_uppercase();
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| NodeError::InvalidConfig(format!("unknown HTTP method '{method}'")))?;
        let timeout = view
            .u64("timeoutSecs")?
            .map(|secs| Duration::from_secs(secs.max(1)))
            .unwrap_or(self.timeout);

        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .headers(headers(view.object("headers")?.unwrap_or_default())?)
            .timeout(timeout);
        if let Some(query) = view.object("query")? {
            let pairs: Vec<(String, String)> = query
                .iter()
                .map(|(k, v)| (k.clone(), to_display_string(v)))
                .collect();
            request = request.query(&pairs);
        }
        request = match view.get("body") {
            None => request,
            Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
                Ok(json @ (Value::Object(_) | Value::Array(_))) => request.json(&json),
                _ => request.body(text.clone()),
            },
            Some(other) => request.json(other),
        };

        debug!(%method, %url, "sending http request");
        let response = request
            .send()
            .await
            .map_err(|e| map_transport_error(e, timeout))?;
        let response = ensure_success(response, timeout).await?;
        let status = response.status().as_u16();
        let response_headers: Map<String, Value> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_owned(), Value::String(v.to_owned())))
            })
            .collect();
        let text = response
            .text()
            .await
            .map_err(|e| map_transport_error(e, timeout))?;
        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        Ok((
            json!({ "status": status, "headers": response_headers, "body": body }),
            status,
        ))
    }
}

#[async_trait]
impl ProviderAdapter for HttpRequestAdapter {
    fn provider(&self) -> Provider {
        Provider::Http
    }

    async fn execute(
        &self,
        operation: OperationId,
        config: Value,
        _credentials: Option<&CredentialBundle>,
        _ctx: &ExecutionContext,
    ) -> OperationResult {
        let started_at = Utc::now();
        match operation {
            OperationId::HttpRequest => match self.request(&config).await {
                Ok((output, status)) => {
                    OperationResult::ok(started_at, output).with_meta("statusCode", json!(status))
                }
                Err(err) => OperationResult::from_outcome(started_at, Err(err)),
            },
            other => OperationResult::from_outcome(started_at, Err(NodeError::Unsupported(other))),
        }
    }
}

fn parse_url(raw: &str) -> Result<Url, NodeError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| NodeError::InvalidConfig(format!("invalid url '{raw}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(NodeError::InvalidConfig(format!(
            "unsupported url scheme '{scheme}'"
        ))),
    }
}

fn headers(map: Map<String, Value>) -> Result<HeaderMap, NodeError> {
    let mut headers = HeaderMap::new();
    for (name, value) in map {
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| NodeError::InvalidConfig(format!("invalid header name '{name}'")))?;
        let value = HeaderValue::from_str(&to_display_string(&value))
            .map_err(|_| NodeError::InvalidConfig(format!("invalid value for header '{name}'")))?;
        headers.insert(header, value);
    }
    Ok(headers)
}
