//! Endpoint and timeout settings for the built-in adapters.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::email::EmailAdapter;
use crate::flow::FlowAdapter;
use crate::google::GoogleAdapter;
use crate::http::build_client;
use crate::http_request::HttpRequestAdapter;
use crate::openai::OpenAiAdapter;
use crate::transform::TransformAdapter;
use crate::webhook::TriggerAdapter;
use crate::{NodeError, ProviderAdapter};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterSettings {
    /// Upper bound on every outbound HTTP call, in seconds.
    pub timeout_secs: u64,
    pub openai_base_url: String,
    pub gmail_base_url: String,
    pub sheets_base_url: String,
    pub email_base_url: String,
    /// Sender used by `email.send` when the node does not set `from`.
    pub email_from: Option<String>,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            openai_base_url: "https://api.openai.com/v1".into(),
            gmail_base_url: "https://gmail.googleapis.com".into(),
            sheets_base_url: "https://sheets.googleapis.com".into(),
            email_base_url: "https://api.resend.com".into(),
            email_from: None,
        }
    }
}

impl AdapterSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Point every HTTP adapter at one base URL (used against mock servers).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.openai_base_url = base_url.to_owned();
        self.gmail_base_url = base_url.to_owned();
        self.sheets_base_url = base_url.to_owned();
        self.email_base_url = base_url.to_owned();
        self
    }
}

/// Construct one instance of every built-in adapter. HTTP adapters share a
/// single client built with the configured timeout.
pub fn builtin_adapters(
    settings: &AdapterSettings,
) -> Result<Vec<Arc<dyn ProviderAdapter>>, NodeError> {
    let timeout = settings.timeout();
    let client = build_client(timeout)?;

    Ok(vec![
        Arc::new(TriggerAdapter),
        Arc::new(OpenAiAdapter::new(client.clone(), &settings.openai_base_url, timeout)),
        Arc::new(GoogleAdapter::new(
            client.clone(),
            &settings.gmail_base_url,
            &settings.sheets_base_url,
            timeout,
        )),
        Arc::new(EmailAdapter::new(
            client.clone(),
            &settings.email_base_url,
            settings.email_from.clone(),
            timeout,
        )),
        Arc::new(HttpRequestAdapter::new(client, timeout)),
        Arc::new(TransformAdapter),
        Arc::new(FlowAdapter),
    ])
}
