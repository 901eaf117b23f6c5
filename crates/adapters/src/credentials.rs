//! Pre-resolved credential bundles handed to the engine by the host.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Provider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    ApiKey,
    Oauth2,
}

/// Opaque to the scheduler; only the adapter for the matching provider
/// interprets the fields.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialBundle {
    #[serde(rename = "type")]
    pub kind: CredentialKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default)]
    pub scope: Vec<String>,
}

impl CredentialBundle {
    pub fn api_key(key: impl Into<String>) -> Self {
        Self {
            kind: CredentialKind::ApiKey,
            access_token: None,
            refresh_token: None,
            expires_at: None,
            api_key: Some(key.into()),
            scope: Vec::new(),
        }
    }

    pub fn oauth2(access_token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            kind: CredentialKind::Oauth2,
            access_token: Some(access_token.into()),
            refresh_token: None,
            expires_at,
            api_key: None,
            scope: Vec::new(),
        }
    }

    /// An OAuth2 bundle is expired once `expires_at` has passed. API keys
    /// never expire from the engine's point of view.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match (self.kind, self.expires_at) {
            (CredentialKind::Oauth2, Some(expires_at)) => expires_at <= now,
            _ => false,
        }
    }

    /// The secret to present upstream: the API key for `api_key` bundles,
    /// the access token for `oauth2` ones, falling back to whichever is set.
    pub fn secret(&self) -> Option<&str> {
        let (primary, fallback) = match self.kind {
            CredentialKind::ApiKey => (&self.api_key, &self.access_token),
            CredentialKind::Oauth2 => (&self.access_token, &self.api_key),
        };
        primary
            .as_deref()
            .or(fallback.as_deref())
            .filter(|s| !s.is_empty())
    }
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("kind", &self.kind)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("scope", &self.scope)
            .finish()
    }
}

/// Host-side credential source. The engine consults it once per provider
/// at run start; refresh, storage and per-user scoping are the host's job.
#[async_trait]
pub trait CredentialLookup: Send + Sync {
    async fn credential(&self, provider: Provider) -> Option<CredentialBundle>;
}

/// Bundles keyed by [`Provider::as_str`].
#[async_trait]
impl CredentialLookup for HashMap<String, CredentialBundle> {
    async fn credential(&self, provider: Provider) -> Option<CredentialBundle> {
        self.get(provider.as_str()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn oauth_bundle_expires_but_api_key_does_not() {
        let now = Utc::now();
        let stale = CredentialBundle::oauth2("tok", Some(now - Duration::minutes(1)));
        let fresh = CredentialBundle::oauth2("tok", Some(now + Duration::minutes(5)));
        assert!(stale.is_expired_at(now));
        assert!(!fresh.is_expired_at(now));
        assert!(!CredentialBundle::api_key("sk").is_expired_at(now));
    }

    #[test]
    fn deserialises_host_shape() {
        let bundle: CredentialBundle = serde_json::from_value(json!({
            "type": "oauth2",
            "accessToken": "ya29",
            "scope": ["gmail.send"]
        }))
        .unwrap();
        assert_eq!(bundle.kind, CredentialKind::Oauth2);
        assert_eq!(bundle.secret(), Some("ya29"));
        assert_eq!(bundle.scope, vec!["gmail.send"]);
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let rendered = format!("{:?}", CredentialBundle::api_key("sk-very-secret"));
        assert!(!rendered.contains("sk-very-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[tokio::test]
    async fn map_lookup_uses_provider_key() {
        let mut map = HashMap::new();
        map.insert("openai".to_string(), CredentialBundle::api_key("sk"));
        assert!(map.credential(Provider::OpenAi).await.is_some());
        assert!(map.credential(Provider::Google).await.is_none());
    }
}
