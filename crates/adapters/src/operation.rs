//! Provider and canonical operation identifiers shared by the resolver and
//! every adapter.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// The external capability an adapter implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Provider {
    /// Entry point of a run; echoes the trigger payload.
    Webhook,
    /// Chat completion against an OpenAI-compatible API.
    #[serde(rename = "openai")]
    OpenAi,
    /// Gmail and Google Sheets.
    Google,
    /// Transactional email API.
    Email,
    /// Generic outbound HTTP call.
    Http,
    /// Pure data transforms (no I/O).
    Transform,
    /// Control-flow primitives driven by the scheduler.
    Flow,
}

impl Provider {
    /// Stable identifier, also used as the credential lookup key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Webhook => "webhook",
            Self::OpenAi => "openai",
            Self::Google => "google",
            Self::Email => "email",
            Self::Http => "http",
            Self::Transform => "transform",
            Self::Flow => "flow",
        }
    }

    /// Whether a resolved credential bundle must be present before any
    /// operation of this provider is attempted.
    pub fn requires_credentials(&self) -> bool {
        matches!(self, Self::OpenAi | Self::Google | Self::Email)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// OperationId
// ---------------------------------------------------------------------------

/// Canonical operation understood by exactly one adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationId {
    #[serde(rename = "webhook.trigger")]
    WebhookTrigger,
    #[serde(rename = "openai.chat")]
    OpenAiChat,
    #[serde(rename = "google.gmail.send")]
    GmailSend,
    #[serde(rename = "google.sheets.append")]
    SheetsAppend,
    #[serde(rename = "google.sheets.find")]
    SheetsFind,
    #[serde(rename = "google.sheets.update")]
    SheetsUpdate,
    #[serde(rename = "google.sheets.delete")]
    SheetsDelete,
    #[serde(rename = "email.send")]
    EmailSend,
    #[serde(rename = "http.request")]
    HttpRequest,
    #[serde(rename = "transform.jsonParse")]
    TransformJsonParse,
    #[serde(rename = "transform.jsonStringify")]
    TransformJsonStringify,
    #[serde(rename = "transform.template")]
    TransformTemplate,
    #[serde(rename = "transform.filter")]
    TransformFilter,
    #[serde(rename = "transform.map")]
    TransformMap,
    #[serde(rename = "flow.iterate")]
    FlowIterate,
    #[serde(rename = "flow.endIterate")]
    FlowEndIterate,
    #[serde(rename = "flow.aggregate")]
    FlowAggregate,
    #[serde(rename = "flow.route")]
    FlowRoute,
    #[serde(rename = "flow.filter")]
    FlowFilter,
    #[serde(rename = "flow.setVariable")]
    FlowSetVariable,
}

impl OperationId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebhookTrigger => "webhook.trigger",
            Self::OpenAiChat => "openai.chat",
            Self::GmailSend => "google.gmail.send",
            Self::SheetsAppend => "google.sheets.append",
            Self::SheetsFind => "google.sheets.find",
            Self::SheetsUpdate => "google.sheets.update",
            Self::SheetsDelete => "google.sheets.delete",
            Self::EmailSend => "email.send",
            Self::HttpRequest => "http.request",
            Self::TransformJsonParse => "transform.jsonParse",
            Self::TransformJsonStringify => "transform.jsonStringify",
            Self::TransformTemplate => "transform.template",
            Self::TransformFilter => "transform.filter",
            Self::TransformMap => "transform.map",
            Self::FlowIterate => "flow.iterate",
            Self::FlowEndIterate => "flow.endIterate",
            Self::FlowAggregate => "flow.aggregate",
            Self::FlowRoute => "flow.route",
            Self::FlowFilter => "flow.filter",
            Self::FlowSetVariable => "flow.setVariable",
        }
    }

    /// The provider whose adapter executes this operation.
    pub fn provider(&self) -> Provider {
        match self {
            Self::WebhookTrigger => Provider::Webhook,
            Self::OpenAiChat => Provider::OpenAi,
            Self::GmailSend
            | Self::SheetsAppend
            | Self::SheetsFind
            | Self::SheetsUpdate
            | Self::SheetsDelete => Provider::Google,
            Self::EmailSend => Provider::Email,
            Self::HttpRequest => Provider::Http,
            Self::TransformJsonParse
            | Self::TransformJsonStringify
            | Self::TransformTemplate
            | Self::TransformFilter
            | Self::TransformMap => Provider::Transform,
            Self::FlowIterate
            | Self::FlowEndIterate
            | Self::FlowAggregate
            | Self::FlowRoute
            | Self::FlowFilter
            | Self::FlowSetVariable => Provider::Flow,
        }
    }

    /// Configuration keys that must be present in a node's `data` before
    /// the operation can run. Checked against the raw (uninterpolated) map.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::OpenAiChat => &["prompt"],
            Self::GmailSend => &["to", "subject", "body"],
            Self::SheetsAppend | Self::SheetsUpdate => &["spreadsheetId", "range", "values"],
            Self::SheetsFind => &["spreadsheetId", "range", "column", "value"],
            Self::SheetsDelete => &["spreadsheetId", "rowNumber"],
            Self::EmailSend => &["to", "subject"],
            Self::HttpRequest => &["url"],
            Self::TransformJsonParse | Self::TransformJsonStringify => &["input"],
            Self::TransformTemplate => &["template"],
            Self::TransformFilter | Self::FlowFilter => &["conditions"],
            Self::FlowRoute => &["routes"],
            Self::FlowSetVariable => &["variables"],
            _ => &[],
        }
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
