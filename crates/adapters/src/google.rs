//! Gmail send and Google Sheets row operations over the Google REST APIs.
//!
//! Both services authenticate with the OAuth2 access token from the
//! `google` credential bundle; token refresh is the host's job.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use chrono::Utc;
use reqwest::{Method, Url};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::ConfigView;
use crate::http::{bearer_secret, send_json};
use crate::path::{coerce_array, to_display_string};
use crate::{
    CredentialBundle, ExecutionContext, NodeError, OperationId, OperationResult, Provider,
    ProviderAdapter,
};

pub struct GoogleAdapter {
    client: reqwest::Client,
    gmail_base_url: String,
    sheets_base_url: String,
    timeout: Duration,
}

impl GoogleAdapter {
    pub fn new(
        client: reqwest::Client,
        gmail_base_url: &str,
        sheets_base_url: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            gmail_base_url: gmail_base_url.trim_end_matches('/').to_owned(),
            sheets_base_url: sheets_base_url.trim_end_matches('/').to_owned(),
            timeout,
        }
    }

    /// `{base}/segment/segment/...` with each segment percent-encoded.
    fn url(base: &str, segments: &[&str]) -> Result<Url, NodeError> {
        let mut url = Url::parse(base)
            .map_err(|e| NodeError::InvalidConfig(format!("invalid base URL '{base}': {e}")))?;
        url.path_segments_mut()
            .map_err(|_| NodeError::InvalidConfig(format!("base URL '{base}' cannot have a path")))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn call(
        &self,
        method: Method,
        url: Url,
        token: &str,
        body: Option<Value>,
    ) -> Result<Value, NodeError> {
        debug!(%method, %url, "calling google api");
        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(token)
            .timeout(self.timeout);
        if let Some(body) = body {
            request = request.json(&body);
        }
        send_json(request, self.timeout).await
    }

    // -----------------------------------------------------------------------
    // Gmail
    // -----------------------------------------------------------------------

    async fn gmail_send(&self, view: &ConfigView<'_>, token: &str) -> Result<Value, NodeError> {
        let to = view.string_list("to");
        if to.is_empty() {
            return Err(NodeError::InvalidConfig("'to' must name at least one recipient".into()));
        }
        let subject = view.required_str("subject")?;
        let body = view.get("body").map(to_display_string).unwrap_or_default();
        let html = view.bool("isHtml")?.unwrap_or(false);

        let mut message = format!("To: {}\r\n", to.join(", "));
        let cc = view.string_list("cc");
        if !cc.is_empty() {
            message.push_str(&format!("Cc: {}\r\n", cc.join(", ")));
        }
        let bcc = view.string_list("bcc");
        if !bcc.is_empty() {
            message.push_str(&format!("Bcc: {}\r\n", bcc.join(", ")));
        }
        message.push_str(&format!("Subject: {subject}\r\nMIME-Version: 1.0\r\n"));
        let content_type = if html { "text/html" } else { "text/plain" };
        message.push_str(&format!(
            "Content-Type: {content_type}; charset=\"UTF-8\"\r\n\r\n{body}"
        ));

        let url = Self::url(
            &self.gmail_base_url,
            &["gmail", "v1", "users", "me", "messages", "send"],
        )?;
        let response = self
            .call(Method::POST, url, token, Some(json!({ "raw": URL_SAFE.encode(message) })))
            .await?;
        Ok(json!({
            "id": response.get("id").cloned().unwrap_or(Value::Null),
            "threadId": response.get("threadId").cloned().unwrap_or(Value::Null),
            "labelIds": response.get("labelIds").cloned().unwrap_or(json!([])),
        }))
    }

    // -----------------------------------------------------------------------
    // Sheets
    // -----------------------------------------------------------------------

    fn values_url(&self, spreadsheet_id: &str, range_suffix: &str) -> Result<Url, NodeError> {
        Self::url(
            &self.sheets_base_url,
            &["v4", "spreadsheets", spreadsheet_id, "values", range_suffix],
        )
    }

    async fn sheets_append(&self, view: &ConfigView<'_>, token: &str) -> Result<Value, NodeError> {
        let spreadsheet_id = view.required_str("spreadsheetId")?;
        let range = view.required_str("range")?;
        let rows = rows(view)?;

        let mut url = self.values_url(spreadsheet_id, &format!("{range}:append"))?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED")
            .append_pair("insertDataOption", "INSERT_ROWS");
        let response = self
            .call(Method::POST, url, token, Some(json!({ "values": rows })))
            .await?;
        let updates = response.get("updates").cloned().unwrap_or(Value::Null);
        Ok(json!({
            "updatedRange": updates.get("updatedRange").cloned().unwrap_or(Value::Null),
            "updatedRows": updates.get("updatedRows").cloned().unwrap_or(json!(0)),
        }))
    }

    async fn sheets_update(&self, view: &ConfigView<'_>, token: &str) -> Result<Value, NodeError> {
        let spreadsheet_id = view.required_str("spreadsheetId")?;
        let range = view.required_str("range")?;
        let rows = rows(view)?;

        let mut url = self.values_url(spreadsheet_id, range)?;
        url.query_pairs_mut().append_pair("valueInputOption", "USER_ENTERED");
        let body = json!({ "range": range, "majorDimension": "ROWS", "values": rows });
        let response = self.call(Method::PUT, url, token, Some(body)).await?;
        Ok(json!({
            "updatedRange": response.get("updatedRange").cloned().unwrap_or(Value::Null),
            "updatedRows": response.get("updatedRows").cloned().unwrap_or(json!(0)),
            "updatedCells": response.get("updatedCells").cloned().unwrap_or(json!(0)),
        }))
    }

    /// Rows in `range` whose `column` cell equals `value`. `column` is a
    /// zero-based index or, with the default `hasHeader: true`, a header
    /// name from the first row.
    async fn sheets_find(&self, view: &ConfigView<'_>, token: &str) -> Result<Value, NodeError> {
        let spreadsheet_id = view.required_str("spreadsheetId")?;
        let range = view.required_str("range")?;
        let column = view
            .get("column")
            .map(to_display_string)
            .ok_or_else(|| NodeError::InvalidConfig("'column' is required".into()))?;
        let wanted = view.get("value").map(to_display_string).unwrap_or_default();
        let has_header = view.bool("hasHeader")?.unwrap_or(true);

        let url = self.values_url(spreadsheet_id, range)?;
        let response = self.call(Method::GET, url, token, None).await?;
        let values = response
            .get("values")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let first_row = response
            .get("range")
            .and_then(Value::as_str)
            .map(start_row)
            .unwrap_or(1);

        let header: Vec<String> = match (has_header, values.first()) {
            (true, Some(Value::Array(cells))) => cells.iter().map(to_display_string).collect(),
            _ => Vec::new(),
        };
        let index = match column.parse::<usize>() {
            Ok(index) => index,
            Err(_) => header.iter().position(|h| *h == column).ok_or_else(|| {
                NodeError::InvalidConfig(format!("column '{column}' not found in header row"))
            })?,
        };

        let skip = usize::from(has_header && !header.is_empty());
        let matches: Vec<Value> = values
            .iter()
            .enumerate()
            .skip(skip)
            .filter_map(|(offset, row)| {
                let cells = row.as_array()?;
                let cell = cells.get(index).map(to_display_string).unwrap_or_default();
                if cell != wanted {
                    return None;
                }
                let mut found = json!({ "rowNumber": first_row + offset, "values": cells });
                if !header.is_empty() {
                    let record: serde_json::Map<String, Value> = header
                        .iter()
                        .zip(cells.iter().chain(std::iter::repeat(&Value::Null)))
                        .map(|(h, v)| (h.clone(), v.clone()))
                        .collect();
                    found["record"] = Value::Object(record);
                }
                Some(found)
            })
            .collect();

        Ok(json!({ "count": matches.len(), "matches": matches }))
    }

    async fn sheets_delete(&self, view: &ConfigView<'_>, token: &str) -> Result<Value, NodeError> {
        let spreadsheet_id = view.required_str("spreadsheetId")?;
        let row_number = view
            .u64("rowNumber")?
            .filter(|n| *n >= 1)
            .ok_or_else(|| NodeError::InvalidConfig("'rowNumber' must be 1 or greater".into()))?;
        let sheet_id = view.u64("sheetId")?.unwrap_or(0);

        let url = Self::url(
            &self.sheets_base_url,
            &["v4", "spreadsheets", &format!("{spreadsheet_id}:batchUpdate")],
        )?;
        let body = json!({
            "requests": [{
                "deleteDimension": {
                    "range": {
                        "sheetId": sheet_id,
                        "dimension": "ROWS",
                        "startIndex": row_number - 1,
                        "endIndex": row_number,
                    }
                }
            }]
        });
        self.call(Method::POST, url, token, Some(body)).await?;
        Ok(json!({ "deletedRow": row_number, "sheetId": sheet_id }))
    }
}

#[async_trait]
impl ProviderAdapter for GoogleAdapter {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    async fn execute(
        &self,
        operation: OperationId,
        config: Value,
        credentials: Option<&CredentialBundle>,
        _ctx: &ExecutionContext,
    ) -> OperationResult {
        let started_at = Utc::now();
        let token = match bearer_secret(Provider::Google, credentials) {
            Ok(token) => token,
            Err(err) => return OperationResult::from_outcome(started_at, Err(err)),
        };
        let view = ConfigView::new(&config);
        let outcome = match operation {
            OperationId::GmailSend => self.gmail_send(&view, token).await,
            OperationId::SheetsAppend => self.sheets_append(&view, token).await,
            OperationId::SheetsFind => self.sheets_find(&view, token).await,
            OperationId::SheetsUpdate => self.sheets_update(&view, token).await,
            OperationId::SheetsDelete => self.sheets_delete(&view, token).await,
            other => Err(NodeError::Unsupported(other)),
        };
        OperationResult::from_outcome(started_at, outcome)
    }
}

/// `values` as a list of rows; a flat list is a single row.
fn rows(view: &ConfigView<'_>) -> Result<Vec<Value>, NodeError> {
    let values = view
        .get("values")
        .and_then(coerce_array)
        .ok_or_else(|| NodeError::InvalidConfig("'values' must be an array".into()))?;
    if values.iter().all(Value::is_array) && !values.is_empty() {
        Ok(values)
    } else {
        Ok(vec![Value::Array(values)])
    }
}

/// First row number of an A1 range such as `Sheet1!A2:D40`.
fn start_row(range: &str) -> usize {
    let cells = range.rsplit('!').next().unwrap_or(range);
    let start = cells.split(':').next().unwrap_or(cells);
    start
        .trim_start_matches(|c: char| c.is_ascii_alphabetic() || c == '$')
        .parse()
        .unwrap_or(1)
}
