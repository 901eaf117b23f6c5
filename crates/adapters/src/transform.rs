//! Pure data transforms. No I/O; inputs are cloned, never mutated.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};

use crate::condition::{evaluate_all, parse_conditions, parse_match_mode};
use crate::config::ConfigView;
use crate::path::{coerce_array, lookup};
use crate::{
    CredentialBundle, ExecutionContext, NodeError, OperationId, OperationResult, Provider,
    ProviderAdapter,
};

pub struct TransformAdapter;

impl TransformAdapter {
    fn run(
        &self,
        operation: OperationId,
        config: &Value,
        ctx: &ExecutionContext,
    ) -> Result<Value, NodeError> {
        let view = ConfigView::new(config);
        match operation {
            OperationId::TransformJsonParse => json_parse(&view),
            OperationId::TransformJsonStringify => json_stringify(&view),
            OperationId::TransformTemplate => {
                let text = view
                    .get("template")
                    .map(crate::path::to_display_string)
                    .unwrap_or_default();
                Ok(serde_json::json!({ "text": text }))
            }
            OperationId::TransformFilter => {
                let items = input_items(&view, ctx)?;
                let conditions = parse_conditions(view.get("conditions").unwrap_or(&Value::Null))?;
                let mode = parse_match_mode(view.get("match"))?;
                Ok(Value::Array(
                    items
                        .into_iter()
                        .filter(|item| evaluate_all(&conditions, mode, item))
                        .collect(),
                ))
            }
            OperationId::TransformMap => map_items(&view, ctx),
            other => Err(NodeError::Unsupported(other)),
        }
    }
}

#[async_trait]
impl ProviderAdapter for TransformAdapter {
    fn provider(&self) -> Provider {
        Provider::Transform
    }

    async fn execute(
        &self,
        operation: OperationId,
        config: Value,
        _credentials: Option<&CredentialBundle>,
        ctx: &ExecutionContext,
    ) -> OperationResult {
        let started_at = Utc::now();
        OperationResult::from_outcome(started_at, self.run(operation, &config, ctx))
    }
}

fn json_parse(view: &ConfigView<'_>) -> Result<Value, NodeError> {
    match view.get("input") {
        Some(Value::String(text)) => serde_json::from_str(text)
            .map_err(|e| NodeError::InvalidInput(format!("input is not valid JSON: {e}"))),
        Some(other) => Ok(other.clone()),
        None => Err(NodeError::InvalidConfig("'input' is required".into())),
    }
}

fn json_stringify(view: &ConfigView<'_>) -> Result<Value, NodeError> {
    let input = view.get("input").cloned().unwrap_or(Value::Null);
    let text = if view.bool("pretty")?.unwrap_or(false) {
        serde_json::to_string_pretty(&input)
    } else {
        serde_json::to_string(&input)
    }
    .map_err(|e| NodeError::InvalidInput(e.to_string()))?;
    Ok(Value::String(text))
}

/// `items` from config, else the previous node's output.
fn input_items(view: &ConfigView<'_>, ctx: &ExecutionContext) -> Result<Vec<Value>, NodeError> {
    let source = match view.get("items") {
        Some(items) => items,
        None => ctx.previous_output().unwrap_or(&Value::Null),
    };
    coerce_array(source).ok_or_else(|| NodeError::InvalidInput("items must be an array".into()))
}

/// `field` plucks one path per item; `fields` builds an object per item
/// from `{ outputKey: path }`.
fn map_items(view: &ConfigView<'_>, ctx: &ExecutionContext) -> Result<Value, NodeError> {
    let items = input_items(view, ctx)?;
    if let Some(fields) = view.object("fields")? {
        let mapped = items
            .iter()
            .map(|item| {
                let mut out = Map::new();
                for (key, path) in &fields {
                    let path = path.as_str().unwrap_or_default();
                    out.insert(key.clone(), lookup(item, path).cloned().unwrap_or(Value::Null));
                }
                Value::Object(out)
            })
            .collect();
        return Ok(Value::Array(mapped));
    }
    let field = view
        .str("field")
        .ok_or_else(|| NodeError::InvalidConfig("'field' or 'fields' is required".into()))?;
    Ok(Value::Array(
        items
            .iter()
            .map(|item| lookup(item, field).cloned().unwrap_or(Value::Null))
            .collect(),
    ))
}
