//! Flow-control primitives.
//!
//! The adapter only computes values and a [`FlowDecision`]; looping,
//! branch pruning and variable writes are carried out by the scheduler.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};

use crate::condition::{evaluate_all, parse_conditions, parse_match_mode, Condition, MatchMode};
use crate::config::ConfigView;
use crate::path::{coerce_array, coerce_object, lookup};
use crate::{
    CredentialBundle, ExecutionContext, FlowDecision, NodeError, OperationId, OperationResult,
    Provider, ProviderAdapter,
};

pub struct FlowAdapter;

/// One branch of a router node.
#[derive(Debug)]
struct Route {
    handle: String,
    conditions: Vec<Condition>,
    mode: MatchMode,
}

impl FlowAdapter {
    fn run(
        &self,
        operation: OperationId,
        config: &Value,
        ctx: &ExecutionContext,
    ) -> Result<(Value, Option<FlowDecision>), NodeError> {
        let view = ConfigView::new(config);
        match operation {
            OperationId::FlowIterate => {
                let source = view
                    .get("items")
                    .or_else(|| ctx.previous_output())
                    .unwrap_or(&Value::Null);
                let items = coerce_array(source)
                    .ok_or_else(|| NodeError::InvalidInput("iterator input must be an array".into()))?;
                let output = serde_json::json!({ "items": items, "count": items.len() });
                Ok((output, Some(FlowDecision::Iterate { items })))
            }
            OperationId::FlowEndIterate => {
                let collected = ctx.previous_output().cloned().unwrap_or(Value::Null);
                Ok((collected.clone(), Some(FlowDecision::EndIterate { collected })))
            }
            OperationId::FlowAggregate => {
                let items = aggregate(&view, ctx)?;
                Ok((Value::Array(items), None))
            }
            OperationId::FlowRoute => {
                let subject = subject(&view, ctx);
                let routes = parse_routes(view.get("routes").unwrap_or(&Value::Null))?;
                let handle = routes
                    .iter()
                    .find(|route| evaluate_all(&route.conditions, route.mode, &subject))
                    .map(|route| route.handle.clone())
                    .or_else(|| view.str("fallback").map(str::to_owned));
                Ok((subject, Some(FlowDecision::Route { handle })))
            }
            OperationId::FlowFilter => {
                let subject = subject(&view, ctx);
                let conditions = parse_conditions(view.get("conditions").unwrap_or(&Value::Null))?;
                let mode = parse_match_mode(view.get("match"))?;
                let passed = evaluate_all(&conditions, mode, &subject);
                Ok((subject, Some(FlowDecision::Filter { passed })))
            }
            OperationId::FlowSetVariable => {
                let variables = view
                    .object("variables")?
                    .ok_or_else(|| NodeError::InvalidConfig("'variables' is required".into()))?;
                Ok((
                    Value::Object(variables.clone()),
                    Some(FlowDecision::SetVariables { variables }),
                ))
            }
            other => Err(NodeError::Unsupported(other)),
        }
    }
}

#[async_trait]
impl ProviderAdapter for FlowAdapter {
    fn provider(&self) -> Provider {
        Provider::Flow
    }

    async fn execute(
        &self,
        operation: OperationId,
        config: Value,
        _credentials: Option<&CredentialBundle>,
        ctx: &ExecutionContext,
    ) -> OperationResult {
        let started_at = Utc::now();
        match self.run(operation, &config, ctx) {
            Ok((output, Some(decision))) => {
                OperationResult::ok(started_at, output).with_decision(decision)
            }
            Ok((output, None)) => OperationResult::ok(started_at, output),
            Err(err) => OperationResult::from_outcome(started_at, Err(err)),
        }
    }
}

/// Value the predicates run against: `input` when configured, else the
/// previous node's output.
fn subject(view: &ConfigView<'_>, ctx: &ExecutionContext) -> Value {
    view.get("input")
        .or_else(|| ctx.previous_output())
        .cloned()
        .unwrap_or(Value::Null)
}

/// Explicit `items`, else the innermost loop's collected results, else the
/// previous output (wrapped when it is not already an array). `field`
/// plucks one path from each element.
fn aggregate(view: &ConfigView<'_>, ctx: &ExecutionContext) -> Result<Vec<Value>, NodeError> {
    let items = if let Some(items) = view.array("items")? {
        items
    } else if let Some(frame) = ctx.loop_frame() {
        frame.aggregated.clone()
    } else {
        match ctx.previous_output() {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => vec![other.clone()],
        }
    };
    Ok(match view.str("field") {
        Some(field) => items
            .iter()
            .map(|item| lookup(item, field).cloned().unwrap_or(Value::Null))
            .collect(),
        None => items,
    })
}

/// Each route is `{ handle, conditions, match? }` or the shorthand
/// `{ handle, field, operator, value }`.
fn parse_routes(value: &Value) -> Result<Vec<Route>, NodeError> {
    let entries = coerce_array(value)
        .ok_or_else(|| NodeError::InvalidConfig("'routes' must be an array".into()))?;
    entries
        .iter()
        .map(|entry| {
            let map: Map<String, Value> = coerce_object(entry)
                .ok_or_else(|| NodeError::InvalidConfig("each route must be an object".into()))?;
            let handle = map
                .get("handle")
                .and_then(Value::as_str)
                .filter(|h| !h.is_empty())
                .ok_or_else(|| NodeError::InvalidConfig("each route needs a 'handle'".into()))?
                .to_owned();
            let conditions = match map.get("conditions") {
                Some(list) => parse_conditions(list)?,
                None => vec![serde_json::from_value(Value::Object(map.clone())).map_err(|e| {
                    NodeError::InvalidConfig(format!("route '{handle}' has no valid condition: {e}"))
                })?],
            };
            let mode = parse_match_mode(map.get("match"))?;
            Ok(Route { handle, conditions, mode })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LoopFrame;
    use serde_json::json;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn ctx_with_previous(previous: Value) -> ExecutionContext {
        let mut ctx = ExecutionContext::new("wf", Uuid::new_v4(), json!({}), HashMap::new());
        ctx.record_output("prev", previous);
        ctx
    }

    async fn run(op: OperationId, config: Value, ctx: &ExecutionContext) -> OperationResult {
        FlowAdapter.execute(op, config, None, ctx).await
    }

    #[tokio::test]
    async fn iterate_accepts_json_text_items() {
        let ctx = ctx_with_previous(Value::Null);
        let result = run(OperationId::FlowIterate, json!({ "items": "[1,2,3]" }), &ctx).await;
        assert_eq!(result.output.as_ref().unwrap()["count"], 3);
        assert_eq!(
            result.metadata.decision,
            Some(FlowDecision::Iterate { items: vec![json!(1), json!(2), json!(3)] })
        );
    }

    #[tokio::test]
    async fn iterate_rejects_non_arrays() {
        let ctx = ctx_with_previous(json!({ "not": "array" }));
        let result = run(OperationId::FlowIterate, json!({}), &ctx).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn route_picks_first_matching_handle() {
        let ctx = ctx_with_previous(json!({ "priority": "high" }));
        let config = json!({
            "routes": [
                { "handle": "low", "field": "priority", "operator": "equals", "value": "low" },
                { "handle": "high", "conditions": [{ "field": "priority", "operator": "equals", "value": "high" }] }
            ],
            "fallback": "other"
        });
        let result = run(OperationId::FlowRoute, config, &ctx).await;
        assert_eq!(result.metadata.decision, Some(FlowDecision::Route { handle: Some("high".into()) }));
        assert_eq!(result.output, Some(json!({ "priority": "high" })));
    }

    #[tokio::test]
    async fn route_without_match_uses_fallback() {
        let ctx = ctx_with_previous(json!({ "priority": "none" }));
        let config = json!({
            "routes": [{ "handle": "a", "field": "priority", "operator": "equals", "value": "a" }],
            "fallback": "else"
        });
        let result = run(OperationId::FlowRoute, config, &ctx).await;
        assert_eq!(result.metadata.decision, Some(FlowDecision::Route { handle: Some("else".into()) }));
    }

    #[tokio::test]
    async fn filter_reports_predicate_outcome() {
        let ctx = ctx_with_previous(json!({ "score": 2 }));
        let config = json!({ "conditions": [{ "field": "score", "operator": "gte", "value": 5 }] });
        let result = run(OperationId::FlowFilter, config, &ctx).await;
        assert!(result.success);
        assert_eq!(result.metadata.decision, Some(FlowDecision::Filter { passed: false }));
    }

    #[tokio::test]
    async fn aggregate_reads_innermost_loop() {
        let mut ctx = ctx_with_previous(json!("x"));
        let mut frame = LoopFrame::new("it", vec![json!(1), json!(2)]);
        frame.aggregated = vec![json!({ "v": 1 }), json!({ "v": 2 })];
        ctx.push_loop(frame);
        let result = run(OperationId::FlowAggregate, json!({ "field": "v" }), &ctx).await;
        assert_eq!(result.output, Some(json!([1, 2])));
    }

    #[tokio::test]
    async fn set_variable_requires_object() {
        let ctx = ctx_with_previous(Value::Null);
        let ok = run(OperationId::FlowSetVariable, json!({ "variables": { "k": "v" } }), &ctx).await;
        assert!(matches!(ok.metadata.decision, Some(FlowDecision::SetVariables { .. })));
        let bad = run(OperationId::FlowSetVariable, json!({ "variables": "nope" }), &ctx).await;
        assert!(!bad.success);
    }
}
