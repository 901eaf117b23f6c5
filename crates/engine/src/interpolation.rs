//! `{{path}}` placeholder resolution against the execution context.
//!
//! Roots:
//! - `previous.*`: output of the most recently executed node
//! - `trigger.*`: the run's trigger input
//! - `nodes.<id>.*`: any recorded node output
//! - `vars.<key>`: the run's variable store
//! - `loop.item` / `loop.index`: the innermost active loop
//!
//! A leading `output` segment after `previous` or `nodes.<id>` addresses the
//! raw output, so `{{previous.output}}` and `{{previous}}` are equivalent.
//! Unresolvable paths and `null` render as the empty string; resolution
//! never fails.

use std::sync::LazyLock;

use adapters::path::{lookup_segments, to_display_string};
use adapters::ExecutionContext;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use tracing::debug;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("placeholder pattern is valid")
});

#[derive(Debug, Clone, Copy, Default)]
pub struct Interpolator {
    /// Return the resolved JSON value (not its string form) when a string
    /// is exactly one placeholder.
    preserve_types: bool,
}

impl Interpolator {
    pub fn new(preserve_types: bool) -> Self {
        Self { preserve_types }
    }

    /// Walk `value` and resolve placeholders in every string. Object keys
    /// and non-string scalars are copied unchanged.
    pub fn interpolate(&self, value: &Value, ctx: &ExecutionContext) -> Value {
        match value {
            Value::String(s) => self.interpolate_string(s, ctx),
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.interpolate(v, ctx)).collect())
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.interpolate(v, ctx)))
                    .collect::<Map<String, Value>>(),
            ),
            other => other.clone(),
        }
    }

    fn interpolate_string(&self, template: &str, ctx: &ExecutionContext) -> Value {
        if !template.contains("{{") {
            return Value::String(template.to_owned());
        }
        if self.preserve_types {
            if let Some(caps) = PLACEHOLDER.captures(template) {
                if caps.get(0).is_some_and(|m| m.as_str().len() == template.len()) {
                    return match resolve_path(&caps[1], ctx) {
                        Some(Value::Null) | None => Value::String(String::new()),
                        Some(value) => value,
                    };
                }
            }
        }
        Value::String(render(template, ctx))
    }
}

/// Render `template` with every placeholder replaced by its string form.
pub fn render(template: &str, ctx: &ExecutionContext) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            let path = &caps[1];
            match resolve_path(path, ctx) {
                Some(value) => to_display_string(&value),
                None => {
                    debug!(path, "placeholder did not resolve");
                    String::new()
                }
            }
        })
        .into_owned()
}

/// Resolve one dotted path. `None` when the root is unknown or any segment
/// is missing.
pub fn resolve_path(path: &str, ctx: &ExecutionContext) -> Option<Value> {
    let mut segments = path.split('.').map(str::trim);
    let root = segments.next()?;
    let rest: Vec<&str> = segments.collect();

    match root {
        "previous" => lookup_output(ctx.previous_output()?, &rest),
        "trigger" => lookup_segments(ctx.trigger_input(), rest.iter().copied()).cloned(),
        "nodes" => {
            let (id, rest) = rest.split_first()?;
            lookup_output(ctx.output(id)?, rest)
        }
        "vars" | "variables" => {
            let (key, rest) = rest.split_first()?;
            lookup_segments(ctx.variable(key)?, rest.iter().copied()).cloned()
        }
        "loop" => {
            let frame = ctx.loop_frame()?;
            match rest.split_first()? {
                (&"item", rest) => {
                    lookup_segments(frame.current_item()?, rest.iter().copied()).cloned()
                }
                (&"index", []) => Some(Value::from(frame.cursor)),
                _ => None,
            }
        }
        _ => None,
    }
}

fn lookup_output(output: &Value, rest: &[&str]) -> Option<Value> {
    let rest = match rest.split_first() {
        Some((&"output", tail)) => tail,
        _ => rest,
    };
    lookup_segments(output, rest.iter().copied()).cloned()
}
