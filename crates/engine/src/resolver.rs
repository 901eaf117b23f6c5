//! Node Type Resolver: UI node type + operation → provider and canonical
//! operation id.

use adapters::{OperationId, Provider};
use serde_json::Value;
use thiserror::Error;

use crate::models::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedNode {
    pub provider: Provider,
    pub operation: OperationId,
}

impl From<OperationId> for ResolvedNode {
    fn from(operation: OperationId) -> Self {
        Self {
            provider: operation.provider(),
            operation,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResolveError {
    #[error("unknown node type '{0}'")]
    UnknownType(String),

    #[error("unknown operation '{operation}' for node type '{node_type}'")]
    UnknownOperation { node_type: String, operation: String },

    #[error("node type '{0}' requires an operation")]
    MissingOperation(String),

    #[error("missing required field '{field}' for operation '{operation}'")]
    MissingField {
        operation: OperationId,
        field: &'static str,
    },
}

impl ResolveError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownType(_) => "unknown_node_type",
            Self::UnknownOperation { .. } | Self::MissingOperation(_) => "unknown_operation",
            Self::MissingField { .. } => "missing_field",
        }
    }
}

/// Map a node type and optional operation name to a canonical operation.
///
/// Types with a single operation accept it by name or omitted. `flow`
/// accepts both the editor's mode names (`iterator`, `router`, ...) and
/// the operation names (`iterate`, `route`, ...).
pub fn resolve(node_type: &str, operation: Option<&str>) -> Result<ResolvedNode, ResolveError> {
    let op = operation.map(str::trim).filter(|op| !op.is_empty());
    let unknown = |op: &str| ResolveError::UnknownOperation {
        node_type: node_type.to_owned(),
        operation: op.to_owned(),
    };

    let resolved = match (node_type, op) {
        ("trigger" | "webhook", _) => OperationId::WebhookTrigger,
        ("openai", None | Some("chat")) => OperationId::OpenAiChat,
        ("gmail", None | Some("send")) => OperationId::GmailSend,
        ("sheets", None | Some("append")) => OperationId::SheetsAppend,
        ("sheets", Some("find")) => OperationId::SheetsFind,
        ("sheets", Some("update")) => OperationId::SheetsUpdate,
        ("sheets", Some("delete")) => OperationId::SheetsDelete,
        ("email", None | Some("send")) => OperationId::EmailSend,
        ("httpRequest" | "http", None | Some("request")) => OperationId::HttpRequest,
        ("transform", Some("jsonParse")) => OperationId::TransformJsonParse,
        ("transform", Some("jsonStringify")) => OperationId::TransformJsonStringify,
        ("transform", Some("template")) => OperationId::TransformTemplate,
        ("transform", Some("filter")) => OperationId::TransformFilter,
        ("transform", Some("map")) => OperationId::TransformMap,
        ("flow", Some("iterator" | "iterate")) => OperationId::FlowIterate,
        ("flow", Some("endIterator" | "endIterate")) => OperationId::FlowEndIterate,
        ("flow", Some("aggregator" | "aggregate")) => OperationId::FlowAggregate,
        ("flow", Some("router" | "route")) => OperationId::FlowRoute,
        ("flow", Some("filter")) => OperationId::FlowFilter,
        ("flow", Some("setVariable")) => OperationId::FlowSetVariable,
        ("transform" | "flow", None) => {
            return Err(ResolveError::MissingOperation(node_type.to_owned()))
        }
        ("openai" | "gmail" | "sheets" | "email" | "httpRequest" | "http" | "transform" | "flow", Some(op)) => {
            return Err(unknown(op))
        }
        _ => return Err(ResolveError::UnknownType(node_type.to_owned())),
    };
    Ok(resolved.into())
}

/// The operation name a node declares: `node.operation`, else
/// `data.operation`, else (for `flow`) `data.mode`.
pub fn declared_operation(node: &Node) -> Option<&str> {
    let from_data = |key: &str| node.data.get(key).and_then(Value::as_str);
    node.operation
        .as_deref()
        .filter(|op| !op.trim().is_empty())
        .or_else(|| from_data("operation"))
        .or_else(|| {
            if node.node_type == "flow" {
                from_data("mode")
            } else {
                None
            }
        })
}

/// Resolve `node` and check that its raw data carries every field the
/// operation requires. Runs before interpolation, so a field holding only
/// a placeholder counts as present.
pub fn resolve_node(node: &Node) -> Result<ResolvedNode, ResolveError> {
    let resolved = resolve(&node.node_type, declared_operation(node))?;
    for &field in resolved.operation.required_fields() {
        let present = match node.data.get(field) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
        };
        if !present {
            return Err(ResolveError::MissingField {
                operation: resolved.operation,
                field,
            });
        }
    }
    Ok(resolved)
}
