//! Per-run execution state.
//!
//! Defined here (in the adapters crate) so both the engine and individual
//! adapters can import it without a circular dependency. Adapters only ever
//! see `&ExecutionContext`; the scheduler owns the single `&mut` and is the
//! only writer of node outputs, variables and loop frames.

use std::collections::HashMap;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{CredentialBundle, Provider};

/// One active `flow.iterate` loop.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopFrame {
    /// Id of the iterator node that opened the loop.
    pub node_id: String,
    pub items: Vec<Value>,
    pub cursor: usize,
    /// Values collected by `flow.endIterate`, one per finished iteration.
    pub aggregated: Vec<Value>,
}

impl LoopFrame {
    pub fn new(node_id: impl Into<String>, items: Vec<Value>) -> Self {
        Self {
            node_id: node_id.into(),
            items,
            cursor: 0,
            aggregated: Vec::new(),
        }
    }

    pub fn current_item(&self) -> Option<&Value> {
        self.items.get(self.cursor)
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.items.len()
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    workflow_id: String,
    execution_id: Uuid,
    trigger_input: Value,
    node_outputs: HashMap<String, Value>,
    previous_output: Option<Value>,
    variables: Map<String, Value>,
    credentials: HashMap<Provider, CredentialBundle>,
    loop_stack: Vec<LoopFrame>,
}

impl ExecutionContext {
    pub fn new(
        workflow_id: impl Into<String>,
        execution_id: Uuid,
        trigger_input: Value,
        credentials: HashMap<Provider, CredentialBundle>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            execution_id,
            trigger_input,
            node_outputs: HashMap::new(),
            previous_output: None,
            variables: Map::new(),
            credentials,
            loop_stack: Vec::new(),
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    pub fn trigger_input(&self) -> &Value {
        &self.trigger_input
    }

    /// Store `output` as the latest result of `node_id`; it also becomes
    /// the `previous` output seen by the next node.
    pub fn record_output(&mut self, node_id: &str, output: Value) {
        self.previous_output = Some(output.clone());
        self.node_outputs.insert(node_id.to_owned(), output);
    }

    pub fn output(&self, node_id: &str) -> Option<&Value> {
        self.node_outputs.get(node_id)
    }

    /// Output of the most recently executed node.
    pub fn previous_output(&self) -> Option<&Value> {
        self.previous_output.as_ref()
    }

    /// Override what `previous` refers to without recording a node output.
    pub fn set_previous_output(&mut self, output: Option<Value>) {
        self.previous_output = output;
    }

    pub fn variable(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    pub fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }

    pub fn set_variable(&mut self, key: impl Into<String>, value: Value) {
        self.variables.insert(key.into(), value);
    }

    pub fn credential(&self, provider: Provider) -> Option<&CredentialBundle> {
        self.credentials.get(&provider)
    }

    /// Innermost active loop, if any.
    pub fn loop_frame(&self) -> Option<&LoopFrame> {
        self.loop_stack.last()
    }

    pub fn loop_frame_mut(&mut self) -> Option<&mut LoopFrame> {
        self.loop_stack.last_mut()
    }

    pub fn push_loop(&mut self, frame: LoopFrame) {
        self.loop_stack.push(frame);
    }

    pub fn pop_loop(&mut self) -> Option<LoopFrame> {
        self.loop_stack.pop()
    }

    pub fn loop_depth(&self) -> usize {
        self.loop_stack.len()
    }
}
