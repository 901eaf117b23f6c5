//! Workflow execution engine.
//!
//! `WorkflowExecutor` is the central orchestrator:
//! 1. Derives the execution plan (order, loop brackets, collapsed edges).
//! 2. Loads credential bundles once for every provider the plan needs.
//! 3. Walks the order, interpolating each node's data and dispatching it
//!    to the adapter for its provider.
//! 4. Applies flow decisions (loops, routes, filters, variables).
//! 5. Records every outcome and stops at the first failure.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use adapters::{
    builtin_adapters, CredentialBundle, CredentialLookup, ExecutionContext, FlowDecision,
    LoopFrame, NodeError, OperationId, OperationResult, Provider, ProviderAdapter,
};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, info, instrument, warn, Span};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::dag::{build_plan, ExecutionPlan};
use crate::interpolation::Interpolator;
use crate::models::{Graph, Node};
use crate::recorder::{
    ExecutionLogEntry, ExecutionRecorder, LogStatus, RunErrorKind, RunFailure, RunResult,
};
use crate::resolver::{declared_operation, resolve, resolve_node, ResolvedNode};

/// Workflow id used for contexts built by [`WorkflowExecutor::test_node`].
const NODE_TEST_WORKFLOW: &str = "node-test";

// ---------------------------------------------------------------------------
// Adapter registry
// ---------------------------------------------------------------------------

/// Maps each provider to the adapter that executes its operations.
pub type AdapterRegistry = HashMap<Provider, Arc<dyn ProviderAdapter>>;

// ---------------------------------------------------------------------------
// Single-node test entry point types
// ---------------------------------------------------------------------------

/// Mock run state for [`WorkflowExecutor::test_node`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeTestInput {
    pub trigger_input: Value,
    /// Outputs of (pretend) predecessors, reachable as `nodes.<id>.*`.
    pub node_outputs: Map<String, Value>,
    /// What `previous.*` resolves against.
    pub previous_output: Option<Value>,
    pub variables: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTestResult {
    pub node_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<OperationId>,
    /// The interpolated configuration handed to the adapter.
    pub input: Value,
    pub result: OperationResult,
}

// ---------------------------------------------------------------------------
// WorkflowExecutor
// ---------------------------------------------------------------------------

/// Stateless between runs: every call to [`WorkflowExecutor::run`] builds
/// its own context and recorder, so one executor can serve concurrent runs.
pub struct WorkflowExecutor {
    registry: AdapterRegistry,
    config: EngineConfig,
    interpolator: Interpolator,
}

impl WorkflowExecutor {
    pub fn new(
        adapters: impl IntoIterator<Item = Arc<dyn ProviderAdapter>>,
        config: EngineConfig,
    ) -> Self {
        let registry = adapters.into_iter().map(|a| (a.provider(), a)).collect();
        Self {
            registry,
            interpolator: Interpolator::new(config.preserve_placeholder_types),
            config,
        }
    }

    /// Executor wired to every built-in adapter, configured from
    /// `config.adapters`.
    pub fn with_builtin_adapters(config: EngineConfig) -> Result<Self, NodeError> {
        let adapters = builtin_adapters(&config.adapters)?;
        Ok(Self::new(adapters, config))
    }

    /// Add or replace the adapter for its provider.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.registry.insert(adapter.provider(), adapter);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute `graph` once.
    ///
    /// Never returns an error: configuration problems, node failures, the
    /// run deadline and panics inside adapters all end up in a failed
    /// [`RunResult`] that keeps every log entry recorded so far.
    #[instrument(skip_all, fields(workflow_id = %workflow_id, execution_id = tracing::field::Empty))]
    pub async fn run(
        &self,
        workflow_id: &str,
        graph: &Graph,
        trigger_input: Value,
        credentials: &dyn CredentialLookup,
    ) -> RunResult {
        let execution_id = Uuid::new_v4();
        Span::current().record("execution_id", tracing::field::display(execution_id));
        let deadline = Instant::now() + self.config.run_timeout();
        let mut recorder = ExecutionRecorder::new(workflow_id, execution_id);

        // ------------------------------------------------------------------
        // Validate the graph and derive the order.
        // ------------------------------------------------------------------
        let plan = match build_plan(graph) {
            Ok(plan) => plan,
            Err(err) => {
                error!(error = %err, "workflow rejected before execution");
                return recorder.finalize(Err(RunFailure::new(
                    RunErrorKind::Configuration,
                    err.to_string(),
                )));
            }
        };
        for node_id in &plan.unreachable {
            warn!(%node_id, "node is not reachable from the trigger and will not run");
        }
        info!(
            "graph validated, executing {} nodes in order: {:?}",
            plan.order.len(),
            plan.order
        );

        // ------------------------------------------------------------------
        // Build the run context with pre-resolved credentials.
        // ------------------------------------------------------------------
        let bundles = self.load_credentials(graph, &plan, credentials).await;
        let mut ctx = ExecutionContext::new(workflow_id, execution_id, trigger_input, bundles);

        // ------------------------------------------------------------------
        // Execute, catching panics at the run boundary.
        // ------------------------------------------------------------------
        let scheduler = Scheduler::new(self, graph, &plan, &mut ctx, &mut recorder, deadline);
        let caught = AssertUnwindSafe(scheduler.run()).catch_unwind().await;
        let outcome = match caught {
            Ok(outcome) => outcome,
            Err(panic) => {
                error!(panic = %panic_message(panic.as_ref()), "workflow execution panicked");
                recorder.abandon_in_flight(LogStatus::Error, Some("internal error".into()));
                Err(RunFailure::new(
                    RunErrorKind::Internal,
                    "internal error while executing workflow",
                ))
            }
        };

        match &outcome {
            Ok(_) => info!(
                entries = recorder.entries().len(),
                "workflow execution {} succeeded", execution_id
            ),
            Err(failure) => error!(
                kind = ?failure.kind,
                error = %failure.message,
                "workflow execution {} failed", execution_id
            ),
        }
        recorder.finalize(outcome)
    }

    /// Execute one node in isolation against mock predecessor state, using
    /// the same resolution, interpolation and credential rules as a run.
    #[instrument(skip_all, fields(node_id = %node.id))]
    pub async fn test_node(
        &self,
        node: &Node,
        input: NodeTestInput,
        credentials: &dyn CredentialLookup,
    ) -> NodeTestResult {
        let started_at = Utc::now();
        let raw = Value::Object(node.data.clone());
        let resolved = match resolve_node(node) {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!(error = %err, "node test rejected");
                return NodeTestResult {
                    node_id: node.id.clone(),
                    operation: None,
                    input: raw,
                    result: OperationResult::failed(started_at, err.to_string(), err.code()),
                };
            }
        };

        let mut bundles = HashMap::new();
        if resolved.provider.requires_credentials() {
            if let Some(bundle) = credentials.credential(resolved.provider).await {
                bundles.insert(resolved.provider, bundle);
            }
        }
        let trigger_input = match input.trigger_input {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        let mut ctx = ExecutionContext::new(NODE_TEST_WORKFLOW, Uuid::new_v4(), trigger_input, bundles);
        for (node_id, output) in input.node_outputs {
            ctx.record_output(&node_id, output);
        }
        ctx.set_previous_output(input.previous_output);
        for (key, value) in input.variables {
            ctx.set_variable(key, value);
        }

        let config = self.interpolator.interpolate(&raw, &ctx);
        let call = timeout(
            self.config.run_timeout(),
            self.dispatch(resolved, config.clone(), &ctx),
        );
        let result = match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => OperationResult::failed(started_at, "time budget exceeded", "deadline_exceeded"),
            Err(panic) => {
                error!(panic = %panic_message(panic.as_ref()), "node test panicked");
                OperationResult::failed(started_at, "internal error", "internal")
            }
        };

        NodeTestResult {
            node_id: node.id.clone(),
            operation: Some(resolved.operation),
            input: config,
            result,
        }
    }

    // -----------------------------------------------------------------------
    // Internal: credentials and dispatch
    // -----------------------------------------------------------------------

    /// Ask the host once for each distinct provider in the plan that needs
    /// credentials.
    async fn load_credentials(
        &self,
        graph: &Graph,
        plan: &ExecutionPlan,
        lookup: &dyn CredentialLookup,
    ) -> HashMap<Provider, CredentialBundle> {
        let mut providers: Vec<Provider> = Vec::new();
        for node in plan.order.iter().filter_map(|id| graph.node(id)) {
            if let Ok(resolved) = resolve(&node.node_type, declared_operation(node)) {
                if resolved.provider.requires_credentials() && !providers.contains(&resolved.provider) {
                    providers.push(resolved.provider);
                }
            }
        }

        let mut bundles = HashMap::new();
        for provider in providers {
            match lookup.credential(provider).await {
                Some(bundle) => {
                    if bundle.is_expired_at(Utc::now()) {
                        warn!(%provider, "credential bundle has already expired");
                    }
                    bundles.insert(provider, bundle);
                }
                None => warn!(%provider, "no credential bundle supplied"),
            }
        }
        bundles
    }

    /// Credential pre-flight, then the adapter call. Never panics on its
    /// own; adapter panics are caught by the callers.
    async fn dispatch(
        &self,
        resolved: ResolvedNode,
        config: Value,
        ctx: &ExecutionContext,
    ) -> OperationResult {
        let started_at = Utc::now();
        let credentials = match credential_for(resolved.provider, ctx) {
            Ok(credentials) => credentials,
            Err(err) => {
                warn!(provider = %resolved.provider, error = %err, "credential pre-flight failed");
                return OperationResult::from_outcome(started_at, Err(err));
            }
        };
        let Some(adapter) = self.registry.get(&resolved.provider) else {
            return OperationResult::failed(
                started_at,
                format!("no adapter registered for provider '{}'", resolved.provider),
                "no_adapter",
            );
        };
        adapter
            .execute(resolved.operation, config, credentials, ctx)
            .await
    }
}

/// The bundle for `provider`, or the deterministic failure when a provider
/// that needs one has none (or only an expired one).
fn credential_for(
    provider: Provider,
    ctx: &ExecutionContext,
) -> Result<Option<&CredentialBundle>, NodeError> {
    let bundle = ctx.credential(provider);
    if !provider.requires_credentials() {
        return Ok(bundle);
    }
    match bundle {
        None => Err(NodeError::MissingCredentials(provider)),
        Some(bundle) if bundle.is_expired_at(Utc::now()) => {
            Err(NodeError::CredentialExpired(provider))
        }
        Some(bundle) => Ok(Some(bundle)),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}

// ---------------------------------------------------------------------------
// Scheduler: the state of one run
// ---------------------------------------------------------------------------

/// Which outgoing edges of a succeeded node stay active.
#[derive(Debug, Clone, PartialEq)]
enum Branch {
    All,
    /// Only edges leaving from this handle (router decision).
    Handle(Option<String>),
    /// None (failed filter).
    Closed,
}

impl Branch {
    fn admits(&self, handle: Option<&str>) -> bool {
        match self {
            Self::All => true,
            Self::Handle(selected) => selected.is_some() && selected.as_deref() == handle,
            Self::Closed => false,
        }
    }
}

/// Node states that matter for scheduling; absent means not started.
#[derive(Debug, Clone, PartialEq)]
enum NodeState {
    Succeeded(Branch),
    Skipped,
}

struct Scheduler<'a> {
    executor: &'a WorkflowExecutor,
    plan: &'a ExecutionPlan,
    nodes: HashMap<&'a str, &'a Node>,
    ctx: &'a mut ExecutionContext,
    recorder: &'a mut ExecutionRecorder,
    states: HashMap<String, NodeState>,
    last_output: Option<Value>,
    deadline: Instant,
}

impl<'a> Scheduler<'a> {
    fn new(
        executor: &'a WorkflowExecutor,
        graph: &'a Graph,
        plan: &'a ExecutionPlan,
        ctx: &'a mut ExecutionContext,
        recorder: &'a mut ExecutionRecorder,
        deadline: Instant,
    ) -> Self {
        Self {
            executor,
            plan,
            nodes: graph.nodes.iter().map(|n| (n.id.as_str(), n)).collect(),
            ctx,
            recorder,
            states: HashMap::new(),
            last_output: None,
            deadline,
        }
    }

    /// Walk the order with a program counter; loops jump it backwards.
    /// Returns the output of the last executed node.
    async fn run(mut self) -> Result<Option<Value>, RunFailure> {
        let mut pc = 0;
        while pc < self.plan.order.len() {
            pc = self.step(pc).await?;
        }
        Ok(self.last_output)
    }

    async fn step(&mut self, pc: usize) -> Result<usize, RunFailure> {
        let plan = self.plan;
        let node_id = plan.order[pc].as_str();
        let node = *self.nodes.get(node_id).ok_or_else(|| {
            RunFailure::new(
                RunErrorKind::Internal,
                format!("planned node '{node_id}' is missing from the graph"),
            )
        })?;

        if Instant::now() >= self.deadline {
            return Err(deadline_exceeded(node_id));
        }

        let closes_open_loop = self.closes_open_loop(node_id);
        if !self.is_eligible(node_id) {
            self.states.insert(node_id.to_owned(), NodeState::Skipped);
            if closes_open_loop {
                debug!(%node_id, "loop end not reached this iteration");
                return self.finish_iteration(pc, node, Value::Null, None, Utc::now());
            }
            info!(%node_id, "skipping node: no active incoming edge");
            self.recorder
                .append(ExecutionLogEntry::skipped(&node.id, &node.node_type));
            return Ok(pc + 1);
        }

        // ------------------------------------------------------------------
        // Resolve, interpolate, dispatch.
        // ------------------------------------------------------------------
        let resolved = match resolve_node(node) {
            Ok(resolved) => resolved,
            Err(err) => {
                error!(%node_id, error = %err, "node could not be resolved");
                self.recorder.append(ExecutionLogEntry::error(
                    &node.id,
                    &node.node_type,
                    Some(Value::Object(node.data.clone())),
                    err.to_string(),
                ));
                return Err(RunFailure::new(
                    RunErrorKind::Configuration,
                    format!("node '{node_id}': {err}"),
                ));
            }
        };

        let config = self
            .executor
            .interpolator
            .interpolate(&Value::Object(node.data.clone()), self.ctx);
        debug!(%node_id, operation = %resolved.operation, "dispatching node");
        self.recorder.begin(&node.id, &node.node_type, config.clone());

        let call = self.executor.dispatch(resolved, config.clone(), self.ctx);
        let result = match timeout_at(self.deadline, call).await {
            Ok(result) => result,
            Err(_) => {
                self.recorder
                    .abandon_in_flight(LogStatus::Running, Some("run deadline exceeded".into()));
                return Err(deadline_exceeded(node_id));
            }
        };
        let finished_at = result.metadata.finished_at.unwrap_or_else(Utc::now);

        if !result.success {
            let message = result.error_message().unwrap_or("node failed").to_owned();
            return Err(self.fail_node(node, config, message, finished_at));
        }

        // ------------------------------------------------------------------
        // Apply the flow decision, if any.
        // ------------------------------------------------------------------
        let output = result.output.unwrap_or(Value::Null);
        match result.metadata.decision {
            Some(FlowDecision::Iterate { items }) => {
                self.start_loop(pc, node, config, output, items, finished_at)
            }
            Some(FlowDecision::EndIterate { collected }) if closes_open_loop => {
                self.finish_iteration(pc, node, config, Some(collected), finished_at)
            }
            decision => {
                let branch = match decision {
                    Some(FlowDecision::Route { handle }) => {
                        debug!(%node_id, ?handle, "route selected");
                        Branch::Handle(handle)
                    }
                    Some(FlowDecision::Filter { passed: false }) => {
                        debug!(%node_id, "filter closed downstream edges");
                        Branch::Closed
                    }
                    Some(FlowDecision::SetVariables { variables }) => {
                        for (key, value) in variables {
                            self.ctx.set_variable(key, value);
                        }
                        Branch::All
                    }
                    _ => Branch::All,
                };
                self.complete(node, config, output, branch, finished_at);
                Ok(pc + 1)
            }
        }
    }

    /// Trigger always runs; every other node needs at least one active
    /// incoming edge from a succeeded node.
    fn is_eligible(&self, node_id: &str) -> bool {
        if node_id == self.plan.trigger {
            return true;
        }
        self.plan.incoming(node_id).iter().any(|edge| {
            match self.states.get(&edge.source) {
                Some(NodeState::Succeeded(branch)) => branch.admits(edge.source_handle.as_deref()),
                _ => false,
            }
        })
    }

    /// Whether `node_id` is the `flow.endIterate` of the innermost open loop.
    fn closes_open_loop(&self, node_id: &str) -> bool {
        match (self.plan.loop_starts.get(node_id), self.ctx.loop_frame()) {
            (Some(start), Some(frame)) => frame.node_id == *start,
            _ => false,
        }
    }

    fn complete(
        &mut self,
        node: &Node,
        config: Value,
        output: Value,
        branch: Branch,
        finished_at: DateTime<Utc>,
    ) {
        info!(node_id = %node.id, "node succeeded");
        self.ctx.record_output(&node.id, output.clone());
        self.recorder.append(
            ExecutionLogEntry::success(&node.id, &node.node_type, config, output.clone())
                .at(finished_at),
        );
        self.states
            .insert(node.id.clone(), NodeState::Succeeded(branch));
        self.last_output = Some(output);
    }

    fn fail_node(
        &mut self,
        node: &Node,
        config: Value,
        message: String,
        finished_at: DateTime<Utc>,
    ) -> RunFailure {
        error!(node_id = %node.id, error = %message, "node failed");
        self.recorder.append(
            ExecutionLogEntry::error(&node.id, &node.node_type, Some(config), message.clone())
                .at(finished_at),
        );
        RunFailure::new(
            RunErrorKind::Node,
            format!("node '{}' failed: {message}", node.id),
        )
    }

    // -----------------------------------------------------------------------
    // Loops
    // -----------------------------------------------------------------------

    /// `flow.iterate` succeeded: open a frame and enter the body with the
    /// first item, or jump straight past the loop when there are none.
    /// The plan keeps the body contiguous between `pc` and its end node.
    fn start_loop(
        &mut self,
        pc: usize,
        node: &Node,
        config: Value,
        output: Value,
        items: Vec<Value>,
        finished_at: DateTime<Utc>,
    ) -> Result<usize, RunFailure> {
        let limit = self.executor.config.max_loop_iterations;
        if items.len() > limit {
            let message = format!(
                "loop over {} items exceeds the limit of {limit} iterations",
                items.len()
            );
            return Err(self.fail_node(node, config, message, finished_at));
        }
        let plan = self.plan;
        let end = plan
            .loop_ends
            .get(&node.id)
            .and_then(|end_id| Some((end_id, plan.position(end_id)?)));
        let Some((end_id, end_pc)) = end else {
            return Err(RunFailure::new(
                RunErrorKind::Internal,
                format!("loop '{}' has no matching end", node.id),
            ));
        };

        self.complete(node, config, output, Branch::All, finished_at);

        let Some(first) = items.first().cloned() else {
            debug!(node_id = %node.id, "empty loop, skipping body");
            for body_id in &plan.order[pc + 1..end_pc] {
                if let Some(body) = self.nodes.get(body_id.as_str()).copied() {
                    self.recorder
                        .append(ExecutionLogEntry::skipped(&body.id, &body.node_type));
                }
                self.states.insert(body_id.clone(), NodeState::Skipped);
            }
            if let Some(end) = self.nodes.get(end_id.as_str()).copied() {
                self.complete(end, Value::Null, Value::Array(Vec::new()), Branch::All, Utc::now());
            }
            return Ok(end_pc + 1);
        };

        debug!(node_id = %node.id, items = items.len(), "entering loop");
        self.ctx.push_loop(LoopFrame::new(node.id.clone(), items));
        self.ctx.record_output(&node.id, first);
        Ok(pc + 1)
    }

    /// One pass of the innermost loop reached (or skipped) its end node.
    /// Either rewind to the first body node with the next item, or close
    /// the loop and emit the collected values.
    fn finish_iteration(
        &mut self,
        pc: usize,
        node: &Node,
        config: Value,
        collected: Option<Value>,
        finished_at: DateTime<Utc>,
    ) -> Result<usize, RunFailure> {
        let plan = self.plan;
        let start = plan
            .loop_starts
            .get(&node.id)
            .and_then(|start_id| Some((start_id, plan.position(start_id)?)));
        let (Some((start_id, start_pc)), Some(frame)) = (start, self.ctx.loop_frame_mut()) else {
            return Err(RunFailure::new(
                RunErrorKind::Internal,
                format!("loop end '{}' reached without an open loop", node.id),
            ));
        };

        if let Some(value) = collected {
            frame.aggregated.push(value);
        }
        frame.cursor += 1;

        if let Some(item) = frame.current_item().cloned() {
            debug!(loop_id = %start_id, index = frame.cursor, "next iteration");
            for body_id in &plan.order[start_pc + 1..=pc] {
                self.states.remove(body_id);
            }
            self.ctx.record_output(start_id, item);
            return Ok(start_pc + 1);
        }

        let aggregated = self
            .ctx
            .pop_loop()
            .map(|frame| frame.aggregated)
            .unwrap_or_default();
        debug!(loop_id = %start_id, collected = aggregated.len(), "loop finished");
        self.complete(node, config, Value::Array(aggregated), Branch::All, finished_at);
        Ok(pc + 1)
    }
}

fn deadline_exceeded(node_id: &str) -> RunFailure {
    RunFailure::new(
        RunErrorKind::DeadlineExceeded,
        format!("run exceeded its time budget at node '{node_id}'"),
    )
}
