//! Execution order derivation. Run this before executing a graph.
//!
//! Rules enforced:
//! 1. Node IDs must be unique within the graph.
//! 2. Every edge must reference declared node IDs (both `source` and `target`).
//! 3. Exactly one trigger node.
//! 4. The subgraph reachable from the trigger must be acyclic.
//! 5. `flow.iterate` / `flow.endIterate` must nest like brackets; each
//!    loop body is placed contiguously between its two bracket nodes.
//!
//! `drop` nodes are traversed but left out of the order; edges through them
//! are collapsed so their successors see the drop node's own predecessors.

use std::collections::{HashMap, HashSet, VecDeque};

use adapters::OperationId;

use crate::models::{Graph, Node};
use crate::resolver::{declared_operation, resolve};
use crate::PlanError;

/// An incoming dependency of an executable node after `drop` collapsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEdge {
    pub source: String,
    /// Handle on `source` the edge leaves from (router branch name).
    pub source_handle: Option<String>,
}

/// Validated execution order plus the bookkeeping the scheduler needs.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub trigger: String,
    /// Executable node IDs in topological order (`drop` nodes excluded).
    /// Everything strictly between a loop's iterate and end node is its
    /// body, and nothing else is.
    pub order: Vec<String>,
    /// Effective incoming edges of each node in `order`.
    pub incoming: HashMap<String, Vec<PlanEdge>>,
    /// `flow.iterate` id → matching `flow.endIterate` id.
    pub loop_ends: HashMap<String, String>,
    /// `flow.endIterate` id → matching `flow.iterate` id.
    pub loop_starts: HashMap<String, String>,
    /// Declared nodes not reachable from the trigger; never executed.
    pub unreachable: Vec<String>,
    positions: HashMap<String, usize>,
}

impl ExecutionPlan {
    /// Position of `node_id` within `order`.
    pub fn position(&self, node_id: &str) -> Option<usize> {
        self.positions.get(node_id).copied()
    }

    pub fn incoming(&self, node_id: &str) -> &[PlanEdge] {
        self.incoming.get(node_id).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Validate `graph` and derive its execution plan.
///
/// # Errors
/// - [`PlanError::DuplicateNodeId`] if two nodes share an ID.
/// - [`PlanError::UnknownNodeReference`] if an edge references a missing node.
/// - [`PlanError::NoTrigger`] / [`PlanError::MultipleTriggers`].
/// - [`PlanError::CycleDetected`] if the reachable graph is not acyclic.
/// - [`PlanError::UnbalancedLoop`] for unpaired iterate/endIterate nodes.
pub fn build_plan(graph: &Graph) -> Result<ExecutionPlan, PlanError> {
    // -----------------------------------------------------------------------
    // 1. Ensure node IDs are unique
    // -----------------------------------------------------------------------
    let mut nodes: HashMap<&str, &Node> = HashMap::new();
    for node in &graph.nodes {
        if nodes.insert(node.id.as_str(), node).is_some() {
            return Err(PlanError::DuplicateNodeId(node.id.clone()));
        }
    }

    // -----------------------------------------------------------------------
    // 2. Validate edge endpoints
    // -----------------------------------------------------------------------
    for edge in &graph.edges {
        if !nodes.contains_key(edge.source.as_str()) {
            return Err(PlanError::UnknownNodeReference {
                node_id: edge.source.clone(),
                side: "source",
            });
        }
        if !nodes.contains_key(edge.target.as_str()) {
            return Err(PlanError::UnknownNodeReference {
                node_id: edge.target.clone(),
                side: "target",
            });
        }
    }

    // -----------------------------------------------------------------------
    // 3. Locate the unique trigger
    // -----------------------------------------------------------------------
    let triggers: Vec<&Node> = graph.nodes.iter().filter(|n| n.is_trigger()).collect();
    let trigger = match triggers.as_slice() {
        [] => return Err(PlanError::NoTrigger),
        [only] => only.id.as_str(),
        many => {
            return Err(PlanError::MultipleTriggers(
                many.iter().map(|n| n.id.clone()).collect(),
            ))
        }
    };

    // Outgoing edges per node, in declaration order.
    let mut outgoing: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &graph.edges {
        outgoing
            .entry(edge.source.as_str())
            .or_default()
            .push(edge.target.as_str());
    }

    // -----------------------------------------------------------------------
    // 4. Reachability from the trigger
    // -----------------------------------------------------------------------
    let mut reachable: HashSet<&str> = HashSet::from([trigger]);
    let mut frontier: VecDeque<&str> = VecDeque::from([trigger]);
    while let Some(id) = frontier.pop_front() {
        for &next in outgoing.get(id).into_iter().flatten() {
            if reachable.insert(next) {
                frontier.push_back(next);
            }
        }
    }
    let unreachable: Vec<String> = graph
        .nodes
        .iter()
        .filter(|n| !reachable.contains(n.id.as_str()))
        .map(|n| n.id.clone())
        .collect();

    // -----------------------------------------------------------------------
    // 5. Cycle check: plain Kahn's algorithm over the reachable subgraph
    // -----------------------------------------------------------------------
    topo_sort(trigger, &reachable, graph, &outgoing, &HashMap::new())?;

    // -----------------------------------------------------------------------
    // 6. Pair loop brackets and collect each loop's body
    // -----------------------------------------------------------------------
    let loops = pair_loops(graph, &nodes, &reachable, &outgoing)?;

    // -----------------------------------------------------------------------
    // 7. Final order: bodies are drained contiguously between their brackets
    // -----------------------------------------------------------------------
    let sorted = topo_sort(trigger, &reachable, graph, &outgoing, &loops)?;

    // -----------------------------------------------------------------------
    // 8. Collapse drop nodes into effective incoming edges
    // -----------------------------------------------------------------------
    let mut incoming_edges: HashMap<&str, Vec<PlanEdge>> = HashMap::new();
    for edge in &graph.edges {
        if reachable.contains(edge.source.as_str()) {
            incoming_edges
                .entry(edge.target.as_str())
                .or_default()
                .push(PlanEdge {
                    source: edge.source.clone(),
                    source_handle: edge.source_handle.clone(),
                });
        }
    }

    let mut drop_inputs: HashMap<&str, Vec<PlanEdge>> = HashMap::new();
    let mut incoming: HashMap<String, Vec<PlanEdge>> = HashMap::new();
    let mut order: Vec<String> = Vec::with_capacity(sorted.len());
    for &id in &sorted {
        let mut effective = Vec::new();
        for edge in incoming_edges.remove(id).unwrap_or_default() {
            match drop_inputs.get(edge.source.as_str()) {
                Some(upstream) => effective.extend(upstream.iter().cloned()),
                None => effective.push(edge),
            }
        }
        if nodes[id].is_drop() {
            drop_inputs.insert(id, effective);
        } else {
            incoming.insert(id.to_owned(), effective);
            order.push(id.to_owned());
        }
    }

    let mut loop_ends = HashMap::new();
    let mut loop_starts = HashMap::new();
    for (&start, span) in &loops {
        loop_ends.insert(start.to_owned(), span.end.to_owned());
        loop_starts.insert(span.end.to_owned(), start.to_owned());
    }

    let positions = order
        .iter()
        .enumerate()
        .map(|(i, id)| (id.clone(), i))
        .collect();

    Ok(ExecutionPlan {
        trigger: trigger.to_owned(),
        order,
        incoming,
        loop_ends,
        loop_starts,
        unreachable,
        positions,
    })
}

// ---------------------------------------------------------------------------
// Loop structure
// ---------------------------------------------------------------------------

/// A `flow.iterate` node's matching end and the nodes that run once per item.
#[derive(Debug)]
struct LoopSpan<'g> {
    end: &'g str,
    /// Nodes reachable from the iterate node that can reach `end`.
    body: HashSet<&'g str>,
    /// Predecessors of the body (or of `end`) that lie outside the loop.
    /// They must be ordered before the iterate node.
    inputs: HashSet<&'g str>,
}

impl LoopSpan<'_> {
    fn contains(&self, id: &str) -> bool {
        id == self.end || self.body.contains(id)
    }
}

fn loop_role(node: &Node) -> Option<OperationId> {
    match resolve(&node.node_type, declared_operation(node)).map(|r| r.operation) {
        Ok(op @ (OperationId::FlowIterate | OperationId::FlowEndIterate)) => Some(op),
        _ => None,
    }
}

/// Match every reachable `flow.iterate` with the `flow.endIterate` that
/// closes it. Walking forward from an iterate node, nested iterates open a
/// level and end nodes close one; the first end met at level zero is the
/// match. All paths must agree on it.
fn pair_loops<'g>(
    graph: &'g Graph,
    nodes: &HashMap<&'g str, &'g Node>,
    reachable: &HashSet<&'g str>,
    outgoing: &HashMap<&'g str, Vec<&'g str>>,
) -> Result<HashMap<&'g str, LoopSpan<'g>>, PlanError> {
    let roles: HashMap<&str, OperationId> = reachable
        .iter()
        .filter_map(|&id| Some((id, loop_role(nodes[id])?)))
        .collect();

    let mut predecessors: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &graph.edges {
        if reachable.contains(edge.source.as_str()) {
            predecessors
                .entry(edge.target.as_str())
                .or_default()
                .push(edge.source.as_str());
        }
    }

    let mut loops: HashMap<&str, LoopSpan<'g>> = HashMap::new();
    let mut closed_by: HashMap<&str, &str> = HashMap::new();
    let starts = graph
        .nodes
        .iter()
        .map(|n| n.id.as_str())
        .filter(|id| roles.get(id) == Some(&OperationId::FlowIterate));

    for start in starts {
        let mut ends: Vec<&str> = Vec::new();
        let mut seen: HashSet<(&str, usize)> = HashSet::new();
        let mut stack: Vec<(&str, usize)> = outgoing
            .get(start)
            .into_iter()
            .flatten()
            .map(|&next| (next, 0))
            .collect();
        while let Some((id, depth)) = stack.pop() {
            if !seen.insert((id, depth)) {
                continue;
            }
            let depth = match (roles.get(id), depth) {
                (Some(OperationId::FlowEndIterate), 0) => {
                    if !ends.contains(&id) {
                        ends.push(id);
                    }
                    continue;
                }
                (Some(OperationId::FlowEndIterate), d) => d - 1,
                (Some(OperationId::FlowIterate), d) => d + 1,
                (_, d) => d,
            };
            for &next in outgoing.get(id).into_iter().flatten() {
                stack.push((next, depth));
            }
        }

        let end = match ends.as_slice() {
            [] => {
                return Err(PlanError::UnbalancedLoop {
                    node_id: start.to_owned(),
                    reason: "flow.iterate is never closed by a flow.endIterate",
                })
            }
            [end] => *end,
            _ => {
                return Err(PlanError::UnbalancedLoop {
                    node_id: start.to_owned(),
                    reason: "flow.iterate reaches more than one flow.endIterate",
                })
            }
        };
        if closed_by.insert(end, start).is_some() {
            return Err(PlanError::UnbalancedLoop {
                node_id: end.to_owned(),
                reason: "flow.endIterate closes more than one flow.iterate",
            });
        }

        let after_start = walk(start, outgoing);
        let before_end = walk(end, &predecessors);
        let body: HashSet<&str> = after_start.intersection(&before_end).copied().collect();
        let inputs = body
            .iter()
            .chain(std::iter::once(&end))
            .flat_map(|id| predecessors.get(id).into_iter().flatten().copied())
            .filter(|pred| *pred != start && !body.contains(pred))
            .collect();
        loops.insert(start, LoopSpan { end, body, inputs });
    }

    let unmatched = graph.nodes.iter().map(|n| n.id.as_str()).find(|id| {
        roles.get(id) == Some(&OperationId::FlowEndIterate) && !closed_by.contains_key(id)
    });
    if let Some(end) = unmatched {
        return Err(PlanError::UnbalancedLoop {
            node_id: end.to_owned(),
            reason: "no open flow.iterate before it",
        });
    }
    Ok(loops)
}

/// Every node reachable from `from` along `adjacency`, excluding `from`.
fn walk<'g>(from: &'g str, adjacency: &HashMap<&'g str, Vec<&'g str>>) -> HashSet<&'g str> {
    let mut seen = HashSet::new();
    let mut stack = vec![from];
    while let Some(id) = stack.pop() {
        for &next in adjacency.get(id).into_iter().flatten() {
            if seen.insert(next) {
                stack.push(next);
            }
        }
    }
    seen.remove(from);
    seen
}

/// Kahn's algorithm seeded with the trigger; successors are enqueued in
/// edge declaration order. While a loop is open only its body and its end
/// may be taken, and an iterate node waits until every outside input of
/// its loop has been placed.
fn topo_sort<'g>(
    trigger: &'g str,
    reachable: &HashSet<&'g str>,
    graph: &'g Graph,
    outgoing: &HashMap<&'g str, Vec<&'g str>>,
    loops: &HashMap<&'g str, LoopSpan<'g>>,
) -> Result<Vec<&'g str>, PlanError> {
    let mut in_degree: HashMap<&str, usize> = reachable.iter().map(|&id| (id, 0)).collect();
    for edge in &graph.edges {
        if reachable.contains(edge.source.as_str()) {
            *in_degree.entry(edge.target.as_str()).or_insert(0) += 1;
        }
    }

    // Only the trigger can start with no reachable predecessor.
    let mut ready: VecDeque<&str> = VecDeque::new();
    if in_degree.get(trigger) == Some(&0) {
        ready.push_back(trigger);
    }

    let mut sorted: Vec<&str> = Vec::with_capacity(reachable.len());
    let mut placed: HashSet<&str> = HashSet::new();
    let mut open: Vec<(&str, &LoopSpan<'g>)> = Vec::new();
    while !ready.is_empty() {
        let eligible = |id: &str| {
            let in_scope = open.last().map_or(true, |(_, span)| span.contains(id));
            let inputs_placed = loops
                .get(id)
                .map_or(true, |span| span.inputs.iter().all(|i| placed.contains(i)));
            in_scope && inputs_placed
        };
        let Some(pick) = ready.iter().position(|id| eligible(*id)) else {
            let node_id = open.last().map_or(ready[0], |(start, _)| *start);
            return Err(PlanError::UnbalancedLoop {
                node_id: node_id.to_owned(),
                reason: "loop body depends on a node that cannot run before the loop",
            });
        };
        let Some(id) = ready.remove(pick) else {
            break;
        };

        if open.last().is_some_and(|(_, span)| span.end == id) {
            open.pop();
        }
        if let Some(span) = loops.get(id) {
            open.push((id, span));
        }
        sorted.push(id);
        placed.insert(id);

        for &next in outgoing.get(id).into_iter().flatten() {
            if let Some(deg) = in_degree.get_mut(next) {
                *deg -= 1;
                if *deg == 0 {
                    ready.push_back(next);
                }
            }
        }
    }

    if sorted.len() != reachable.len() {
        let stuck = graph
            .nodes
            .iter()
            .filter(|n| reachable.contains(n.id.as_str()) && !placed.contains(n.id.as_str()))
            .map(|n| n.id.clone())
            .collect();
        return Err(PlanError::CycleDetected(stuck));
    }
    Ok(sorted)
}
