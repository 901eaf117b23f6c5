//! Scheduler scenarios for `WorkflowExecutor`.
//!
//! Pure adapters (trigger, transform, flow) run for real; providers that
//! would call out over the network are replaced by `MockAdapter`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use adapters::flow::FlowAdapter;
use adapters::mock::{MockAdapter, MockBehaviour};
use adapters::transform::TransformAdapter;
use adapters::webhook::TriggerAdapter;
use adapters::{CredentialBundle, OperationId, Provider, ProviderAdapter};
use chrono::Utc;
use serde_json::{json, Value};

use crate::{
    Edge, EngineConfig, Graph, LogStatus, Node, NodeTestInput, RunErrorKind, RunResult,
    WorkflowExecutor,
};

type Creds = HashMap<String, CredentialBundle>;

fn no_creds() -> Creds {
    HashMap::new()
}

fn executor_with(extra: Vec<Arc<dyn ProviderAdapter>>) -> WorkflowExecutor {
    executor_with_config(extra, EngineConfig::default())
}

fn executor_with_config(extra: Vec<Arc<dyn ProviderAdapter>>, config: EngineConfig) -> WorkflowExecutor {
    let mut adapters: Vec<Arc<dyn ProviderAdapter>> = vec![
        Arc::new(TriggerAdapter),
        Arc::new(TransformAdapter),
        Arc::new(FlowAdapter),
    ];
    adapters.extend(extra);
    WorkflowExecutor::new(adapters, config)
}

fn trigger() -> Node {
    Node::new("t", "trigger")
}

fn template(id: &str, text: &str) -> Node {
    Node::new(id, "transform")
        .with_operation("template")
        .with_data(json!({ "template": text }))
}

fn http(id: &str) -> Node {
    Node::new(id, "httpRequest").with_data(json!({ "url": format!("https://example.com/{id}") }))
}

fn flow(id: &str, mode: &str, data: Value) -> Node {
    let mut node = Node::new(id, "flow").with_data(data);
    node.data.insert("mode".into(), json!(mode));
    node
}

/// ids[0] → ids[1] → … in node order.
fn linear(nodes: Vec<Node>) -> Graph {
    let edges = nodes
        .windows(2)
        .map(|w| Edge::new(w[0].id.clone(), w[1].id.clone()))
        .collect();
    Graph::new(nodes, edges)
}

fn log_ids(result: &RunResult) -> Vec<&str> {
    result.execution_log.iter().map(|e| e.node_id.as_str()).collect()
}

fn log_statuses(result: &RunResult) -> Vec<LogStatus> {
    result.execution_log.iter().map(|e| e.status).collect()
}

// ============================================================
// Linear runs and failure short-circuiting
// ============================================================

#[tokio::test]
async fn three_node_linear_run_succeeds() {
    let graph = linear(vec![
        trigger(),
        template("greet", "{{trigger.name}}!"),
        template("wrap", "<{{previous.text}}>"),
    ]);
    let result = executor_with(vec![])
        .run("wf", &graph, json!({ "name": "Ada" }), &no_creds())
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.execution_log.len(), 3);
    assert_eq!(log_statuses(&result), vec![LogStatus::Success; 3]);
    assert_eq!(result.output, Some(json!({ "text": "<Ada!>" })));
    assert_eq!(result.output.as_ref(), result.execution_log[2].output.as_ref());
}

#[tokio::test]
async fn failing_node_stops_the_run() {
    let failing = Arc::new(MockAdapter::failing(Provider::Http, "upstream said no"));
    let graph = linear(vec![trigger(), http("a"), template("b", "never")]);

    let result = executor_with(vec![failing.clone() as Arc<dyn ProviderAdapter>])
        .run("wf", &graph, json!({}), &no_creds())
        .await;

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(RunErrorKind::Node));
    assert_eq!(log_ids(&result), vec!["t", "a"]);
    assert_eq!(result.execution_log[1].status, LogStatus::Error);
    assert_eq!(result.execution_log[1].error.as_deref(), Some("upstream said no"));
    assert!(result.output.is_none());
    assert_eq!(failing.call_count(), 1);
}

#[tokio::test]
async fn unknown_node_type_is_logged_and_aborts() {
    let graph = linear(vec![trigger(), Node::new("x", "bogus"), template("b", "never")]);
    let result = executor_with(vec![]).run("wf", &graph, json!({}), &no_creds()).await;

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(RunErrorKind::Configuration));
    assert_eq!(log_ids(&result), vec!["t", "x"]);
    assert_eq!(result.execution_log[1].status, LogStatus::Error);
    assert!(result.execution_log[1].error.as_deref().unwrap().contains("bogus"));
}

#[tokio::test]
async fn missing_required_field_is_a_configuration_error() {
    let graph = linear(vec![trigger(), Node::new("h", "httpRequest")]);
    let result = executor_with(vec![]).run("wf", &graph, json!({}), &no_creds()).await;

    assert_eq!(result.error_kind, Some(RunErrorKind::Configuration));
    assert!(result.error.unwrap().contains("'url'"));
}

#[tokio::test]
async fn trigger_count_other_than_one_runs_nothing() {
    let echo = Arc::new(MockAdapter::echoing(Provider::Http));
    let executor = executor_with(vec![echo.clone() as Arc<dyn ProviderAdapter>]);

    let none = executor
        .run("wf", &linear(vec![http("a"), http("b")]), json!({}), &no_creds())
        .await;
    let two = executor
        .run(
            "wf",
            &linear(vec![trigger(), Node::new("t2", "webhook"), http("a")]),
            json!({}),
            &no_creds(),
        )
        .await;

    for result in [none, two] {
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(RunErrorKind::Configuration));
        assert!(result.execution_log.is_empty());
    }
    assert_eq!(echo.call_count(), 0);
}

#[tokio::test]
async fn cyclic_graph_is_rejected_before_execution() {
    let mut graph = linear(vec![trigger(), template("a", "x"), template("b", "y")]);
    graph.edges.push(Edge::new("b", "a"));
    let result = executor_with(vec![]).run("wf", &graph, json!({}), &no_creds()).await;

    assert_eq!(result.error_kind, Some(RunErrorKind::Configuration));
    assert!(result.error.unwrap().contains("cycle"));
    assert!(result.execution_log.is_empty());
}

// ============================================================
// Ordering and interpolation
// ============================================================

#[tokio::test]
async fn diamond_runs_each_node_once_after_its_predecessors() {
    //   t
    //  / \
    // a   b
    //  \ /
    //   d
    let graph = Graph::new(
        vec![trigger(), template("a", "A"), template("b", "B"), template("d", "{{nodes.a.text}}{{nodes.b.text}}")],
        vec![Edge::new("t", "a"), Edge::new("t", "b"), Edge::new("a", "d"), Edge::new("b", "d")],
    );
    let result = executor_with(vec![]).run("wf", &graph, json!({}), &no_creds()).await;

    assert_eq!(log_ids(&result), vec!["t", "a", "b", "d"]);
    assert_eq!(result.output, Some(json!({ "text": "AB" })));
}

#[tokio::test]
async fn adapter_receives_interpolated_config() {
    let echo = Arc::new(MockAdapter::echoing(Provider::Http));
    let node = Node::new("call", "httpRequest").with_data(json!({
        "url": "{{trigger.base}}/orders/{{trigger.order.id}}",
        "body": "{{previous.output}}",
        "retries": 2
    }));
    let graph = linear(vec![trigger(), node]);

    let result = executor_with(vec![echo.clone() as Arc<dyn ProviderAdapter>])
        .run("wf", &graph, json!({ "base": "https://api.test", "order": { "id": 7 } }), &no_creds())
        .await;

    assert!(result.success, "{:?}", result.error);
    let call = &echo.calls()[0];
    assert_eq!(call.operation, OperationId::HttpRequest);
    assert_eq!(call.config["url"], "https://api.test/orders/7");
    assert_eq!(
        call.config["body"],
        r#"{"base":"https://api.test","order":{"id":7}}"#
    );
    assert_eq!(call.config["retries"], 2);
    assert_eq!(result.execution_log[1].input.as_ref().unwrap()["url"], "https://api.test/orders/7");
}

#[tokio::test]
async fn exact_placeholders_keep_types_when_configured() {
    let echo = Arc::new(MockAdapter::echoing(Provider::Http));
    let config = EngineConfig {
        preserve_placeholder_types: true,
        ..EngineConfig::default()
    };
    let mut node = http("call");
    node.data.insert("limit".into(), json!("{{trigger.count}}"));
    let graph = linear(vec![trigger(), node]);

    executor_with_config(vec![echo.clone() as Arc<dyn ProviderAdapter>], config)
        .run("wf", &graph, json!({ "count": 5 }), &no_creds())
        .await;

    assert_eq!(echo.calls()[0].config["limit"], json!(5));
}

#[tokio::test]
async fn drop_nodes_pass_through_and_unreachable_nodes_never_run() {
    let echo = Arc::new(MockAdapter::echoing(Provider::Http));
    let graph = Graph::new(
        vec![trigger(), Node::new("gap", "drop"), template("after", "ok"), http("island")],
        vec![Edge::new("t", "gap"), Edge::new("gap", "after")],
    );
    let result = executor_with(vec![echo.clone() as Arc<dyn ProviderAdapter>])
        .run("wf", &graph, json!({}), &no_creds())
        .await;

    assert!(result.success);
    assert_eq!(log_ids(&result), vec!["t", "after"]);
    assert_eq!(echo.call_count(), 0);
}

#[tokio::test]
async fn identical_runs_produce_identical_logs() {
    let graph = linear(vec![
        trigger(),
        Node::new("parse", "transform")
            .with_operation("jsonParse")
            .with_data(json!({ "input": "{{trigger.payload}}" })),
        Node::new("pick", "transform")
            .with_operation("map")
            .with_data(json!({ "items": "{{previous.rows}}", "field": "name" })),
    ]);
    let input = json!({ "payload": r#"{"rows":[{"name":"a"},{"name":"b"}]}"# });
    let executor = executor_with(vec![]);

    let first = executor.run("wf", &graph, input.clone(), &no_creds()).await;
    let second = executor.run("wf", &graph, input, &no_creds()).await;

    let outputs = |r: &RunResult| -> Vec<String> {
        r.execution_log
            .iter()
            .map(|e| serde_json::to_string(&e.output).unwrap())
            .collect()
    };
    assert!(first.success, "{:?}", first.error);
    assert_eq!(outputs(&first), outputs(&second));
    assert_eq!(first.output, Some(json!(["a", "b"])));
}

// ============================================================
// Branching
// ============================================================

#[tokio::test]
async fn router_prunes_unselected_branches() {
    let router = flow(
        "route",
        "router",
        json!({
            "routes": [
                { "handle": "a", "field": "kind", "operator": "equals", "value": "a" },
                { "handle": "b", "field": "kind", "operator": "equals", "value": "b" }
            ]
        }),
    );
    let graph = Graph::new(
        vec![trigger(), router, template("on_a", "took a"), template("on_b", "took b")],
        vec![
            Edge::new("t", "route"),
            Edge::new("route", "on_a").with_handle("a"),
            Edge::new("route", "on_b").with_handle("b"),
        ],
    );
    let result = executor_with(vec![]).run("wf", &graph, json!({ "kind": "a" }), &no_creds()).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(log_ids(&result), vec!["t", "route", "on_a", "on_b"]);
    assert_eq!(
        log_statuses(&result),
        vec![LogStatus::Success, LogStatus::Success, LogStatus::Success, LogStatus::Skipped]
    );
    assert_eq!(result.output, Some(json!({ "text": "took a" })));
}

#[tokio::test]
async fn failed_filter_skips_everything_downstream() {
    let gmail = Arc::new(MockAdapter::returning(Provider::Google, json!({ "id": "m1" })));
    let graph = linear(vec![
        trigger(),
        flow(
            "big_orders",
            "filter",
            json!({ "conditions": [{ "field": "amount", "operator": "gte", "value": 100 }] }),
        ),
        Node::new("notify", "gmail").with_data(json!({ "to": "ops@x.io", "subject": "big", "body": "{{trigger.amount}}" })),
    ]);

    let result = executor_with(vec![gmail.clone() as Arc<dyn ProviderAdapter>])
        .run("wf", &graph, json!({ "amount": "5" }), &no_creds())
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.execution_log[2].status, LogStatus::Skipped);
    assert_eq!(gmail.call_count(), 0);
    assert_eq!(result.output, Some(json!({ "amount": "5" })));
}

#[tokio::test]
async fn set_variable_feeds_later_placeholders() {
    let graph = linear(vec![
        trigger(),
        flow("remember", "setVariable", json!({ "variables": { "greeting": "hi {{trigger.name}}" } })),
        template("use", "{{vars.greeting}}!"),
    ]);
    let result = executor_with(vec![]).run("wf", &graph, json!({ "name": "Ada" }), &no_creds()).await;

    assert_eq!(result.output, Some(json!({ "text": "hi Ada!" })));
}

// ============================================================
// Loops
// ============================================================

fn loop_graph(body: Node) -> Graph {
    linear(vec![
        trigger(),
        flow("each", "iterator", json!({ "items": "{{trigger.items}}" })),
        body,
        flow("done", "endIterator", json!({})),
    ])
}

#[tokio::test]
async fn loop_body_runs_once_per_item_and_collects() {
    let graph = loop_graph(template("body", "n={{loop.item}} at {{loop.index}}"));
    let result = executor_with(vec![])
        .run("wf", &graph, json!({ "items": [1, 2, 3] }), &no_creds())
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(log_ids(&result), vec!["t", "each", "body", "body", "body", "done"]);
    assert_eq!(
        result.output,
        Some(json!([
            { "text": "n=1 at 0" },
            { "text": "n=2 at 1" },
            { "text": "n=3 at 2" }
        ]))
    );
}

#[tokio::test]
async fn empty_loop_skips_body() {
    let echo = Arc::new(MockAdapter::echoing(Provider::Http));
    let graph = loop_graph(http("body"));
    let result = executor_with(vec![echo.clone() as Arc<dyn ProviderAdapter>])
        .run("wf", &graph, json!({ "items": [] }), &no_creds())
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(log_statuses(&result)[2], LogStatus::Skipped);
    assert_eq!(result.output, Some(json!([])));
    assert_eq!(echo.call_count(), 0);
}

#[tokio::test]
async fn filter_inside_loop_drops_items() {
    let graph = loop_graph(flow(
        "keep",
        "filter",
        json!({ "conditions": [{ "field": "", "operator": "gt", "value": 1 }] }),
    ));
    let result = executor_with(vec![])
        .run("wf", &graph, json!({ "items": [1, 2, 3] }), &no_creds())
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.output, Some(json!([2, 3])));
    assert_eq!(log_ids(&result), vec!["t", "each", "keep", "keep", "keep", "done"]);
}

#[tokio::test]
async fn loop_over_the_limit_fails_the_iterator() {
    let config = EngineConfig {
        max_loop_iterations: 2,
        ..EngineConfig::default()
    };
    let graph = loop_graph(template("body", "x"));
    let result = executor_with_config(vec![], config)
        .run("wf", &graph, json!({ "items": [1, 2, 3] }), &no_creds())
        .await;

    assert_eq!(result.error_kind, Some(RunErrorKind::Node));
    assert_eq!(log_ids(&result), vec!["t", "each"]);
    assert_eq!(result.execution_log[1].status, LogStatus::Error);
}

#[tokio::test]
async fn branch_beside_a_loop_runs_once() {
    let notify = Arc::new(MockAdapter::echoing(Provider::Http));
    let mut graph = loop_graph(template("body", "n={{loop.item}}"));
    graph.nodes.push(http("notify"));
    graph.edges.push(Edge::new("t", "notify"));
    let executor = executor_with(vec![notify.clone() as Arc<dyn ProviderAdapter>]);

    let result = executor
        .run("wf", &graph, json!({ "items": [1, 2, 3] }), &no_creds())
        .await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(log_ids(&result), vec!["t", "each", "body", "body", "body", "done", "notify"]);
    assert_eq!(notify.call_count(), 1);

    let empty = executor
        .run("wf", &graph, json!({ "items": [] }), &no_creds())
        .await;
    assert_eq!(log_ids(&empty), vec!["t", "each", "body", "done", "notify"]);
    assert_eq!(
        log_statuses(&empty),
        vec![
            LogStatus::Success,
            LogStatus::Success,
            LogStatus::Skipped,
            LogStatus::Success,
            LogStatus::Success
        ]
    );
    assert_eq!(notify.call_count(), 2);
}

#[tokio::test]
async fn nested_loops_collect_per_group() {
    let graph = linear(vec![
        trigger(),
        flow("groups", "iterator", json!({ "items": "{{trigger.groups}}" })),
        flow("members", "iterator", json!({ "items": "{{loop.item}}" })),
        template("label", "v{{loop.item}}"),
        flow("members_done", "endIterator", json!({})),
        flow("groups_done", "endIterator", json!({})),
    ]);
    let result = executor_with(vec![])
        .run("wf", &graph, json!({ "groups": [[1, 2], [3]] }), &no_creds())
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(
        result.output,
        Some(json!([
            [{ "text": "v1" }, { "text": "v2" }],
            [{ "text": "v3" }]
        ]))
    );
}

#[tokio::test]
async fn router_inside_loop_picks_a_branch_per_item() {
    let router = flow(
        "route",
        "router",
        json!({
            "routes": [{ "handle": "yes", "field": "", "operator": "equals", "value": "a" }],
            "fallback": "no"
        }),
    );
    let graph = Graph::new(
        vec![
            trigger(),
            flow("each", "iterator", json!({ "items": "{{trigger.items}}" })),
            router,
            template("yes", "Y{{loop.item}}"),
            template("no", "N{{loop.item}}"),
            flow("done", "endIterator", json!({})),
        ],
        vec![
            Edge::new("t", "each"),
            Edge::new("each", "route"),
            Edge::new("route", "yes").with_handle("yes"),
            Edge::new("route", "no").with_handle("no"),
            Edge::new("yes", "done"),
            Edge::new("no", "done"),
        ],
    );
    let result = executor_with(vec![])
        .run("wf", &graph, json!({ "items": ["a", "b", "a"] }), &no_creds())
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(
        result.output,
        Some(json!([{ "text": "Ya" }, { "text": "Nb" }, { "text": "Ya" }]))
    );
    let ran = |id: &str| {
        result
            .execution_log
            .iter()
            .filter(|e| e.node_id == id && e.status == LogStatus::Success)
            .count()
    };
    assert_eq!((ran("yes"), ran("no")), (2, 1));
}

#[tokio::test]
async fn registered_adapter_replaces_the_previous_one() {
    let failing = Arc::new(MockAdapter::failing(Provider::Http, "old adapter"));
    let replacement = Arc::new(MockAdapter::returning(Provider::Http, json!({ "ok": true })));
    let mut executor = executor_with(vec![failing.clone() as Arc<dyn ProviderAdapter>]);
    executor.register(replacement.clone());

    let result = executor
        .run("wf", &linear(vec![trigger(), http("call")]), json!({}), &no_creds())
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.output, Some(json!({ "ok": true })));
    assert_eq!((failing.call_count(), replacement.call_count()), (0, 1));
}

// ============================================================
// Credentials
// ============================================================

fn chat_graph() -> Graph {
    linear(vec![
        trigger(),
        Node::new("ask", "openai").with_data(json!({ "prompt": "summarise {{trigger.text}}" })),
    ])
}

#[tokio::test]
async fn missing_credentials_fail_before_the_adapter_runs() {
    let openai = Arc::new(MockAdapter::returning(Provider::OpenAi, json!({ "content": "ok" })));
    let result = executor_with(vec![openai.clone() as Arc<dyn ProviderAdapter>])
        .run("wf", &chat_graph(), json!({ "text": "t" }), &no_creds())
        .await;

    assert!(!result.success);
    assert!(result.execution_log[1].error.as_deref().unwrap().contains("missing credentials"));
    assert_eq!(openai.call_count(), 0);
}

#[tokio::test]
async fn supplied_credentials_reach_the_adapter() {
    let openai = Arc::new(MockAdapter::returning(Provider::OpenAi, json!({ "content": "ok" })));
    let creds: Creds = HashMap::from([("openai".to_owned(), CredentialBundle::api_key("sk-test"))]);
    let result = executor_with(vec![openai.clone() as Arc<dyn ProviderAdapter>])
        .run("wf", &chat_graph(), json!({ "text": "t" }), &creds)
        .await;

    assert!(result.success, "{:?}", result.error);
    assert!(openai.calls()[0].had_credentials);
}

#[tokio::test]
async fn expired_oauth_bundle_is_rejected() {
    let gmail = Arc::new(MockAdapter::returning(Provider::Google, json!({})));
    let expired = CredentialBundle::oauth2("ya29", Some(Utc::now() - chrono::Duration::hours(1)));
    let creds: Creds = HashMap::from([("google".to_owned(), expired)]);
    let graph = linear(vec![
        trigger(),
        Node::new("mail", "gmail").with_data(json!({ "to": "a@x.io", "subject": "s", "body": "b" })),
    ]);

    let result = executor_with(vec![gmail.clone() as Arc<dyn ProviderAdapter>])
        .run("wf", &graph, json!({}), &creds)
        .await;

    assert!(!result.success);
    assert!(result.execution_log[1].error.as_deref().unwrap().contains("expired"));
    assert_eq!(gmail.call_count(), 0);
}

// ============================================================
// Run-level failures
// ============================================================

#[tokio::test(start_paused = true)]
async fn deadline_marks_in_flight_node_as_running() {
    let slow = Arc::new(MockAdapter::new(
        Provider::Http,
        MockBehaviour::Delay(Duration::from_secs(30), json!({})),
    ));
    let config = EngineConfig {
        run_timeout_secs: 1,
        ..EngineConfig::default()
    };
    let graph = linear(vec![trigger(), http("slow"), template("after", "never")]);

    let result = executor_with_config(vec![slow as Arc<dyn ProviderAdapter>], config)
        .run("wf", &graph, json!({}), &no_creds())
        .await;

    assert_eq!(result.error_kind, Some(RunErrorKind::DeadlineExceeded));
    assert_eq!(log_ids(&result), vec!["t", "slow"]);
    assert_eq!(result.execution_log[1].status, LogStatus::Running);
}

#[tokio::test]
async fn adapter_panic_becomes_internal_failure() {
    let panicking = Arc::new(MockAdapter::new(
        Provider::Http,
        MockBehaviour::Panic("adapter bug".into()),
    ));
    let graph = linear(vec![trigger(), http("boom"), template("after", "never")]);

    let result = executor_with(vec![panicking as Arc<dyn ProviderAdapter>])
        .run("wf", &graph, json!({}), &no_creds())
        .await;

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(RunErrorKind::Internal));
    assert_eq!(result.error.as_deref(), Some("internal error while executing workflow"));
    assert_eq!(log_ids(&result), vec!["t", "boom"]);
    assert_eq!(result.execution_log[0].status, LogStatus::Success);
    assert_eq!(result.execution_log[1].status, LogStatus::Error);
}

// ============================================================
// Single-node test entry point
// ============================================================

#[tokio::test]
async fn test_node_uses_mock_predecessor_state() {
    let node = template("preview", "{{trigger.user}} asked: {{previous.question}} ({{nodes.lookup.plan}})");
    let input = NodeTestInput {
        trigger_input: json!({ "user": "ada" }),
        node_outputs: serde_json::from_value(json!({ "lookup": { "plan": "pro" } })).unwrap(),
        previous_output: Some(json!({ "question": "why?" })),
        ..NodeTestInput::default()
    };

    let outcome = executor_with(vec![]).test_node(&node, input, &no_creds()).await;

    assert!(outcome.result.success);
    assert_eq!(outcome.operation, Some(OperationId::TransformTemplate));
    assert_eq!(outcome.result.output, Some(json!({ "text": "ada asked: why? (pro)" })));
}

#[tokio::test]
async fn test_node_applies_credential_rules() {
    let openai = Arc::new(MockAdapter::returning(Provider::OpenAi, json!({})));
    let executor = executor_with(vec![openai.clone() as Arc<dyn ProviderAdapter>]);
    let node = Node::new("ask", "openai").with_data(json!({ "prompt": "hi" }));

    let outcome = executor.test_node(&node, NodeTestInput::default(), &no_creds()).await;
    assert_eq!(outcome.result.error.unwrap().code.as_deref(), Some("missing_credentials"));

    let bogus = executor
        .test_node(&Node::new("x", "bogus"), NodeTestInput::default(), &no_creds())
        .await;
    assert_eq!(bogus.result.error.unwrap().code.as_deref(), Some("unknown_node_type"));
    assert_eq!(openai.call_count(), 0);
}
