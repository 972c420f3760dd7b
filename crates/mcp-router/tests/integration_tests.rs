//! Integration tests for the router
//!
//! These tests drive the public API end to end:
//!
//! - Registry duplicate policies
//! - Multi-provider listing and first-registered-wins execution
//! - Live mounts and snapshot imports
//! - Tool transformation through the registry
//! - Visibility rules and list-changed notifications
//! - Partial-failure isolation
//! - Proxying to an in-process upstream

use mcp_router::component::{Arguments, Component, Prompt, PromptMessage, Resource, ResourceContent, ResourceTemplate, Tool};
use mcp_router::config::{DuplicatePolicy, RouterConfig};
use mcp_router::context::CallContext;
use mcp_router::error::{ProviderError, RegistryError, ToolError};
use mcp_router::notify::{MockSession, Notification};
use mcp_router::provider::{InProcessUpstream, MountedProvider, Provider, ProxyProvider};
use mcp_router::router::Router;
use mcp_router::transform::{ArgTransform, ToolTransform};
use mcp_router::visibility::RuleMatch;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;

// =============================================================================
// Helpers
// =============================================================================

fn returning(name: &str, value: Value) -> Tool {
    Tool::from_fn(name, json!({"type": "object"}), move |_args| {
        let value = value.clone();
        async move { Ok(value) }
    })
}

fn add_tool() -> Tool {
    Tool::from_fn(
        "add",
        json!({
            "type": "object",
            "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}},
            "required": ["a", "b"]
        }),
        |args| async move { Ok(json!(args["a"].as_i64().unwrap_or(0) + args["b"].as_i64().unwrap_or(0))) },
    )
}

fn args(value: Value) -> Arguments {
    match value {
        Value::Object(map) => map,
        _ => Arguments::new(),
    }
}

fn names(tools: &[Tool]) -> Vec<String> {
    tools.iter().map(|t| t.name().to_string()).collect()
}

fn in_session<F: Future>(session: &Arc<MockSession>, future: F) -> impl Future<Output = F::Output> {
    CallContext::scope(CallContext::builder().session(session.clone()).build(), future)
}

/// A provider whose every call fails, like an unreachable remote server.
struct DownProvider;

#[async_trait]
impl Provider for DownProvider {
    fn name(&self) -> &str {
        "down"
    }

    async fn list_tools(&self) -> Result<Vec<Tool>, ProviderError> {
        Err(down())
    }

    async fn list_resources(&self) -> Result<Vec<Resource>, ProviderError> {
        Err(down())
    }

    async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplate>, ProviderError> {
        Err(down())
    }

    async fn list_prompts(&self) -> Result<Vec<Prompt>, ProviderError> {
        Err(down())
    }
}

fn down() -> ProviderError {
    ProviderError::Unreachable {
        provider: "down".to_string(),
        reason: "connection refused".to_string(),
    }
}

// =============================================================================
// Registry
// =============================================================================

#[tokio::test]
async fn test_duplicate_registration_is_rejected_by_default() {
    let router = Router::new("server");
    router.add_tool(returning("greet", json!("first"))).unwrap();

    let err = router.add_tool(returning("greet", json!("second"))).unwrap_err();
    assert_eq!(err, RegistryError::Duplicate("tool:greet".to_string()));

    let tools = router.list_tools().await;
    assert_eq!(names(&tools), vec!["greet"]);
    let result = router.call_tool("greet", Arguments::new()).await.unwrap();
    assert_eq!(result.first_text(), Some("first"));
}

#[tokio::test]
async fn test_replace_policy_keeps_latest() {
    let router = Router::with_config(RouterConfig::builder().on_duplicate(DuplicatePolicy::Replace).build());
    router.add_tool(returning("greet", json!("first"))).unwrap();
    router.add_tool(returning("greet", json!("second"))).unwrap();

    assert_eq!(router.list_tools().await.len(), 1);
    let result = router.call_tool("greet", Arguments::new()).await.unwrap();
    assert_eq!(result.first_text(), Some("second"));
}

#[tokio::test]
async fn test_versions_coexist_and_highest_is_called() {
    let router = Router::new("server");
    router.add_tool(returning("calc", json!("v1")).with_version("1.0")).unwrap();
    router.add_tool(returning("calc", json!("v2")).with_version("2.0")).unwrap();

    assert_eq!(router.list_tools().await.len(), 2);
    let result = router.call_tool("calc", Arguments::new()).await.unwrap();
    assert_eq!(result.first_text(), Some("v2"));
}

// =============================================================================
// Composition
// =============================================================================

#[tokio::test]
async fn test_same_namespace_mounts_list_both_and_first_wins() {
    let x = Router::new("x");
    x.add_tool(returning("name", json!("from x"))).unwrap();
    let y = Router::new("y");
    y.add_tool(returning("name", json!("from y"))).unwrap();

    let main = Router::new("main");
    main.mount(x, Some("sub")).await;
    main.mount(y, Some("sub")).await;

    let tools = main.list_tools().await;
    assert_eq!(names(&tools), vec!["sub_name", "sub_name"]);

    let result = main.call_tool("sub_name", Arguments::new()).await.unwrap();
    assert_eq!(result.first_text(), Some("from x"));
}

#[tokio::test]
async fn test_mount_is_live() {
    let child = Router::new("child");
    let main = Router::new("main");
    main.mount(child.clone(), Some("child")).await;
    assert!(main.list_tools().await.is_empty());

    child.add_tool(returning("late", json!("here"))).unwrap();
    let result = main.call_tool("child_late", Arguments::new()).await.unwrap();
    assert_eq!(result.first_text(), Some("here"));

    // The unprefixed name is not routed to the mount.
    assert!(matches!(
        main.call_tool("late", Arguments::new()).await,
        Err(ToolError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_mounted_resources_are_prefixed() {
    let child = Router::new("child");
    child.add_resource(Resource::text("data://config", "on")).unwrap();
    child
        .add_template(
            ResourceTemplate::from_fn("users://{id}", |params| async move {
                Ok(ResourceContent::text(format!("user {}", params["id"]), "text/plain"))
            })
            .unwrap(),
        )
        .unwrap();

    let main = Router::new("main");
    main.mount(child, Some("child")).await;

    let resources = main.list_resources().await;
    assert_eq!(resources[0].uri(), "data://child/config");
    assert_eq!(main.read_resource("data://child/config").await.unwrap().as_text(), Some("on"));
    assert_eq!(
        main.read_resource("users://child/7").await.unwrap().as_text(),
        Some("user 7")
    );
}

#[tokio::test]
async fn test_mount_tool_name_override() {
    let child = Router::new("child");
    child.add_tool(returning("fetch", json!("fetched"))).unwrap();

    let main = Router::new("main");
    main.mount_with(
        MountedProvider::new(child, Some("web"))
            .with_tool_names([("fetch", "download")])
            .unwrap(),
    )
    .await;

    assert_eq!(names(&main.list_tools().await), vec!["download"]);
    assert!(main.call_tool("download", Arguments::new()).await.is_ok());
    assert!(main.call_tool("web_fetch", Arguments::new()).await.is_err());
}

#[tokio::test]
async fn test_import_is_snapshot_with_last_write_wins() {
    let x = Router::new("x");
    x.add_tool(returning("name", json!("from x"))).unwrap();
    let y = Router::new("y");
    y.add_tool(returning("name", json!("from y"))).unwrap();

    let main = Router::new("main");
    assert_eq!(main.import(&x, Some("lib")).await.unwrap(), 1);
    assert_eq!(main.import(&y, Some("lib")).await.unwrap(), 1);

    let tools = main.list_tools().await;
    assert_eq!(names(&tools), vec!["lib_name"]);
    let result = main.call_tool("lib_name", Arguments::new()).await.unwrap();
    assert_eq!(result.first_text(), Some("from y"));

    // Later changes to the source are not visible.
    x.add_tool(returning("extra", json!(null))).unwrap();
    assert_eq!(main.list_tools().await.len(), 1);
}

#[tokio::test]
async fn test_unreachable_provider_is_isolated() {
    let healthy = Router::new("healthy");
    healthy.add_tool(returning("ping", json!("pong"))).unwrap();

    let main = Router::new("main");
    main.mount(DownProvider, Some("down")).await;
    main.mount(healthy, Some("up")).await;

    assert_eq!(names(&main.list_tools().await), vec!["up_ping"]);
    let result = main.call_tool("up_ping", Arguments::new()).await.unwrap();
    assert_eq!(result.first_text(), Some("pong"));
}

#[tokio::test]
async fn test_proxy_to_in_process_upstream() {
    let remote = Router::new("remote");
    remote.add_tool(returning("echo", json!("remote echo"))).unwrap();
    remote
        .add_prompt(Prompt::from_fn("hello", |_| async { Ok(vec![PromptMessage::user("hi")]) }))
        .unwrap();

    let proxy = ProxyProvider::new("proxy", InProcessUpstream::new(remote));
    let main = Router::new("main");
    main.mount(proxy, Some("remote")).await;

    let result = main.call_tool("remote_echo", Arguments::new()).await.unwrap();
    assert_eq!(result.first_text(), Some("remote echo"));

    let messages = main.render_prompt("remote_hello", Arguments::new()).await.unwrap();
    assert_eq!(messages, vec![PromptMessage::user("hi")]);
}

// =============================================================================
// Transformation
// =============================================================================

#[tokio::test]
async fn test_hidden_argument_with_default() {
    let router = Router::new("server");
    router.add_tool(add_tool()).unwrap();

    let direct = router.call_tool("add", args(json!({"a": 10, "b": 5}))).await.unwrap();

    router
        .add_transform(
            "add",
            ToolTransform::new().with_argument("a", ArgTransform::new().hidden().with_default(json!(10))),
        )
        .unwrap();

    let tool = router.get_tool("add").await.unwrap().unwrap();
    assert!(tool.input_schema()["properties"].get("a").is_none());

    let transformed = router.call_tool("add", args(json!({"b": 5}))).await.unwrap();
    assert_eq!(transformed.first_text(), direct.first_text());
    assert_eq!(transformed.first_text(), Some("15"));

    let err = router.call_tool("add", args(json!({"a": 1, "b": 5}))).await.unwrap_err();
    assert!(err.to_string().contains("unexpected keyword argument"));
}

#[tokio::test]
async fn test_renamed_tool_through_transform() {
    let router = Router::new("server");
    router.add_tool(add_tool()).unwrap();
    router
        .add_transform(
            "add",
            ToolTransform::new()
                .with_name("sum")
                .with_argument("a", ArgTransform::renamed("left"))
                .with_argument("b", ArgTransform::renamed("right")),
        )
        .unwrap();

    assert_eq!(names(&router.list_tools().await), vec!["sum"]);
    let result = router
        .call_tool("sum", args(json!({"left": 2, "right": 3})))
        .await
        .unwrap();
    assert_eq!(result.first_text(), Some("5"));
    assert!(router.call_tool("add", args(json!({"a": 2, "b": 3}))).await.is_err());
}

#[tokio::test]
async fn test_chained_transforms_over_recursive_schema() {
    let original = Tool::from_fn(
        "plant",
        json!({
            "type": "object",
            "properties": {
                "tree": {"$ref": "#/$defs/Node"},
                "pair": {"$ref": "#/$defs/Left"},
                "label": {"type": "string"},
                "token": {"type": "string"}
            },
            "required": ["tree", "token"],
            "$defs": {
                "Node": {
                    "type": "object",
                    "properties": {
                        "value": {"type": "integer"},
                        "children": {"type": "array", "items": {"$ref": "#/$defs/Node"}}
                    }
                },
                "Left": {"type": "object", "properties": {"right": {"$ref": "#/$defs/Right"}}},
                "Right": {"type": "object", "properties": {"left": {"$ref": "#/$defs/Left"}}},
                "Unused": {"type": "boolean"}
            }
        }),
        |args| async move { Ok(Value::Object(args)) },
    );

    let hidden = original
        .transform(&ToolTransform::new().with_argument("token", ArgTransform::new().hidden().with_default(json!("secret"))))
        .unwrap();
    let renamed = hidden
        .transform(&ToolTransform::new().with_argument("tree", ArgTransform::renamed("root")))
        .unwrap();

    let schema = renamed.input_schema();
    let properties = schema["properties"].as_object().unwrap();
    assert_eq!(properties.keys().collect::<Vec<_>>(), vec!["root", "pair", "label"]);
    assert_eq!(properties["root"], json!({"$ref": "#/$defs/Node"}));
    assert_eq!(schema["required"], json!(["root"]));

    let defs = schema["$defs"].as_object().unwrap();
    assert!(defs.contains_key("Node"));
    assert!(defs.contains_key("Left"));
    assert!(defs.contains_key("Right"));
    assert!(!defs.contains_key("Unused"));
    assert_eq!(defs["Node"]["properties"]["children"]["items"], json!({"$ref": "#/$defs/Node"}));

    let router = Router::new("server");
    router.add_tool(renamed).unwrap();
    let tree = json!({"value": 1, "children": [{"value": 2, "children": []}]});
    let result = router
        .call_tool("plant", args(json!({"root": tree.clone(), "label": "oak"})))
        .await
        .unwrap();

    let received = result.structured_content.unwrap();
    assert_eq!(received["tree"], tree);
    assert_eq!(received["token"], "secret");
    assert_eq!(received["label"], "oak");
    assert!(received.get("root").is_none());
}

#[tokio::test]
async fn test_invalid_transform_is_rejected_up_front() {
    let router = Router::new("server");
    router.add_tool(add_tool()).unwrap();

    let result = router.add_transform("add", ToolTransform::new().with_argument("a", ArgTransform::new().hidden()));
    assert!(result.is_err());

    // The stored tool is untouched.
    let ok = router.call_tool("add", args(json!({"a": 1, "b": 1}))).await.unwrap();
    assert_eq!(ok.first_text(), Some("2"));
}

// =============================================================================
// Visibility and notifications
// =============================================================================

#[tokio::test]
async fn test_enable_disable_notification_counts() {
    let router = Router::new("server");
    router.add_tool(returning("greet", json!(null))).unwrap();
    let session = MockSession::new("s1");

    in_session(&session, router.enable(RuleMatch::names(["greet"]))).await;
    assert_eq!(session.count(Notification::ToolListChanged), 0);

    in_session(&session, router.disable(RuleMatch::names(["greet"]))).await;
    assert_eq!(session.count(Notification::ToolListChanged), 1);
    assert!(router.list_tools().await.is_empty());
}

#[tokio::test]
async fn test_registration_notifies_session() {
    let router = Router::new("server");
    let session = MockSession::new("s1");

    in_session(&session, async {
        router.add_tool(returning("a", json!(null))).unwrap();
        router.add_resource(Resource::text("data://a", "a")).unwrap();
        let _ = router.add_tool(returning("a", json!(null)));
    })
    .await;

    assert_eq!(
        session.notifications(),
        vec![Notification::ToolListChanged, Notification::ResourceListChanged]
    );
}

#[tokio::test]
async fn test_last_matching_rule_wins() {
    let router = Router::new("server");
    router.add_tool(returning("a", json!(null)).with_tag("beta")).unwrap();
    router.add_tool(returning("b", json!(null)).with_tag("beta")).unwrap();

    router.disable(RuleMatch::tags(["beta"])).await;
    router.enable(RuleMatch::names(["a"])).await;
    assert_eq!(names(&router.list_tools().await), vec!["a"]);

    router.disable(RuleMatch::all()).await;
    assert!(router.list_tools().await.is_empty());
}

#[tokio::test]
async fn test_sessions_do_not_see_each_other() {
    let router = Router::new("server");
    router.add_tool(returning("secret", json!(null))).unwrap();
    let alice = MockSession::new("alice");
    let bob = MockSession::new("bob");

    in_session(&alice, async {
        router.disable_for_session(RuleMatch::names(["secret"])).await.unwrap();
    })
    .await;

    let (alice_tools, bob_tools) = tokio::join!(
        in_session(&alice, router.list_tools()),
        in_session(&bob, router.list_tools()),
    );
    assert!(alice_tools.is_empty());
    assert_eq!(bob_tools.len(), 1);
    assert_eq!(alice.count(Notification::ToolListChanged), 1);
    assert!(bob.notifications().is_empty());
}

#[tokio::test]
async fn test_disabled_tool_cannot_be_called() {
    let router = Router::new("server");
    router.add_tool(returning("danger", json!(null)).with_tag("admin")).unwrap();
    router.disable(RuleMatch::tags(["admin"])).await;

    assert!(matches!(
        router.call_tool("danger", Arguments::new()).await,
        Err(ToolError::NotFound(_))
    ));

    router.reset_visibility().await;
    assert!(router.call_tool("danger", Arguments::new()).await.is_ok());
}
