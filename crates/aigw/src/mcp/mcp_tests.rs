use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::relay::Relay;
use super::*;
use crate::config::{McpBackendConfig, McpConfig, ToolSelector};

fn tool(name: &str) -> Value {
	json!({"name": name, "inputSchema": {"type": "object"}})
}

async fn mock_backend(tools: Vec<Value>) -> MockServer {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/"))
		.and(body_partial_json(json!({"method": "tools/list"})))
		.respond_with(
			ResponseTemplate::new(200)
				.insert_header("content-type", "application/json")
				.set_body_json(json!({
					"jsonrpc": "2.0",
					"id": 1,
					"result": {"tools": tools, "nextCursor": null},
				})),
		)
		.mount(&server)
		.await;
	server
}

fn mcp_config(backends: Vec<McpBackendConfig>) -> McpConfig {
	McpConfig {
		backends,
		session_ttl_secs: 60,
		fanout_concurrency: 8,
		list_changed_debounce_ms: 10,
	}
}

fn backend(name: &str, url: String, selector: Option<ToolSelector>) -> McpBackendConfig {
	McpBackendConfig {
		name: strng::new(name),
		url: strng::new(url),
		bearer_token: None,
		tool_selector: selector,
	}
}

#[tokio::test]
async fn fan_out_filters_namespaces_and_sorts() {
	let kiwi = mock_backend(vec![tool("search-flight"), tool("feedback-to-devs")]).await;
	let github = mock_backend(vec![tool("pull_request_read"), tool("create_issue")]).await;
	let context7 = mock_backend(vec![tool("resolve-library-id"), tool("get-library-docs")]).await;

	let cfg = mcp_config(vec![
		backend("kiwi", kiwi.uri(), None),
		backend(
			"github",
			github.uri(),
			Some(ToolSelector {
				include: vec![strng::literal!("pull_request_read")],
				include_regex: vec![],
			}),
		),
		backend("context7", context7.uri(), None),
	]);
	let relay = Arc::new(Relay::new("session-1".into(), &cfg));
	let tools = relay.merged_tools().await.unwrap();
	let names: Vec<String> = tools.iter().map(|t| t.name.to_string()).collect();
	assert_eq!(
		names,
		vec![
			"context7__get-library-docs",
			"context7__resolve-library-id",
			"github__pull_request_read",
			"kiwi__feedback-to-devs",
			"kiwi__search-flight",
		]
	);

	// Every exposed name is namespaced and strips back to the original
	let re = regex::Regex::new(r"^[A-Za-z0-9-]+__.+$").unwrap();
	for name in &names {
		assert!(re.is_match(name), "{name:?} is not namespaced");
		let (_, original) = name.split_once(NAMESPACE_SEPARATOR).unwrap();
		assert!(!original.is_empty());
	}
}

#[tokio::test]
async fn selector_regex_includes() {
	let selector = ToolSelector {
		include: vec![],
		include_regex: vec![regex::Regex::new("^pull_request_.*$").unwrap()],
	};
	assert!(selector.matches("pull_request_read"));
	assert!(!selector.matches("create_issue"));
	// No selector at all passes everything
	let all = ToolSelector::default();
	assert!(all.matches("anything"));
}

#[tokio::test]
async fn duplicate_namespaced_names_first_registration_wins() {
	let a = mock_backend(vec![tool("dup")]).await;
	let b = mock_backend(vec![tool("dup")]).await;
	// Same backend name twice: the second registration is rejected
	let cfg = mcp_config(vec![
		backend("svc", a.uri(), None),
		backend("svc", b.uri(), None),
	]);
	let relay = Arc::new(Relay::new("session-2".into(), &cfg));
	let tools = relay.merged_tools().await.unwrap();
	assert_eq!(tools.len(), 1);
	assert_eq!(tools[0].name, "svc__dup");
}

#[tokio::test]
async fn tool_calls_route_with_fresh_upstream_ids() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/"))
		.and(body_partial_json(json!({
			"method": "tools/call",
			"params": {"name": "search-flight"},
		})))
		.respond_with(
			ResponseTemplate::new(200)
				.insert_header("content-type", "application/json")
				.set_body_json(json!({
					"jsonrpc": "2.0",
					"id": 999,
					"result": {"content": [{"type": "text", "text": "AMS->CDG"}]},
				})),
		)
		.expect(1)
		.mount(&server)
		.await;

	let cfg = mcp_config(vec![backend("kiwi", server.uri(), None)]);
	let relay = Arc::new(Relay::new("session-3".into(), &cfg));
	let resp = relay
		.handle(json!({
			"jsonrpc": "2.0",
			"id": 42,
			"method": "tools/call",
			"params": {"name": "kiwi__search-flight", "arguments": {}},
		}))
		.await
		.unwrap()
		.expect("requests get responses");
	// The response is translated back to the client's id
	assert_eq!(resp["id"], json!(42));
	assert_eq!(resp["result"]["content"][0]["text"], json!("AMS->CDG"));
	assert_eq!(relay.pending_len(), 0, "id mapping is freed on response");
}

#[tokio::test]
async fn unknown_tool_prefix_is_rejected() {
	let cfg = mcp_config(vec![]);
	let relay = Arc::new(Relay::new("session-4".into(), &cfg));
	let err = relay
		.handle(json!({
			"jsonrpc": "2.0",
			"id": 1,
			"method": "tools/call",
			"params": {"name": "nope__tool", "arguments": {}},
		}))
		.await
		.unwrap_err();
	assert!(matches!(err, Error::UnknownResource(_)));
	let err = relay.parse_resource_name("no-separator").unwrap_err();
	assert!(matches!(err, Error::UnknownResource(_)));
}

#[tokio::test]
async fn rejected_bearer_token_surfaces_as_unauthorized() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/"))
		.respond_with(ResponseTemplate::new(401))
		.mount(&server)
		.await;

	let mut be = backend("secure", server.uri(), None);
	be.bearer_token = Some(strng::literal!("expired-token"));
	let cfg = mcp_config(vec![be]);
	let relay = Arc::new(Relay::new("session-5".into(), &cfg));
	let err = relay
		.handle(json!({
			"jsonrpc": "2.0",
			"id": 7,
			"method": "tools/call",
			"params": {"name": "secure__anything", "arguments": {}},
		}))
		.await
		.unwrap_err();
	assert!(matches!(err, Error::Unauthorized));
	assert_eq!(err.code(), -32001);
}

#[tokio::test]
async fn bearer_token_is_attached_upstream() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/"))
		.and(header("authorization", "Bearer token-abc"))
		.respond_with(
			ResponseTemplate::new(200)
				.insert_header("content-type", "application/json")
				.set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": {"tools": []}})),
		)
		.expect(1)
		.mount(&server)
		.await;

	let mut be = backend("secure", server.uri(), None);
	be.bearer_token = Some(strng::literal!("token-abc"));
	let cfg = mcp_config(vec![be]);
	let relay = Arc::new(Relay::new("session-6".into(), &cfg));
	relay.merged_tools().await.unwrap();
}

#[tokio::test]
async fn session_ttl_expiry_closes_children_once() {
	let manager = Arc::new(session::SessionManager::new(Duration::from_millis(10)));
	let cfg = mcp_config(vec![]);
	let session = manager.create_session(&cfg);
	let id = session.id.to_string();
	assert!(manager.get_session(&id).is_some());

	manager.spawn_sweeper();
	tokio::time::sleep(Duration::from_millis(1200)).await;
	assert!(
		manager.get_session(&id).is_none(),
		"idle session must be swept"
	);
	// A second delete is a no-op
	assert!(!manager.delete_session(&id).await);
}

#[tokio::test]
async fn initialize_merges_capabilities() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/"))
		.respond_with(
			ResponseTemplate::new(200)
				.insert_header("content-type", "application/json")
				.set_body_json(json!({
					"jsonrpc": "2.0",
					"id": 1,
					"result": {
						"protocolVersion": "2025-06-18",
						"capabilities": {"tools": {}},
						"serverInfo": {"name": "upstream", "version": "1.0"},
					},
				})),
		)
		.mount(&server)
		.await;

	let cfg = mcp_config(vec![backend("kiwi", server.uri(), None)]);
	let relay = Arc::new(Relay::new("session-7".into(), &cfg));
	let resp = relay
		.handle(json!({
			"jsonrpc": "2.0",
			"id": 0,
			"method": "initialize",
			"params": {"protocolVersion": "2025-06-18", "capabilities": {}},
		}))
		.await
		.unwrap()
		.unwrap();
	assert_eq!(resp["result"]["serverInfo"]["name"], json!("ai-gateway"));
	assert_eq!(
		resp["result"]["capabilities"]["tools"]["listChanged"],
		json!(true)
	);
	relay.close().await;
}
