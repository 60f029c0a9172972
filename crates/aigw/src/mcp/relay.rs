use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::broadcast;

use super::upstream::{UpstreamClient, UpstreamError};
use super::{Error, NAMESPACE_SEPARATOR};
use crate::config::{McpConfig, ToolSelector};
use crate::*;

/// One configured backend with its tool filter.
#[derive(Debug)]
pub struct BackendTarget {
	pub name: Strng,
	pub selector: Option<ToolSelector>,
	pub client: Arc<UpstreamClient>,
}

impl std::fmt::Display for BackendTarget {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.name)
	}
}

struct PendingCall {
	client_id: Value,
	backend: Strng,
	created: Instant,
}

/// Fans one client session out to every configured backend, namespaces the
/// merged catalogs, and routes addressed calls to the owning backend.
pub struct Relay {
	pub session_id: Arc<str>,
	backends: Vec<Arc<BackendTarget>>,
	concurrency: usize,
	debounce: Duration,
	next_upstream_id: AtomicU64,
	pending: Mutex<HashMap<u64, PendingCall>>,
	cached_tools: Mutex<Option<Vec<rmcp::model::Tool>>>,
	relist_scheduled: AtomicBool,
	notify_tx: broadcast::Sender<Value>,
	listeners: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl std::fmt::Debug for Relay {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Relay")
			.field("session_id", &self.session_id)
			.field("backends", &self.backends.len())
			.finish()
	}
}

impl Relay {
	pub fn new(session_id: Arc<str>, cfg: &McpConfig) -> Self {
		let (notify_tx, _) = broadcast::channel(16);
		let backends = cfg
			.backends
			.iter()
			.map(|b| {
				Arc::new(BackendTarget {
					name: b.name.clone(),
					selector: b.tool_selector.clone(),
					client: Arc::new(UpstreamClient::new(b)),
				})
			})
			.collect();
		Self {
			session_id,
			backends,
			concurrency: cfg.fanout_concurrency.max(1),
			debounce: Duration::from_millis(cfg.list_changed_debounce_ms),
			next_upstream_id: AtomicU64::new(1),
			pending: Mutex::new(HashMap::new()),
			cached_tools: Mutex::new(None),
			relist_scheduled: AtomicBool::new(false),
			notify_tx,
			listeners: Mutex::new(Vec::new()),
		}
	}

	pub fn subscribe(&self) -> broadcast::Receiver<Value> {
		self.notify_tx.subscribe()
	}

	pub fn backend_count(&self) -> usize {
		self.backends.len()
	}

	/// Handles one client JSON-RPC message; None means nothing goes back on
	/// this POST (notifications).
	pub async fn handle(self: &Arc<Self>, msg: Value) -> Result<Option<Value>, Error> {
		let method = msg
			.get("method")
			.and_then(|m| m.as_str())
			.ok_or_else(|| Error::InvalidRequest("missing method".to_string()))?
			.to_string();
		let client_id = msg.get("id").cloned();

		let Some(client_id) = client_id else {
			// Notification: forward everywhere, nothing to merge
			self.fanout(&msg).await;
			return Ok(None);
		};

		let params = msg.get("params").cloned().unwrap_or(Value::Null);
		let result = match method.as_str() {
			"initialize" => self.initialize(&params).await?,
			"ping" => json!({}),
			"tools/list" => {
				let tools = self.merged_tools().await?;
				json!({ "tools": tools })
			},
			"tools/call" => {
				let name = params
					.get("name")
					.and_then(|n| n.as_str())
					.ok_or_else(|| Error::InvalidRequest("missing tool name".to_string()))?;
				let (backend, tool) = self.parse_resource_name(name)?;
				let mut params = params.clone();
				params["name"] = Value::String(tool);
				return self
					.send_single(&backend, &client_id, "tools/call", params)
					.await
					.map(Some);
			},
			"prompts/list" => {
				let prompts = self.merged_listing("prompts/list", "prompts", "name").await?;
				json!({ "prompts": prompts })
			},
			"prompts/get" => {
				let name = params
					.get("name")
					.and_then(|n| n.as_str())
					.ok_or_else(|| Error::InvalidRequest("missing prompt name".to_string()))?;
				let (backend, prompt) = self.parse_resource_name(name)?;
				let mut params = params.clone();
				params["name"] = Value::String(prompt);
				return self
					.send_single(&backend, &client_id, "prompts/get", params)
					.await
					.map(Some);
			},
			"resources/list" => {
				let resources = self.merged_listing("resources/list", "resources", "uri").await?;
				json!({ "resources": resources })
			},
			"resources/read" | "completion/complete" => {
				// No namespace exists for these objects, so they only route
				// when there is exactly one backend
				let [backend] = self.backends.as_slice() else {
					return Err(Error::InvalidMethodWithMultiplexing(method.clone()));
				};
				let name = backend.name.clone();
				return self
					.send_single(&name, &client_id, &method, params)
					.await
					.map(Some);
			},
			"logging/setLevel" => {
				self.fanout(&msg).await;
				json!({})
			},
			other => return Err(Error::MethodNotFound(other.to_string())),
		};
		Ok(Some(json!({
			"jsonrpc": "2.0",
			"id": client_id,
			"result": result,
		})))
	}

	async fn initialize(self: &Arc<Self>, params: &Value) -> Result<Value, Error> {
		let protocol_version = params
			.get("protocolVersion")
			.and_then(|v| v.as_str())
			.unwrap_or("2025-06-18")
			.to_string();

		let init = json!({
			"jsonrpc": "2.0",
			"method": "initialize",
			"params": {
				"protocolVersion": protocol_version,
				"capabilities": {},
				"clientInfo": {
					"name": "ai-gateway",
					"version": aigw_core::version::BuildInfo::new().version,
				},
			},
		});
		let results = self.fanout_request(&init).await;
		for (backend, result) in &results {
			if let Err(e) = result {
				warn!(backend = %backend, "backend initialize failed: {e}");
			}
		}
		// Tell every backend we are ready, then start watching for changes
		let initialized = json!({ "jsonrpc": "2.0", "method": "notifications/initialized" });
		self.fanout(&initialized).await;
		self.spawn_listeners();

		Ok(json!({
			"protocolVersion": protocol_version,
			"capabilities": {
				"tools": { "listChanged": true },
				"prompts": {},
				"resources": {},
			},
			"serverInfo": {
				"name": "ai-gateway",
				"version": aigw_core::version::BuildInfo::new().version,
			},
		}))
	}

	fn spawn_listeners(self: &Arc<Self>) {
		let mut listeners = self.listeners.lock();
		if !listeners.is_empty() {
			return;
		}
		for backend in &self.backends {
			let relay = self.clone();
			let handle = backend.client.listen(move |_name, msg| {
				if msg.get("method").and_then(|m| m.as_str())
					== Some("notifications/tools/list_changed")
				{
					relay.schedule_relist();
				}
			});
			listeners.push(handle);
		}
	}

	/// Debounced: many backend change notifications collapse into one
	/// re-list and one client notification.
	fn schedule_relist(self: &Arc<Self>) {
		if self.relist_scheduled.swap(true, Ordering::SeqCst) {
			return;
		}
		let relay = self.clone();
		tokio::spawn(async move {
			tokio::time::sleep(relay.debounce).await;
			relay.relist_scheduled.store(false, Ordering::SeqCst);
			*relay.cached_tools.lock() = None;
			if let Err(e) = relay.merged_tools().await {
				warn!("tool re-list after change notification failed: {e}");
			}
			let _ = relay.notify_tx.send(json!({
				"jsonrpc": "2.0",
				"method": "notifications/tools/list_changed",
			}));
		});
	}

	/// The merged, namespaced, filtered, stably-ordered tool catalog.
	pub async fn merged_tools(self: &Arc<Self>) -> Result<Vec<rmcp::model::Tool>, Error> {
		if let Some(cached) = self.cached_tools.lock().clone() {
			return Ok(cached);
		}
		let request = json!({ "jsonrpc": "2.0", "method": "tools/list", "params": {} });
		let results = self.fanout_request(&request).await;

		let mut merged: Vec<rmcp::model::Tool> = Vec::new();
		let mut seen: std::collections::HashSet<String> = Default::default();
		for (backend, result) in results {
			let resp = match result {
				Ok(Some(resp)) => resp,
				Ok(None) => continue,
				Err(e) => {
					warn!(backend = %backend.name, "tools/list failed: {e}");
					continue;
				},
			};
			let Some(result) = resp.get("result") else {
				continue;
			};
			let listing: rmcp::model::ListToolsResult =
				match serde_json::from_value(result.clone()) {
					Ok(l) => l,
					Err(e) => {
						warn!(backend = %backend.name, "malformed tools/list result: {e}");
						continue;
					},
				};
			for mut tool in listing.tools {
				let original = tool.name.to_string();
				if let Some(selector) = &backend.selector
					&& !selector.matches(&original)
				{
					continue;
				}
				let namespaced = format!("{}{}{}", backend.name, NAMESPACE_SEPARATOR, original);
				if !seen.insert(namespaced.clone()) {
					// First registration wins; the duplicate is dropped
					warn!(tool = %namespaced, "duplicate namespaced tool rejected");
					continue;
				}
				tool.name = namespaced.into();
				merged.push(tool);
			}
		}
		merged.sort_by(|a, b| a.name.cmp(&b.name));
		*self.cached_tools.lock() = Some(merged.clone());
		Ok(merged)
	}

	/// Fan-out list for prompts/resources: items are namespaced on `key`
	/// where the object model names them, merged, and stably ordered.
	async fn merged_listing(
		self: &Arc<Self>,
		method: &str,
		collection: &str,
		key: &str,
	) -> Result<Vec<Value>, Error> {
		let request = json!({ "jsonrpc": "2.0", "method": method, "params": {} });
		let results = self.fanout_request(&request).await;
		let mut merged = Vec::new();
		for (backend, result) in results {
			let Ok(Some(resp)) = result else { continue };
			let Some(items) = resp
				.get("result")
				.and_then(|r| r.get(collection))
				.and_then(|c| c.as_array())
			else {
				continue;
			};
			for item in items {
				let mut item = item.clone();
				if key == "name"
					&& let Some(name) = item.get("name").and_then(|n| n.as_str())
				{
					item["name"] =
						Value::String(format!("{}{}{}", backend.name, NAMESPACE_SEPARATOR, name));
				}
				merged.push(item);
			}
		}
		merged.sort_by(|a, b| {
			let ka = a.get(key).and_then(|v| v.as_str()).unwrap_or_default();
			let kb = b.get(key).and_then(|v| v.as_str()).unwrap_or_default();
			ka.cmp(kb)
		});
		Ok(merged)
	}

	/// Splits `backend__object` and validates the backend exists. The
	/// separator never appears in backend names, so the first split wins.
	pub fn parse_resource_name(&self, name: &str) -> Result<(Strng, String), Error> {
		let Some((backend, object)) = name.split_once(NAMESPACE_SEPARATOR) else {
			return Err(Error::UnknownResource(name.to_string()));
		};
		if object.is_empty() {
			return Err(Error::UnknownResource(name.to_string()));
		}
		let Some(target) = self.backends.iter().find(|b| b.name.as_str() == backend) else {
			return Err(Error::UnknownResource(name.to_string()));
		};
		Ok((target.name.clone(), object.to_string()))
	}

	/// Forwards one addressed request with a fresh upstream id, then maps the
	/// response back to the client's id.
	async fn send_single(
		self: &Arc<Self>,
		backend: &Strng,
		client_id: &Value,
		method: &str,
		params: Value,
	) -> Result<Value, Error> {
		let target = self
			.backends
			.iter()
			.find(|b| &b.name == backend)
			.ok_or_else(|| Error::UnknownResource(backend.to_string()))?;

		let upstream_id = self.next_upstream_id.fetch_add(1, Ordering::Relaxed);
		self.pending.lock().insert(
			upstream_id,
			PendingCall {
				client_id: client_id.clone(),
				backend: backend.clone(),
				created: Instant::now(),
			},
		);

		let request = json!({
			"jsonrpc": "2.0",
			"id": upstream_id,
			"method": method,
			"params": params,
		});
		let result = target
			.client
			.send(&request, Some(&Value::from(upstream_id)))
			.await;
		let pending = self.pending.lock().remove(&upstream_id);

		let resp = result.map_err(Error::from)?;
		let Some(mut resp) = resp else {
			return Err(Error::InvalidRequest("backend sent no response".to_string()));
		};
		// Translate the upstream id back to the client's
		if let Some(p) = pending
			&& let Some(obj) = resp.as_object_mut()
		{
			obj.insert("id".to_string(), p.client_id);
		}
		Ok(resp)
	}

	/// Fans a message to every backend, bounded by the session concurrency
	/// cap, preserving which backend produced which result.
	async fn fanout_request(
		self: &Arc<Self>,
		message: &Value,
	) -> Vec<(Arc<BackendTarget>, Result<Option<Value>, UpstreamError>)> {
		let is_notification = message
			.get("method")
			.and_then(|m| m.as_str())
			.map(|m| m.starts_with("notifications/"))
			.unwrap_or(false);
		futures::stream::iter(self.backends.iter().cloned())
			.map(|backend| {
				let mut message = message.clone();
				async move {
					// Every forwarded request gets a fresh upstream id
					let id = if is_notification {
						None
					} else {
						let upstream_id = self.next_upstream_id.fetch_add(1, Ordering::Relaxed);
						if let Some(obj) = message.as_object_mut() {
							obj.insert("id".to_string(), Value::from(upstream_id));
						}
						Some(Value::from(upstream_id))
					};
					let result = backend.client.send(&message, id.as_ref()).await;
					(backend, result)
				}
			})
			.buffer_unordered(self.concurrency)
			.collect::<Vec<_>>()
			.await
	}

	async fn fanout(self: &Arc<Self>, message: &Value) {
		let results = self.fanout_request(message).await;
		for (backend, result) in results {
			if let Err(e) = result {
				debug!(backend = %backend.name, "fanout send failed: {e}");
			}
		}
	}

	/// Drops pending-id mappings that never resolved.
	pub fn expire_pending(&self, ttl: Duration) {
		self
			.pending
			.lock()
			.retain(|_, call| call.created.elapsed() < ttl);
	}

	pub fn pending_len(&self) -> usize {
		self.pending.lock().len()
	}

	/// Closes every child session and stops the notification listeners.
	pub async fn close(&self) {
		for handle in self.listeners.lock().drain(..) {
			handle.abort();
		}
		for backend in &self.backends {
			backend.client.close().await;
		}
		self.pending.lock().clear();
	}
}
