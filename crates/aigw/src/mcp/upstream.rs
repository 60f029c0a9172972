use parking_lot::Mutex;
use serde_json::Value;

use crate::config::McpBackendConfig;
use crate::parse::sse::SseFramer;
use crate::*;

pub const HEADER_SESSION_ID: &str = "mcp-session-id";
const EVENT_STREAM_MIME_TYPE: &str = "text/event-stream";
const JSON_MIME_TYPE: &str = "application/json";

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
	#[error("missing or rejected authorization")]
	Unauthorized,
	#[error("upstream http status {0}")]
	Status(u16),
	#[error("upstream request failed: {0}")]
	Transport(#[from] reqwest::Error),
	#[error("unexpected content type: {0}")]
	ContentType(String),
	#[error("malformed upstream message: {0}")]
	Malformed(String),
}

/// One backend MCP server reached over Streamable HTTP. The child session id
/// is captured on `initialize` and pinned to every subsequent request, which
/// keeps the upstream session sticky.
#[derive(Debug)]
pub struct UpstreamClient {
	pub name: Strng,
	http: reqwest::Client,
	url: Strng,
	bearer: Option<Strng>,
	session_id: Mutex<Option<String>>,
}

impl UpstreamClient {
	pub fn new(cfg: &McpBackendConfig) -> Self {
		Self {
			name: cfg.name.clone(),
			http: reqwest::Client::new(),
			url: cfg.url.clone(),
			bearer: cfg.bearer_token.clone(),
			session_id: Mutex::new(None),
		}
	}

	pub fn session_id(&self) -> Option<String> {
		self.session_id.lock().clone()
	}

	fn base_request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
		let mut req = self
			.http
			.request(method, self.url.as_str())
			.header(http::header::ACCEPT, format!("{EVENT_STREAM_MIME_TYPE}, {JSON_MIME_TYPE}"));
		if let Some(token) = &self.bearer {
			req = req.header(http::header::AUTHORIZATION, format!("Bearer {token}"));
		}
		if let Some(sid) = self.session_id() {
			req = req.header(HEADER_SESSION_ID, sid);
		}
		req
	}

	/// POSTs one JSON-RPC message. A JSON response body resolves directly; an
	/// SSE response body resolves to the first event carrying the reply for
	/// `id`. Notifications get a 202 and resolve to None.
	pub async fn send(&self, message: &Value, id: Option<&Value>) -> Result<Option<Value>, UpstreamError> {
		let body = serde_json::to_vec(message).expect("JSON-RPC values serialize");
		let resp = self
			.base_request(reqwest::Method::POST)
			.header(http::header::CONTENT_TYPE, JSON_MIME_TYPE)
			.body(body)
			.send()
			.await?;

		let status = resp.status();
		if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
			return Err(UpstreamError::Unauthorized);
		}
		if status == reqwest::StatusCode::ACCEPTED {
			return Ok(None);
		}
		if !status.is_success() {
			return Err(UpstreamError::Status(status.as_u16()));
		}

		if let Some(sid) = resp
			.headers()
			.get(HEADER_SESSION_ID)
			.and_then(|v| v.to_str().ok())
		{
			*self.session_id.lock() = Some(sid.to_string());
		}

		let content_type = resp
			.headers()
			.get(http::header::CONTENT_TYPE)
			.and_then(|v| v.to_str().ok())
			.unwrap_or_default()
			.to_string();
		if content_type.starts_with(JSON_MIME_TYPE) {
			let raw = resp.bytes().await?;
			let body: Value =
				serde_json::from_slice(&raw).map_err(|e| UpstreamError::Malformed(e.to_string()))?;
			return Ok(Some(body));
		}
		if content_type.starts_with(EVENT_STREAM_MIME_TYPE) {
			return self.read_sse_response(resp, id).await.map(Some);
		}
		Err(UpstreamError::ContentType(content_type))
	}

	/// Drains the response SSE stream until the reply for `id` shows up.
	/// Interleaved notifications are dropped here; server-initiated traffic
	/// is carried by the GET stream instead.
	async fn read_sse_response(
		&self,
		mut resp: reqwest::Response,
		id: Option<&Value>,
	) -> Result<Value, UpstreamError> {
		let mut framer = SseFramer::new();
		while let Some(chunk) = resp.chunk().await? {
			let events = framer
				.push(&chunk)
				.map_err(|e| UpstreamError::Malformed(e.to_string()))?;
			for ev in events {
				let Ok(msg) = serde_json::from_slice::<Value>(&ev.data) else {
					continue;
				};
				let is_reply = msg.get("result").is_some() || msg.get("error").is_some();
				let id_matches = match id {
					Some(want) => msg.get("id") == Some(want),
					None => true,
				};
				if is_reply && id_matches {
					return Ok(msg);
				}
			}
		}
		Err(UpstreamError::Malformed(
			"stream ended before the response".to_string(),
		))
	}

	/// Opens the server-initiated event stream and forwards change
	/// notifications until the stream or the session ends.
	pub fn listen(
		self: &Arc<Self>,
		on_notification: impl Fn(&Strng, &Value) + Send + Sync + 'static,
	) -> tokio::task::JoinHandle<()> {
		let client = self.clone();
		tokio::spawn(async move {
			let resp = client
				.base_request(reqwest::Method::GET)
				.header(http::header::ACCEPT, EVENT_STREAM_MIME_TYPE)
				.send()
				.await;
			let Ok(mut resp) = resp else {
				debug!(backend = %client.name, "no notification stream available");
				return;
			};
			if !resp.status().is_success() {
				debug!(backend = %client.name, status = %resp.status(), "notification stream rejected");
				return;
			}
			let mut framer = SseFramer::new();
			while let Ok(Some(chunk)) = resp.chunk().await {
				let Ok(events) = framer.push(&chunk) else {
					return;
				};
				for ev in events {
					if let Ok(msg) = serde_json::from_slice::<Value>(&ev.data) {
						on_notification(&client.name, &msg);
					}
				}
			}
		})
	}

	/// Closes the child session.
	pub async fn close(&self) {
		if self.session_id().is_none() {
			return;
		}
		let _ = self.base_request(reqwest::Method::DELETE).send().await;
	}
}
