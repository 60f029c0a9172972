use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use opentelemetry::KeyValue;
use opentelemetry::trace::{Span as _, SpanKind, Tracer as _};
use serde_json::{Value, json};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::config::ConfigStore;
use crate::mcp::session::SessionManager;
use crate::mcp::upstream::UpstreamError;
use crate::telemetry::trc::Tracing;
use crate::*;

pub mod relay;
pub mod session;
pub mod upstream;

#[cfg(test)]
#[path = "mcp_tests.rs"]
mod tests;

/// The `backend__tool` separator.
pub const NAMESPACE_SEPARATOR: &str = "__";

pub const HEADER_SESSION_ID: &str = "mcp-session-id";

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("invalid request: {0}")]
	InvalidRequest(String),
	#[error("method not found: {0}")]
	MethodNotFound(String),
	// Intentionally does NOT say unauthorized; unknown objects and filtered
	// objects are indistinguishable to the client
	#[error("unknown resource: {0}")]
	UnknownResource(String),
	#[error("unauthorized")]
	Unauthorized,
	#[error("upstream error: {0}")]
	Upstream(UpstreamError),
	#[error("session not found")]
	UnknownSession,
	#[error("session header is required for non-initialize requests")]
	MissingSessionHeader,
	#[error("{0} cannot be routed when multiplexing")]
	InvalidMethodWithMultiplexing(String),
}

impl From<UpstreamError> for Error {
	fn from(e: UpstreamError) -> Self {
		match e {
			UpstreamError::Unauthorized => Error::Unauthorized,
			other => Error::Upstream(other),
		}
	}
}

impl Error {
	/// JSON-RPC error code; -32001 marks missing/rejected auth.
	pub fn code(&self) -> i64 {
		match self {
			Error::InvalidRequest(_) | Error::MissingSessionHeader => -32600,
			Error::MethodNotFound(_) | Error::InvalidMethodWithMultiplexing(_) => -32601,
			Error::UnknownResource(_) => -32602,
			Error::Unauthorized => -32001,
			Error::Upstream(_) | Error::UnknownSession => -32603,
		}
	}
}

/// The MCP endpoint served over Streamable HTTP.
#[derive(Clone)]
pub struct App {
	pub sessions: Arc<SessionManager>,
	pub config: Arc<ConfigStore>,
	pub tracing: Tracing,
}

impl App {
	pub fn new(config: Arc<ConfigStore>, tracing: Tracing) -> Self {
		let ttl = config
			.load()
			.mcp
			.as_ref()
			.map(|m| Duration::from_secs(m.session_ttl_secs))
			.unwrap_or(Duration::from_secs(30 * 60));
		let sessions = Arc::new(SessionManager::new(ttl));
		sessions.spawn_sweeper();
		Self {
			sessions,
			config,
			tracing,
		}
	}

	pub fn router(self) -> axum::Router {
		axum::Router::new()
			.route(
				"/mcp",
				axum::routing::post(handle_post)
					.get(handle_get)
					.delete(handle_delete),
			)
			.with_state(self)
	}
}

fn jsonrpc_error(id: Value, e: &Error) -> Value {
	json!({
		"jsonrpc": "2.0",
		"id": id,
		"error": { "code": e.code(), "message": e.to_string() },
	})
}

async fn handle_post(
	State(app): State<App>,
	headers: HeaderMap,
	Json(msg): Json<Value>,
) -> Response {
	let cfg = app.config.load();
	let Some(mcp_cfg) = &cfg.mcp else {
		return StatusCode::NOT_FOUND.into_response();
	};

	let method = msg
		.get("method")
		.and_then(|m| m.as_str())
		.unwrap_or_default()
		.to_string();
	let id = msg.get("id").cloned().unwrap_or(Value::Null);

	// A span per call; `_meta` values win over HTTP headers for mapped
	// attributes
	let span = start_span(&app, &cfg.header_attributes, &headers, &msg, &method);

	let session = if method == "initialize" {
		app.sessions.create_session(mcp_cfg)
	} else {
		let sid = headers
			.get(HEADER_SESSION_ID)
			.and_then(|v| v.to_str().ok());
		let Some(sid) = sid else {
			let e = Error::MissingSessionHeader;
			return error_response(StatusCode::BAD_REQUEST, jsonrpc_error(id, &e));
		};
		match app.sessions.get_session(sid) {
			Some(s) => s,
			None => {
				let e = Error::UnknownSession;
				return error_response(StatusCode::NOT_FOUND, jsonrpc_error(id, &e));
			},
		}
	};

	let result = session.relay.handle(msg).await;
	end_span(span, &result);
	match result {
		Ok(Some(resp)) => (
			StatusCode::OK,
			[
				(header::CONTENT_TYPE, "application/json".to_string()),
				(
					header::HeaderName::from_static(HEADER_SESSION_ID),
					session.id.to_string(),
				),
			],
			Json(resp),
		)
			.into_response(),
		Ok(None) => StatusCode::ACCEPTED.into_response(),
		Err(e) => error_response(StatusCode::OK, jsonrpc_error(id, &e)),
	}
}

fn error_response(status: StatusCode, body: Value) -> Response {
	(status, Json(body)).into_response()
}

fn start_span(
	app: &App,
	header_attributes: &std::collections::HashMap<String, String>,
	headers: &HeaderMap,
	msg: &Value,
	method: &str,
) -> Option<opentelemetry_sdk::trace::Span> {
	let tracer = app.tracing.tracer.as_ref()?;
	let parent = app.tracing.propagation.extract(headers);
	let mut span = tracer
		.span_builder(format!("mcp {method}"))
		.with_kind(SpanKind::Server)
		.start_with_context(tracer.as_ref(), &parent);
	let meta = msg.pointer("/params/_meta");
	for (key, attr) in header_attributes {
		let from_meta = meta
			.and_then(|m| m.get(key))
			.and_then(|v| v.as_str())
			.map(|s| s.to_string());
		let value = from_meta.or_else(|| {
			headers
				.get(key.to_ascii_lowercase())
				.and_then(|v| v.to_str().ok())
				.map(|s| s.to_string())
		});
		if let Some(v) = value {
			span.set_attribute(KeyValue::new(attr.clone(), v));
		}
	}
	span.set_attribute(KeyValue::new("rpc.system", "jsonrpc"));
	span.set_attribute(KeyValue::new("rpc.method", method.to_string()));
	Some(span)
}

fn end_span(
	span: Option<opentelemetry_sdk::trace::Span>,
	result: &Result<Option<Value>, Error>,
) {
	let Some(mut span) = span else { return };
	if let Err(e) = result {
		span.set_status(opentelemetry::trace::Status::error(e.to_string()));
		span.set_attribute(KeyValue::new("rpc.jsonrpc.error_code", e.code()));
	}
	span.end();
}

/// The server-initiated stream: change notifications flow to the client as
/// SSE events.
async fn handle_get(State(app): State<App>, headers: HeaderMap) -> Response {
	let sid = headers
		.get(HEADER_SESSION_ID)
		.and_then(|v| v.to_str().ok());
	let Some(sid) = sid else {
		return StatusCode::BAD_REQUEST.into_response();
	};
	let Some(session) = app.sessions.get_session(sid) else {
		return StatusCode::NOT_FOUND.into_response();
	};
	let rx = session.relay.subscribe();
	let stream = BroadcastStream::new(rx).filter_map(|msg| {
		let msg = msg.ok()?;
		let data = serde_json::to_string(&msg).ok()?;
		Some(Ok::<_, std::convert::Infallible>(
			axum::response::sse::Event::default().data(data),
		))
	});
	axum::response::sse::Sse::new(stream)
		.keep_alive(axum::response::sse::KeepAlive::default())
		.into_response()
}

async fn handle_delete(State(app): State<App>, headers: HeaderMap) -> Response {
	let sid = headers
		.get(HEADER_SESSION_ID)
		.and_then(|v| v.to_str().ok());
	let Some(sid) = sid else {
		return StatusCode::BAD_REQUEST.into_response();
	};
	if app.sessions.delete_session(sid).await {
		StatusCode::NO_CONTENT.into_response()
	} else {
		StatusCode::NOT_FOUND.into_response()
	}
}
