use std::collections::HashMap;

use opentelemetry::trace::{
	Span as _, SpanContext, SpanId, SpanKind, TraceContextExt, TraceFlags, TraceId, TraceState,
	Tracer as _,
};
use opentelemetry::KeyValue;
use rand::RngExt;

use super::trc::Tracing;
use crate::llm::{LLMRequest, RouteType, TokenUsage};
use crate::*;

/// The literal recorded in place of any redacted payload.
pub const REDACTED: &str = "__REDACTED__";

/// Redaction switches, read once at startup.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedactionFlags {
	pub hide_inputs: bool,
	pub hide_outputs: bool,
	pub hide_embeddings_text: bool,
	pub hide_embeddings_vectors: bool,
}

impl RedactionFlags {
	pub fn from_env() -> Self {
		let flag = |name: &str| {
			std::env::var(name)
				.map(|v| v.eq_ignore_ascii_case("true") || v == "1")
				.unwrap_or(false)
		};
		Self {
			hide_inputs: flag("OPENINFERENCE_HIDE_INPUTS"),
			hide_outputs: flag("OPENINFERENCE_HIDE_OUTPUTS"),
			hide_embeddings_text: flag("OPENINFERENCE_HIDE_EMBEDDINGS_TEXT"),
			hide_embeddings_vectors: flag("OPENINFERENCE_HIDE_EMBEDDINGS_VECTORS"),
		}
	}
}

/// Starts spans for one endpoint family and owns the attribute policy.
#[derive(Clone)]
pub struct RequestTracer {
	tracing: Tracing,
	redaction: RedactionFlags,
	// header name (lowercase) -> attribute name
	header_attributes: Arc<HashMap<String, String>>,
}

impl RequestTracer {
	pub fn new(
		tracing: Tracing,
		redaction: RedactionFlags,
		header_attributes: &HashMap<String, String>,
	) -> Self {
		Self {
			tracing,
			redaction,
			header_attributes: Arc::new(
				header_attributes
					.iter()
					.map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
					.collect(),
			),
		}
	}

	/// Extracts the parent context, starts a span, and injects trace context
	/// into `sink` — always, even unsampled, so downstream propagation holds.
	/// Returns a recording span only when the span is sampled.
	pub fn start_span(
		&self,
		llm: &LLMRequest,
		inbound: &http::HeaderMap,
		sink: &mut http::HeaderMap,
		body: &[u8],
	) -> Option<RequestSpan> {
		let parent = self.tracing.propagation.extract(inbound);
		let Some(tracer) = &self.tracing.tracer else {
			// No SDK: keep propagation alive with fresh or inherited ids
			let sc = passthrough_context(&parent);
			self.tracing.propagation.inject(&sc, sink);
			return None;
		};

		let name = format!("{} {}", llm.route.operation_name(), llm.request_model);
		let span = tracer
			.span_builder(name)
			.with_kind(SpanKind::Server)
			.start_with_context(tracer.as_ref(), &parent);
		self
			.tracing
			.propagation
			.inject(span.span_context(), sink);

		if !span.is_recording() {
			return None;
		}
		let mut span = RequestSpan {
			span,
			redaction: self.redaction,
			route: llm.route,
			chunks: 0,
			start: Instant::now(),
		};
		span.record_request(llm, inbound, body, &self.header_attributes);
		Some(span)
	}
}

/// When the provider is off there is no span to propagate; ids are minted so
/// downstream systems still see a coherent trace.
fn passthrough_context(parent: &opentelemetry::Context) -> SpanContext {
	let parent_sc = parent.span().span_context().clone();
	let mut rng = rand::rng();
	let span_id = SpanId::from_bytes(rng.random::<[u8; 8]>());
	if parent_sc.is_valid() {
		SpanContext::new(
			parent_sc.trace_id(),
			span_id,
			parent_sc.trace_flags(),
			false,
			parent_sc.trace_state().clone(),
		)
	} else {
		SpanContext::new(
			TraceId::from_bytes(rng.random::<[u8; 16]>()),
			span_id,
			TraceFlags::default(),
			false,
			TraceState::default(),
		)
	}
}

/// A live request span. Ended exactly once on every exit path.
pub struct RequestSpan {
	span: opentelemetry_sdk::trace::Span,
	redaction: RedactionFlags,
	route: RouteType,
	chunks: u64,
	start: Instant,
}

impl RequestSpan {
	fn record_request(
		&mut self,
		llm: &LLMRequest,
		inbound: &http::HeaderMap,
		body: &[u8],
		header_attributes: &HashMap<String, String>,
	) {
		self.span.set_attribute(KeyValue::new(
			"gen_ai.operation.name",
			llm.route.operation_name().to_string(),
		));
		self.span.set_attribute(KeyValue::new(
			"gen_ai.request.model",
			llm.request_model.to_string(),
		));
		self
			.span
			.set_attribute(KeyValue::new("gen_ai.system", llm.provider.to_string()));

		let hide = match self.route {
			RouteType::Embeddings => self.redaction.hide_inputs || self.redaction.hide_embeddings_text,
			_ => self.redaction.hide_inputs,
		};
		let input = if hide {
			REDACTED.to_string()
		} else {
			String::from_utf8_lossy(body).to_string()
		};
		self.span.set_attribute(KeyValue::new("input.value", input));

		for (name, value) in inbound {
			if let Some(attr) = header_attributes.get(name.as_str())
				&& let Ok(v) = value.to_str()
			{
				self
					.span
					.set_attribute(KeyValue::new(attr.clone(), v.to_string()));
			}
		}
	}

	pub fn record_response_chunk(&mut self) {
		self.chunks += 1;
	}

	pub fn record_response(&mut self, body: &[u8]) {
		let hide = match self.route {
			RouteType::Embeddings => {
				self.redaction.hide_outputs || self.redaction.hide_embeddings_vectors
			},
			_ => self.redaction.hide_outputs,
		};
		let output = if hide {
			REDACTED.to_string()
		} else {
			String::from_utf8_lossy(body).to_string()
		};
		self.span.set_attribute(KeyValue::new("output.value", output));
	}

	pub fn end(mut self, usage: &TokenUsage) {
		self.span.set_attribute(KeyValue::new(
			"gen_ai.usage.input_tokens",
			usage.input_tokens as i64,
		));
		self.span.set_attribute(KeyValue::new(
			"gen_ai.usage.output_tokens",
			usage.output_tokens as i64,
		));
		if self.chunks > 0 {
			self
				.span
				.set_attribute(KeyValue::new("gen_ai.response.chunks", self.chunks as i64));
		}
		self.span.end();
	}

	pub fn end_on_error(mut self, status: u16, body: &[u8]) {
		self.span.set_status(opentelemetry::trace::Status::error(
			String::from_utf8_lossy(body).to_string(),
		));
		self
			.span
			.set_attribute(KeyValue::new("http.response.status_code", status as i64));
		self.span.end();
	}

	pub fn end_cancelled(mut self) {
		self
			.span
			.set_status(opentelemetry::trace::Status::error("cancelled"));
		self.span.end();
	}

	pub fn elapsed(&self) -> Duration {
		self.start.elapsed()
	}
}
