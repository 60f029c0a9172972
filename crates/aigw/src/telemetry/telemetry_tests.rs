use std::sync::Mutex;

use opentelemetry::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};
use opentelemetry_sdk::trace::SdkTracerProvider;

use super::metrics::Metrics;
use super::recorder::{REDACTED, RedactionFlags, RequestTracer};
use super::trc::{Propagation, Tracing};
use crate::llm::{LLMRequest, RouteType, TokenUsage};
use crate::*;

fn span_context() -> SpanContext {
	SpanContext::new(
		TraceId::from_hex("0af7651916cd43dd8448eb211c80319c").unwrap(),
		SpanId::from_hex("b7ad6b7169203331").unwrap(),
		TraceFlags::SAMPLED,
		false,
		TraceState::default(),
	)
}

#[test]
fn injection_covers_every_configured_propagator() {
	let propagation = Propagation::from_names(["tracecontext", "b3"]);
	let mut headers = http::HeaderMap::new();
	propagation.inject(&span_context(), &mut headers);
	let tp = headers.get("traceparent").expect("traceparent").to_str().unwrap();
	assert_eq!(
		tp,
		"00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01"
	);
	let b3 = headers.get("b3").expect("b3").to_str().unwrap();
	assert_eq!(
		b3,
		"0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-1"
	);
}

#[test]
fn b3_multi_injection_and_extraction() {
	let propagation = Propagation::from_names(["b3multi"]);
	let mut headers = http::HeaderMap::new();
	propagation.inject(&span_context(), &mut headers);
	assert_eq!(
		headers.get("x-b3-traceid").unwrap().to_str().unwrap(),
		"0af7651916cd43dd8448eb211c80319c"
	);
	assert_eq!(headers.get("x-b3-sampled").unwrap(), "1");

	let cx = propagation.extract(&headers);
	use opentelemetry::trace::TraceContextExt;
	let sc = cx.span().span_context().clone();
	assert!(sc.is_valid());
	assert!(sc.is_sampled());
	assert_eq!(
		sc.trace_id(),
		TraceId::from_hex("0af7651916cd43dd8448eb211c80319c").unwrap()
	);
}

#[test]
fn b3_single_header_extraction() {
	let propagation = Propagation::from_names(["b3"]);
	let mut headers = http::HeaderMap::new();
	headers.insert(
		"b3",
		"80f198ee56343ba864fe8b2a57d3eff7-e457b5a2e4d86bd1-1"
			.parse()
			.unwrap(),
	);
	let cx = propagation.extract(&headers);
	use opentelemetry::trace::TraceContextExt;
	assert!(cx.span().span_context().is_valid());
}

#[test]
fn disabled_sdk_still_propagates() {
	let tracer = RequestTracer::new(
		Tracing::disabled(),
		RedactionFlags::default(),
		&Default::default(),
	);
	let llm = LLMRequest {
		request_model: strng::literal!("gpt-4o"),
		provider: strng::literal!("openai"),
		streaming: false,
		route: RouteType::ChatCompletions,
	};
	let mut sink = http::HeaderMap::new();
	let span = tracer.start_span(&llm, &http::HeaderMap::new(), &mut sink, b"{}");
	assert!(span.is_none(), "no recording span without an SDK");
	assert!(
		sink.get("traceparent").is_some(),
		"propagation must outlive the disabled SDK"
	);
}

/// Captures ended spans so attribute policy can be asserted.
#[derive(Debug, Clone, Default)]
struct CapturingExporter {
	spans: Arc<Mutex<Vec<opentelemetry_sdk::trace::SpanData>>>,
}

impl opentelemetry_sdk::trace::SpanExporter for CapturingExporter {
	fn export(
		&self,
		batch: Vec<opentelemetry_sdk::trace::SpanData>,
	) -> impl std::future::Future<Output = opentelemetry_sdk::error::OTelSdkResult> + Send {
		self.spans.lock().unwrap().extend(batch);
		std::future::ready(Ok(()))
	}
}

fn capturing_tracing() -> (Tracing, CapturingExporter) {
	use opentelemetry::trace::TracerProvider as _;
	let exporter = CapturingExporter::default();
	let provider = SdkTracerProvider::builder()
		.with_simple_exporter(exporter.clone())
		.build();
	let tracer = Arc::new(provider.tracer("test"));
	let tracing = Tracing {
		tracer: Some(tracer),
		provider: Some(provider),
		propagation: Arc::new(Propagation::from_names(["tracecontext"])),
	};
	(tracing, exporter)
}

#[test]
fn hide_inputs_redacts_the_request_body() {
	let (tracing, exporter) = capturing_tracing();
	let tracer = RequestTracer::new(
		tracing,
		RedactionFlags {
			hide_inputs: true,
			..Default::default()
		},
		&Default::default(),
	);
	let llm = LLMRequest {
		request_model: strng::literal!("gpt-4o"),
		provider: strng::literal!("openai"),
		streaming: false,
		route: RouteType::ChatCompletions,
	};
	let secret_body = br#"{"messages":[{"role":"user","content":"super secret prompt"}]}"#;
	let mut sink = http::HeaderMap::new();
	let span = tracer
		.start_span(&llm, &http::HeaderMap::new(), &mut sink, secret_body)
		.expect("recording span");
	span.end(&TokenUsage::default());

	let spans = exporter.spans.lock().unwrap();
	let span = spans.last().expect("span exported");
	let mut saw_sentinel = false;
	for kv in &span.attributes {
		let value = kv.value.as_str();
		assert!(
			!value.contains("super secret prompt"),
			"attribute {} leaked the input",
			kv.key
		);
		if value == REDACTED {
			saw_sentinel = true;
		}
	}
	assert!(saw_sentinel, "the {REDACTED} sentinel must be recorded");
}

#[test]
fn configured_headers_map_to_attributes() {
	let (tracing, exporter) = capturing_tracing();
	let mut map = std::collections::HashMap::new();
	map.insert("X-Session-Id".to_string(), "session.id".to_string());
	let tracer = RequestTracer::new(tracing, RedactionFlags::default(), &map);
	let llm = LLMRequest {
		request_model: strng::literal!("gpt-4o"),
		provider: strng::literal!("openai"),
		streaming: false,
		route: RouteType::ChatCompletions,
	};
	let mut inbound = http::HeaderMap::new();
	inbound.insert("x-session-id", "abc-123".parse().unwrap());
	let mut sink = http::HeaderMap::new();
	let span = tracer
		.start_span(&llm, &inbound, &mut sink, b"{}")
		.expect("recording span");
	span.end(&TokenUsage::default());

	let spans = exporter.spans.lock().unwrap();
	let span = spans.last().unwrap();
	assert!(
		span
			.attributes
			.iter()
			.any(|kv| kv.key.as_str() == "session.id" && kv.value.as_str() == "abc-123"),
		"header must map to the configured attribute case-insensitively"
	);
}

#[test]
fn metrics_register_and_record() {
	let mut registry = prometheus_client::registry::Registry::default();
	let metrics = Metrics::new(&mut registry);
	let llm = LLMRequest {
		request_model: strng::literal!("gpt-4o"),
		provider: strng::literal!("openai"),
		streaming: true,
		route: RouteType::ChatCompletions,
	};
	metrics.record(
		&llm,
		&TokenUsage {
			input_tokens: 10,
			output_tokens: 20,
			total_tokens: 30,
			cached_tokens: Some(4),
			reasoning_tokens: None,
		},
		Duration::from_millis(500),
	);
	let mut out = String::new();
	prometheus_client::encoding::text::encode(&mut out, &registry).unwrap();
	assert!(out.contains("gen_ai_server_time_per_output_token_seconds"));
	assert!(out.contains("gen_ai_client_token_usage"));
	assert!(out.contains("gen_ai_token_type=\"cached_tokens\""));
	assert!(out.contains("gen_ai_request_model=\"gpt-4o\""));
}
