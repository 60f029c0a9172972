use std::env;

use once_cell::sync::Lazy;
use opentelemetry::propagation::text_map_propagator::FieldIter;
use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
use opentelemetry::trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};

use crate::*;

pub const DEFAULT_SERVICE_NAME: &str = "ai-gateway";

/// Process-wide tracer state built from the standard `OTEL_*` environment.
#[derive(Clone)]
pub struct Tracing {
	pub tracer: Option<Arc<opentelemetry_sdk::trace::SdkTracer>>,
	pub provider: Option<SdkTracerProvider>,
	pub propagation: Arc<Propagation>,
}

impl std::fmt::Debug for Tracing {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Tracing")
			.field("enabled", &self.tracer.is_some())
			.finish()
	}
}

impl Tracing {
	/// Builds the provider from `OTEL_SDK_DISABLED`, `OTEL_TRACES_EXPORTER`,
	/// `OTEL_EXPORTER_OTLP_*`, `OTEL_TRACES_SAMPLER` and `OTEL_PROPAGATORS`.
	/// Propagation is configured even when the SDK is disabled, so trace
	/// context keeps flowing downstream.
	pub fn from_env() -> anyhow::Result<Tracing> {
		let propagation = Arc::new(Propagation::from_env());
		if env_flag("OTEL_SDK_DISABLED") {
			return Ok(Tracing {
				tracer: None,
				provider: None,
				propagation,
			});
		}
		let exporter = env::var("OTEL_TRACES_EXPORTER").unwrap_or_else(|_| "otlp".to_string());
		let provider = match exporter.as_str() {
			"none" => None,
			"console" => Some(
				SdkTracerProvider::builder()
					.with_resource(resource())
					.with_sampler(sampler_from_env())
					.with_simple_exporter(ConsoleExporter)
					.build(),
			),
			_ => {
				let endpoint = env::var("OTEL_EXPORTER_OTLP_TRACES_ENDPOINT")
					.or_else(|_| env::var("OTEL_EXPORTER_OTLP_ENDPOINT"))
					.unwrap_or_else(|_| "http://localhost:4317".to_string());
				let protocol = env::var("OTEL_EXPORTER_OTLP_PROTOCOL")
					.unwrap_or_else(|_| "grpc".to_string());
				let exporter = if protocol.starts_with("http") {
					opentelemetry_otlp::SpanExporter::builder()
						.with_http()
						.with_endpoint(format!(
							"{}/v1/traces",
							endpoint.strip_suffix('/').unwrap_or(&endpoint)
						))
						.build()?
				} else {
					opentelemetry_otlp::SpanExporter::builder()
						.with_tonic()
						.with_endpoint(endpoint)
						.build()?
				};
				Some(
					SdkTracerProvider::builder()
						.with_resource(resource())
						.with_sampler(sampler_from_env())
						.with_batch_exporter(exporter)
						.build(),
				)
			},
		};
		use opentelemetry::trace::TracerProvider as _;
		let tracer = provider
			.as_ref()
			.map(|p| Arc::new(p.tracer(DEFAULT_SERVICE_NAME)));
		Ok(Tracing {
			tracer,
			provider,
			propagation,
		})
	}

	pub fn disabled() -> Tracing {
		Tracing {
			tracer: None,
			provider: None,
			propagation: Arc::new(Propagation::default()),
		}
	}

	/// Flushes and shuts the provider down; bounded by the caller's deadline.
	pub fn shutdown(&self) {
		if let Some(p) = &self.provider {
			let _ = p.force_flush();
			let _ = p.shutdown();
		}
	}
}

fn env_flag(name: &str) -> bool {
	env::var(name)
		.map(|v| v.eq_ignore_ascii_case("true") || v == "1")
		.unwrap_or(false)
}

fn resource() -> Resource {
	let service = env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| DEFAULT_SERVICE_NAME.to_string());
	Resource::builder()
		.with_service_name(service)
		.with_attribute(KeyValue::new(
			"service.version",
			aigw_core::version::BuildInfo::new().version,
		))
		.build()
}

fn sampler_from_env() -> Sampler {
	let name = env::var("OTEL_TRACES_SAMPLER").unwrap_or_else(|_| "parentbased_always_on".into());
	let arg = || {
		env::var("OTEL_TRACES_SAMPLER_ARG")
			.ok()
			.and_then(|v| v.parse::<f64>().ok())
			.unwrap_or(1.0)
	};
	match name.as_str() {
		"always_off" => Sampler::AlwaysOff,
		"always_on" => Sampler::AlwaysOn,
		"traceidratio" => Sampler::TraceIdRatioBased(arg()),
		"parentbased_always_off" => Sampler::ParentBased(Box::new(Sampler::AlwaysOff)),
		"parentbased_traceidratio" => {
			Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(arg())))
		},
		_ => Sampler::ParentBased(Box::new(Sampler::AlwaysOn)),
	}
}

/// A simple-span console exporter; spans land in the process log.
#[derive(Debug, Default)]
struct ConsoleExporter;

impl opentelemetry_sdk::trace::SpanExporter for ConsoleExporter {
	fn export(
		&self,
		batch: Vec<opentelemetry_sdk::trace::SpanData>,
	) -> impl std::future::Future<Output = opentelemetry_sdk::error::OTelSdkResult> + Send {
		for span in &batch {
			info!(
				name = %span.name,
				trace_id = %span.span_context.trace_id(),
				span_id = %span.span_context.span_id(),
				"span"
			);
		}
		std::future::ready(Ok(()))
	}
}

/// The configured text-map propagators. Injection covers every configured
/// propagator, regardless of sampling.
pub struct Propagation {
	propagators: Vec<PropagatorKind>,
}

enum PropagatorKind {
	TraceContext(TraceContextPropagator),
	B3(B3Propagator),
}

impl Default for Propagation {
	fn default() -> Self {
		Propagation {
			propagators: vec![PropagatorKind::TraceContext(TraceContextPropagator::new())],
		}
	}
}

impl Propagation {
	/// `OTEL_PROPAGATORS`: comma-separated from {tracecontext, b3, b3multi,
	/// none}; default tracecontext.
	pub fn from_env() -> Propagation {
		let raw = env::var("OTEL_PROPAGATORS").unwrap_or_else(|_| "tracecontext".to_string());
		Self::from_names(raw.split(',').map(|s| s.trim()))
	}

	pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Propagation {
		let mut propagators = Vec::new();
		for name in names {
			match name {
				"tracecontext" => {
					propagators.push(PropagatorKind::TraceContext(TraceContextPropagator::new()));
				},
				"b3" => propagators.push(PropagatorKind::B3(B3Propagator { single_header: true })),
				"b3multi" => {
					propagators.push(PropagatorKind::B3(B3Propagator {
						single_header: false,
					}));
				},
				"none" => propagators.clear(),
				other => warn!("unsupported propagator {other:?}, skipping"),
			}
		}
		Propagation { propagators }
	}

	pub fn extract(&self, headers: &http::HeaderMap) -> Context {
		let extractor = opentelemetry_http::HeaderExtractor(headers);
		let mut cx = Context::new();
		for p in &self.propagators {
			cx = match p {
				PropagatorKind::TraceContext(p) => p.extract_with_context(&cx, &extractor),
				PropagatorKind::B3(p) => p.extract_with_context(&cx, &extractor),
			};
			if cx.span().span_context().is_valid() {
				break;
			}
		}
		cx
	}

	pub fn inject(&self, span_context: &SpanContext, headers: &mut http::HeaderMap) {
		let cx = Context::new().with_remote_span_context(span_context.clone());
		let mut injector = opentelemetry_http::HeaderInjector(headers);
		for p in &self.propagators {
			match p {
				PropagatorKind::TraceContext(p) => p.inject_context(&cx, &mut injector),
				PropagatorKind::B3(p) => p.inject_context(&cx, &mut injector),
			}
		}
	}
}

const B3_SINGLE: &str = "b3";
const B3_TRACE_ID: &str = "x-b3-traceid";
const B3_SPAN_ID: &str = "x-b3-spanid";
const B3_SAMPLED: &str = "x-b3-sampled";

static B3_FIELDS: Lazy<[String; 4]> = Lazy::new(|| {
	[
		B3_SINGLE.to_string(),
		B3_TRACE_ID.to_string(),
		B3_SPAN_ID.to_string(),
		B3_SAMPLED.to_string(),
	]
});

/// B3 propagation. Injection uses the single-header form when configured as
/// `b3`, the multi-header form for `b3multi`; extraction accepts both.
#[derive(Debug)]
pub struct B3Propagator {
	pub single_header: bool,
}

impl B3Propagator {
	fn extract_span_context(&self, extractor: &dyn Extractor) -> Option<SpanContext> {
		if let Some(single) = extractor.get(B3_SINGLE) {
			let mut parts = single.split('-');
			let trace_id = TraceId::from_hex(parts.next()?).ok()?;
			let span_id = SpanId::from_hex(parts.next()?).ok()?;
			let sampled = parts.next().map(|s| s == "1" || s == "d").unwrap_or(false);
			return Some(SpanContext::new(
				trace_id,
				span_id,
				if sampled {
					TraceFlags::SAMPLED
				} else {
					TraceFlags::default()
				},
				true,
				TraceState::default(),
			));
		}
		let trace_id = TraceId::from_hex(extractor.get(B3_TRACE_ID)?).ok()?;
		let span_id = SpanId::from_hex(extractor.get(B3_SPAN_ID)?).ok()?;
		let sampled = extractor
			.get(B3_SAMPLED)
			.map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
			.unwrap_or(false);
		Some(SpanContext::new(
			trace_id,
			span_id,
			if sampled {
				TraceFlags::SAMPLED
			} else {
				TraceFlags::default()
			},
			true,
			TraceState::default(),
		))
	}
}

impl TextMapPropagator for B3Propagator {
	fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
		let span_context = cx.span().span_context().clone();
		if !span_context.is_valid() {
			return;
		}
		let sampled = if span_context.is_sampled() { "1" } else { "0" };
		if self.single_header {
			injector.set(
				B3_SINGLE,
				format!(
					"{}-{}-{}",
					span_context.trace_id(),
					span_context.span_id(),
					sampled
				),
			);
		} else {
			injector.set(B3_TRACE_ID, span_context.trace_id().to_string());
			injector.set(B3_SPAN_ID, span_context.span_id().to_string());
			injector.set(B3_SAMPLED, sampled.to_string());
		}
	}

	fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
		match self.extract_span_context(extractor) {
			Some(sc) => cx.with_remote_span_context(sc),
			None => cx.clone(),
		}
	}

	fn fields(&self) -> FieldIter<'_> {
		FieldIter::new(B3_FIELDS.as_ref())
	}
}
