use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

use crate::config::{ApiSchema, BackendConfig, ConfigStore, GatewayConfig};
use crate::llm::translate::{ErrorTranslator, ResponseTranslator, StreamTranslator};
use crate::llm::{AIError, LLMRequest, RouteType, TokenUsage};
use crate::telemetry::metrics::Metrics;
use crate::telemetry::recorder::{RequestSpan, RequestTracer};
use crate::*;

pub mod proto;

#[cfg(test)]
#[path = "extproc_tests.rs"]
mod tests;

use proto::external_processor_server::ExternalProcessor;
use proto::processing_request::Request as Inbound;
use proto::processing_response::Response as Outbound;
use proto::{
	BodyMutation, BodyResponse, CommonResponse, GrpcStatus, HeaderMap as ProtoHeaderMap,
	HeaderMutation, HeaderValue, HeaderValueOption, HeadersResponse, HttpStatus,
	ImmediateResponse, ProcessingMode, ProcessingRequest, ProcessingResponse, body_mutation,
	processing_mode,
};

/// Header carrying backends already tried on this request; the proxy echoes
/// it on retry so fallback walks the list instead of looping.
pub const ATTEMPTED_BACKENDS_HEADER: &str = "x-ai-eg-attempted-backends";
/// Header naming the backend the proxy should retry against.
pub const FALLBACK_TO_HEADER: &str = "x-ai-eg-fallback-to";

const MAX_REQUEST_BODY: usize = 16 * 1024 * 1024;

/// The ExtProc gRPC service. Each bidirectional stream is one HTTP request;
/// a single task owns the per-stream state for its whole life.
#[derive(Clone)]
pub struct ExtProcService {
	pub config: Arc<ConfigStore>,
	pub metrics: Arc<Metrics>,
	pub tracer: RequestTracer,
}

#[tonic::async_trait]
impl ExternalProcessor for ExtProcService {
	type ProcessStream = ReceiverStream<Result<ProcessingResponse, Status>>;

	async fn process(
		&self,
		request: Request<Streaming<ProcessingRequest>>,
	) -> Result<Response<Self::ProcessStream>, Status> {
		let inbound = request.into_inner();
		let (tx, rx) = mpsc::channel(16);
		let handler = StreamHandler::new(
			self.config.load(),
			self.metrics.clone(),
			self.tracer.clone(),
		);
		tokio::spawn(drive(inbound, tx, handler));
		Ok(Response::new(ReceiverStream::new(rx)))
	}
}

async fn drive(
	mut inbound: Streaming<ProcessingRequest>,
	tx: mpsc::Sender<Result<ProcessingResponse, Status>>,
	mut handler: StreamHandler,
) {
	loop {
		let msg = match inbound.message().await {
			Ok(Some(msg)) => msg,
			// The proxy closed the stream: request finished or was cancelled
			Ok(None) => break,
			Err(e) => {
				debug!("ext_proc stream error: {e}");
				break;
			},
		};
		let Some(req) = msg.request else { continue };
		let responses = handler.on_message(req).await;
		for resp in responses {
			if tx.send(Ok(resp)).await.is_err() {
				handler.on_cancel();
				return;
			}
		}
		if matches!(handler.phase, Phase::Done | Phase::Failed) {
			break;
		}
	}
	handler.on_cancel();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
	AwaitReqHeaders,
	AwaitReqBody,
	AwaitRespHeaders,
	AwaitRespBody,
	Done,
	Failed,
}

/// Per-stream state machine. Owned by exactly one task.
struct StreamHandler {
	config: Arc<GatewayConfig>,
	metrics: Arc<Metrics>,
	tracer: RequestTracer,
	phase: Phase,

	// Request side
	req_headers: http::HeaderMap,
	path: String,
	route_type: Option<RouteType>,
	attempted: Vec<Strng>,
	rule_name: Option<Strng>,
	backend: Option<BackendConfig>,
	llm: Option<LLMRequest>,
	req_body: BytesMut,

	// Response side
	resp_status: u16,
	resp_gzip: bool,
	resp_body: BytesMut,
	stream_translator: Option<Box<dyn StreamTranslator>>,
	response_translator: Option<Box<dyn ResponseTranslator>>,
	error_translator: Option<Box<dyn ErrorTranslator>>,
	resp_headers: http::HeaderMap,
	forwarded_bytes: u64,

	span: Option<RequestSpan>,
	usage: TokenUsage,
}

impl StreamHandler {
	fn new(config: Arc<GatewayConfig>, metrics: Arc<Metrics>, tracer: RequestTracer) -> Self {
		Self {
			config,
			metrics,
			tracer,
			phase: Phase::AwaitReqHeaders,
			req_headers: http::HeaderMap::new(),
			path: String::new(),
			route_type: None,
			attempted: Vec::new(),
			rule_name: None,
			backend: None,
			llm: None,
			req_body: BytesMut::new(),
			resp_status: 0,
			resp_gzip: false,
			resp_body: BytesMut::new(),
			stream_translator: None,
			response_translator: None,
			error_translator: None,
			resp_headers: http::HeaderMap::new(),
			forwarded_bytes: 0,
			span: None,
			usage: TokenUsage::default(),
		}
	}

	async fn on_message(&mut self, msg: Inbound) -> Vec<ProcessingResponse> {
		match (self.phase, msg) {
			(Phase::AwaitReqHeaders, Inbound::RequestHeaders(h)) => self.on_request_headers(h),
			(Phase::AwaitReqBody, Inbound::RequestBody(b)) => self.on_request_body(b).await,
			(Phase::AwaitRespHeaders, Inbound::ResponseHeaders(h)) => self.on_response_headers(h),
			(Phase::AwaitRespBody, Inbound::ResponseBody(b)) => self.on_response_body(b).await,
			(_, Inbound::RequestTrailers(_)) => {
				vec![ProcessingResponse {
					mode_override: None,
					response: Some(Outbound::RequestTrailers(Default::default())),
				}]
			},
			(_, Inbound::ResponseTrailers(_)) => {
				vec![ProcessingResponse {
					mode_override: None,
					response: Some(Outbound::ResponseTrailers(Default::default())),
				}]
			},
			(phase, msg) => {
				warn!(?phase, "out-of-order ext_proc message {:?}", message_kind(&msg));
				self.phase = Phase::Failed;
				vec![immediate_plain(500, "protocol error")]
			},
		}
	}

	fn on_request_headers(&mut self, h: proto::HttpHeaders) -> Vec<ProcessingResponse> {
		let (headers, pseudo) = from_proto_headers(h.headers.as_ref());
		self.req_headers = headers;
		let method = pseudo.method.unwrap_or_default();
		self.path = pseudo.path.unwrap_or_default();

		self.attempted = self
			.req_headers
			.get(ATTEMPTED_BACKENDS_HEADER)
			.and_then(|v| v.to_str().ok())
			.map(|v| v.split(',').map(|s| strng::new(s.trim())).collect())
			.unwrap_or_default();

		let Some(route_type) = RouteType::from_path(&method, &self.path) else {
			self.phase = Phase::Done;
			return vec![immediate_plain(
				404,
				&format!("unsupported path: {}", self.path),
			)];
		};
		self.route_type = Some(route_type);

		if route_type == RouteType::Models {
			// Served from the declared catalog; no backend involved
			self.phase = Phase::Done;
			let body = crate::router::models_response(&self.config);
			return vec![immediate_json(200, body)];
		}

		// Everything else reshapes JSON, so the body must be buffered
		self.phase = Phase::AwaitReqBody;
		vec![ProcessingResponse {
			mode_override: Some(ProcessingMode {
				request_body_mode: processing_mode::BodySendMode::Buffered as i32,
				..Default::default()
			}),
			response: Some(Outbound::RequestHeaders(HeadersResponse { response: None })),
		}]
	}

	async fn on_request_body(&mut self, b: proto::HttpBody) -> Vec<ProcessingResponse> {
		if self.req_body.len() + b.body.len() > MAX_REQUEST_BODY {
			self.phase = Phase::Failed;
			return vec![self.client_error(413, "request body too large")];
		}
		self.req_body.put_slice(&b.body);
		if !b.end_of_stream {
			return vec![ProcessingResponse {
				mode_override: None,
				response: Some(Outbound::RequestBody(BodyResponse { response: None })),
			}];
		}
		// Transparent request decompression; the translated body goes out
		// uncompressed
		let raw = self.req_body.split().freeze();
		match crate::parse::compression::decode_body(&self.req_headers, raw).await {
			Ok((raw, _)) => self.req_body = BytesMut::from(raw.as_ref()),
			Err(e) => {
				self.phase = Phase::Failed;
				return vec![
					self.ai_error(&AIError::ProtocolFraming(format!("invalid gzip body: {e}"))),
				];
			},
		}
		match self.translate_request() {
			Ok(resp) => vec![resp],
			Err(err) => {
				self.phase = Phase::Failed;
				vec![self.ai_error(&err)]
			},
		}
	}

	fn translate_request(&mut self) -> Result<ProcessingResponse, AIError> {
		let route_type = self.route_type.expect("set at request headers");
		let mut body: serde_json::Value =
			serde_json::from_slice(&self.req_body).map_err(AIError::RequestParsing)?;

		let model = crate::router::extract_model(
			&self.config,
			&self.req_headers,
			&self.path,
			Some(&body),
		)
		.ok_or(AIError::MissingField(strng::literal!("model")))?;

		// The chosen model rides on a stable header for rule matching and
		// downstream metric labels
		let mut effective_headers = self.req_headers.clone();
		if let Ok(v) = http::HeaderValue::from_str(&model) {
			effective_headers.insert(
				http::header::HeaderName::try_from(self.config.model_name_header.as_str())
					.expect("config header name is valid"),
				v,
			);
		}

		let route = crate::router::select_route(&self.config, &effective_headers)
			.ok_or(AIError::ModelNotFound)?;
		let backend =
			crate::router::select_backend(route, &self.attempted).ok_or(AIError::ModelNotFound)?;
		self.rule_name = Some(route.name.clone());

		crate::router::apply_mutations(&mut body, backend);
		let (action, llm) = crate::llm::translate_request(route_type, backend, &body)?;

		// Telemetry: the span starts at route decision, and trace context is
		// injected into the upstream headers whether sampled or not
		let mut sink = http::HeaderMap::new();
		let span = self
			.tracer
			.start_span(&llm, &self.req_headers, &mut sink, &action.body);
		self.span = span;

		let mut set_headers: Vec<(String, String)> = vec![
			(":path".to_string(), action.path.clone()),
			(":authority".to_string(), action.authority.to_string()),
			("host".to_string(), action.authority.to_string()),
			(
				self.config.selected_route_header.to_string(),
				route.name.to_string(),
			),
			(
				self.config.model_name_header.to_string(),
				llm.request_model.to_string(),
			),
		];
		for (k, v) in &action.set_headers {
			set_headers.push((k.to_string(), v.clone()));
		}
		for (k, v) in sink.iter() {
			set_headers.push((
				k.as_str().to_string(),
				v.to_str().unwrap_or_default().to_string(),
			));
		}
		let mut remove_headers: Vec<String> = vec![
			"content-length".to_string(),
			"content-encoding".to_string(),
		];
		remove_headers.extend(action.remove_headers.iter().map(|h| h.to_string()));
		if let Some(hm) = &backend.header_mutation {
			for set in &hm.set {
				set_headers.push((set.name.to_string(), set.value.to_string()));
			}
			remove_headers.extend(hm.remove.iter().map(|h| h.to_string()));
		}

		self.backend = Some(backend.clone());
		self.error_translator = Some(crate::llm::error_translator(
			route_type.client_schema(),
			backend.schema,
		));
		self.llm = Some(llm);
		self.phase = Phase::AwaitRespHeaders;

		Ok(ProcessingResponse {
			mode_override: None,
			response: Some(Outbound::RequestBody(BodyResponse {
				response: Some(CommonResponse {
					status: proto::common_response::ResponseStatus::Continue as i32,
					header_mutation: Some(header_mutation(set_headers, remove_headers)),
					body_mutation: Some(BodyMutation {
						mutation: Some(body_mutation::Mutation::Body(action.body.to_vec())),
					}),
					trailers: None,
					clear_route_cache: true,
				}),
			})),
		})
	}

	fn on_response_headers(&mut self, h: proto::HttpHeaders) -> Vec<ProcessingResponse> {
		let (headers, pseudo) = from_proto_headers(h.headers.as_ref());
		self.resp_headers = headers;
		self.resp_status = pseudo
			.status
			.and_then(|s| s.parse().ok())
			.unwrap_or(200);
		self.resp_gzip = self
			.resp_headers
			.get(http::header::CONTENT_ENCODING)
			.and_then(|v| v.to_str().ok())
			.map(|v| v.eq_ignore_ascii_case("gzip"))
			.unwrap_or(false);

		// Retryable failure before any byte reached the client: advise the
		// proxy to retry on the next backend. After first byte, never.
		if self.is_retryable_status() && self.forwarded_bytes == 0 {
			let backend_name = self
				.backend
				.as_ref()
				.map(|b| b.name.clone())
				.expect("set during request translation");
			let mut attempted = self.attempted.clone();
			attempted.push(backend_name);
			let next = self
				.rule_name
				.as_ref()
				.and_then(|n| self.config.rules.iter().find(|r| &r.name == n))
				.and_then(|rule| crate::router::select_backend(rule, &attempted))
				.map(|b| b.name.clone());
			if let Some(next) = next {
				let llm = self.llm.take().expect("set during request translation");
				self.metrics.record_error(&llm);
				if let Some(span) = self.span.take() {
					span.end_on_error(self.resp_status, b"fallback");
				}
				self.phase = Phase::Done;
				return vec![fallback_response(self.resp_status, &attempted, &next)];
			}
		}

		let llm = self.llm.as_ref().expect("set during request translation");
		let backend = self.backend.as_ref().expect("set during request translation");
		let streaming = llm.streaming && self.resp_status < 400;
		let mut set_headers = Vec::new();
		if self.resp_status >= 400 {
			// Error bodies are buffered and re-enveloped
			self.phase = Phase::AwaitRespBody;
			set_headers.push(("content-type".to_string(), "application/json".to_string()));
			return vec![ProcessingResponse {
				mode_override: Some(ProcessingMode {
					response_body_mode: processing_mode::BodySendMode::Buffered as i32,
					..Default::default()
				}),
				response: Some(Outbound::ResponseHeaders(HeadersResponse {
					response: Some(CommonResponse {
						status: proto::common_response::ResponseStatus::Continue as i32,
						header_mutation: Some(header_mutation(
							set_headers,
							vec!["content-length".to_string(), "content-encoding".to_string()],
						)),
						body_mutation: None,
						trailers: None,
						clear_route_cache: false,
					}),
				})),
			}];
		}

		let body_mode = if streaming {
			match crate::llm::stream_translator(backend, llm) {
				Ok(t) => self.stream_translator = Some(t),
				Err(e) => {
					self.phase = Phase::Failed;
					return vec![self.ai_error(&e)];
				},
			}
			set_headers.push((
				"content-type".to_string(),
				"text/event-stream".to_string(),
			));
			processing_mode::BodySendMode::Streamed
		} else {
			match crate::llm::response_translator(backend, llm) {
				Ok(t) => self.response_translator = Some(t),
				Err(e) => {
					self.phase = Phase::Failed;
					return vec![self.ai_error(&e)];
				},
			}
			set_headers.push(("content-type".to_string(), "application/json".to_string()));
			processing_mode::BodySendMode::Buffered
		};

		self.phase = Phase::AwaitRespBody;
		vec![ProcessingResponse {
			mode_override: Some(ProcessingMode {
				response_body_mode: body_mode as i32,
				..Default::default()
			}),
			response: Some(Outbound::ResponseHeaders(HeadersResponse {
				response: Some(CommonResponse {
					status: proto::common_response::ResponseStatus::Continue as i32,
					header_mutation: Some(header_mutation(
						set_headers,
						vec!["content-length".to_string(), "content-encoding".to_string()],
					)),
					body_mutation: None,
					trailers: None,
					clear_route_cache: false,
				}),
			})),
		}]
	}

	fn is_retryable_status(&self) -> bool {
		self.resp_status >= 500
			|| self
				.config
				.retryable_statuses
				.contains(&self.resp_status)
	}

	async fn on_response_body(&mut self, b: proto::HttpBody) -> Vec<ProcessingResponse> {
		if self.stream_translator.is_some() {
			return self.on_streamed_response_body(b);
		}
		// Buffered: error envelope or non-streaming translation
		self.resp_body.put_slice(&b.body);
		if !b.end_of_stream {
			return vec![ProcessingResponse {
				mode_override: None,
				response: Some(Outbound::ResponseBody(BodyResponse { response: None })),
			}];
		}
		let raw = self.resp_body.split().freeze();
		let raw = if self.resp_gzip {
			match crate::parse::compression::gunzip(&raw).await {
				Ok(b) => b,
				Err(e) => {
					warn!("failed to decode gzip response: {e}");
					raw
				},
			}
		} else {
			raw
		};

		let out = if self.resp_status >= 400 {
			let translator = self.error_translator.as_ref().expect("set at request time");
			translator
				.translate_error(self.resp_status, &self.resp_headers, &raw)
				.unwrap_or_else(|_| raw.clone())
		} else {
			let translator = self
				.response_translator
				.as_ref()
				.expect("buffered implies translator");
			match translator.translate(&raw) {
				Ok((body, usage)) => {
					self.usage.merge(&usage);
					body
				},
				Err(e) => {
					self.phase = Phase::Failed;
					return vec![self.ai_error(&e)];
				},
			}
		};

		self.finish(&out);
		self.phase = Phase::Done;
		vec![ProcessingResponse {
			mode_override: None,
			response: Some(Outbound::ResponseBody(BodyResponse {
				response: Some(CommonResponse {
					status: proto::common_response::ResponseStatus::Continue as i32,
					header_mutation: None,
					body_mutation: Some(BodyMutation {
						mutation: Some(body_mutation::Mutation::Body(out.to_vec())),
					}),
					trailers: None,
					clear_route_cache: false,
				}),
			})),
		}]
	}

	fn on_streamed_response_body(&mut self, b: proto::HttpBody) -> Vec<ProcessingResponse> {
		let translator = self.stream_translator.as_mut().expect("checked by caller");
		let mut out = BytesMut::new();
		match translator.push(&b.body) {
			Ok(chunks) => {
				for c in chunks {
					out.put_slice(&c);
				}
			},
			Err(e) => return self.stream_error(e),
		}
		if b.end_of_stream {
			match translator.finish() {
				Ok(chunks) => {
					for c in chunks {
						out.put_slice(&c);
					}
				},
				Err(e) => return self.stream_error(e),
			}
		}
		self.usage.merge(&translator.usage());
		self.forwarded_bytes += out.len() as u64;
		if let Some(span) = self.span.as_mut()
			&& !out.is_empty()
		{
			span.record_response_chunk();
		}

		if b.end_of_stream {
			self.finish(&out);
			self.phase = Phase::Done;
		}
		vec![ProcessingResponse {
			mode_override: None,
			response: Some(Outbound::ResponseBody(BodyResponse {
				response: Some(CommonResponse {
					status: proto::common_response::ResponseStatus::Continue as i32,
					header_mutation: None,
					body_mutation: Some(BodyMutation {
						mutation: Some(body_mutation::Mutation::Body(out.to_vec())),
					}),
					trailers: None,
					clear_route_cache: false,
				}),
			})),
		}]
	}

	fn stream_error(&mut self, e: AIError) -> Vec<ProcessingResponse> {
		warn!("stream translation failed: {e}");
		if let Some(llm) = &self.llm {
			self.metrics.record_error(llm);
		}
		if let Some(span) = self.span.take() {
			span.end_on_error(502, e.to_string().as_bytes());
		}
		self.phase = Phase::Failed;
		if self.forwarded_bytes == 0 {
			vec![self.ai_error_with_status(502, &e)]
		} else {
			// Bytes already reached the client; the broken tail is dropped and
			// the stream just ends
			vec![ProcessingResponse {
				mode_override: None,
				response: Some(Outbound::ResponseBody(BodyResponse {
					response: Some(CommonResponse {
						status: proto::common_response::ResponseStatus::Continue as i32,
						header_mutation: None,
						body_mutation: Some(BodyMutation {
							mutation: Some(body_mutation::Mutation::Body(Vec::new())),
						}),
						trailers: None,
						clear_route_cache: false,
					}),
				})),
			}]
		}
	}

	/// Ends the span and emits the final usage metric. Called once on any
	/// successful completion path.
	fn finish(&mut self, last_body: &[u8]) {
		if let Some(llm) = &self.llm {
			let elapsed = self
				.span
				.as_ref()
				.map(|s| s.elapsed())
				.unwrap_or_default();
			self.metrics.record(llm, &self.usage, elapsed);
			if let Some(mut span) = self.span.take() {
				span.record_response(last_body);
				span.end(&self.usage);
			}
		}
	}

	fn on_cancel(&mut self) {
		if matches!(self.phase, Phase::Done | Phase::Failed) {
			return;
		}
		self.phase = Phase::Done;
		if let Some(span) = self.span.take() {
			span.end_cancelled();
		}
	}

	/// Client-dialect error envelope with an HTTP status.
	fn ai_error(&mut self, e: &AIError) -> ProcessingResponse {
		let status = match e {
			AIError::RequestParsing(_) | AIError::MissingField(_) | AIError::RequestTooLarge => 400,
			AIError::ModelNotFound => 404,
			_ => 502,
		};
		self.ai_error_with_status(status, e)
	}

	fn ai_error_with_status(&mut self, status: u16, e: &AIError) -> ProcessingResponse {
		if let Some(llm) = &self.llm {
			self.metrics.record_error(llm);
		}
		if let Some(span) = self.span.take() {
			span.end_on_error(status, e.to_string().as_bytes());
		}
		let schema = self
			.route_type
			.map(|r| r.client_schema())
			.unwrap_or(ApiSchema::OpenAI);
		let body = match schema {
			ApiSchema::OpenAI => serde_json::to_vec(&crate::llm::types::OpenAIErrorResponse::new(
				e.to_string(),
				error_kind(e),
			)),
			ApiSchema::Anthropic => serde_json::to_vec(
				&crate::llm::types::AnthropicErrorResponse::new(e.to_string(), error_kind(e)),
			),
		}
		.unwrap_or_default();
		immediate_json(status, Bytes::from(body))
	}

	fn client_error(&mut self, status: u16, msg: &str) -> ProcessingResponse {
		self.ai_error_with_status(status, &AIError::ProtocolFraming(msg.to_string()))
	}
}

fn error_kind(e: &AIError) -> &'static str {
	match e {
		AIError::RequestParsing(_)
		| AIError::RequestMarshal(_)
		| AIError::MissingField(_)
		| AIError::RequestTooLarge
		| AIError::ModelNotFound => "invalid_request_error",
		AIError::ProtocolFraming(_) => "protocol_framing_error",
		_ => "internal_error",
	}
}

fn message_kind(msg: &Inbound) -> &'static str {
	match msg {
		Inbound::RequestHeaders(_) => "request_headers",
		Inbound::ResponseHeaders(_) => "response_headers",
		Inbound::RequestBody(_) => "request_body",
		Inbound::ResponseBody(_) => "response_body",
		Inbound::RequestTrailers(_) => "request_trailers",
		Inbound::ResponseTrailers(_) => "response_trailers",
	}
}

/// Pseudo-headers split out of the proto header map.
#[derive(Debug, Default)]
struct PseudoHeaders {
	method: Option<String>,
	path: Option<String>,
	status: Option<String>,
}

fn from_proto_headers(map: Option<&ProtoHeaderMap>) -> (http::HeaderMap, PseudoHeaders) {
	let mut headers = http::HeaderMap::new();
	let mut pseudo = PseudoHeaders::default();
	for hv in map.iter().flat_map(|m| m.headers.iter()) {
		let value = String::from_utf8_lossy(hv.raw()).to_string();
		match hv.key.as_str() {
			":method" => pseudo.method = Some(value),
			":path" => pseudo.path = Some(value),
			":status" => pseudo.status = Some(value),
			key if key.starts_with(':') => {},
			key => {
				if let (Ok(name), Ok(val)) = (
					http::header::HeaderName::try_from(key),
					http::HeaderValue::from_bytes(hv.raw()),
				) {
					headers.append(name, val);
				}
			},
		}
	}
	(headers, pseudo)
}

fn header_mutation(
	set: Vec<(String, String)>,
	remove: Vec<String>,
) -> HeaderMutation {
	HeaderMutation {
		set_headers: set
			.into_iter()
			.map(|(k, v)| HeaderValueOption {
				header: Some(HeaderValue {
					key: k,
					value: String::new(),
					raw_value: v.into_bytes(),
				}),
				append_action:
					proto::header_value_option::HeaderAppendAction::OverwriteIfExistsOrAdd as i32,
			})
			.collect(),
		remove_headers: remove,
	}
}

fn immediate_plain(status: u16, body: &str) -> ProcessingResponse {
	ProcessingResponse {
		mode_override: None,
		response: Some(Outbound::ImmediateResponse(ImmediateResponse {
			status: Some(HttpStatus {
				code: status as i32,
			}),
			headers: Some(header_mutation(
				vec![("content-type".to_string(), "text/plain".to_string())],
				vec![],
			)),
			body: body.as_bytes().to_vec(),
			grpc_status: None,
			details: String::new(),
		})),
	}
}

fn immediate_json(status: u16, body: Bytes) -> ProcessingResponse {
	ProcessingResponse {
		mode_override: None,
		response: Some(Outbound::ImmediateResponse(ImmediateResponse {
			status: Some(HttpStatus {
				code: status as i32,
			}),
			headers: Some(header_mutation(
				vec![("content-type".to_string(), "application/json".to_string())],
				vec![],
			)),
			body: body.to_vec(),
			grpc_status: None,
			details: String::new(),
		})),
	}
}

/// Tells the proxy to retry the route against the named backend. Only ever
/// produced before the first response byte has been forwarded.
fn fallback_response(status: u16, attempted: &[Strng], next: &str) -> ProcessingResponse {
	ProcessingResponse {
		mode_override: None,
		response: Some(Outbound::ImmediateResponse(ImmediateResponse {
			status: Some(HttpStatus {
				code: status as i32,
			}),
			headers: Some(header_mutation(
				vec![
					(FALLBACK_TO_HEADER.to_string(), next.to_string()),
					(
						ATTEMPTED_BACKENDS_HEADER.to_string(),
						attempted
							.iter()
							.map(|s| s.as_str())
							.collect::<Vec<_>>()
							.join(","),
					),
				],
				vec![],
			)),
			body: Vec::new(),
			grpc_status: Some(GrpcStatus { status: 14 }),
			details: "upstream retryable failure".to_string(),
		})),
	}
}
