use bytes::Bytes;
use serde_json::Value;

use super::{RequestAction, ResponseTranslator, StreamTranslator, json_bytes};
use crate::config::{BackendConfig, BackendSchema};
use crate::llm::types::completions;
use crate::llm::{AIError, LLMRequest, RouteType, TokenUsage, hosts};
use crate::parse::sse::SseFramer;
use crate::*;

const DEFAULT_AZURE_API_VERSION: &str = "2024-02-01";

/// OpenAI-dialect requests to OpenAI-compatible backends pass through with
/// two edits: the configured model override and, for streaming chat, forced
/// `stream_options.include_usage` so usage accounting always works.
pub fn translate_request(
	route: RouteType,
	backend: &BackendConfig,
	body: &Value,
) -> Result<(RequestAction, LLMRequest), AIError> {
	let (model, streaming, out) = match route {
		RouteType::ChatCompletions => {
			let mut req: completions::Request =
				serde_json::from_value(body.clone()).map_err(AIError::RequestParsing)?;
			if let Some(m) = &backend.model_name_override {
				req.model = Some(m.to_string());
			}
			let model = req
				.model
				.clone()
				.ok_or(AIError::MissingField(strng::literal!("model")))?;
			let streaming = req.streaming();
			if streaming {
				// Without usage in the stream we cannot account tokens; the
				// client's preference is overridden.
				let mut opts = req.stream_options.take().unwrap_or_default();
				opts.include_usage = true;
				req.stream_options = Some(opts);
			}
			(
				model,
				streaming,
				serde_json::to_vec(&req).map_err(AIError::RequestMarshal)?,
			)
		},
		RouteType::Completions => {
			let mut req: completions::LegacyRequest =
				serde_json::from_value(body.clone()).map_err(AIError::RequestParsing)?;
			if let Some(m) = &backend.model_name_override {
				req.model = Some(m.to_string());
			}
			let model = req
				.model
				.clone()
				.ok_or(AIError::MissingField(strng::literal!("model")))?;
			let streaming = req.stream.unwrap_or(false);
			(
				model,
				streaming,
				serde_json::to_vec(&req).map_err(AIError::RequestMarshal)?,
			)
		},
		RouteType::Embeddings => {
			let mut req: crate::llm::types::embeddings::Request =
				serde_json::from_value(body.clone()).map_err(AIError::RequestParsing)?;
			if let Some(m) = &backend.model_name_override {
				req.model = Some(m.to_string());
			}
			let model = req
				.model
				.clone()
				.ok_or(AIError::MissingField(strng::literal!("model")))?;
			(
				model,
				false,
				serde_json::to_vec(&req).map_err(AIError::RequestMarshal)?,
			)
		},
		RouteType::Images => {
			let mut req: completions::ImagesRequest =
				serde_json::from_value(body.clone()).map_err(AIError::RequestParsing)?;
			if let Some(m) = &backend.model_name_override {
				req.model = Some(m.to_string());
			}
			let model = req.model.clone().unwrap_or_default();
			(
				model,
				false,
				serde_json::to_vec(&req).map_err(AIError::RequestMarshal)?,
			)
		},
		_ => {
			return Err(AIError::UnsupportedConversion(strng::literal!(
				"route not supported by OpenAI-compatible backends"
			)));
		},
	};

	let (authority, path) = host_and_path(route, backend, &model)?;
	let action = RequestAction::new(authority, path, out)
		.with_header(strng::literal!("content-type"), "application/json");
	let llm = LLMRequest {
		request_model: strng::new(&model),
		provider: backend.schema.system_name(),
		streaming,
		route,
	};
	Ok((action, llm))
}

fn host_and_path(
	route: RouteType,
	backend: &BackendConfig,
	model: &str,
) -> Result<(Strng, String), AIError> {
	let endpoint = match route {
		RouteType::ChatCompletions => "chat/completions",
		RouteType::Completions => "completions",
		RouteType::Embeddings => "embeddings",
		RouteType::Images => "images/generations",
		_ => unreachable!("validated by caller"),
	};
	match backend.schema {
		BackendSchema::AzureOpenAI => {
			let authority = backend
				.host_override
				.clone()
				.ok_or(AIError::MissingField(strng::literal!("hostOverride")))?;
			let version = backend
				.api_version
				.as_deref()
				.unwrap_or(DEFAULT_AZURE_API_VERSION);
			Ok((
				authority,
				format!("/openai/deployments/{model}/{endpoint}?api-version={version}"),
			))
		},
		_ => {
			let authority = backend.host_override.clone().unwrap_or(hosts::OPENAI);
			Ok((authority, format!("/v1/{endpoint}")))
		},
	}
}

/// Buffered passthrough: the body is forwarded as-is; usage is read for
/// telemetry.
pub struct Passthrough {
	route: RouteType,
}

impl Passthrough {
	pub fn new(route: RouteType) -> Self {
		Self { route }
	}
}

impl ResponseTranslator for Passthrough {
	fn translate(&self, body: &[u8]) -> Result<(Bytes, TokenUsage), AIError> {
		let usage = match self.route {
			RouteType::ChatCompletions | RouteType::Completions => {
				serde_json::from_slice::<completions::Response>(body)
					.ok()
					.and_then(|r| r.usage.as_ref().map(|u| TokenUsage::from_openai(u)))
			},
			RouteType::Embeddings => serde_json::from_slice::<crate::llm::types::embeddings::Response>(body)
				.ok()
				.map(|r| TokenUsage {
					input_tokens: r.usage.prompt_tokens,
					total_tokens: r.usage.total_tokens,
					..Default::default()
				}),
			_ => None,
		};
		Ok((Bytes::copy_from_slice(body), usage.unwrap_or_default()))
	}
}

/// Streaming passthrough: SSE events are re-framed unchanged while the
/// usage-bearing chunk is observed.
pub struct PassthroughStream {
	framer: SseFramer,
	usage: TokenUsage,
	saw_done: bool,
}

impl Default for PassthroughStream {
	fn default() -> Self {
		Self::new()
	}
}

impl PassthroughStream {
	pub fn new() -> Self {
		Self {
			framer: SseFramer::new(),
			usage: TokenUsage::default(),
			saw_done: false,
		}
	}

	fn observe(&mut self, data: &[u8]) {
		if let Ok(chunk) = serde_json::from_slice::<completions::StreamResponse>(data)
			&& let Some(u) = &chunk.usage
		{
			self.usage.merge(&TokenUsage::from_openai(u));
		}
	}
}

impl StreamTranslator for PassthroughStream {
	fn push(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>, AIError> {
		let events = self
			.framer
			.push(chunk)
			.map_err(|e| AIError::ProtocolFraming(e.to_string()))?;
		let mut out = Vec::with_capacity(events.len());
		for ev in events {
			if ev.is_done() {
				self.saw_done = true;
				out.push(crate::parse::sse::done_sentinel());
				continue;
			}
			self.observe(&ev.data);
			out.push(crate::parse::sse::encode_event(ev.name.as_deref(), &ev.data));
		}
		Ok(out)
	}

	fn finish(&mut self) -> Result<Vec<Bytes>, AIError> {
		let mut out = Vec::new();
		for ev in self
			.framer
			.finish()
			.map_err(|e| AIError::ProtocolFraming(e.to_string()))?
		{
			if ev.is_done() {
				self.saw_done = true;
				out.push(crate::parse::sse::done_sentinel());
			} else {
				self.observe(&ev.data);
				out.push(crate::parse::sse::encode_event(ev.name.as_deref(), &ev.data));
			}
		}
		if !self.saw_done {
			out.push(crate::parse::sse::done_sentinel());
		}
		Ok(out)
	}

	fn usage(&self) -> TokenUsage {
		self.usage
	}
}

/// Re-serializes a stream chunk; shared by the translating streams.
pub(crate) fn encode_chunk(chunk: &completions::StreamResponse) -> Result<Bytes, AIError> {
	json_bytes(chunk).map(|b| {
		let mut out = bytes::BytesMut::with_capacity(b.len() + 8);
		out.extend_from_slice(b"data: ");
		out.extend_from_slice(&b);
		out.extend_from_slice(b"\n\n");
		out.freeze()
	})
}
