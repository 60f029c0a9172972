use std::collections::HashMap;

use bytes::Bytes;
use serde_json::{Map, Value};

use super::{RequestAction, ResponseTranslator, StreamTranslator, json_bytes};
use crate::config::{BackendAuth, BackendConfig};
use crate::llm::types::{completions, messages};
use crate::llm::{AIError, LLMRequest, RouteType, TokenUsage, hosts};
use crate::parse::aws::EventStreamFramer;
use crate::parse::sse::SseFramer;
use crate::*;

#[cfg(test)]
#[path = "anthropic_tests.rs"]
mod tests;

pub const BEDROCK_ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";
pub const VERTEX_ANTHROPIC_VERSION: &str = "vertex-2023-10-16";

const DEFAULT_MAX_TOKENS: u64 = 4096;

fn stop_reason(r: messages::StopReason) -> completions::FinishReason {
	match r {
		messages::StopReason::EndTurn
		| messages::StopReason::StopSequence
		| messages::StopReason::PauseTurn => completions::FinishReason::Stop,
		messages::StopReason::MaxTokens => completions::FinishReason::Length,
		messages::StopReason::ToolUse => completions::FinishReason::ToolCalls,
		messages::StopReason::Refusal => completions::FinishReason::ContentFilter,
	}
}

fn openai_usage(u: &messages::Usage) -> completions::Usage {
	completions::Usage {
		prompt_tokens: u.input_tokens,
		completion_tokens: u.output_tokens,
		total_tokens: u.input_tokens + u.output_tokens,
		prompt_tokens_details: u.cache_read_input_tokens.map(|c| {
			completions::PromptTokensDetails {
				cached_tokens: Some(c),
				audio_tokens: None,
			}
		}),
		completion_tokens_details: None,
	}
}

/// Converts an OpenAI chat request into an Anthropic messages request.
pub fn to_messages_request(
	req: &completions::Request,
) -> Result<messages::Request, AIError> {
	let mut system_parts = Vec::new();
	let mut msgs: Vec<messages::Message> = Vec::new();

	for msg in &req.messages {
		match msg {
			completions::RequestMessage::System(s) | completions::RequestMessage::Developer(s) => {
				system_parts.push(s.content.text());
			},
			completions::RequestMessage::User(u) => {
				msgs.push(messages::Message {
					role: messages::Role::User,
					content: messages::MessageContent::Text(u.content.text()),
				});
			},
			completions::RequestMessage::Assistant(a) => {
				let mut blocks = Vec::new();
				if let Some(c) = &a.content {
					let text = c.text();
					if !text.is_empty() {
						blocks.push(messages::ContentBlock::Text {
							text,
							cache_control: None,
						});
					}
				}
				for tc in a.tool_calls.iter().flatten() {
					blocks.push(messages::ContentBlock::ToolUse {
						id: tc.id.clone(),
						name: tc.function.name.clone(),
						input: serde_json::from_str(&tc.function.arguments)
							.unwrap_or(Value::Object(Default::default())),
					});
				}
				if !blocks.is_empty() {
					msgs.push(messages::Message {
						role: messages::Role::Assistant,
						content: messages::MessageContent::Blocks(blocks),
					});
				}
			},
			completions::RequestMessage::Tool(t) => {
				// role=tool becomes a user turn holding a tool_result block
				msgs.push(messages::Message {
					role: messages::Role::User,
					content: messages::MessageContent::Blocks(vec![messages::ContentBlock::ToolResult {
						tool_use_id: t.tool_call_id.clone(),
						content: Some(messages::ToolResultContent::Text(t.content.text())),
						is_error: None,
					}]),
				});
			},
		}
	}

	let tools = req.tools.as_ref().map(|tools| {
		tools
			.iter()
			.map(|completions::Tool::Function { function }| messages::Tool {
				name: function.name.clone(),
				description: function.description.clone(),
				input_schema: function
					.parameters
					.clone()
					.unwrap_or(Value::Object(Default::default())),
				rest: Default::default(),
			})
			.collect()
	});
	let tool_choice = req.tool_choice.as_ref().map(|tc| match tc {
		completions::ToolChoice::Mode(completions::ToolChoiceMode::Auto) => messages::ToolChoice::Auto,
		completions::ToolChoice::Mode(completions::ToolChoiceMode::Required) => {
			messages::ToolChoice::Any
		},
		completions::ToolChoice::Mode(completions::ToolChoiceMode::None) => messages::ToolChoice::None,
		completions::ToolChoice::Named(n) => messages::ToolChoice::Tool {
			name: n.function.name.clone(),
		},
	});

	Ok(messages::Request {
		model: req.model.clone(),
		messages: msgs,
		max_tokens: Some(req.max_output_tokens().unwrap_or(DEFAULT_MAX_TOKENS)),
		system: if system_parts.is_empty() {
			None
		} else {
			Some(messages::SystemPrompt::Text(system_parts.join("\n")))
		},
		stream: req.stream,
		temperature: req.temperature,
		top_p: req.top_p,
		top_k: None,
		stop_sequences: req.stop_sequences(),
		tools,
		tool_choice,
		metadata: None,
		rest: Default::default(),
	})
}

/// OpenAI chat completions against the native Anthropic messages API.
pub mod from_openai {
	use super::*;

	pub fn translate_request(
		backend: &BackendConfig,
		body: &Value,
	) -> Result<(RequestAction, LLMRequest), AIError> {
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

		let out = to_messages_request(&req)?;
		let body = serde_json::to_vec(&out).map_err(AIError::RequestMarshal)?;
		let authority = backend.host_override.clone().unwrap_or(hosts::ANTHROPIC);
		let action = RequestAction::new(authority, "/v1/messages".to_string(), body)
			.with_header(strng::literal!("content-type"), "application/json");
		let llm = LLMRequest {
			request_model: strng::new(&model),
			provider: backend.schema.system_name(),
			streaming,
			route: RouteType::ChatCompletions,
		};
		Ok((action, llm))
	}

	/// Buffered Anthropic response to an OpenAI chat completion.
	pub struct MessagesResponse {
		model: Strng,
	}

	impl MessagesResponse {
		pub fn new(model: &str) -> Self {
			Self {
				model: strng::new(model),
			}
		}
	}

	impl ResponseTranslator for MessagesResponse {
		fn translate(&self, body: &[u8]) -> Result<(Bytes, TokenUsage), AIError> {
			let resp: messages::Response =
				serde_json::from_slice(body).map_err(AIError::ResponseParsing)?;

			let mut text = String::new();
			let mut reasoning = None;
			let mut tool_calls = Vec::new();
			for block in &resp.content {
				match block {
					messages::ContentBlock::Text { text: t, .. } => text.push_str(t),
					messages::ContentBlock::ToolUse { id, name, input } => {
						tool_calls.push(completions::ToolCall {
							id: id.clone(),
							r#type: completions::ToolType::Function,
							function: completions::FunctionCall {
								name: name.clone(),
								arguments: serde_json::to_string(input).map_err(AIError::ResponseMarshal)?,
							},
						});
					},
					messages::ContentBlock::Thinking { thinking, .. } => {
						reasoning = Some(thinking.clone());
					},
					messages::ContentBlock::Image { .. }
					| messages::ContentBlock::ToolResult { .. }
					| messages::ContentBlock::RedactedThinking { .. } => {},
				}
			}

			let openai = completions::Response {
				id: Some(resp.id.clone()),
				object: completions::COMPLETION_OBJECT.to_string(),
				created: None,
				model: self.model.to_string(),
				choices: vec![completions::Choice {
					index: 0,
					message: completions::ResponseMessage {
						role: completions::ASSISTANT_ROLE.to_string(),
						content: if text.is_empty() { None } else { Some(text) },
						reasoning_content: reasoning,
						tool_calls: if tool_calls.is_empty() {
							None
						} else {
							Some(tool_calls)
						},
					},
					finish_reason: resp.stop_reason.map(stop_reason),
					logprobs: None,
				}],
				usage: Some(openai_usage(&resp.usage)),
				rest: Default::default(),
			};
			Ok((json_bytes(&openai)?, TokenUsage::from_anthropic(&resp.usage)))
		}
	}

	/// Anthropic SSE events re-shaped into OpenAI stream chunks.
	pub struct MessagesStream {
		framer: SseFramer,
		model: String,
		message_id: String,
		created: u64,
		// anthropic content block index -> client tool_calls[].index
		tool_indices: HashMap<u32, u32>,
		finish_reason: Option<completions::FinishReason>,
		emitted_finish: bool,
		usage: TokenUsage,
		anthropic_usage: messages::Usage,
	}

	impl MessagesStream {
		pub fn new(model: &str) -> Self {
			Self {
				framer: SseFramer::new(),
				model: model.to_string(),
				message_id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
				created: chrono::Utc::now().timestamp() as u64,
				tool_indices: HashMap::new(),
				finish_reason: None,
				emitted_finish: false,
				usage: TokenUsage::default(),
				anthropic_usage: messages::Usage::default(),
			}
		}

		fn chunk(
			&self,
			choices: Vec<completions::StreamChoice>,
			usage: Option<completions::Usage>,
		) -> completions::StreamResponse {
			completions::StreamResponse {
				id: self.message_id.clone(),
				object: completions::CHUNK_OBJECT.to_string(),
				created: self.created,
				model: self.model.clone(),
				choices,
				usage,
				rest: Default::default(),
			}
		}

		fn delta_choice(delta: completions::StreamDelta) -> completions::StreamChoice {
			completions::StreamChoice {
				index: 0,
				delta,
				finish_reason: None,
				logprobs: None,
			}
		}

		fn on_event(
			&mut self,
			ev: messages::StreamEvent,
		) -> Result<Option<completions::StreamResponse>, AIError> {
			use messages::StreamEvent::*;
			Ok(match ev {
				MessageStart { message } => {
					self.anthropic_usage.input_tokens = message.usage.input_tokens;
					self.anthropic_usage.cache_read_input_tokens = message.usage.cache_read_input_tokens;
					self.usage.merge(&TokenUsage::from_anthropic(&self.anthropic_usage));
					let delta = completions::StreamDelta {
						role: Some(completions::ASSISTANT_ROLE.to_string()),
						..Default::default()
					};
					Some(self.chunk(vec![Self::delta_choice(delta)], None))
				},
				ContentBlockStart {
					index,
					content_block,
				} => match content_block {
					messages::ContentBlock::ToolUse { id, name, .. } => {
						let next = self.tool_indices.len() as u32;
						let client_index = *self.tool_indices.entry(index).or_insert(next);
						let delta = completions::StreamDelta {
							tool_calls: Some(vec![completions::ToolCallChunk {
								index: client_index,
								id: Some(id),
								r#type: Some(completions::ToolType::Function),
								function: Some(completions::FunctionCallChunk {
									name: Some(name),
									arguments: None,
								}),
							}]),
							..Default::default()
						};
						Some(self.chunk(vec![Self::delta_choice(delta)], None))
					},
					messages::ContentBlock::Text { text, .. } if !text.is_empty() => {
						let delta = completions::StreamDelta {
							content: Some(text),
							..Default::default()
						};
						Some(self.chunk(vec![Self::delta_choice(delta)], None))
					},
					_ => None,
				},
				ContentBlockDelta { index, delta } => {
					let dr = match delta {
						messages::Delta::TextDelta { text } => completions::StreamDelta {
							content: Some(text),
							..Default::default()
						},
						messages::Delta::InputJsonDelta { partial_json } => {
							let Some(client_index) = self.tool_indices.get(&index).copied() else {
								return Ok(None);
							};
							completions::StreamDelta {
								tool_calls: Some(vec![completions::ToolCallChunk {
									index: client_index,
									id: None,
									r#type: None,
									function: Some(completions::FunctionCallChunk {
										name: None,
										arguments: Some(partial_json),
									}),
								}]),
								..Default::default()
							}
						},
						messages::Delta::ThinkingDelta { thinking } => completions::StreamDelta {
							reasoning_content: Some(thinking),
							..Default::default()
						},
						messages::Delta::SignatureDelta { .. } => return Ok(None),
					};
					Some(self.chunk(vec![Self::delta_choice(dr)], None))
				},
				ContentBlockStop { .. } | Ping => None,
				MessageDelta { delta, usage } => {
					if let Some(u) = usage {
						self.anthropic_usage.output_tokens = u.output_tokens;
						if u.input_tokens > 0 {
							self.anthropic_usage.input_tokens = u.input_tokens;
						}
						self.usage.merge(&TokenUsage::from_anthropic(&self.anthropic_usage));
					}
					if let Some(sr) = delta.stop_reason {
						self.finish_reason = Some(stop_reason(sr));
						self.emitted_finish = true;
						return Ok(Some(self.chunk(
							vec![completions::StreamChoice {
								index: 0,
								delta: Default::default(),
								finish_reason: self.finish_reason,
								logprobs: None,
							}],
							None,
						)));
					}
					None
				},
				MessageStop => None,
				Error { error } => {
					return Err(AIError::UpstreamException {
						kind: error.r#type,
						message: error.message,
					});
				},
			})
		}

		fn translate_events(
			&mut self,
			events: Vec<crate::parse::sse::SseEvent>,
		) -> Result<Vec<Bytes>, AIError> {
			let mut out = Vec::new();
			for ev in events {
				let parsed: messages::StreamEvent =
					serde_json::from_slice(&ev.data).map_err(AIError::ResponseParsing)?;
				if let Some(chunk) = self.on_event(parsed)? {
					out.push(super::super::openai::encode_chunk(&chunk)?);
				}
			}
			Ok(out)
		}
	}

	impl StreamTranslator for MessagesStream {
		fn push(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>, AIError> {
			let events = self
				.framer
				.push(chunk)
				.map_err(|e| AIError::ProtocolFraming(e.to_string()))?;
			self.translate_events(events)
		}

		fn finish(&mut self) -> Result<Vec<Bytes>, AIError> {
			let events = self
				.framer
				.finish()
				.map_err(|e| AIError::ProtocolFraming(e.to_string()))?;
			let mut out = self.translate_events(events)?;
			if !self.emitted_finish && self.finish_reason.is_some() {
				self.emitted_finish = true;
				let chunk = self.chunk(
					vec![completions::StreamChoice {
						index: 0,
						delta: Default::default(),
						finish_reason: self.finish_reason,
						logprobs: None,
					}],
					None,
				);
				out.push(super::super::openai::encode_chunk(&chunk)?);
			}
			if self.anthropic_usage.output_tokens > 0 || self.anthropic_usage.input_tokens > 0 {
				let chunk = self.chunk(vec![], Some(openai_usage(&self.anthropic_usage)));
				out.push(super::super::openai::encode_chunk(&chunk)?);
			}
			out.push(crate::parse::sse::done_sentinel());
			Ok(out)
		}

		fn usage(&self) -> TokenUsage {
			self.usage
		}
	}
}

/// Anthropic clients talking to the native Anthropic API: passthrough with
/// model override.
pub mod native {
	use super::*;

	pub fn translate_request(
		backend: &BackendConfig,
		body: &Value,
	) -> Result<(RequestAction, LLMRequest), AIError> {
		let mut req: messages::Request =
			serde_json::from_value(body.clone()).map_err(AIError::RequestParsing)?;
		if let Some(m) = &backend.model_name_override {
			req.model = Some(m.to_string());
		}
		let model = req
			.model
			.clone()
			.ok_or(AIError::MissingField(strng::literal!("model")))?;
		let streaming = req.streaming();
		let body = serde_json::to_vec(&req).map_err(AIError::RequestMarshal)?;
		let authority = backend.host_override.clone().unwrap_or(hosts::ANTHROPIC);
		let action = RequestAction::new(authority, "/v1/messages".to_string(), body)
			.with_header(strng::literal!("content-type"), "application/json");
		let llm = LLMRequest {
			request_model: strng::new(&model),
			provider: backend.schema.system_name(),
			streaming,
			route: RouteType::Messages,
		};
		Ok((action, llm))
	}

	/// Anthropic-shaped responses flow through unchanged; only usage is read.
	pub struct Passthrough {}

	impl Default for Passthrough {
		fn default() -> Self {
			Self::new()
		}
	}

	impl Passthrough {
		pub fn new() -> Self {
			Self {}
		}
	}

	impl ResponseTranslator for Passthrough {
		fn translate(&self, body: &[u8]) -> Result<(Bytes, TokenUsage), AIError> {
			let usage = serde_json::from_slice::<messages::Response>(body)
				.ok()
				.map(|r| TokenUsage::from_anthropic(&r.usage))
				.unwrap_or_default();
			Ok((Bytes::copy_from_slice(body), usage))
		}
	}

	/// SSE passthrough preserving Anthropic event names while observing usage.
	pub struct PassthroughStream {
		framer: SseFramer,
		usage: TokenUsage,
		anthropic_usage: messages::Usage,
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
				anthropic_usage: messages::Usage::default(),
			}
		}

		fn observe(&mut self, data: &[u8]) {
			let Ok(ev) = serde_json::from_slice::<messages::StreamEvent>(data) else {
				return;
			};
			match ev {
				messages::StreamEvent::MessageStart { message } => {
					self.anthropic_usage.input_tokens = message.usage.input_tokens;
					self.anthropic_usage.cache_read_input_tokens = message.usage.cache_read_input_tokens;
				},
				messages::StreamEvent::MessageDelta { usage: Some(u), .. } => {
					self.anthropic_usage.output_tokens = u.output_tokens;
					if u.input_tokens > 0 {
						self.anthropic_usage.input_tokens = u.input_tokens;
					}
				},
				_ => return,
			}
			self.usage.merge(&TokenUsage::from_anthropic(&self.anthropic_usage));
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
				self.observe(&ev.data);
				out.push(crate::parse::sse::encode_event(ev.name.as_deref(), &ev.data));
			}
			Ok(out)
		}

		fn finish(&mut self) -> Result<Vec<Bytes>, AIError> {
			let events = self
				.framer
				.finish()
				.map_err(|e| AIError::ProtocolFraming(e.to_string()))?;
			Ok(
				events
					.into_iter()
					.map(|ev| {
						self.observe(&ev.data);
						crate::parse::sse::encode_event(ev.name.as_deref(), &ev.data)
					})
					.collect(),
			)
		}

		fn usage(&self) -> TokenUsage {
			self.usage
		}
	}
}

/// Anthropic clients against Anthropic models on Bedrock, via InvokeModel.
pub mod on_bedrock {
	use base64::Engine;

	use super::*;

	pub fn translate_request(
		backend: &BackendConfig,
		body: &Value,
	) -> Result<(RequestAction, LLMRequest), AIError> {
		let mut req: messages::Request =
			serde_json::from_value(body.clone()).map_err(AIError::RequestParsing)?;
		if let Some(m) = &backend.model_name_override {
			req.model = Some(m.to_string());
		}
		let model = req
			.model
			.clone()
			.ok_or(AIError::MissingField(strng::literal!("model")))?;
		let streaming = req.streaming();

		let body = prepare_invoke_body(&req)?;
		let region = super::super::bedrock::region_of(backend)?;
		let op = if streaming {
			"invoke-with-response-stream"
		} else {
			"invoke"
		};
		let action = RequestAction::new(
			hosts::bedrock(&region),
			format!("/model/{model}/{op}"),
			body,
		)
		.with_header(strng::literal!("content-type"), "application/json");
		let llm = LLMRequest {
			request_model: strng::new(&model),
			provider: backend.schema.system_name(),
			streaming,
			route: RouteType::Messages,
		};
		Ok((action, llm))
	}

	/// The InvokeModel body is the messages request with the model lifted to
	/// the path and the Bedrock `anthropic_version` pinned. `stream` rides in
	/// the path choice too.
	fn prepare_invoke_body(req: &messages::Request) -> Result<Vec<u8>, AIError> {
		let mut map: Map<String, Value> = serde_json::to_value(req)
			.map_err(AIError::RequestMarshal)
			.and_then(|v| match v {
				Value::Object(m) => Ok(m),
				_ => Err(AIError::MissingField(strng::literal!("body object"))),
			})?;
		map.remove("model");
		map.remove("stream");
		map.insert(
			"anthropic_version".to_string(),
			Value::String(BEDROCK_ANTHROPIC_VERSION.to_string()),
		);
		serde_json::to_vec(&map).map_err(AIError::RequestMarshal)
	}

	/// InvokeModelWithResponseStream wraps each Anthropic event in an
	/// event-stream frame whose payload is `{"bytes": base64(event)}`. We
	/// unwrap and re-emit native Anthropic SSE.
	pub struct InvokeStream {
		framer: EventStreamFramer,
		usage: TokenUsage,
		anthropic_usage: messages::Usage,
	}

	impl Default for InvokeStream {
		fn default() -> Self {
			Self::new()
		}
	}

	impl InvokeStream {
		pub fn new() -> Self {
			Self {
				framer: EventStreamFramer::new(),
				usage: TokenUsage::default(),
				anthropic_usage: messages::Usage::default(),
			}
		}
	}

	#[derive(serde::Deserialize)]
	struct ChunkPayload {
		bytes: String,
	}

	impl StreamTranslator for InvokeStream {
		fn push(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>, AIError> {
			let frames = self
				.framer
				.push(chunk)
				.map_err(|e| AIError::ProtocolFraming(e.to_string()))?;
			let mut out = Vec::new();
			for frame in frames {
				match crate::parse::aws::event_kind(&frame) {
					crate::parse::aws::EventKind::Event(_) => {},
					crate::parse::aws::EventKind::Exception(kind) => {
						return Err(AIError::UpstreamException {
							kind,
							message: String::from_utf8_lossy(frame.payload().as_ref()).to_string(),
						});
					},
					crate::parse::aws::EventKind::Unknown => continue,
				}
				let payload: ChunkPayload = serde_json::from_slice(frame.payload().as_ref())
					.map_err(AIError::ResponseParsing)?;
				let event = base64::engine::general_purpose::STANDARD
					.decode(&payload.bytes)
					.map_err(|e| AIError::ProtocolFraming(e.to_string()))?;

				// The inner event's `type` names the SSE event
				let name = serde_json::from_slice::<Value>(&event)
					.ok()
					.and_then(|v| v.get("type").and_then(|t| t.as_str()).map(|s| s.to_string()));
				if let Ok(parsed) = serde_json::from_slice::<messages::StreamEvent>(&event) {
					match parsed {
						messages::StreamEvent::MessageStart { message } => {
							self.anthropic_usage.input_tokens = message.usage.input_tokens;
							self.anthropic_usage.cache_read_input_tokens =
								message.usage.cache_read_input_tokens;
							self.usage.merge(&TokenUsage::from_anthropic(&self.anthropic_usage));
						},
						messages::StreamEvent::MessageDelta { usage: Some(u), .. } => {
							self.anthropic_usage.output_tokens = u.output_tokens;
							self.usage.merge(&TokenUsage::from_anthropic(&self.anthropic_usage));
						},
						_ => {},
					}
				}
				out.push(crate::parse::sse::encode_event(name.as_deref(), &event));
			}
			Ok(out)
		}

		fn finish(&mut self) -> Result<Vec<Bytes>, AIError> {
			Ok(Vec::new())
		}

		fn usage(&self) -> TokenUsage {
			self.usage
		}
	}
}

/// Anthropic clients against Anthropic models on Vertex, via rawPredict.
pub mod on_vertex {
	use super::*;

	pub fn translate_request(
		backend: &BackendConfig,
		body: &Value,
	) -> Result<(RequestAction, LLMRequest), AIError> {
		let mut req: messages::Request =
			serde_json::from_value(body.clone()).map_err(AIError::RequestParsing)?;
		if let Some(m) = &backend.model_name_override {
			req.model = Some(m.to_string());
		}
		let model = req
			.model
			.clone()
			.ok_or(AIError::MissingField(strng::literal!("model")))?;
		let streaming = req.streaming();

		let body = prepare_vertex_body(&req)?;
		let Some(BackendAuth::Gcp {
			project, region, ..
		}) = &backend.auth
		else {
			return Err(AIError::MissingField(strng::literal!("gcp auth")));
		};
		let verb = if streaming {
			"streamRawPredict"
		} else {
			"rawPredict"
		};
		let model_name = super::super::vertex::anthropic_model_name(&model);
		let path = format!(
			"/v1/projects/{project}/locations/{region}/publishers/anthropic/models/{model_name}:{verb}"
		);
		let action = RequestAction::new(hosts::vertex(region), path, body)
			.with_header(strng::literal!("content-type"), "application/json");
		let llm = LLMRequest {
			request_model: strng::new(&model),
			provider: backend.schema.system_name(),
			streaming,
			route: RouteType::Messages,
		};
		Ok((action, llm))
	}

	fn prepare_vertex_body(req: &messages::Request) -> Result<Vec<u8>, AIError> {
		let mut map: Map<String, Value> = serde_json::to_value(req)
			.map_err(AIError::RequestMarshal)
			.and_then(|v| match v {
				Value::Object(m) => Ok(m),
				_ => Err(AIError::MissingField(strng::literal!("body object"))),
			})?;
		map.remove("model");
		map.insert(
			"anthropic_version".to_string(),
			Value::String(VERTEX_ANTHROPIC_VERSION.to_string()),
		);
		serde_json::to_vec(&map).map_err(AIError::RequestMarshal)
	}
}
