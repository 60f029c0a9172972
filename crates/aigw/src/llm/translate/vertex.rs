use std::collections::HashMap;

use bytes::Bytes;
use serde_json::Value;

use super::{RequestAction, ResponseTranslator, StreamTranslator, json_bytes};
use crate::config::{BackendAuth, BackendConfig};
use crate::llm::types::{completions, vertex};
use crate::llm::{AIError, LLMRequest, RouteType, TokenUsage, hosts};
use crate::parse::sse::SseFramer;
use crate::*;

#[cfg(test)]
#[path = "vertex_tests.rs"]
mod tests;

/// Anthropic models on Vertex are addressed through the anthropic publisher
/// and use the Anthropic wire dialect, not Gemini's.
pub fn is_anthropic_model(model: &str) -> bool {
	model.starts_with("publishers/anthropic/models/") || model.starts_with("anthropic/")
}

pub fn anthropic_model_name(model: &str) -> &str {
	model
		.strip_prefix("publishers/anthropic/models/")
		.or_else(|| model.strip_prefix("anthropic/"))
		.unwrap_or(model)
}

/// A response `functionCall` block without an id still needs a stable OpenAI
/// `tool_calls[].id`; the same block must map to the same id on every
/// translation, so the id is derived from the call's content.
pub fn synthesize_tool_call_id(name: &str, args: Option<&Value>) -> String {
	let seed = format!(
		"{name}:{}",
		args
			.map(|a| serde_json::to_string(a).unwrap_or_default())
			.unwrap_or_default()
	);
	uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, seed.as_bytes()).to_string()
}

fn finish_reason(r: vertex::FinishReason) -> completions::FinishReason {
	match r {
		vertex::FinishReason::Stop | vertex::FinishReason::FinishReasonUnspecified => {
			completions::FinishReason::Stop
		},
		vertex::FinishReason::MaxTokens => completions::FinishReason::Length,
		vertex::FinishReason::Safety
		| vertex::FinishReason::Recitation
		| vertex::FinishReason::Blocklist
		| vertex::FinishReason::ProhibitedContent
		| vertex::FinishReason::Spii => completions::FinishReason::ContentFilter,
		vertex::FinishReason::MalformedFunctionCall | vertex::FinishReason::Other => {
			completions::FinishReason::Stop
		},
	}
}

fn openai_usage(u: &vertex::UsageMetadata) -> completions::Usage {
	completions::Usage {
		prompt_tokens: u.prompt_token_count,
		completion_tokens: u.candidates_token_count,
		total_tokens: u.total_token_count,
		prompt_tokens_details: u.cached_content_token_count.map(|c| {
			completions::PromptTokensDetails {
				cached_tokens: Some(c),
				audio_tokens: None,
			}
		}),
		completion_tokens_details: u.thoughts_token_count.map(|t| {
			completions::CompletionTokensDetails {
				reasoning_tokens: Some(t),
				audio_tokens: None,
			}
		}),
	}
}

fn token_usage(u: &vertex::UsageMetadata) -> TokenUsage {
	TokenUsage {
		input_tokens: u.prompt_token_count,
		output_tokens: u.candidates_token_count,
		total_tokens: u.total_token_count,
		cached_tokens: u.cached_content_token_count,
		reasoning_tokens: u.thoughts_token_count,
	}
}

/// OpenAI chat completions against Vertex.
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

		let Some(BackendAuth::Gcp {
			project, region, ..
		}) = &backend.auth
		else {
			return Err(AIError::MissingField(strng::literal!("gcp auth")));
		};

		// Anthropic models on Vertex take the Anthropic dialect via rawPredict
		if is_anthropic_model(&model) {
			let messages_req = super::super::anthropic::to_messages_request(&req)?;
			let mut map = match serde_json::to_value(&messages_req).map_err(AIError::RequestMarshal)? {
				Value::Object(m) => m,
				_ => return Err(AIError::MissingField(strng::literal!("body object"))),
			};
			map.remove("model");
			map.insert(
				"anthropic_version".to_string(),
				Value::String(super::super::anthropic::VERTEX_ANTHROPIC_VERSION.to_string()),
			);
			let body = serde_json::to_vec(&map).map_err(AIError::RequestMarshal)?;
			let verb = if streaming {
				"streamRawPredict"
			} else {
				"rawPredict"
			};
			let name = anthropic_model_name(&model);
			let path = format!(
				"/v1/projects/{project}/locations/{region}/publishers/anthropic/models/{name}:{verb}"
			);
			let action = RequestAction::new(hosts::vertex(region), path, body)
				.with_header(strng::literal!("content-type"), "application/json");
			let llm = LLMRequest {
				request_model: strng::new(&model),
				provider: backend.schema.system_name(),
				streaming,
				route: RouteType::ChatCompletions,
			};
			return Ok((action, llm));
		}

		let gemini = to_gemini(&req)?;
		let body = serde_json::to_vec(&gemini).map_err(AIError::RequestMarshal)?;
		let path = if streaming {
			format!(
				"/v1/projects/{project}/locations/{region}/publishers/google/models/{model}:streamGenerateContent?alt=sse"
			)
		} else {
			format!(
				"/v1/projects/{project}/locations/{region}/publishers/google/models/{model}:generateContent"
			)
		};
		let action = RequestAction::new(hosts::vertex(region), path, body)
			.with_header(strng::literal!("content-type"), "application/json");
		let llm = LLMRequest {
			request_model: strng::new(&model),
			provider: backend.schema.system_name(),
			streaming,
			route: RouteType::ChatCompletions,
		};
		Ok((action, llm))
	}

	fn to_gemini(req: &completions::Request) -> Result<vertex::GenerateContentRequest, AIError> {
		let mut system_parts = Vec::new();
		let mut contents: Vec<vertex::Content> = Vec::new();
		// Gemini functionResponse parts are keyed by function name, while the
		// OpenAI tool message only carries the call id.
		let mut call_names: HashMap<String, String> = HashMap::new();

		for msg in &req.messages {
			match msg {
				completions::RequestMessage::System(s) | completions::RequestMessage::Developer(s) => {
					system_parts.push(vertex::Part::Text(s.content.text()));
				},
				completions::RequestMessage::User(u) => {
					contents.push(vertex::Content {
						role: Some("user".to_string()),
						parts: vec![vertex::Part::Text(u.content.text())],
					});
				},
				completions::RequestMessage::Assistant(a) => {
					let mut parts = Vec::new();
					if let Some(c) = &a.content {
						let text = c.text();
						if !text.is_empty() {
							parts.push(vertex::Part::Text(text));
						}
					}
					for tc in a.tool_calls.iter().flatten() {
						call_names.insert(tc.id.clone(), tc.function.name.clone());
						parts.push(vertex::Part::FunctionCall(vertex::FunctionCall {
							name: tc.function.name.clone(),
							args: serde_json::from_str(&tc.function.arguments).ok(),
							id: None,
						}));
					}
					if !parts.is_empty() {
						contents.push(vertex::Content {
							role: Some("model".to_string()),
							parts,
						});
					}
				},
				completions::RequestMessage::Tool(t) => {
					let name = call_names
						.get(&t.tool_call_id)
						.cloned()
						.unwrap_or_else(|| t.tool_call_id.clone());
					let response = serde_json::from_str::<Value>(&t.content.text())
						.unwrap_or_else(|_| serde_json::json!({ "output": t.content.text() }));
					contents.push(vertex::Content {
						role: Some("user".to_string()),
						parts: vec![vertex::Part::FunctionResponse(vertex::FunctionResponse {
							name,
							response,
						})],
					});
				},
			}
		}

		let tools = req.tools.as_ref().map(|tools| {
			vec![vertex::Tool {
				function_declarations: Some(
					tools
						.iter()
						.map(|completions::Tool::Function { function }| vertex::FunctionDeclaration {
							name: function.name.clone(),
							description: function.description.clone(),
							parameters: function.parameters.clone(),
						})
						.collect(),
				),
			}]
		});
		let tool_config = req.tool_choice.as_ref().map(|tc| vertex::ToolConfig {
			function_calling_config: Some(match tc {
				completions::ToolChoice::Mode(completions::ToolChoiceMode::Auto) => {
					vertex::FunctionCallingConfig {
						mode: Some(vertex::FunctionCallingMode::Auto),
						allowed_function_names: None,
					}
				},
				completions::ToolChoice::Mode(completions::ToolChoiceMode::Required) => {
					vertex::FunctionCallingConfig {
						mode: Some(vertex::FunctionCallingMode::Any),
						allowed_function_names: None,
					}
				},
				completions::ToolChoice::Mode(completions::ToolChoiceMode::None) => {
					vertex::FunctionCallingConfig {
						mode: Some(vertex::FunctionCallingMode::None),
						allowed_function_names: None,
					}
				},
				completions::ToolChoice::Named(n) => vertex::FunctionCallingConfig {
					mode: Some(vertex::FunctionCallingMode::Any),
					allowed_function_names: Some(vec![n.function.name.clone()]),
				},
			}),
		});

		let generation_config = vertex::GenerationConfig {
			temperature: req.temperature,
			top_p: req.top_p,
			max_output_tokens: req.max_output_tokens(),
			candidate_count: req.n,
			stop_sequences: {
				let stops = req.stop_sequences();
				if stops.is_empty() { None } else { Some(stops) }
			},
			seed: req.seed,
			frequency_penalty: req.frequency_penalty,
			presence_penalty: req.presence_penalty,
		};

		Ok(vertex::GenerateContentRequest {
			contents,
			system_instruction: if system_parts.is_empty() {
				None
			} else {
				Some(vertex::Content {
					role: None,
					parts: system_parts,
				})
			},
			tools,
			tool_config,
			generation_config: Some(generation_config),
		})
	}

	/// Buffered Gemini response to an OpenAI chat completion.
	pub struct GeminiResponse {
		model: Strng,
	}

	impl GeminiResponse {
		pub fn new(model: &str) -> Self {
			Self {
				model: strng::new(model),
			}
		}
	}

	impl ResponseTranslator for GeminiResponse {
		fn translate(&self, body: &[u8]) -> Result<(Bytes, TokenUsage), AIError> {
			let resp: vertex::GenerateContentResponse =
				serde_json::from_slice(body).map_err(AIError::ResponseParsing)?;

			let mut choices = Vec::with_capacity(resp.candidates.len());
			for (i, cand) in resp.candidates.iter().enumerate() {
				let mut text = String::new();
				let mut tool_calls = Vec::new();
				for part in cand.content.iter().flat_map(|c| c.parts.iter()) {
					match part {
						vertex::Part::Text(t) => text.push_str(t),
						vertex::Part::FunctionCall(fc) => {
							tool_calls.push(completions::ToolCall {
								id: fc
									.id
									.clone()
									.unwrap_or_else(|| synthesize_tool_call_id(&fc.name, fc.args.as_ref())),
								r#type: completions::ToolType::Function,
								function: completions::FunctionCall {
									name: fc.name.clone(),
									arguments: fc
										.args
										.as_ref()
										.map(|a| serde_json::to_string(a).unwrap_or_default())
										.unwrap_or_else(|| "{}".to_string()),
								},
							});
						},
						vertex::Part::FunctionResponse(_) | vertex::Part::InlineData(_) => {},
					}
				}
				let has_tools = !tool_calls.is_empty();
				choices.push(completions::Choice {
					index: cand.index.unwrap_or(i as u32),
					message: completions::ResponseMessage {
						role: completions::ASSISTANT_ROLE.to_string(),
						content: if text.is_empty() { None } else { Some(text) },
						reasoning_content: None,
						tool_calls: if has_tools { Some(tool_calls) } else { None },
					},
					finish_reason: if has_tools {
						Some(completions::FinishReason::ToolCalls)
					} else {
						cand.finish_reason.map(finish_reason)
					},
					logprobs: None,
				});
			}

			let usage = resp.usage_metadata.as_ref();
			let openai = completions::Response {
				id: resp.response_id.clone(),
				object: completions::COMPLETION_OBJECT.to_string(),
				created: None,
				model: self.model.to_string(),
				choices,
				usage: usage.map(openai_usage),
				rest: Default::default(),
			};
			Ok((
				json_bytes(&openai)?,
				usage.map(token_usage).unwrap_or_default(),
			))
		}
	}

	/// Gemini SSE (`alt=sse`) stream to OpenAI chunks.
	pub struct GeminiStream {
		framer: SseFramer,
		model: String,
		message_id: String,
		created: u64,
		tool_count: u32,
		sent_role: bool,
		finish_reason: Option<completions::FinishReason>,
		emitted_finish: bool,
		usage: TokenUsage,
		pending_usage: Option<completions::Usage>,
	}

	impl GeminiStream {
		pub fn new(model: &str) -> Self {
			Self {
				framer: SseFramer::new(),
				model: model.to_string(),
				message_id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
				created: chrono::Utc::now().timestamp() as u64,
				tool_count: 0,
				sent_role: false,
				finish_reason: None,
				emitted_finish: false,
				usage: TokenUsage::default(),
				pending_usage: None,
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

		fn on_event(
			&mut self,
			resp: vertex::GenerateContentResponse,
		) -> Result<Vec<completions::StreamResponse>, AIError> {
			let mut out = Vec::new();
			if let Some(u) = &resp.usage_metadata {
				self.usage.merge(&token_usage(u));
				self.pending_usage = Some(openai_usage(u));
			}
			for cand in &resp.candidates {
				// Role rides only on the first chunk of the stream
				let role = if self.sent_role {
					None
				} else {
					self.sent_role = true;
					Some(completions::ASSISTANT_ROLE.to_string())
				};
				let mut delta = completions::StreamDelta {
					role,
					..Default::default()
				};
				let mut tool_chunks = Vec::new();
				for part in cand.content.iter().flat_map(|c| c.parts.iter()) {
					match part {
						vertex::Part::Text(t) => {
							delta.content = Some(delta.content.take().unwrap_or_default() + t);
						},
						vertex::Part::FunctionCall(fc) => {
							let index = self.tool_count;
							self.tool_count += 1;
							tool_chunks.push(completions::ToolCallChunk {
								index,
								id: Some(
									fc.id
										.clone()
										.unwrap_or_else(|| synthesize_tool_call_id(&fc.name, fc.args.as_ref())),
								),
								r#type: Some(completions::ToolType::Function),
								function: Some(completions::FunctionCallChunk {
									name: Some(fc.name.clone()),
									arguments: Some(
										fc.args
											.as_ref()
											.map(|a| serde_json::to_string(a).unwrap_or_default())
											.unwrap_or_else(|| "{}".to_string()),
									),
								}),
							});
						},
						vertex::Part::FunctionResponse(_) | vertex::Part::InlineData(_) => {},
					}
				}
				if !tool_chunks.is_empty() {
					delta.tool_calls = Some(tool_chunks);
					self.finish_reason = Some(completions::FinishReason::ToolCalls);
				} else if let Some(fr) = cand.finish_reason {
					self.finish_reason = Some(finish_reason(fr));
				}
				out.push(self.chunk(
					vec![completions::StreamChoice {
						index: cand.index.unwrap_or(0),
						delta,
						finish_reason: None,
						logprobs: None,
					}],
					None,
				));
			}
			Ok(out)
		}
	}

	impl StreamTranslator for GeminiStream {
		fn push(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>, AIError> {
			let events = self
				.framer
				.push(chunk)
				.map_err(|e| AIError::ProtocolFraming(e.to_string()))?;
			let mut out = Vec::new();
			for ev in events {
				let resp: vertex::GenerateContentResponse =
					serde_json::from_slice(&ev.data).map_err(AIError::ResponseParsing)?;
				for chunk in self.on_event(resp)? {
					out.push(super::super::openai::encode_chunk(&chunk)?);
				}
			}
			Ok(out)
		}

		fn finish(&mut self) -> Result<Vec<Bytes>, AIError> {
			let mut out = Vec::new();
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
			if let Some(u) = self.pending_usage.take() {
				let chunk = self.chunk(vec![], Some(u));
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
