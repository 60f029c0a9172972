use std::collections::HashMap;

use bytes::Bytes;
use serde_json::Value;

use super::{RequestAction, ResponseTranslator, StreamTranslator};
use crate::config::{BackendAuth, BackendConfig};
use crate::llm::types::{bedrock, completions};
use crate::llm::{AIError, LLMRequest, RouteType, TokenUsage, hosts};
use crate::parse::aws::EventStreamFramer;
use crate::*;

#[cfg(test)]
#[path = "bedrock_tests.rs"]
mod tests;

pub(crate) fn region_of(backend: &BackendConfig) -> Result<Strng, AIError> {
	match &backend.auth {
		Some(BackendAuth::Aws { region, .. }) => Ok(region.clone()),
		_ => Err(AIError::MissingField(strng::literal!("aws auth region"))),
	}
}

/// OpenAI chat completions against Bedrock Converse.
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

		let converse = to_converse(&req)?;
		let out = serde_json::to_vec(&converse).map_err(AIError::RequestMarshal)?;

		let region = region_of(backend)?;
		let op = if streaming { "converse-stream" } else { "converse" };
		let action = RequestAction::new(
			hosts::bedrock(&region),
			format!("/model/{model}/{op}"),
			out,
		)
		.with_header(strng::literal!("content-type"), "application/json");
		let llm = LLMRequest {
			request_model: strng::new(&model),
			provider: backend.schema.system_name(),
			streaming,
			route: RouteType::ChatCompletions,
		};
		Ok((action, llm))
	}

	fn to_converse(req: &completions::Request) -> Result<bedrock::ConverseRequest, AIError> {
		// System messages lift out of the turn list into the top-level system array
		let system: Vec<bedrock::SystemContentBlock> = req
			.messages
			.iter()
			.filter_map(|m| match m {
				completions::RequestMessage::System(s) | completions::RequestMessage::Developer(s) => {
					Some(bedrock::SystemContentBlock {
						text: s.content.text(),
					})
				},
				_ => None,
			})
			.collect();

		let mut messages: Vec<bedrock::Message> = Vec::new();
		for msg in &req.messages {
			match msg {
				completions::RequestMessage::System(_) | completions::RequestMessage::Developer(_) => {},
				completions::RequestMessage::User(u) => {
					let content = user_content(&u.content)?;
					if !content.is_empty() {
						messages.push(bedrock::Message {
							role: bedrock::Role::User,
							content,
						});
					}
				},
				completions::RequestMessage::Assistant(a) => {
					let mut content = Vec::new();
					if let Some(c) = &a.content {
						let text = c.text();
						if !text.is_empty() {
							content.push(bedrock::ContentBlock::Text(text));
						}
					}
					for tc in a.tool_calls.iter().flatten() {
						content.push(bedrock::ContentBlock::ToolUse(bedrock::ToolUseBlock {
							tool_use_id: tc.id.clone(),
							name: tc.function.name.clone(),
							input: serde_json::from_str(&tc.function.arguments)
								.unwrap_or(Value::Object(Default::default())),
						}));
					}
					if !content.is_empty() {
						messages.push(bedrock::Message {
							role: bedrock::Role::Assistant,
							content,
						});
					}
				},
				completions::RequestMessage::Tool(t) => {
					// Tool results are user-role turns keyed by the tool use id
					messages.push(bedrock::Message {
						role: bedrock::Role::User,
						content: vec![bedrock::ContentBlock::ToolResult(bedrock::ToolResultBlock {
							tool_use_id: t.tool_call_id.clone(),
							content: vec![bedrock::ToolResultContentBlock::Text(t.content.text())],
							status: None,
						})],
					});
				},
			}
		}

		let tool_config = req.tools.as_ref().map(|tools| {
			let tools = tools
				.iter()
				.map(|completions::Tool::Function { function }| {
					bedrock::Tool::ToolSpec(bedrock::ToolSpecification {
						name: function.name.clone(),
						description: function.description.clone(),
						input_schema: function
							.parameters
							.clone()
							.map(bedrock::ToolInputSchema::Json),
					})
				})
				.collect();
			let tool_choice = match &req.tool_choice {
				Some(completions::ToolChoice::Mode(completions::ToolChoiceMode::Auto)) => {
					Some(bedrock::ToolChoice::Auto(Default::default()))
				},
				Some(completions::ToolChoice::Mode(completions::ToolChoiceMode::Required)) => {
					Some(bedrock::ToolChoice::Any(Default::default()))
				},
				Some(completions::ToolChoice::Mode(completions::ToolChoiceMode::None)) | None => None,
				Some(completions::ToolChoice::Named(n)) => Some(bedrock::ToolChoice::Tool {
					name: n.function.name.clone(),
				}),
			};
			bedrock::ToolConfiguration { tools, tool_choice }
		});

		Ok(bedrock::ConverseRequest {
			messages,
			system: if system.is_empty() { None } else { Some(system) },
			inference_config: bedrock::InferenceConfiguration {
				max_tokens: req.max_output_tokens(),
				temperature: req.temperature,
				top_p: req.top_p,
				stop_sequences: req.stop_sequences(),
			},
			tool_config,
			additional_model_request_fields: None,
			request_metadata: None,
		})
	}

	fn user_content(
		content: &completions::Content,
	) -> Result<Vec<bedrock::ContentBlock>, AIError> {
		match content {
			completions::Content::Text(t) => {
				if t.trim().is_empty() {
					Ok(vec![])
				} else {
					Ok(vec![bedrock::ContentBlock::Text(t.clone())])
				}
			},
			completions::Content::Parts(parts) => {
				let mut out = Vec::with_capacity(parts.len());
				for p in parts {
					match p {
						completions::ContentPart::Text { text } => {
							out.push(bedrock::ContentBlock::Text(text.clone()));
						},
						completions::ContentPart::ImageUrl { image_url } => {
							let Some((media, data)) = parse_data_url(&image_url.url) else {
								return Err(AIError::UnknownContent(strng::literal!(
									"image url is not a data url"
								)));
							};
							out.push(bedrock::ContentBlock::Image(bedrock::ImageBlock {
								format: media
									.strip_prefix("image/")
									.unwrap_or(media)
									.to_string(),
								source: bedrock::ImageSource {
									bytes: data.to_string(),
								},
							}));
						},
						completions::ContentPart::InputAudio { .. } => {
							return Err(AIError::UnknownContent(strng::literal!("input_audio")));
						},
					}
				}
				Ok(out)
			},
		}
	}

	fn parse_data_url(url: &str) -> Option<(&str, &str)> {
		let rest = url.strip_prefix("data:")?;
		let (media, data) = rest.split_once(";base64,")?;
		Some((media, data))
	}

	pub fn stop_reason(r: bedrock::StopReason) -> completions::FinishReason {
		match r {
			bedrock::StopReason::EndTurn | bedrock::StopReason::StopSequence => {
				completions::FinishReason::Stop
			},
			bedrock::StopReason::ToolUse => completions::FinishReason::ToolCalls,
			bedrock::StopReason::MaxTokens | bedrock::StopReason::ModelContextWindowExceeded => {
				completions::FinishReason::Length
			},
			bedrock::StopReason::GuardrailIntervened | bedrock::StopReason::ContentFiltered => {
				completions::FinishReason::ContentFilter
			},
		}
	}

	fn usage(u: &bedrock::TokenUsage) -> completions::Usage {
		completions::Usage {
			prompt_tokens: u.input_tokens,
			completion_tokens: u.output_tokens,
			total_tokens: u.total_tokens,
			prompt_tokens_details: u.cache_read_input_tokens.map(|c| {
				completions::PromptTokensDetails {
					cached_tokens: Some(c),
					audio_tokens: None,
				}
			}),
			completion_tokens_details: None,
		}
	}

	/// Buffered Converse response to an OpenAI chat completion.
	pub struct ConverseResponse {
		model: Strng,
	}

	impl ConverseResponse {
		pub fn new(model: &str) -> Self {
			Self {
				model: strng::new(model),
			}
		}
	}

	impl ResponseTranslator for ConverseResponse {
		fn translate(&self, body: &[u8]) -> Result<(Bytes, TokenUsage), AIError> {
			let resp: bedrock::ConverseResponse =
				serde_json::from_slice(body).map_err(AIError::ResponseParsing)?;

			let mut content = None;
			let mut reasoning = None;
			let mut tool_calls = Vec::new();
			for block in &resp.output.message.content {
				match block {
					bedrock::ContentBlock::Text(t) => {
						if content.is_none() {
							content = Some(t.clone());
						}
					},
					bedrock::ContentBlock::ToolUse(tu) => {
						tool_calls.push(completions::ToolCall {
							id: tu.tool_use_id.clone(),
							r#type: completions::ToolType::Function,
							function: completions::FunctionCall {
								name: tu.name.clone(),
								arguments: serde_json::to_string(&tu.input)
									.map_err(AIError::ResponseMarshal)?,
							},
						});
					},
					bedrock::ContentBlock::ReasoningContent(rc) => {
						let text = match rc {
							bedrock::ReasoningContentBlock::Structured { reasoning_text } => {
								reasoning_text.text.clone()
							},
							bedrock::ReasoningContentBlock::Simple { text } => text.clone(),
						};
						reasoning = Some(text);
					},
					bedrock::ContentBlock::Image(_) | bedrock::ContentBlock::ToolResult(_) => {},
				}
			}

			let openai = completions::Response {
				id: None,
				object: completions::COMPLETION_OBJECT.to_string(),
				created: None,
				model: self.model.to_string(),
				choices: vec![completions::Choice {
					index: 0,
					message: completions::ResponseMessage {
						role: completions::ASSISTANT_ROLE.to_string(),
						content,
						reasoning_content: reasoning,
						tool_calls: if tool_calls.is_empty() {
							None
						} else {
							Some(tool_calls)
						},
					},
					finish_reason: Some(stop_reason(resp.stop_reason)),
					logprobs: None,
				}],
				usage: Some(usage(&resp.usage)),
				rest: Default::default(),
			};
			let tokens = TokenUsage {
				input_tokens: resp.usage.input_tokens,
				output_tokens: resp.usage.output_tokens,
				total_tokens: resp.usage.total_tokens,
				cached_tokens: resp.usage.cache_read_input_tokens,
				reasoning_tokens: None,
			};
			Ok((super::super::json_bytes(&openai)?, tokens))
		}
	}

	/// Converse stream to OpenAI SSE chunks. Tracks one buffer per tool-use
	/// content block; the first tool-use block seen becomes client index 0.
	pub struct ConverseStream {
		framer: EventStreamFramer,
		model: String,
		message_id: String,
		created: u64,
		// contentBlockIndex -> client tool_calls[].index
		tool_indices: HashMap<i32, u32>,
		finish_reason: Option<completions::FinishReason>,
		usage: TokenUsage,
		pending_usage: Option<completions::Usage>,
		emitted_finish: bool,
	}

	impl ConverseStream {
		pub fn new(model: &str) -> Self {
			Self {
				framer: EventStreamFramer::new(),
				model: model.to_string(),
				message_id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
				created: chrono::Utc::now().timestamp() as u64,
				tool_indices: HashMap::new(),
				finish_reason: None,
				usage: TokenUsage::default(),
				pending_usage: None,
				emitted_finish: false,
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
			ev: bedrock::ConverseStreamOutput,
		) -> Result<Option<completions::StreamResponse>, AIError> {
			use bedrock::ConverseStreamOutput::*;
			Ok(match ev {
				MessageStart(start) => {
					let delta = completions::StreamDelta {
						role: Some(match start.role {
							bedrock::Role::Assistant => completions::ASSISTANT_ROLE.to_string(),
							bedrock::Role::User => completions::USER_ROLE.to_string(),
						}),
						..Default::default()
					};
					Some(self.chunk(vec![Self::delta_choice(delta)], None))
				},
				ContentBlockStart(start) => match start.start {
					Some(bedrock::ContentBlockStart::ToolUse(tu)) => {
						let next = self.tool_indices.len() as u32;
						let index = *self
							.tool_indices
							.entry(start.content_block_index)
							.or_insert(next);
						let delta = completions::StreamDelta {
							tool_calls: Some(vec![completions::ToolCallChunk {
								index,
								id: Some(tu.tool_use_id),
								r#type: Some(completions::ToolType::Function),
								function: Some(completions::FunctionCallChunk {
									name: Some(tu.name),
									arguments: None,
								}),
							}]),
							..Default::default()
						};
						Some(self.chunk(vec![Self::delta_choice(delta)], None))
					},
					// Text and reasoning block starts carry no content
					None => None,
				},
				ContentBlockDelta(d) => {
					let Some(delta) = d.delta else {
						return Ok(None);
					};
					let dr = match delta {
						bedrock::ContentBlockDelta::Text(t) => completions::StreamDelta {
							content: Some(t),
							..Default::default()
						},
						bedrock::ContentBlockDelta::ToolUse(tu) => {
							let Some(index) = self.tool_indices.get(&d.content_block_index).copied()
							else {
								return Ok(None);
							};
							completions::StreamDelta {
								tool_calls: Some(vec![completions::ToolCallChunk {
									index,
									id: None,
									r#type: None,
									function: Some(completions::FunctionCallChunk {
										name: None,
										arguments: Some(tu.input),
									}),
								}]),
								..Default::default()
							}
						},
						bedrock::ContentBlockDelta::ReasoningContent(rc) => match rc {
							bedrock::ReasoningContentBlockDelta::Text(t) => completions::StreamDelta {
								reasoning_content: Some(t),
								..Default::default()
							},
							bedrock::ReasoningContentBlockDelta::RedactedContent(_)
							| bedrock::ReasoningContentBlockDelta::Signature(_) => return Ok(None),
						},
					};
					Some(self.chunk(vec![Self::delta_choice(dr)], None))
				},
				ContentBlockStop(_) => None,
				MessageStop(stop) => {
					self.finish_reason = Some(stop_reason(stop.stop_reason));
					self.emitted_finish = true;
					Some(self.chunk(
						vec![completions::StreamChoice {
							index: 0,
							delta: Default::default(),
							finish_reason: self.finish_reason,
							logprobs: None,
						}],
						None,
					))
				},
				Metadata(meta) => {
					if let Some(u) = meta.usage {
						self.usage.merge(&TokenUsage {
							input_tokens: u.input_tokens,
							output_tokens: u.output_tokens,
							total_tokens: u.total_tokens,
							cached_tokens: u.cache_read_input_tokens,
							reasoning_tokens: None,
						});
						self.pending_usage = Some(usage(&u));
					}
					None
				},
				Exception { kind, message } => {
					return Err(AIError::UpstreamException { kind, message });
				},
			})
		}
	}

	impl StreamTranslator for ConverseStream {
		fn push(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>, AIError> {
			let messages = self
				.framer
				.push(chunk)
				.map_err(|e| AIError::ProtocolFraming(e.to_string()))?;
			let mut out = Vec::new();
			for msg in messages {
				let ev = bedrock::ConverseStreamOutput::from_message(&msg)
					.map_err(AIError::ResponseParsing)?;
				if let Some(chunk) = self.on_event(ev)? {
					out.push(super::super::openai::encode_chunk(&chunk)?);
				}
			}
			Ok(out)
		}

		fn finish(&mut self) -> Result<Vec<Bytes>, AIError> {
			let mut out = Vec::new();
			// The finish_reason chunk always precedes the usage-only chunk
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
