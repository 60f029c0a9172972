use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Rest;

pub const SYSTEM_ROLE: &str = "system";
pub const DEVELOPER_ROLE: &str = "developer";
pub const USER_ROLE: &str = "user";
pub const ASSISTANT_ROLE: &str = "assistant";
pub const TOOL_ROLE: &str = "tool";

/// OpenAI `/v1/chat/completions` request.
#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct Request {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub model: Option<String>,
	pub messages: Vec<RequestMessage>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stream: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stream_options: Option<StreamOptions>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub frequency_penalty: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub presence_penalty: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub seed: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_tokens: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_completion_tokens: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stop: Option<Stop>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub n: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tools: Option<Vec<Tool>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tool_choice: Option<ToolChoice>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub parallel_tool_calls: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub response_format: Option<Value>,
	#[serde(flatten)]
	pub rest: Rest,
}

impl Request {
	pub fn streaming(&self) -> bool {
		self.stream.unwrap_or(false)
	}

	/// Effective completion budget; `max_tokens` is the deprecated spelling.
	pub fn max_output_tokens(&self) -> Option<u64> {
		self.max_completion_tokens.or(self.max_tokens)
	}

	pub fn stop_sequences(&self) -> Vec<String> {
		match &self.stop {
			Some(Stop::String(s)) => vec![s.clone()],
			Some(Stop::StringArray(v)) => v.clone(),
			None => vec![],
		}
	}
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(untagged)]
pub enum Stop {
	String(String),
	StringArray(Vec<String>),
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct StreamOptions {
	pub include_usage: bool,
	#[serde(flatten)]
	pub rest: Rest,
}

/// A chat message in its request form. The `role` tag discriminates.
#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum RequestMessage {
	System(SystemMessage),
	Developer(SystemMessage),
	User(UserMessage),
	Assistant(AssistantMessage),
	Tool(ToolMessage),
}

impl RequestMessage {
	pub fn role(&self) -> &'static str {
		match self {
			RequestMessage::System(_) => SYSTEM_ROLE,
			RequestMessage::Developer(_) => DEVELOPER_ROLE,
			RequestMessage::User(_) => USER_ROLE,
			RequestMessage::Assistant(_) => ASSISTANT_ROLE,
			RequestMessage::Tool(_) => TOOL_ROLE,
		}
	}

	/// Flattened text content of the message, when any.
	pub fn text(&self) -> Option<String> {
		match self {
			RequestMessage::System(m) | RequestMessage::Developer(m) => Some(m.content.text()),
			RequestMessage::User(m) => Some(m.content.text()),
			RequestMessage::Assistant(m) => m.content.as_ref().map(|c| c.text()),
			RequestMessage::Tool(m) => Some(m.content.text()),
		}
	}
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct SystemMessage {
	pub content: Content,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct UserMessage {
	pub content: Content,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct AssistantMessage {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub content: Option<Content>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tool_calls: Option<Vec<ToolCall>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct ToolMessage {
	pub tool_call_id: String,
	pub content: Content,
}

/// Message content: either a bare string or an array of typed parts.
#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(untagged)]
pub enum Content {
	Text(String),
	Parts(Vec<ContentPart>),
}

impl Content {
	pub fn text(&self) -> String {
		match self {
			Content::Text(t) => t.clone(),
			Content::Parts(parts) => parts
				.iter()
				.filter_map(|p| match p {
					ContentPart::Text { text } => Some(text.as_str()),
					_ => None,
				})
				.collect::<Vec<_>>()
				.join("\n"),
		}
	}
}

impl From<String> for Content {
	fn from(s: String) -> Self {
		Content::Text(s)
	}
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
	Text { text: String },
	ImageUrl { image_url: ImageUrl },
	InputAudio { input_audio: Value },
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct ImageUrl {
	pub url: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub detail: Option<String>,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct ToolCall {
	pub id: String,
	#[serde(rename = "type")]
	pub r#type: ToolType,
	pub function: FunctionCall,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolType {
	Function,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct FunctionCall {
	pub name: String,
	/// JSON-encoded arguments object.
	pub arguments: String,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Tool {
	Function { function: FunctionDefinition },
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct FunctionDefinition {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub parameters: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub strict: Option<bool>,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(untagged)]
pub enum ToolChoice {
	Mode(ToolChoiceMode),
	Named(NamedToolChoice),
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoiceMode {
	None,
	Auto,
	Required,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct NamedToolChoice {
	#[serde(rename = "type")]
	pub r#type: ToolType,
	pub function: FunctionName,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct FunctionName {
	pub name: String,
}

/// Non-streaming `/v1/chat/completions` response.
#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct Response {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	pub object: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub created: Option<u64>,
	pub model: String,
	pub choices: Vec<Choice>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub usage: Option<Usage>,
	#[serde(flatten)]
	pub rest: Rest,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Choice {
	pub index: u32,
	pub message: ResponseMessage,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub finish_reason: Option<FinishReason>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub logprobs: Option<Value>,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct ResponseMessage {
	pub role: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub content: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reasoning_content: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
	Stop,
	Length,
	ToolCalls,
	ContentFilter,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Usage {
	pub prompt_tokens: u64,
	pub completion_tokens: u64,
	pub total_tokens: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub prompt_tokens_details: Option<PromptTokensDetails>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub completion_tokens_details: Option<CompletionTokensDetails>,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct PromptTokensDetails {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cached_tokens: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub audio_tokens: Option<u64>,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct CompletionTokensDetails {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reasoning_tokens: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub audio_tokens: Option<u64>,
}

/// One `data:` chunk of a streaming response.
#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct StreamResponse {
	pub id: String,
	pub object: String,
	pub created: u64,
	pub model: String,
	pub choices: Vec<StreamChoice>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub usage: Option<Usage>,
	#[serde(flatten)]
	pub rest: Rest,
}

pub const CHUNK_OBJECT: &str = "chat.completion.chunk";
pub const COMPLETION_OBJECT: &str = "chat.completion";

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct StreamChoice {
	pub index: u32,
	pub delta: StreamDelta,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub finish_reason: Option<FinishReason>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub logprobs: Option<Value>,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct StreamDelta {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub role: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub content: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reasoning_content: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tool_calls: Option<Vec<ToolCallChunk>>,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct ToolCallChunk {
	pub index: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
	pub r#type: Option<ToolType>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub function: Option<FunctionCallChunk>,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct FunctionCallChunk {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub arguments: Option<String>,
}

/// OpenAI legacy `/v1/completions` request. Only routed passthrough is
/// supported, so the body keeps its unknown fields.
#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct LegacyRequest {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub model: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub prompt: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stream: Option<bool>,
	#[serde(flatten)]
	pub rest: Rest,
}

/// OpenAI `/v1/images/generations` request.
#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct ImagesRequest {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub model: Option<String>,
	pub prompt: String,
	#[serde(flatten)]
	pub rest: Rest,
}
