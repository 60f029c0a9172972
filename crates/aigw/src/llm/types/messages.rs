use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Rest;

/// Anthropic `/v1/messages` request.
#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct Request {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub model: Option<String>,
	pub messages: Vec<Message>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_tokens: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub system: Option<SystemPrompt>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stream: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub top_k: Option<u64>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub stop_sequences: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tools: Option<Vec<Tool>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tool_choice: Option<ToolChoice>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub metadata: Option<Value>,
	#[serde(flatten)]
	pub rest: Rest,
}

impl Request {
	pub fn streaming(&self) -> bool {
		self.stream.unwrap_or(false)
	}
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(untagged)]
pub enum SystemPrompt {
	Text(String),
	Blocks(Vec<SystemBlock>),
}

impl SystemPrompt {
	pub fn text(&self) -> String {
		match self {
			SystemPrompt::Text(t) => t.clone(),
			SystemPrompt::Blocks(blocks) => blocks
				.iter()
				.map(|b| b.text.as_str())
				.collect::<Vec<_>>()
				.join("\n"),
		}
	}
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct SystemBlock {
	#[serde(rename = "type")]
	pub r#type: String,
	pub text: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cache_control: Option<Value>,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Message {
	pub role: Role,
	pub content: MessageContent,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	User,
	Assistant,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(untagged)]
pub enum MessageContent {
	Text(String),
	Blocks(Vec<ContentBlock>),
}

impl MessageContent {
	pub fn blocks(&self) -> Vec<ContentBlock> {
		match self {
			MessageContent::Text(t) => vec![ContentBlock::Text {
				text: t.clone(),
				cache_control: None,
			}],
			MessageContent::Blocks(b) => b.clone(),
		}
	}
}

/// Anthropic content blocks are a closed tagged union; an unknown tag is a
/// translation error, never a silent drop.
#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
	Text {
		text: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		cache_control: Option<Value>,
	},
	Image {
		source: Value,
	},
	ToolUse {
		id: String,
		name: String,
		input: Value,
	},
	ToolResult {
		tool_use_id: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		content: Option<ToolResultContent>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		is_error: Option<bool>,
	},
	Thinking {
		thinking: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		signature: Option<String>,
	},
	RedactedThinking {
		data: String,
	},
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(untagged)]
pub enum ToolResultContent {
	Text(String),
	Blocks(Vec<ToolResultBlock>),
}

impl ToolResultContent {
	pub fn text(&self) -> String {
		match self {
			ToolResultContent::Text(t) => t.clone(),
			ToolResultContent::Blocks(blocks) => blocks
				.iter()
				.filter_map(|b| match b {
					ToolResultBlock::Text { text } => Some(text.as_str()),
					_ => None,
				})
				.collect::<Vec<_>>()
				.join("\n"),
		}
	}
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolResultBlock {
	Text { text: String },
	Image { source: Value },
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Tool {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	pub input_schema: Value,
	#[serde(flatten)]
	pub rest: Rest,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
	Auto,
	Any,
	Tool { name: String },
	None,
}

/// Anthropic `/v1/messages` non-streaming response.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Response {
	pub id: String,
	#[serde(rename = "type")]
	pub r#type: String,
	pub role: Role,
	pub model: String,
	pub content: Vec<ContentBlock>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stop_reason: Option<StopReason>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stop_sequence: Option<String>,
	pub usage: Usage,
	#[serde(flatten)]
	pub rest: Rest,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
	EndTurn,
	MaxTokens,
	StopSequence,
	ToolUse,
	PauseTurn,
	Refusal,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct Usage {
	#[serde(default)]
	pub input_tokens: u64,
	#[serde(default)]
	pub output_tokens: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cache_read_input_tokens: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cache_creation_input_tokens: Option<u64>,
}

/// Streaming events, discriminated by the SSE `event:` name and the `type`
/// field inside the payload.
#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
	MessageStart {
		message: MessageStart,
	},
	ContentBlockStart {
		index: u32,
		content_block: ContentBlock,
	},
	ContentBlockDelta {
		index: u32,
		delta: Delta,
	},
	ContentBlockStop {
		index: u32,
	},
	MessageDelta {
		delta: MessageDelta,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		usage: Option<Usage>,
	},
	MessageStop,
	Ping,
	Error {
		error: super::AnthropicError,
	},
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct MessageStart {
	pub id: String,
	pub role: Role,
	pub model: String,
	#[serde(default)]
	pub content: Vec<ContentBlock>,
	pub usage: Usage,
	#[serde(flatten)]
	pub rest: Rest,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delta {
	TextDelta { text: String },
	InputJsonDelta { partial_json: String },
	ThinkingDelta { thinking: String },
	SignatureDelta { signature: String },
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct MessageDelta {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stop_reason: Option<StopReason>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stop_sequence: Option<String>,
}
