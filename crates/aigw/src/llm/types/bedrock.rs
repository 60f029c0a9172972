use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::parse::aws;

#[derive(Copy, Clone, Deserialize, Serialize, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum Role {
	#[default]
	User,
	Assistant,
}

/// Converse content blocks; a closed tagged union. Unknown tags fail
/// deserialization and surface as a translation error.
#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub enum ContentBlock {
	Text(String),
	Image(ImageBlock),
	ToolUse(ToolUseBlock),
	ToolResult(ToolResultBlock),
	ReasoningContent(ReasoningContentBlock),
}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ImageBlock {
	pub format: String,
	pub source: ImageSource,
}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ImageSource {
	pub bytes: String,
}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(untagged)]
pub enum ReasoningContentBlock {
	Structured {
		#[serde(rename = "reasoningText")]
		reasoning_text: ReasoningText,
	},
	Simple {
		text: String,
	},
}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningText {
	pub text: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub signature: Option<String>,
}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ToolUseBlock {
	/// The ID for the tool request.
	pub tool_use_id: String,
	/// The name of the tool that the model wants to use.
	pub name: String,
	/// The input to pass to the tool.
	pub input: Value,
}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultBlock {
	/// The ID of the tool request that this is the result for.
	pub tool_use_id: String,
	pub content: Vec<ToolResultContentBlock>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<ToolResultStatus>,
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ToolResultStatus {
	Error,
	Success,
}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub enum ToolResultContentBlock {
	Text(String),
	Image(ImageBlock),
	Json(Value),
}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SystemContentBlock {
	pub text: String,
}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Message {
	pub role: Role,
	pub content: Vec<ContentBlock>,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfiguration {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_tokens: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f64>,
	#[serde(skip_serializing_if = "Vec::is_empty", default)]
	pub stop_sequences: Vec<String>,
}

/// The Converse request body. The model id rides in the request path, not in
/// the body.
#[derive(Clone, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConverseRequest {
	pub messages: Vec<Message>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub system: Option<Vec<SystemContentBlock>>,
	/// Always serialized; Bedrock requires the object even when empty.
	pub inference_config: InferenceConfiguration,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_config: Option<ToolConfiguration>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub additional_model_request_fields: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub request_metadata: Option<std::collections::HashMap<String, String>>,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfiguration {
	pub tools: Vec<Tool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_choice: Option<ToolChoice>,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub enum Tool {
	ToolSpec(ToolSpecification),
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpecification {
	pub name: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub input_schema: Option<ToolInputSchema>,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub enum ToolInputSchema {
	Json(Value),
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub enum ToolChoice {
	Auto(EmptyObject),
	Any(EmptyObject),
	Tool { name: String },
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct EmptyObject {}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ConverseResponse {
	pub output: ConverseOutput,
	pub stop_reason: StopReason,
	pub usage: TokenUsage,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub metrics: Option<Value>,
}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ConverseOutput {
	pub message: Message,
}

#[derive(Clone, Copy, Deserialize, Serialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
	EndTurn,
	ToolUse,
	MaxTokens,
	StopSequence,
	GuardrailIntervened,
	ContentFiltered,
	ModelContextWindowExceeded,
}

#[derive(Clone, Deserialize, Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
	pub input_tokens: u64,
	pub output_tokens: u64,
	pub total_tokens: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cache_read_input_tokens: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cache_write_input_tokens: Option<u64>,
}

#[derive(Clone, Deserialize, Serialize, Debug)]
pub struct ConverseErrorResponse {
	pub message: String,
}

/// One logical event of a Converse stream, keyed by the frame's
/// `:event-type` header with the frame payload as the body.
#[derive(Clone, Debug)]
pub enum ConverseStreamOutput {
	MessageStart(MessageStartEvent),
	ContentBlockStart(ContentBlockStartEvent),
	ContentBlockDelta(ContentBlockDeltaEvent),
	ContentBlockStop(ContentBlockStopEvent),
	MessageStop(MessageStopEvent),
	Metadata(MetadataEvent),
	Exception { kind: String, message: String },
}

impl ConverseStreamOutput {
	pub fn from_message(msg: &aws::Message) -> Result<Self, serde_json::Error> {
		let payload = msg.payload().as_ref();
		match aws::event_kind(msg) {
			aws::EventKind::Event(e) => match e.as_str() {
				"messageStart" => Ok(Self::MessageStart(serde_json::from_slice(payload)?)),
				"contentBlockStart" => Ok(Self::ContentBlockStart(serde_json::from_slice(payload)?)),
				"contentBlockDelta" => Ok(Self::ContentBlockDelta(serde_json::from_slice(payload)?)),
				"contentBlockStop" => Ok(Self::ContentBlockStop(serde_json::from_slice(payload)?)),
				"messageStop" => Ok(Self::MessageStop(serde_json::from_slice(payload)?)),
				"metadata" => Ok(Self::Metadata(serde_json::from_slice(payload)?)),
				other => Ok(Self::Exception {
					kind: other.to_string(),
					message: String::from_utf8_lossy(payload).to_string(),
				}),
			},
			aws::EventKind::Exception(kind) => {
				let message = serde_json::from_slice::<ConverseErrorResponse>(payload)
					.map(|e| e.message)
					.unwrap_or_else(|_| String::from_utf8_lossy(payload).to_string());
				Ok(Self::Exception { kind, message })
			},
			aws::EventKind::Unknown => Ok(Self::Exception {
				kind: "unknown".to_string(),
				message: String::from_utf8_lossy(payload).to_string(),
			}),
		}
	}
}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MessageStartEvent {
	pub role: Role,
}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ContentBlockStartEvent {
	pub content_block_index: i32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub start: Option<ContentBlockStart>,
}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub enum ContentBlockStart {
	ToolUse(ToolUseBlockStart),
}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ToolUseBlockStart {
	pub tool_use_id: String,
	pub name: String,
}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ContentBlockDeltaEvent {
	pub content_block_index: i32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub delta: Option<ContentBlockDelta>,
}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub enum ContentBlockDelta {
	Text(String),
	ToolUse(ToolUseBlockDelta),
	ReasoningContent(ReasoningContentBlockDelta),
}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ToolUseBlockDelta {
	pub input: String,
}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub enum ReasoningContentBlockDelta {
	Text(String),
	RedactedContent(String),
	Signature(String),
}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ContentBlockStopEvent {
	pub content_block_index: i32,
}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MessageStopEvent {
	pub stop_reason: StopReason,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub additional_model_response_fields: Option<Value>,
}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MetadataEvent {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub usage: Option<TokenUsage>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub metrics: Option<Value>,
}
