use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Gemini `generateContent` request.
#[derive(Clone, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
	pub contents: Vec<Content>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub system_instruction: Option<Content>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tools: Option<Vec<Tool>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_config: Option<ToolConfig>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub generation_config: Option<GenerationConfig>,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Content {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub role: Option<String>,
	pub parts: Vec<Part>,
}

/// Gemini `Part`s are a closed tagged union; exactly one of the fields is
/// set on the wire.
#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub enum Part {
	Text(String),
	FunctionCall(FunctionCall),
	FunctionResponse(FunctionResponse),
	InlineData(Blob),
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCall {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub args: Option<Value>,
	/// Rarely present; when absent the translator synthesizes a stable id.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
	pub name: String,
	pub response: Value,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
	pub mime_type: String,
	pub data: String,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub function_declarations: Option<Vec<FunctionDeclaration>>,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDeclaration {
	pub name: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub parameters: Option<Value>,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub function_calling_config: Option<FunctionCallingConfig>,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCallingConfig {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub mode: Option<FunctionCallingMode>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub allowed_function_names: Option<Vec<String>>,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FunctionCallingMode {
	Auto,
	Any,
	None,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_output_tokens: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub candidate_count: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stop_sequences: Option<Vec<String>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub seed: Option<i64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub frequency_penalty: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub presence_penalty: Option<f64>,
}

/// Gemini `generateContent` / `streamGenerateContent` response. Streaming
/// reuses the same shape per SSE event.
#[derive(Clone, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
	#[serde(default)]
	pub candidates: Vec<Candidate>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub usage_metadata: Option<UsageMetadata>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub model_version: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub response_id: Option<String>,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub content: Option<Content>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub finish_reason: Option<FinishReason>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub index: Option<u32>,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishReason {
	FinishReasonUnspecified,
	Stop,
	MaxTokens,
	Safety,
	Recitation,
	Blocklist,
	ProhibitedContent,
	Spii,
	MalformedFunctionCall,
	Other,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
	#[serde(default)]
	pub prompt_token_count: u64,
	#[serde(default)]
	pub candidates_token_count: u64,
	#[serde(default)]
	pub total_token_count: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cached_content_token_count: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub thoughts_token_count: Option<u64>,
}

/// Vertex error envelope.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
	pub error: ErrorDetail,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct ErrorDetail {
	#[serde(default)]
	pub code: i32,
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<String>,
}
