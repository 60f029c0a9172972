use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod bedrock;
pub mod completions;
pub mod embeddings;
pub mod messages;
pub mod vertex;

/// The OpenAI dialect error envelope.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct OpenAIErrorResponse {
	pub error: OpenAIError,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct OpenAIError {
	pub message: String,
	#[serde(rename = "type")]
	pub r#type: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub code: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub param: Option<String>,
}

impl OpenAIErrorResponse {
	pub fn new(message: impl Into<String>, r#type: impl Into<String>) -> Self {
		Self {
			error: OpenAIError {
				message: message.into(),
				r#type: r#type.into(),
				code: None,
				param: None,
			},
		}
	}
}

/// The Anthropic dialect error envelope.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct AnthropicErrorResponse {
	#[serde(rename = "type")]
	pub r#type: String,
	pub error: AnthropicError,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct AnthropicError {
	#[serde(rename = "type")]
	pub r#type: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub code: Option<String>,
	pub message: String,
}

impl AnthropicErrorResponse {
	pub fn new(message: impl Into<String>, r#type: impl Into<String>) -> Self {
		Self {
			r#type: "error".to_string(),
			error: AnthropicError {
				r#type: r#type.into(),
				code: None,
				message: message.into(),
			},
		}
	}
}

/// Unknown fields a dialect object must round-trip untouched.
pub type Rest = Map<String, Value>;
