use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Rest;

/// OpenAI `/v1/embeddings` request. Backends are OpenAI-compatible, so the
/// body passes through with only a model override; unknown fields survive.
#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct Request {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub model: Option<String>,
	pub input: Value,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub encoding_format: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub dimensions: Option<u64>,
	#[serde(flatten)]
	pub rest: Rest,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct Response {
	pub object: String,
	pub data: Vec<Embedding>,
	pub model: String,
	pub usage: Usage,
	#[serde(flatten)]
	pub rest: Rest,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Embedding {
	pub object: String,
	pub index: u32,
	pub embedding: Value,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct Usage {
	pub prompt_tokens: u64,
	pub total_tokens: u64,
}
