use bytes::Bytes;

use crate::llm::AIError;
use crate::*;

pub mod anthropic;
pub mod bedrock;
pub mod openai;
pub mod vertex;

/// The outcome of request translation: where the request goes and what it
/// carries. The body is always re-serialized; header mutations include the
/// backend's auth material.
#[derive(Debug, Clone)]
pub struct RequestAction {
	pub authority: Strng,
	pub path: String,
	pub set_headers: Vec<(Strng, String)>,
	pub remove_headers: Vec<Strng>,
	pub body: Bytes,
}

impl RequestAction {
	pub fn new(authority: Strng, path: String, body: Vec<u8>) -> Self {
		Self {
			authority,
			path,
			set_headers: Vec::new(),
			remove_headers: Vec::new(),
			body: Bytes::from(body),
		}
	}

	pub fn with_header(mut self, name: Strng, value: impl Into<String>) -> Self {
		self.set_headers.push((name, value.into()));
		self
	}
}

/// Streaming response translation. One instance per response; per-stream
/// state (choice/tool-call indices, role, usage, finish reason) lives inside.
pub trait StreamTranslator: Send {
	/// Feed one wire chunk; returns the translated client-facing bytes.
	fn push(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>, AIError>;
	/// Called at end-of-stream; emits synthesized trailing chunks the backend
	/// did not produce (usage-only chunk, `[DONE]`, ...).
	fn finish(&mut self) -> Result<Vec<Bytes>, AIError>;
	/// Usage observed so far. Monotonically non-decreasing.
	fn usage(&self) -> crate::llm::TokenUsage;
}

/// Buffered (non-streaming) response translation.
pub trait ResponseTranslator: Send {
	fn translate(&self, body: &[u8]) -> Result<(Bytes, crate::llm::TokenUsage), AIError>;
}

/// Maps a backend error payload into the client dialect's envelope.
pub trait ErrorTranslator: Send {
	fn translate_error(
		&self,
		status: u16,
		headers: &http::HeaderMap,
		body: &[u8],
	) -> Result<Bytes, AIError>;
}

pub(crate) fn json_bytes<T: serde::Serialize>(value: &T) -> Result<Bytes, AIError> {
	serde_json::to_vec(value)
		.map(Bytes::from)
		.map_err(AIError::ResponseMarshal)
}

/// Maps any backend's error envelope into the client dialect's envelope.
/// Non-JSON upstream errors wrap the raw body as the message with a
/// backend-specific type tag.
pub struct EnvelopeTranslator {
	pub client: crate::config::ApiSchema,
	pub backend: crate::config::BackendSchema,
}

impl EnvelopeTranslator {
	fn backend_tag(&self) -> &'static str {
		use crate::config::BackendSchema::*;
		match self.backend {
			OpenAI => "OpenAIBackendError",
			AzureOpenAI => "AzureOpenAIBackendError",
			AWSBedrock => "AWSBedrockBackendError",
			GCPVertexAI => "GCPVertexAIBackendError",
			Anthropic => "AnthropicBackendError",
			CohereRerank => "CohereBackendError",
		}
	}

	/// Pulls (message, type) out of the backend's error shape.
	fn extract(&self, headers: &http::HeaderMap, body: &[u8]) -> (String, String) {
		use crate::config::BackendSchema::*;
		let raw = || String::from_utf8_lossy(body).to_string();
		match self.backend {
			OpenAI | AzureOpenAI => {
				match serde_json::from_slice::<crate::llm::types::OpenAIErrorResponse>(body) {
					Ok(e) => (e.error.message, e.error.r#type),
					Err(_) => (raw(), self.backend_tag().to_string()),
				}
			},
			Anthropic => {
				match serde_json::from_slice::<crate::llm::types::AnthropicErrorResponse>(body) {
					Ok(e) => (e.error.message, e.error.r#type),
					Err(_) => (raw(), self.backend_tag().to_string()),
				}
			},
			AWSBedrock => {
				// AWS carries the error type out of band
				let kind = headers
					.get("x-amzn-errortype")
					.and_then(|v| v.to_str().ok())
					.map(|v| v.split(':').next().unwrap_or(v).to_string())
					.unwrap_or_else(|| self.backend_tag().to_string());
				match serde_json::from_slice::<crate::llm::types::bedrock::ConverseErrorResponse>(body) {
					Ok(e) => (e.message, kind),
					Err(_) => (raw(), kind),
				}
			},
			GCPVertexAI => {
				match serde_json::from_slice::<crate::llm::types::vertex::ErrorResponse>(body) {
					Ok(e) => (
						e.error.message,
						e.error.status.unwrap_or_else(|| self.backend_tag().to_string()),
					),
					Err(_) => (raw(), self.backend_tag().to_string()),
				}
			},
			CohereRerank => match serde_json::from_slice::<serde_json::Value>(body) {
				Ok(v) => (
					v.get("message")
						.and_then(|m| m.as_str())
						.map(|s| s.to_string())
						.unwrap_or_else(raw),
					self.backend_tag().to_string(),
				),
				Err(_) => (raw(), self.backend_tag().to_string()),
			},
		}
	}
}

impl ErrorTranslator for EnvelopeTranslator {
	fn translate_error(
		&self,
		status: u16,
		headers: &http::HeaderMap,
		body: &[u8],
	) -> Result<Bytes, AIError> {
		let (message, kind) = self.extract(headers, body);
		match self.client {
			crate::config::ApiSchema::OpenAI => {
				let mut envelope = crate::llm::types::OpenAIErrorResponse::new(message, kind);
				envelope.error.code = Some(status.to_string());
				json_bytes(&envelope)
			},
			crate::config::ApiSchema::Anthropic => {
				let mut envelope = crate::llm::types::AnthropicErrorResponse::new(message, kind);
				envelope.error.code = Some(status.to_string());
				json_bytes(&envelope)
			},
		}
	}
}
