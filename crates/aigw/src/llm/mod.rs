use bytes::Bytes;
use serde_json::Value;

use crate::config::{ApiSchema, BackendAuth, BackendConfig, BackendSchema};
use crate::llm::translate::{ErrorTranslator, RequestAction, ResponseTranslator, StreamTranslator};
use crate::*;

pub mod translate;
pub mod types;

#[cfg(test)]
#[path = "tests.rs"]
pub(crate) mod tests;

#[derive(thiserror::Error, Debug)]
pub enum AIError {
	#[error("missing field: {0}")]
	MissingField(Strng),
	#[error("model not found")]
	ModelNotFound,
	#[error("unsupported conversion: {0}")]
	UnsupportedConversion(Strng),
	#[error("unknown content tag: {0}")]
	UnknownContent(Strng),
	#[error("request was too large")]
	RequestTooLarge,
	#[error("failed to parse request: {0}")]
	RequestParsing(serde_json::Error),
	#[error("failed to marshal request: {0}")]
	RequestMarshal(serde_json::Error),
	#[error("failed to parse response: {0}")]
	ResponseParsing(serde_json::Error),
	#[error("failed to marshal response: {0}")]
	ResponseMarshal(serde_json::Error),
	#[error("malformed stream framing: {0}")]
	ProtocolFraming(String),
	#[error("upstream exception {kind}: {message}")]
	UpstreamException { kind: String, message: String },
	#[error("failed to sign request: {0}")]
	Signing(String),
}

/// Which endpoint family a request belongs to, detected from the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteType {
	/// OpenAI /v1/chat/completions
	ChatCompletions,
	/// OpenAI legacy /v1/completions
	Completions,
	/// OpenAI /v1/embeddings
	Embeddings,
	/// OpenAI /v1/images/generations
	Images,
	/// OpenAI /v1/models (direct response)
	Models,
	/// Anthropic /anthropic/v1/messages
	Messages,
}

impl RouteType {
	pub fn from_path(method: &str, path: &str) -> Option<RouteType> {
		let path = path.split('?').next().unwrap_or(path);
		match (method, path) {
			("POST", "/v1/chat/completions") => Some(RouteType::ChatCompletions),
			("POST", "/v1/completions") => Some(RouteType::Completions),
			("POST", "/v1/embeddings") => Some(RouteType::Embeddings),
			("POST", "/v1/images/generations") => Some(RouteType::Images),
			("GET", "/v1/models") => Some(RouteType::Models),
			("POST", "/anthropic/v1/messages") => Some(RouteType::Messages),
			_ => None,
		}
	}

	pub fn client_schema(&self) -> ApiSchema {
		match self {
			RouteType::Messages => ApiSchema::Anthropic,
			_ => ApiSchema::OpenAI,
		}
	}

	/// GenAI semconv operation name for telemetry.
	pub fn operation_name(&self) -> Strng {
		match self {
			RouteType::ChatCompletions | RouteType::Messages => strng::literal!("chat"),
			RouteType::Completions => strng::literal!("text_completion"),
			RouteType::Embeddings => strng::literal!("embeddings"),
			RouteType::Images => strng::literal!("image_generation"),
			RouteType::Models => strng::literal!("list_models"),
		}
	}
}

/// What the request translator learned about the request.
#[derive(Debug, Clone)]
pub struct LLMRequest {
	pub request_model: Strng,
	pub provider: Strng,
	pub streaming: bool,
	pub route: RouteType,
}

/// Usage accounting across a response. Counters only move up; the final
/// value is the backend-reported total when present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
	pub input_tokens: u64,
	pub output_tokens: u64,
	pub total_tokens: u64,
	pub cached_tokens: Option<u64>,
	pub reasoning_tokens: Option<u64>,
}

impl TokenUsage {
	pub fn merge(&mut self, other: &TokenUsage) {
		self.input_tokens = self.input_tokens.max(other.input_tokens);
		self.output_tokens = self.output_tokens.max(other.output_tokens);
		self.total_tokens = self.total_tokens.max(other.total_tokens);
		if other.cached_tokens.is_some() {
			self.cached_tokens = other.cached_tokens;
		}
		if other.reasoning_tokens.is_some() {
			self.reasoning_tokens = other.reasoning_tokens;
		}
	}

	pub fn from_openai(u: &types::completions::Usage) -> Self {
		TokenUsage {
			input_tokens: u.prompt_tokens,
			output_tokens: u.completion_tokens,
			total_tokens: u.total_tokens,
			cached_tokens: u.prompt_tokens_details.as_ref().and_then(|d| d.cached_tokens),
			reasoning_tokens: u
				.completion_tokens_details
				.as_ref()
				.and_then(|d| d.reasoning_tokens),
		}
	}

	pub fn from_anthropic(u: &types::messages::Usage) -> Self {
		TokenUsage {
			input_tokens: u.input_tokens,
			output_tokens: u.output_tokens,
			total_tokens: u.input_tokens + u.output_tokens,
			cached_tokens: u.cache_read_input_tokens,
			reasoning_tokens: None,
		}
	}
}

/// Translates a parsed client request body for the chosen backend. Pure:
/// the same input yields byte-identical output.
pub fn translate_request(
	route: RouteType,
	backend: &BackendConfig,
	body: &Value,
) -> Result<(RequestAction, LLMRequest), AIError> {
	let (mut action, llm) = match (route, backend.schema) {
		(
			RouteType::ChatCompletions
			| RouteType::Completions
			| RouteType::Embeddings
			| RouteType::Images,
			BackendSchema::OpenAI | BackendSchema::AzureOpenAI,
		) => translate::openai::translate_request(route, backend, body)?,
		(RouteType::ChatCompletions, BackendSchema::AWSBedrock) => {
			translate::bedrock::from_openai::translate_request(backend, body)?
		},
		(RouteType::ChatCompletions, BackendSchema::GCPVertexAI) => {
			translate::vertex::from_openai::translate_request(backend, body)?
		},
		(RouteType::ChatCompletions, BackendSchema::Anthropic) => {
			translate::anthropic::from_openai::translate_request(backend, body)?
		},
		(RouteType::Messages, BackendSchema::Anthropic) => {
			translate::anthropic::native::translate_request(backend, body)?
		},
		(RouteType::Messages, BackendSchema::AWSBedrock) => {
			translate::anthropic::on_bedrock::translate_request(backend, body)?
		},
		(RouteType::Messages, BackendSchema::GCPVertexAI) => {
			translate::anthropic::on_vertex::translate_request(backend, body)?
		},
		(r, s) => {
			return Err(AIError::UnsupportedConversion(strng::format!(
				"{r:?} to {s:?}"
			)));
		},
	};
	apply_auth(&mut action, backend)?;
	Ok((action, llm))
}

/// Builds the streaming response translator for the backend chosen at
/// request time.
pub fn stream_translator(
	backend: &BackendConfig,
	llm: &LLMRequest,
) -> Result<Box<dyn StreamTranslator>, AIError> {
	match (llm.route, backend.schema) {
		(
			RouteType::ChatCompletions | RouteType::Completions,
			BackendSchema::OpenAI | BackendSchema::AzureOpenAI,
		) => Ok(Box::new(translate::openai::PassthroughStream::new())),
		(RouteType::ChatCompletions, BackendSchema::AWSBedrock) => Ok(Box::new(
			translate::bedrock::from_openai::ConverseStream::new(&llm.request_model),
		)),
		(RouteType::ChatCompletions, BackendSchema::GCPVertexAI) => {
			if translate::vertex::is_anthropic_model(&llm.request_model) {
				Ok(Box::new(translate::anthropic::from_openai::MessagesStream::new(
					&llm.request_model,
				)))
			} else {
				Ok(Box::new(translate::vertex::from_openai::GeminiStream::new(
					&llm.request_model,
				)))
			}
		},
		(RouteType::ChatCompletions, BackendSchema::Anthropic) => Ok(Box::new(
			translate::anthropic::from_openai::MessagesStream::new(&llm.request_model),
		)),
		(RouteType::Messages, BackendSchema::Anthropic | BackendSchema::GCPVertexAI) => {
			Ok(Box::new(translate::anthropic::native::PassthroughStream::new()))
		},
		(RouteType::Messages, BackendSchema::AWSBedrock) => Ok(Box::new(
			translate::anthropic::on_bedrock::InvokeStream::new(),
		)),
		(r, s) => Err(AIError::UnsupportedConversion(strng::format!(
			"streaming {r:?} from {s:?}"
		))),
	}
}

/// Builds the buffered response translator.
pub fn response_translator(
	backend: &BackendConfig,
	llm: &LLMRequest,
) -> Result<Box<dyn ResponseTranslator>, AIError> {
	match (llm.route, backend.schema) {
		(
			RouteType::ChatCompletions
			| RouteType::Completions
			| RouteType::Embeddings
			| RouteType::Images,
			BackendSchema::OpenAI | BackendSchema::AzureOpenAI,
		) => Ok(Box::new(translate::openai::Passthrough::new(llm.route))),
		(RouteType::ChatCompletions, BackendSchema::AWSBedrock) => Ok(Box::new(
			translate::bedrock::from_openai::ConverseResponse::new(&llm.request_model),
		)),
		(RouteType::ChatCompletions, BackendSchema::GCPVertexAI) => {
			if translate::vertex::is_anthropic_model(&llm.request_model) {
				Ok(Box::new(translate::anthropic::from_openai::MessagesResponse::new(
					&llm.request_model,
				)))
			} else {
				Ok(Box::new(translate::vertex::from_openai::GeminiResponse::new(
					&llm.request_model,
				)))
			}
		},
		(RouteType::ChatCompletions, BackendSchema::Anthropic) => Ok(Box::new(
			translate::anthropic::from_openai::MessagesResponse::new(&llm.request_model),
		)),
		(
			RouteType::Messages,
			BackendSchema::Anthropic | BackendSchema::GCPVertexAI | BackendSchema::AWSBedrock,
		) => Ok(Box::new(translate::anthropic::native::Passthrough::new())),
		(r, s) => Err(AIError::UnsupportedConversion(strng::format!(
			"{r:?} from {s:?}"
		))),
	}
}

/// Builds the error-envelope translator mapping the backend's error shape
/// into the client dialect.
pub fn error_translator(
	client: ApiSchema,
	backend: BackendSchema,
) -> Box<dyn ErrorTranslator> {
	Box::new(translate::EnvelopeTranslator { client, backend })
}

/// Provider default hosts.
pub mod hosts {
	use crate::*;

	pub const OPENAI: Strng = strng::literal!("api.openai.com");
	pub const ANTHROPIC: Strng = strng::literal!("api.anthropic.com");

	pub fn bedrock(region: &str) -> Strng {
		strng::format!("bedrock-runtime.{region}.amazonaws.com")
	}

	pub fn vertex(region: &str) -> Strng {
		if region == "global" {
			strng::literal!("aiplatform.googleapis.com")
		} else {
			strng::format!("{region}-aiplatform.googleapis.com")
		}
	}
}

/// Applies the backend's auth to the outgoing request. Bedrock signs the
/// final body with SigV4; everything else is a header.
fn apply_auth(action: &mut RequestAction, backend: &BackendConfig) -> Result<(), AIError> {
	let Some(auth) = &backend.auth else {
		return Ok(());
	};
	match auth {
		BackendAuth::ApiKey { key } => {
			action
				.set_headers
				.push((strng::literal!("authorization"), format!("Bearer {key}")));
		},
		BackendAuth::Azure { token } => {
			action
				.set_headers
				.push((strng::literal!("api-key"), token.to_string()));
			action.remove_headers.push(strng::literal!("authorization"));
		},
		BackendAuth::Gcp { token, .. } => {
			action
				.set_headers
				.push((strng::literal!("authorization"), format!("Bearer {token}")));
		},
		BackendAuth::Anthropic { key } => {
			action
				.set_headers
				.push((strng::literal!("x-api-key"), key.to_string()));
			action
				.set_headers
				.push((strng::literal!("anthropic-version"), "2023-06-01".to_string()));
			action.remove_headers.push(strng::literal!("authorization"));
		},
		BackendAuth::Aws {
			access_key_id,
			secret_access_key,
			session_token,
			region,
		} => {
			sign_aws(
				action,
				access_key_id,
				secret_access_key,
				session_token.as_deref(),
				region,
			)?;
		},
	}
	Ok(())
}

fn sign_aws(
	action: &mut RequestAction,
	access_key_id: &str,
	secret_access_key: &str,
	session_token: Option<&str>,
	region: &str,
) -> Result<(), AIError> {
	use aws_sigv4::http_request::{SignableBody, SignableRequest, SigningSettings, sign};
	use aws_sigv4::sign::v4;

	let identity = aws_credential_types::Credentials::new(
		access_key_id,
		secret_access_key,
		session_token.map(|s| s.to_string()),
		None,
		"gateway-config",
	)
	.into();
	let params = v4::SigningParams::builder()
		.identity(&identity)
		.region(region)
		.name("bedrock")
		.time(std::time::SystemTime::now())
		.settings(SigningSettings::default())
		.build()
		.map_err(|e| AIError::Signing(e.to_string()))?;

	let url = format!("https://{}{}", action.authority, action.path);
	let base_headers = [
		("host", action.authority.to_string()),
		("content-type", "application/json".to_string()),
	];
	let signable = SignableRequest::new(
		"POST",
		&url,
		base_headers.iter().map(|(k, v)| (*k, v.as_str())),
		SignableBody::Bytes(action.body.as_ref()),
	)
	.map_err(|e| AIError::Signing(e.to_string()))?;

	let (instructions, _signature) = sign(signable, &params.into())
		.map_err(|e| AIError::Signing(e.to_string()))?
		.into_parts();

	let mut scratch = ::http::Request::builder()
		.method(::http::Method::POST)
		.uri(&url)
		.body(())
		.map_err(|e| AIError::Signing(e.to_string()))?;
	instructions.apply_to_request_http1x(&mut scratch);
	for (name, value) in scratch.headers() {
		action.set_headers.push((
			strng::new(name.as_str()),
			value.to_str().unwrap_or_default().to_string(),
		));
	}
	action
		.set_headers
		.push((strng::literal!("content-type"), "application/json".to_string()));
	action.remove_headers.push(strng::literal!("authorization"));
	Ok(())
}
