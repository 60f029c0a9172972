use serde_json::{Value, json};

use super::translate::StreamTranslator;
use super::*;
use crate::config::{BackendAuth, BackendConfig, BackendSchema};

pub(crate) fn openai_backend() -> BackendConfig {
	BackendConfig {
		name: strng::literal!("openai"),
		schema: BackendSchema::OpenAI,
		weight: 1,
		model_name_override: None,
		host_override: None,
		header_mutation: None,
		body_mutation: None,
		auth: Some(BackendAuth::ApiKey {
			key: strng::literal!("sk-test"),
		}),
		api_version: None,
	}
}

pub(crate) fn bedrock_backend() -> BackendConfig {
	BackendConfig {
		name: strng::literal!("aws"),
		schema: BackendSchema::AWSBedrock,
		weight: 1,
		model_name_override: None,
		host_override: None,
		header_mutation: None,
		body_mutation: None,
		auth: Some(BackendAuth::Aws {
			access_key_id: strng::literal!("AKIAEXAMPLE"),
			secret_access_key: strng::literal!("secret"),
			session_token: None,
			region: strng::literal!("us-east-1"),
		}),
		api_version: None,
	}
}

pub(crate) fn anthropic_backend() -> BackendConfig {
	BackendConfig {
		name: strng::literal!("anthropic"),
		schema: BackendSchema::Anthropic,
		weight: 1,
		model_name_override: None,
		host_override: None,
		header_mutation: None,
		body_mutation: None,
		auth: Some(BackendAuth::Anthropic {
			key: strng::literal!("sk-ant-test"),
		}),
		api_version: None,
	}
}

pub(crate) fn vertex_backend() -> BackendConfig {
	BackendConfig {
		name: strng::literal!("gcp"),
		schema: BackendSchema::GCPVertexAI,
		weight: 1,
		model_name_override: None,
		host_override: None,
		header_mutation: None,
		body_mutation: None,
		auth: Some(BackendAuth::Gcp {
			token: strng::literal!("ya29.token"),
			project: strng::literal!("my-project"),
			region: strng::literal!("us-central1"),
		}),
		api_version: None,
	}
}

/// Collects the JSON payloads out of a translated SSE byte sequence,
/// returning the data objects and whether the terminal sentinel was last.
pub(crate) fn collect_sse_chunks(raw: &[bytes::Bytes]) -> (Vec<Value>, bool) {
	let mut framer = crate::parse::sse::SseFramer::new();
	let mut chunks = Vec::new();
	let mut done_last = false;
	for b in raw {
		for ev in framer.push(b).expect("translated output is well-framed") {
			if ev.is_done() {
				done_last = true;
			} else {
				done_last = false;
				chunks.push(serde_json::from_slice::<Value>(&ev.data).expect("chunk is JSON"));
			}
		}
	}
	(chunks, done_last)
}

#[test]
fn converse_request_shape() {
	let body = json!({
		"model": "something",
		"messages": [{"role": "system", "content": "You are a chatbot."}],
	});
	let (action, llm) = translate_request(RouteType::ChatCompletions, &bedrock_backend(), &body)
		.expect("translates");
	assert_eq!(action.path, "/model/something/converse");
	assert_eq!(action.authority.as_str(), "bedrock-runtime.us-east-1.amazonaws.com");
	assert!(!llm.streaming);
	assert_eq!(llm.request_model.as_str(), "something");

	let upstream: Value = serde_json::from_slice(&action.body).unwrap();
	assert_eq!(
		upstream,
		json!({
			"inferenceConfig": {},
			"messages": [],
			"system": [{"text": "You are a chatbot."}],
		})
	);
	// SigV4 material rides on the mutated headers
	assert!(
		action
			.set_headers
			.iter()
			.any(|(k, _)| k.as_str() == "authorization"
				|| k.as_str() == "x-amz-date"
				|| k.as_str() == "x-amz-content-sha256"),
		"expected signing headers, got {:?}",
		action.set_headers
	);
}

#[test]
fn converse_response_shape() {
	let upstream = json!({
		"output": {"message": {
			"content": [{"text": "response"}, {"text": "from"}, {"text": "assistant"}],
			"role": "assistant",
		}},
		"usage": {"inputTokens": 10, "outputTokens": 20, "totalTokens": 30},
		"stopReason": "end_turn",
	});
	let backend = bedrock_backend();
	let llm = LLMRequest {
		request_model: strng::literal!("something"),
		provider: backend.schema.system_name(),
		streaming: false,
		route: RouteType::ChatCompletions,
	};
	let translator = response_translator(&backend, &llm).unwrap();
	let (body, usage) = translator
		.translate(&serde_json::to_vec(&upstream).unwrap())
		.unwrap();
	let got: Value = serde_json::from_slice(&body).unwrap();
	assert_eq!(
		got,
		json!({
			"choices": [{
				"finish_reason": "stop",
				"index": 0,
				"message": {"content": "response", "role": "assistant"},
			}],
			"model": "something",
			"object": "chat.completion",
			"usage": {"completion_tokens": 20, "prompt_tokens": 10, "total_tokens": 30},
		})
	);
	assert_eq!(usage.input_tokens + usage.output_tokens, usage.total_tokens);
}

#[test]
fn streaming_forces_include_usage() {
	let body = json!({
		"model": "gpt-4o",
		"messages": [{"role": "user", "content": "hi"}],
		"stream": true,
		"stream_options": {"include_usage": false},
	});
	let (action, llm) = translate_request(RouteType::ChatCompletions, &openai_backend(), &body)
		.expect("translates");
	assert!(llm.streaming);
	let upstream: Value = serde_json::from_slice(&action.body).unwrap();
	assert_eq!(upstream["stream_options"]["include_usage"], json!(true));

	// Absent stream_options is synthesized too
	let body = json!({
		"model": "gpt-4o",
		"messages": [{"role": "user", "content": "hi"}],
		"stream": true,
	});
	let (action, _) =
		translate_request(RouteType::ChatCompletions, &openai_backend(), &body).unwrap();
	let upstream: Value = serde_json::from_slice(&action.body).unwrap();
	assert_eq!(upstream["stream_options"]["include_usage"], json!(true));
}

#[test]
fn request_translation_is_idempotent() {
	let body = json!({
		"model": "something",
		"messages": [
			{"role": "system", "content": "be brief"},
			{"role": "user", "content": "hello"},
			{"role": "assistant", "tool_calls": [{
				"id": "call_1", "type": "function",
				"function": {"name": "f", "arguments": "{\"x\":1}"},
			}]},
			{"role": "tool", "tool_call_id": "call_1", "content": "42"},
		],
		"temperature": 0.5,
	});
	for backend in [bedrock_backend(), anthropic_backend(), vertex_backend()] {
		let (a, _) = translate_request(RouteType::ChatCompletions, &backend, &body).unwrap();
		let (b, _) = translate_request(RouteType::ChatCompletions, &backend, &body).unwrap();
		assert_eq!(a.body, b.body, "body must be stable for {:?}", backend.schema);
		assert_eq!(a.path, b.path);
	}
}

#[test]
fn model_override_applies() {
	let mut backend = openai_backend();
	backend.model_name_override = Some(strng::literal!("gpt-4o-mini"));
	let body = json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}]});
	let (action, llm) =
		translate_request(RouteType::ChatCompletions, &backend, &body).unwrap();
	let upstream: Value = serde_json::from_slice(&action.body).unwrap();
	assert_eq!(upstream["model"], json!("gpt-4o-mini"));
	assert_eq!(llm.request_model.as_str(), "gpt-4o-mini");
}

#[test]
fn azure_path_and_auth() {
	let backend = BackendConfig {
		name: strng::literal!("azure"),
		schema: BackendSchema::AzureOpenAI,
		weight: 1,
		model_name_override: None,
		host_override: Some(strng::literal!("myresource.openai.azure.com")),
		header_mutation: None,
		body_mutation: None,
		auth: Some(BackendAuth::Azure {
			token: strng::literal!("azkey"),
		}),
		api_version: Some(strng::literal!("2024-10-21")),
	};
	let body = json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}]});
	let (action, _) = translate_request(RouteType::ChatCompletions, &backend, &body).unwrap();
	assert_eq!(
		action.path,
		"/openai/deployments/gpt-4o/chat/completions?api-version=2024-10-21"
	);
	assert!(
		action
			.set_headers
			.iter()
			.any(|(k, v)| k.as_str() == "api-key" && v == "azkey")
	);
}

#[test]
fn anthropic_native_path_rewrite() {
	let body = json!({
		"model": "claude-sonnet-4",
		"max_tokens": 64,
		"messages": [{"role": "user", "content": "hi"}],
	});
	let (action, llm) =
		translate_request(RouteType::Messages, &anthropic_backend(), &body).unwrap();
	assert_eq!(action.path, "/v1/messages");
	assert_eq!(action.authority.as_str(), "api.anthropic.com");
	assert!(
		action
			.set_headers
			.iter()
			.any(|(k, v)| k.as_str() == "x-api-key" && v == "sk-ant-test")
	);
	assert!(
		action
			.set_headers
			.iter()
			.any(|(k, v)| k.as_str() == "anthropic-version" && v == "2023-06-01")
	);
	assert_eq!(llm.route, RouteType::Messages);
}

#[test]
fn anthropic_on_bedrock_invoke_paths() {
	let backend = bedrock_backend();
	let body = json!({
		"model": "anthropic.claude-3-sonnet",
		"max_tokens": 64,
		"messages": [{"role": "user", "content": "hi"}],
	});
	let (action, _) = translate_request(RouteType::Messages, &backend, &body).unwrap();
	assert_eq!(action.path, "/model/anthropic.claude-3-sonnet/invoke");
	let upstream: Value = serde_json::from_slice(&action.body).unwrap();
	assert_eq!(upstream["anthropic_version"], json!("bedrock-2023-05-31"));
	assert!(upstream.get("model").is_none());

	let mut body = body;
	body["stream"] = json!(true);
	let (action, llm) = translate_request(RouteType::Messages, &backend, &body).unwrap();
	assert_eq!(
		action.path,
		"/model/anthropic.claude-3-sonnet/invoke-with-response-stream"
	);
	assert!(llm.streaming);
}

#[test]
fn anthropic_on_vertex_raw_predict() {
	let backend = vertex_backend();
	let body = json!({
		"model": "anthropic/claude-sonnet-4",
		"max_tokens": 64,
		"messages": [{"role": "user", "content": "hi"}],
		"stream": true,
	});
	let (action, _) = translate_request(RouteType::Messages, &backend, &body).unwrap();
	assert_eq!(
		action.path,
		"/v1/projects/my-project/locations/us-central1/publishers/anthropic/models/claude-sonnet-4:streamRawPredict"
	);
	let upstream: Value = serde_json::from_slice(&action.body).unwrap();
	assert_eq!(upstream["anthropic_version"], json!("vertex-2023-10-16"));
}

#[test]
fn bedrock_error_envelope_uses_amzn_errortype() {
	let translator = error_translator(crate::config::ApiSchema::OpenAI, BackendSchema::AWSBedrock);
	let mut headers = http::HeaderMap::new();
	headers.insert(
		"x-amzn-errortype",
		"ThrottlingException:http://internal".parse().unwrap(),
	);
	let out = translator
		.translate_error(429, &headers, br#"{"message":"slow down"}"#)
		.unwrap();
	let got: Value = serde_json::from_slice(&out).unwrap();
	assert_eq!(got["error"]["type"], json!("ThrottlingException"));
	assert_eq!(got["error"]["message"], json!("slow down"));
	assert_eq!(got["error"]["code"], json!("429"));
}

#[test]
fn non_json_error_wraps_raw_body() {
	let translator = error_translator(crate::config::ApiSchema::OpenAI, BackendSchema::OpenAI);
	let out = translator
		.translate_error(502, &http::HeaderMap::new(), b"bad gateway")
		.unwrap();
	let got: Value = serde_json::from_slice(&out).unwrap();
	assert_eq!(got["error"]["message"], json!("bad gateway"));
	assert_eq!(got["error"]["type"], json!("OpenAIBackendError"));
}

#[test]
fn anthropic_client_error_envelope() {
	let translator = error_translator(
		crate::config::ApiSchema::Anthropic,
		BackendSchema::AWSBedrock,
	);
	let mut headers = http::HeaderMap::new();
	headers.insert("x-amzn-errortype", "ValidationException".parse().unwrap());
	let out = translator
		.translate_error(400, &headers, br#"{"message":"bad input"}"#)
		.unwrap();
	let got: Value = serde_json::from_slice(&out).unwrap();
	assert_eq!(got["type"], json!("error"));
	assert_eq!(got["error"]["type"], json!("ValidationException"));
	assert_eq!(got["error"]["message"], json!("bad input"));
}

#[test]
fn usage_counters_are_monotonic() {
	let mut u = TokenUsage::default();
	u.merge(&TokenUsage {
		input_tokens: 10,
		output_tokens: 5,
		total_tokens: 15,
		..Default::default()
	});
	u.merge(&TokenUsage {
		input_tokens: 10,
		output_tokens: 3,
		total_tokens: 13,
		..Default::default()
	});
	assert_eq!(u.output_tokens, 5);
	assert_eq!(u.total_tokens, 15);
}

#[tokio::test]
async fn openai_passthrough_stream_appends_done_when_missing() {
	let backend = openai_backend();
	let llm = LLMRequest {
		request_model: strng::literal!("gpt-4o"),
		provider: backend.schema.system_name(),
		streaming: true,
		route: RouteType::ChatCompletions,
	};
	let mut translator = stream_translator(&backend, &llm).unwrap();
	let chunk = json!({
		"id": "chatcmpl-1", "object": "chat.completion.chunk", "created": 1,
		"model": "gpt-4o",
		"choices": [{"index": 0, "delta": {"content": "hi"}}],
	});
	let mut out = translator
		.push(format!("data: {chunk}\n\n").as_bytes())
		.unwrap();
	out.extend(translator.finish().unwrap());
	let (chunks, done_last) = collect_sse_chunks(&out);
	assert_eq!(chunks.len(), 1);
	assert!(done_last, "stream must terminate with [DONE]");
}
