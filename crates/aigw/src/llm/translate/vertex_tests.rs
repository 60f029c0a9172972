use serde_json::{Value, json};

use super::from_openai::{GeminiResponse, GeminiStream};
use super::*;
use crate::llm::tests::{collect_sse_chunks, vertex_backend};
use crate::llm::translate::{ResponseTranslator as _, StreamTranslator as _};

const UUID_PATTERN: &str =
	r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$";

#[test]
fn gemini_request_paths() {
	let backend = vertex_backend();
	let body = json!({
		"model": "gemini-2.0-flash",
		"messages": [{"role": "user", "content": "hi"}],
	});
	let (action, _) =
		crate::llm::translate_request(crate::llm::RouteType::ChatCompletions, &backend, &body)
			.unwrap();
	assert_eq!(
		action.path,
		"/v1/projects/my-project/locations/us-central1/publishers/google/models/gemini-2.0-flash:generateContent"
	);
	assert_eq!(action.authority.as_str(), "us-central1-aiplatform.googleapis.com");
	assert!(
		action
			.set_headers
			.iter()
			.any(|(k, v)| k.as_str() == "authorization" && v == "Bearer ya29.token")
	);

	let mut body = body;
	body["stream"] = json!(true);
	let (action, _) =
		crate::llm::translate_request(crate::llm::RouteType::ChatCompletions, &backend, &body)
			.unwrap();
	assert!(action.path.ends_with(":streamGenerateContent?alt=sse"));
}

#[test]
fn gemini_request_shape() {
	let backend = vertex_backend();
	let body = json!({
		"model": "gemini-2.0-flash",
		"messages": [
			{"role": "system", "content": "be helpful"},
			{"role": "user", "content": "what's the weather"},
		],
		"temperature": 0.3,
		"max_completion_tokens": 256,
		"tools": [{"type": "function", "function": {
			"name": "get_weather",
			"description": "fetches weather",
			"parameters": {"type": "object", "properties": {"city": {"type": "string"}}},
		}}],
	});
	let (action, _) =
		crate::llm::translate_request(crate::llm::RouteType::ChatCompletions, &backend, &body)
			.unwrap();
	let upstream: Value = serde_json::from_slice(&action.body).unwrap();
	assert_eq!(
		upstream["systemInstruction"]["parts"][0]["text"],
		json!("be helpful")
	);
	assert_eq!(upstream["contents"][0]["role"], json!("user"));
	assert_eq!(
		upstream["tools"][0]["functionDeclarations"][0]["name"],
		json!("get_weather")
	);
	assert_eq!(upstream["generationConfig"]["temperature"], json!(0.3));
	assert_eq!(upstream["generationConfig"]["maxOutputTokens"], json!(256));
}

#[test]
fn synthesized_tool_call_id_is_stable() {
	// Same function-call block: same id, both times, matching the UUID shape
	let upstream = json!({
		"candidates": [{
			"content": {"role": "model", "parts": [
				{"functionCall": {"name": "get_weather", "args": {"city": "Paris"}}},
			]},
			"finishReason": "STOP",
		}],
		"usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 6, "totalTokenCount": 10},
	});
	let translator = GeminiResponse::new("gemini-2.0-flash");
	let raw = serde_json::to_vec(&upstream).unwrap();
	let (first, _) = translator.translate(&raw).unwrap();
	let (second, _) = translator.translate(&raw).unwrap();
	assert_eq!(first, second, "two translations must agree byte for byte");

	let got: Value = serde_json::from_slice(&first).unwrap();
	let id = got["choices"][0]["message"]["tool_calls"][0]["id"]
		.as_str()
		.unwrap();
	let re = regex::Regex::new(UUID_PATTERN).unwrap();
	assert!(re.is_match(id), "id {id:?} is not uuid-shaped");
	assert_eq!(got["choices"][0]["finish_reason"], json!("tool_calls"));
}

#[test]
fn different_calls_get_different_ids() {
	let a = synthesize_tool_call_id("get_weather", Some(&json!({"city": "Paris"})));
	let b = synthesize_tool_call_id("get_weather", Some(&json!({"city": "Lyon"})));
	let c = synthesize_tool_call_id("get_time", Some(&json!({"city": "Paris"})));
	assert_ne!(a, b);
	assert_ne!(a, c);
	assert_eq!(
		a,
		synthesize_tool_call_id("get_weather", Some(&json!({"city": "Paris"})))
	);
}

#[tokio::test]
async fn gemini_stream_to_openai_chunks() {
	let events = [
		json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "It is"}]}}]}),
		json!({"candidates": [{"content": {"role": "model", "parts": [{"text": " sunny"}]},
			"finishReason": "STOP"}],
			"usageMetadata": {"promptTokenCount": 5, "candidatesTokenCount": 9,
				"totalTokenCount": 14, "thoughtsTokenCount": 2}}),
	];
	let mut translator = GeminiStream::new("gemini-2.0-flash");
	let mut out = Vec::new();
	for ev in events {
		let framed = format!("data: {}\n\n", serde_json::to_string(&ev).unwrap());
		out.extend(translator.push(framed.as_bytes()).unwrap());
	}
	out.extend(translator.finish().unwrap());
	let (chunks, done_last) = collect_sse_chunks(&out);
	assert!(done_last);

	let text: String = chunks
		.iter()
		.filter_map(|c| c["choices"][0]["delta"]["content"].as_str())
		.collect();
	assert_eq!(text, "It is sunny");
	assert!(
		chunks
			.iter()
			.any(|c| c["choices"][0]["finish_reason"] == json!("stop"))
	);
	let usage = chunks
		.iter()
		.find_map(|c| c.get("usage").filter(|u| !u.is_null()))
		.expect("usage chunk");
	assert_eq!(usage["prompt_tokens"], json!(5));
	assert_eq!(usage["completion_tokens"], json!(9));
	assert_eq!(
		usage["completion_tokens_details"]["reasoning_tokens"],
		json!(2)
	);
	assert_eq!(translator.usage().reasoning_tokens, Some(2));
}

#[tokio::test]
async fn gemini_stream_tool_call_ids_match_uuid_shape() {
	let ev = json!({"candidates": [{"content": {"role": "model", "parts": [
		{"functionCall": {"name": "lookup", "args": {"q": "x"}}},
	]}, "finishReason": "STOP"}]});
	let mut translator = GeminiStream::new("gemini-2.0-flash");
	let framed = format!("data: {}\n\n", serde_json::to_string(&ev).unwrap());
	let mut out = translator.push(framed.as_bytes()).unwrap();
	out.extend(translator.finish().unwrap());
	let (chunks, _) = collect_sse_chunks(&out);
	let tc = chunks
		.iter()
		.find_map(|c| {
			let tc = &c["choices"][0]["delta"]["tool_calls"][0];
			tc.get("id").and_then(|i| i.as_str()).map(String::from)
		})
		.expect("tool call chunk");
	let re = regex::Regex::new(UUID_PATTERN).unwrap();
	assert!(re.is_match(&tc));
	assert!(
		chunks
			.iter()
			.any(|c| c["choices"][0]["finish_reason"] == json!("tool_calls"))
	);
}

#[test]
fn anthropic_model_detection() {
	assert!(is_anthropic_model("anthropic/claude-sonnet-4"));
	assert!(is_anthropic_model("publishers/anthropic/models/claude-sonnet-4"));
	assert!(!is_anthropic_model("gemini-2.0-flash"));
	assert_eq!(
		anthropic_model_name("publishers/anthropic/models/claude-sonnet-4"),
		"claude-sonnet-4"
	);
}
