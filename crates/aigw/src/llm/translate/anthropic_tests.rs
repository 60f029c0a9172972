use serde_json::{Value, json};

use super::from_openai::MessagesStream;
use super::*;
use crate::llm::tests::collect_sse_chunks;
use crate::llm::types::completions;

fn sse(events: &[(&str, Value)]) -> Vec<bytes::Bytes> {
	events
		.iter()
		.map(|(name, payload)| {
			bytes::Bytes::from(format!(
				"event: {name}\ndata: {}\n\n",
				serde_json::to_string(payload).unwrap()
			))
		})
		.collect()
}

#[test]
fn openai_request_maps_to_messages() {
	let req: completions::Request = serde_json::from_value(json!({
		"model": "claude-sonnet-4",
		"messages": [
			{"role": "system", "content": "be brief"},
			{"role": "user", "content": "hello"},
			{"role": "assistant", "content": "hi", "tool_calls": [{
				"id": "call_1", "type": "function",
				"function": {"name": "lookup", "arguments": "{\"q\":\"x\"}"},
			}]},
			{"role": "tool", "tool_call_id": "call_1", "content": "result text"},
		],
		"max_completion_tokens": 128,
		"stop": ["END"],
		"tools": [{"type": "function", "function": {
			"name": "lookup",
			"description": "looks things up",
			"parameters": {"type": "object"},
		}}],
		"tool_choice": "auto",
	}))
	.unwrap();

	let out = to_messages_request(&req).unwrap();
	let v = serde_json::to_value(&out).unwrap();
	assert_eq!(v["system"], json!("be brief"));
	assert_eq!(v["max_tokens"], json!(128));
	assert_eq!(v["stop_sequences"], json!(["END"]));
	assert_eq!(v["messages"][0]["role"], json!("user"));
	assert_eq!(v["messages"][1]["content"][1]["type"], json!("tool_use"));
	assert_eq!(v["messages"][2]["content"][0]["type"], json!("tool_result"));
	assert_eq!(v["messages"][2]["content"][0]["tool_use_id"], json!("call_1"));
	assert_eq!(v["tools"][0]["input_schema"], json!({"type": "object"}));
	assert_eq!(v["tool_choice"]["type"], json!("auto"));
}

#[test]
fn max_tokens_defaults_when_absent() {
	let req: completions::Request = serde_json::from_value(json!({
		"model": "claude-sonnet-4",
		"messages": [{"role": "user", "content": "hi"}],
	}))
	.unwrap();
	let out = to_messages_request(&req).unwrap();
	assert_eq!(out.max_tokens, Some(4096));
}

#[tokio::test]
async fn messages_stream_to_openai_chunks() {
	let input = sse(&[
		(
			"message_start",
			json!({"type": "message_start", "message": {
				"id": "msg_1", "role": "assistant", "model": "claude-sonnet-4",
				"content": [], "usage": {"input_tokens": 9, "output_tokens": 0,
				"cache_read_input_tokens": 4},
			}}),
		),
		(
			"content_block_start",
			json!({"type": "content_block_start", "index": 0,
				"content_block": {"type": "text", "text": ""}}),
		),
		(
			"content_block_delta",
			json!({"type": "content_block_delta", "index": 0,
				"delta": {"type": "text_delta", "text": "Hello"}}),
		),
		(
			"content_block_stop",
			json!({"type": "content_block_stop", "index": 0}),
		),
		(
			"content_block_start",
			json!({"type": "content_block_start", "index": 1,
				"content_block": {"type": "tool_use", "id": "toolu_1", "name": "lookup", "input": {}}}),
		),
		(
			"content_block_delta",
			json!({"type": "content_block_delta", "index": 1,
				"delta": {"type": "input_json_delta", "partial_json": "{\"q\":"}}),
		),
		(
			"content_block_delta",
			json!({"type": "content_block_delta", "index": 1,
				"delta": {"type": "input_json_delta", "partial_json": "\"x\"}"}}),
		),
		(
			"content_block_stop",
			json!({"type": "content_block_stop", "index": 1}),
		),
		(
			"message_delta",
			json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"},
				"usage": {"output_tokens": 17}}),
		),
		("message_stop", json!({"type": "message_stop"})),
	]);

	let mut translator = MessagesStream::new("claude-sonnet-4");
	let mut out = Vec::new();
	for chunk in input {
		out.extend(translator.push(&chunk).unwrap());
	}
	out.extend(translator.finish().unwrap());
	let (chunks, done_last) = collect_sse_chunks(&out);
	assert!(done_last);

	// Role first
	assert_eq!(chunks[0]["choices"][0]["delta"]["role"], json!("assistant"));
	// Tool start carries id + name at index 0 (first tool block seen)
	let start = chunks
		.iter()
		.find(|c| c["choices"][0]["delta"]["tool_calls"][0]["id"] == json!("toolu_1"))
		.expect("tool start chunk");
	assert_eq!(
		start["choices"][0]["delta"]["tool_calls"][0]["index"],
		json!(0)
	);
	assert_eq!(
		start["choices"][0]["delta"]["tool_calls"][0]["function"]["name"],
		json!("lookup")
	);
	// Arguments concatenate to complete JSON
	let args: String = chunks
		.iter()
		.filter_map(|c| {
			c["choices"][0]["delta"]["tool_calls"][0]["function"]["arguments"].as_str()
		})
		.collect();
	assert_eq!(args, "{\"q\":\"x\"}");
	// finish then usage, usage blends message_start input with delta output
	assert!(
		chunks
			.iter()
			.any(|c| c["choices"][0]["finish_reason"] == json!("tool_calls"))
	);
	let usage = chunks
		.iter()
		.find_map(|c| c.get("usage").filter(|u| !u.is_null()))
		.expect("usage chunk");
	assert_eq!(usage["prompt_tokens"], json!(9));
	assert_eq!(usage["completion_tokens"], json!(17));
	assert_eq!(usage["total_tokens"], json!(26));
	assert_eq!(
		usage["prompt_tokens_details"]["cached_tokens"],
		json!(4),
		"cache_read_input_tokens must surface as cached_tokens"
	);
}

#[test]
fn buffered_messages_response_to_openai() {
	let upstream = json!({
		"id": "msg_1",
		"type": "message",
		"role": "assistant",
		"model": "claude-sonnet-4",
		"content": [
			{"type": "text", "text": "The answer is 4."},
			{"type": "tool_use", "id": "toolu_9", "name": "calc", "input": {"x": 2}},
		],
		"stop_reason": "tool_use",
		"usage": {"input_tokens": 3, "output_tokens": 7, "cache_read_input_tokens": 1},
	});
	let translator = from_openai::MessagesResponse::new("claude-sonnet-4");
	let (body, usage) = crate::llm::translate::ResponseTranslator::translate(
		&translator,
		&serde_json::to_vec(&upstream).unwrap(),
	)
	.unwrap();
	let got: Value = serde_json::from_slice(&body).unwrap();
	assert_eq!(got["choices"][0]["finish_reason"], json!("tool_calls"));
	assert_eq!(got["choices"][0]["message"]["content"], json!("The answer is 4."));
	assert_eq!(
		got["choices"][0]["message"]["tool_calls"][0]["function"]["name"],
		json!("calc")
	);
	assert_eq!(
		got["usage"]["prompt_tokens_details"]["cached_tokens"],
		json!(1)
	);
	assert_eq!(usage.cached_tokens, Some(1));
}

#[tokio::test]
async fn native_passthrough_stream_preserves_event_names() {
	let input = sse(&[
		(
			"message_start",
			json!({"type": "message_start", "message": {
				"id": "msg_1", "role": "assistant", "model": "claude-sonnet-4",
				"content": [], "usage": {"input_tokens": 2, "output_tokens": 0},
			}}),
		),
		(
			"content_block_delta",
			json!({"type": "content_block_delta", "index": 0,
				"delta": {"type": "text_delta", "text": "hey"}}),
		),
		(
			"message_delta",
			json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"},
				"usage": {"output_tokens": 5}}),
		),
		("message_stop", json!({"type": "message_stop"})),
	]);
	let mut translator = native::PassthroughStream::new();
	let mut out = Vec::new();
	for chunk in &input {
		out.extend(translator.push(chunk).unwrap());
	}
	out.extend(translator.finish().unwrap());

	let raw: Vec<u8> = out.iter().flat_map(|b| b.iter().copied()).collect();
	let text = String::from_utf8(raw).unwrap();
	// The last event is message_stop; the anthropic dialect has no [DONE]
	let last_line = text
		.lines()
		.filter(|l| !l.trim().is_empty())
		.next_back()
		.unwrap();
	assert!(last_line.contains("message_stop"), "got {last_line:?}");
	assert!(text.contains("event: message_start"));
	assert!(text.contains("event: message_stop"));
	assert_eq!(translator.usage().input_tokens, 2);
	assert_eq!(translator.usage().output_tokens, 5);
}

#[tokio::test]
async fn invoke_stream_unwraps_bedrock_chunks() {
	use base64::Engine;
	let event = json!({"type": "content_block_delta", "index": 0,
		"delta": {"type": "text_delta", "text": "hi"}});
	let payload = json!({
		"bytes": base64::engine::general_purpose::STANDARD
			.encode(serde_json::to_vec(&event).unwrap()),
	});
	let frame = crate::parse::aws::encode_event("chunk", &serde_json::to_vec(&payload).unwrap())
		.unwrap();

	let mut translator = on_bedrock::InvokeStream::new();
	let out = translator.push(&frame).unwrap();
	let text = String::from_utf8(out.concat()).unwrap();
	assert!(text.contains("event: content_block_delta"));
	assert!(text.contains("\"text\":\"hi\""));
}
