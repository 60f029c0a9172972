use serde_json::{Value, json};

use super::from_openai::ConverseStream;
use crate::llm::tests::collect_sse_chunks;
use crate::llm::translate::StreamTranslator;
use crate::parse::aws::encode_event;

fn frames(events: &[(&str, Value)]) -> Vec<bytes::Bytes> {
	events
		.iter()
		.map(|(name, payload)| {
			encode_event(name, &serde_json::to_vec(payload).unwrap()).expect("frame encodes")
		})
		.collect()
}

#[tokio::test]
async fn converse_stream_with_two_tool_calls() {
	// Two toolUse groups on contentBlockIndex 1 and 2; the client must see
	// tool indices 0 and 1 with exactly one start delta each
	let input = frames(&[
		("messageStart", json!({"role": "assistant"})),
		(
			"contentBlockStart",
			json!({"contentBlockIndex": 1, "start": {"toolUse": {"toolUseId": "tool-1", "name": "get_weather"}}}),
		),
		(
			"contentBlockDelta",
			json!({"contentBlockIndex": 1, "delta": {"toolUse": {"input": "{\"city\":\"Paris\"}"}}}),
		),
		("contentBlockStop", json!({"contentBlockIndex": 1})),
		(
			"contentBlockStart",
			json!({"contentBlockIndex": 2, "start": {"toolUse": {"toolUseId": "tool-2", "name": "get_time"}}}),
		),
		(
			"contentBlockDelta",
			json!({"contentBlockIndex": 2, "delta": {"toolUse": {"input": "{\"tz\":\"CET\"}"}}}),
		),
		("contentBlockStop", json!({"contentBlockIndex": 2})),
		("messageStop", json!({"stopReason": "tool_use"})),
		(
			"metadata",
			json!({"usage": {"inputTokens": 11, "outputTokens": 22, "totalTokens": 33}}),
		),
	]);

	let mut translator = ConverseStream::new("something");
	let mut out = Vec::new();
	for frame in input {
		out.extend(translator.push(&frame).unwrap());
	}
	out.extend(translator.finish().unwrap());

	let (chunks, done_last) = collect_sse_chunks(&out);
	assert!(done_last, "stream must end with [DONE]");

	// Start deltas: one per tool, with id and function name, indices 0 and 1
	let starts: Vec<&Value> = chunks
		.iter()
		.filter_map(|c| c["choices"][0]["delta"]["tool_calls"].get(0))
		.filter(|tc| tc.get("id").is_some())
		.collect();
	assert_eq!(starts.len(), 2);
	assert_eq!(starts[0]["index"], json!(0));
	assert_eq!(starts[0]["id"], json!("tool-1"));
	assert_eq!(starts[0]["function"]["name"], json!("get_weather"));
	assert_eq!(starts[1]["index"], json!(1));
	assert_eq!(starts[1]["id"], json!("tool-2"));

	// Argument deltas carry the matching index and no id
	let args: Vec<&Value> = chunks
		.iter()
		.filter_map(|c| c["choices"][0]["delta"]["tool_calls"].get(0))
		.filter(|tc| tc.get("id").is_none())
		.collect();
	assert_eq!(args.len(), 2);
	assert_eq!(args[0]["index"], json!(0));
	assert_eq!(args[0]["function"]["arguments"], json!("{\"city\":\"Paris\"}"));
	assert_eq!(args[1]["index"], json!(1));

	// Exactly one finish_reason chunk, before the usage-only chunk
	let finish_positions: Vec<usize> = chunks
		.iter()
		.enumerate()
		.filter(|(_, c)| c["choices"][0]["finish_reason"] == json!("tool_calls"))
		.map(|(i, _)| i)
		.collect();
	assert_eq!(finish_positions.len(), 1);
	let usage_position = chunks
		.iter()
		.position(|c| c.get("usage").map(|u| !u.is_null()).unwrap_or(false))
		.expect("usage-only chunk present");
	assert!(finish_positions[0] < usage_position);
	let usage = &chunks[usage_position]["usage"];
	assert_eq!(usage["prompt_tokens"], json!(11));
	assert_eq!(usage["completion_tokens"], json!(22));
	assert_eq!(usage["total_tokens"], json!(33));
	assert!(
		chunks[usage_position]["choices"]
			.as_array()
			.unwrap()
			.is_empty()
	);

	assert_eq!(translator.usage().total_tokens, 33);
}

#[tokio::test]
async fn converse_stream_text_deltas_in_order() {
	let input = frames(&[
		("messageStart", json!({"role": "assistant"})),
		(
			"contentBlockDelta",
			json!({"contentBlockIndex": 0, "delta": {"text": "Hello"}}),
		),
		(
			"contentBlockDelta",
			json!({"contentBlockIndex": 0, "delta": {"text": " world"}}),
		),
		("contentBlockStop", json!({"contentBlockIndex": 0})),
		("messageStop", json!({"stopReason": "end_turn"})),
		(
			"metadata",
			json!({"usage": {"inputTokens": 1, "outputTokens": 2, "totalTokens": 3}}),
		),
	]);
	let mut translator = ConverseStream::new("m");
	let mut out = Vec::new();
	// Split frames into tiny chunks to exercise partial-frame buffering
	for frame in input {
		for piece in frame.chunks(7) {
			out.extend(translator.push(piece).unwrap());
		}
	}
	out.extend(translator.finish().unwrap());
	let (chunks, done_last) = collect_sse_chunks(&out);
	assert!(done_last);

	let texts: Vec<String> = chunks
		.iter()
		.filter_map(|c| c["choices"][0]["delta"]["content"].as_str())
		.map(|s| s.to_string())
		.collect();
	assert_eq!(texts.join(""), "Hello world");
	let role = chunks
		.iter()
		.find_map(|c| c["choices"][0]["delta"]["role"].as_str().map(String::from))
		.expect("role chunk");
	assert_eq!(role, "assistant");
	assert!(
		chunks
			.iter()
			.any(|c| c["choices"][0]["finish_reason"] == json!("stop"))
	);
}

#[tokio::test]
async fn converse_stream_exception_is_terminal() {
	let frame = encode_event_exception();
	let mut translator = ConverseStream::new("m");
	let err = translator.push(&frame).unwrap_err();
	assert!(matches!(
		err,
		crate::llm::AIError::UpstreamException { .. }
	));
}

fn encode_event_exception() -> bytes::Bytes {
	use crate::parse::aws::{Header, HeaderValue, Message};
	let msg = Message::new(bytes::Bytes::from_static(br#"{"message":"throttled"}"#))
		.add_header(Header::new(
			":message-type",
			HeaderValue::String("exception".into()),
		))
		.add_header(Header::new(
			":exception-type",
			HeaderValue::String("throttlingException".into()),
		));
	let mut out = Vec::new();
	aws_smithy_eventstream::frame::write_message_to(&msg, &mut out).unwrap();
	bytes::Bytes::from(out)
}
