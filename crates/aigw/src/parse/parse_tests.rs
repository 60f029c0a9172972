use bytes::Bytes;

use super::aws;
use super::jsonl::JsonLinesFramer;
use super::sse::{SseFramer, done_sentinel, encode_event};

#[test]
fn sse_joins_multi_line_events() {
	let mut f = SseFramer::new();
	let events = f
		.push(b"data: hello\ndata: world\n\n")
		.expect("valid frame");
	assert_eq!(events.len(), 1);
	assert_eq!(events[0].data, Bytes::from_static(b"hello\nworld"));
}

#[test]
fn sse_holds_partial_events_across_pushes() {
	let mut f = SseFramer::new();
	assert!(f.push(b"data: {\"a\":").expect("ok").is_empty());
	assert!(f.push(b"1}").expect("ok").is_empty());
	let events = f.push(b"\n\ndata: x\n\n").expect("ok");
	assert_eq!(events.len(), 2);
	assert_eq!(events[0].data, Bytes::from_static(b"{\"a\":1}"));
	assert_eq!(events[1].data, Bytes::from_static(b"x"));
}

#[rstest::rstest]
#[case(b"data: [DONE]\n\n".as_slice())]
#[case(b"data:[DONE]\n\n".as_slice())]
#[case(b"[DONE]\n\n".as_slice())]
fn sse_done_variants(#[case] input: &[u8]) {
	let mut f = SseFramer::new();
	let events = f.push(input).expect("valid frame");
	assert_eq!(events.len(), 1, "input {:?}", String::from_utf8_lossy(input));
	assert!(events[0].is_done());
}

#[test]
fn sse_named_events() {
	let mut f = SseFramer::new();
	let events = f
		.push(b"event: message_stop\ndata: {}\n\n")
		.expect("valid frame");
	assert_eq!(events.len(), 1);
	assert_eq!(events[0].name.as_deref(), Some("message_stop"));
}

#[test]
fn sse_finish_flushes_open_event() {
	let mut f = SseFramer::new();
	assert!(f.push(b"data: tail").expect("ok").is_empty());
	let events = f.finish().expect("ok");
	assert_eq!(events.len(), 1);
	assert_eq!(events[0].data, Bytes::from_static(b"tail"));
}

#[test]
fn sse_encode_renders_data_lines() {
	let out = encode_event(None, b"{\"x\":1}");
	let s = std::str::from_utf8(&out).unwrap();
	assert!(s.contains("data: {\"x\":1}"), "got {s:?}");
	assert!(s.ends_with("\n\n"), "got {s:?}");
	assert_eq!(done_sentinel(), Bytes::from_static(b"data: [DONE]\n\n"));
}

#[test]
fn aws_event_stream_round_trip() {
	let frame = aws::encode_event("contentBlockDelta", br#"{"delta":{"text":"hi"}}"#).unwrap();
	let mut framer = aws::EventStreamFramer::new();
	// Feed one byte at a time to exercise partial-frame retention
	let mut messages = Vec::new();
	for b in frame.iter() {
		messages.extend(framer.push(std::slice::from_ref(b)).expect("decode"));
	}
	assert_eq!(messages.len(), 1);
	assert_eq!(
		aws::event_kind(&messages[0]),
		aws::EventKind::Event("contentBlockDelta".to_string())
	);
	assert_eq!(messages[0].payload().as_ref(), br#"{"delta":{"text":"hi"}}"#);
}

#[test]
fn aws_event_stream_rejects_crc_damage() {
	let mut frame = aws::encode_event("messageStop", br#"{"stopReason":"end_turn"}"#)
		.unwrap()
		.to_vec();
	let last = frame.len() - 1;
	frame[last] ^= 0xff;
	let mut framer = aws::EventStreamFramer::new();
	assert!(framer.push(&frame).is_err());
}

#[test]
fn aws_exception_frames_are_surfaced() {
	let msg = aws_smithy_types::event_stream::Message::new(Bytes::from_static(b"{}"))
		.add_header(aws::Header::new(
			":message-type",
			aws::HeaderValue::String("exception".into()),
		))
		.add_header(aws::Header::new(
			":exception-type",
			aws::HeaderValue::String("throttlingException".into()),
		));
	assert_eq!(
		aws::event_kind(&msg),
		aws::EventKind::Exception("throttlingException".to_string())
	);
}

#[test]
fn jsonl_skips_blank_lines() {
	let mut f = JsonLinesFramer::new();
	let mut vals = f.push(b"{\"a\":1}\n\n{\"b\":2}\n{\"c\":").expect("ok");
	vals.extend(f.push(b"3}\n").expect("ok"));
	assert_eq!(vals.len(), 3);
	assert_eq!(vals[2]["c"], 3);
	assert!(f.finish().expect("ok").is_empty());
}

#[tokio::test]
async fn gzip_transparent_decode() {
	use tokio::io::AsyncReadExt;
	let plain = br#"{"object":"chat.completion"}"#;
	let mut encoder = async_compression::tokio::bufread::GzipEncoder::new(plain.as_slice());
	let mut compressed = Vec::new();
	encoder.read_to_end(&mut compressed).await.unwrap();

	let mut headers = http::HeaderMap::new();
	headers.insert(http::header::CONTENT_ENCODING, "gzip".parse().unwrap());
	let (out, was_compressed) = super::compression::decode_body(&headers, Bytes::from(compressed))
		.await
		.unwrap();
	assert!(was_compressed);
	assert_eq!(out.as_ref(), plain);
}
