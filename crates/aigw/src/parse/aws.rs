use aws_smithy_eventstream::frame::{DecodedFrame, MessageFrameDecoder};
pub use aws_smithy_types::event_stream::{Header, HeaderValue, Message};
use bytes::{BufMut, Bytes, BytesMut};

/// Error type for EventStream decoding.
#[derive(Debug, thiserror::Error)]
pub enum EventStreamError {
	/// AWS EventStream protocol error (CRC mismatch, invalid headers, etc.)
	#[error("{0}")]
	Protocol(#[from] aws_smithy_eventstream::error::Error),
	#[error("{0}")]
	Encode(String),
}

/// Push-based decoder for the AWS EventStream binary protocol. The underlying
/// smithy decoder validates the prelude and message CRC32s; an incomplete
/// trailing frame is retained until more bytes arrive.
#[derive(Default)]
pub struct EventStreamFramer {
	inner: MessageFrameDecoder,
	buffer: BytesMut,
}

impl EventStreamFramer {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&mut self, data: &[u8]) -> Result<Vec<Message>, EventStreamError> {
		self.buffer.put_slice(data);
		let mut messages = Vec::new();
		loop {
			match self.inner.decode_frame(&mut self.buffer)? {
				DecodedFrame::Complete(message) => messages.push(message),
				DecodedFrame::Incomplete => return Ok(messages),
			}
		}
	}
}

/// The logical event kinds of a Converse stream, discriminated by the
/// `:event-type` (or `:exception-type`) header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
	Event(String),
	Exception(String),
	Unknown,
}

pub fn event_kind(msg: &Message) -> EventKind {
	if let Some(e) = header_str(msg, ":exception-type") {
		return EventKind::Exception(e.to_string());
	}
	match header_str(msg, ":event-type") {
		Some(e) => EventKind::Event(e.to_string()),
		None => EventKind::Unknown,
	}
}

pub fn header_str<'a>(msg: &'a Message, name: &str) -> Option<&'a str> {
	msg
		.headers()
		.iter()
		.find(|h| h.name().as_str() == name)
		.and_then(|h| match h.value() {
			HeaderValue::String(s) => Some(s.as_str()),
			_ => None,
		})
}

/// Frames a JSON payload as an event message. Used by fixtures and by the
/// error path when a stream must be terminated in-band.
pub fn encode_event(event_type: &str, payload: &[u8]) -> Result<Bytes, EventStreamError> {
	let msg = Message::new(Bytes::copy_from_slice(payload))
		.add_header(Header::new(
			":message-type",
			HeaderValue::String("event".into()),
		))
		.add_header(Header::new(
			":event-type",
			HeaderValue::String(event_type.to_string().into()),
		))
		.add_header(Header::new(
			":content-type",
			HeaderValue::String("application/json".into()),
		));
	let mut out = Vec::new();
	aws_smithy_eventstream::frame::write_message_to(&msg, &mut out)
		.map_err(|e| EventStreamError::Encode(e.to_string()))?;
	Ok(Bytes::from(out))
}
