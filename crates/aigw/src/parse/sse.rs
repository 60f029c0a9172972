use bytes::{BufMut, Bytes, BytesMut};
use tokio_sse_codec::{Event, Frame, SseDecodeError, SseDecoder, SseEncoder};
use tokio_util::codec::{Decoder, Encoder};

/// A single decoded server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
	/// The `event:` field, when present and non-default.
	pub name: Option<String>,
	/// The joined `data:` payload.
	pub data: Bytes,
}

impl SseEvent {
	/// OpenAI streams terminate with a literal `[DONE]` data payload.
	pub fn is_done(&self) -> bool {
		self.data.as_ref() == b"[DONE]"
	}
}

/// Push-based SSE framer. Bytes are fed in as they arrive off the wire; whole
/// events come out. A partial trailing event is held until more bytes arrive.
pub struct SseFramer {
	decoder: SseDecoder<Bytes>,
	// Raw bytes while we wait for a line terminator.
	staging: BytesMut,
	// Normalized complete lines, not yet consumed by the decoder.
	decode_buf: BytesMut,
}

impl Default for SseFramer {
	fn default() -> Self {
		Self::new()
	}
}

impl SseFramer {
	pub fn new() -> Self {
		Self {
			decoder: SseDecoder::new(),
			staging: BytesMut::new(),
			decode_buf: BytesMut::new(),
		}
	}

	pub fn push(&mut self, data: &[u8]) -> Result<Vec<SseEvent>, SseDecodeError> {
		self.staging.put_slice(data);
		// Only complete lines go to the decoder; a trailing partial stays staged.
		if let Some(pos) = self.staging.iter().rposition(|b| *b == b'\n') {
			let complete = self.staging.split_to(pos + 1);
			for line in complete.as_ref().split_inclusive(|b| *b == b'\n') {
				let trimmed = trim_line(line);
				// Some providers emit the terminator without the `data:` field prefix.
				if trimmed == b"[DONE]" {
					self.decode_buf.put_slice(b"data: [DONE]\n");
				} else {
					self.decode_buf.put_slice(line);
				}
			}
		}
		self.drain()
	}

	/// Flushes an event left open because the stream ended without a trailing
	/// blank line.
	pub fn finish(&mut self) -> Result<Vec<SseEvent>, SseDecodeError> {
		if !self.staging.is_empty() {
			let staged = std::mem::take(&mut self.staging);
			let trimmed = trim_line(&staged);
			if trimmed == b"[DONE]" {
				self.decode_buf.put_slice(b"data: [DONE]\n");
			} else {
				self.decode_buf.put_slice(&staged);
				self.decode_buf.put_slice(b"\n");
			}
		}
		self.decode_buf.put_slice(b"\n");
		self.drain()
	}

	fn drain(&mut self) -> Result<Vec<SseEvent>, SseDecodeError> {
		let mut events = Vec::new();
		while let Some(frame) = self.decoder.decode(&mut self.decode_buf)? {
			match frame {
				Frame::Event(ev) => {
					let name = if ev.name.is_empty() || ev.name == "message" {
						None
					} else {
						Some(ev.name.to_string())
					};
					events.push(SseEvent {
						name,
						data: ev.data,
					});
				},
				// Comments and retry hints are framing noise for our purposes
				Frame::Comment(_) | Frame::Retry(_) => {},
			}
		}
		Ok(events)
	}
}

fn trim_line(line: &[u8]) -> &[u8] {
	let mut l = line;
	while let Some((last, rest)) = l.split_last()
		&& (*last == b'\n' || *last == b'\r')
	{
		l = rest;
	}
	l
}

/// Renders one event as `data: <payload>\n\n` (plus `event:` when named).
pub fn encode_event(name: Option<&str>, data: &[u8]) -> Bytes {
	let mut encoder = SseEncoder::new();
	let mut out = BytesMut::new();
	let frame = Frame::Event(Event::<Bytes> {
		data: Bytes::copy_from_slice(data),
		name: std::borrow::Cow::Owned(name.unwrap_or("").to_string()),
		id: None,
	});
	// Encoding to a growable buffer cannot fail
	let _ = encoder.encode(frame, &mut out);
	out.freeze()
}

/// Serializes a JSON value as a `data:` event.
pub fn encode_json<T: serde::Serialize>(value: &T) -> Bytes {
	let json = serde_json::to_vec(value).unwrap_or_default();
	encode_event(None, &json)
}

/// The OpenAI stream terminator.
pub fn done_sentinel() -> Bytes {
	Bytes::from_static(b"data: [DONE]\n\n")
}
