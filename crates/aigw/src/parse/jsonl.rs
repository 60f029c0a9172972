use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

/// Push-based framer for line-delimited JSON: one value per `\n`-terminated
/// line, blank lines skipped.
pub struct JsonLinesFramer {
	codec: LinesCodec,
	buffer: BytesMut,
}

#[derive(Debug, thiserror::Error)]
pub enum JsonLinesError {
	#[error("{0}")]
	Lines(#[from] LinesCodecError),
	#[error("invalid JSON line: {0}")]
	Json(#[from] serde_json::Error),
}

impl Default for JsonLinesFramer {
	fn default() -> Self {
		Self::new()
	}
}

impl JsonLinesFramer {
	pub fn new() -> Self {
		Self {
			codec: LinesCodec::new(),
			buffer: BytesMut::new(),
		}
	}

	pub fn push(&mut self, data: &[u8]) -> Result<Vec<serde_json::Value>, JsonLinesError> {
		self.buffer.extend_from_slice(data);
		let mut out = Vec::new();
		while let Some(line) = self.codec.decode(&mut self.buffer)? {
			if line.trim().is_empty() {
				continue;
			}
			out.push(serde_json::from_str(&line)?);
		}
		Ok(out)
	}

	/// Parses a final unterminated line, if any.
	pub fn finish(&mut self) -> Result<Vec<serde_json::Value>, JsonLinesError> {
		let mut out = Vec::new();
		if let Some(line) = self.codec.decode_eof(&mut self.buffer)?
			&& !line.trim().is_empty()
		{
			out.push(serde_json::from_str(&line)?);
		}
		Ok(out)
	}
}
