use async_compression::tokio::bufread::GzipDecoder;
use bytes::Bytes;
use tokio::io::AsyncReadExt;

/// Decodes a gzip-compressed buffered body. The outbound client stream is not
/// re-compressed; the proxy owns response encoding.
pub async fn gunzip(body: &[u8]) -> std::io::Result<Bytes> {
	let mut decoder = GzipDecoder::new(body);
	let mut out = Vec::with_capacity(body.len() * 2);
	decoder.read_to_end(&mut out).await?;
	Ok(Bytes::from(out))
}

/// Decodes the body when `Content-Encoding: gzip` is set; otherwise returns
/// it untouched.
pub async fn decode_body(
	headers: &http::HeaderMap,
	body: Bytes,
) -> std::io::Result<(Bytes, bool)> {
	let is_gzip = headers
		.get(http::header::CONTENT_ENCODING)
		.and_then(|v| v.to_str().ok())
		.map(|v| v.eq_ignore_ascii_case("gzip"))
		.unwrap_or(false);
	if !is_gzip {
		return Ok((body, false));
	}
	Ok((gunzip(&body).await?, true))
}
