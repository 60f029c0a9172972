//! The `envoy.service.ext_proc.v3` message subset this processor speaks,
//! kept as hand-maintained prost types so the crate carries no proto
//! toolchain. Field tags follow envoy's external_processor.proto; unknown
//! fields from newer proxies are skipped by prost on decode.

/// envoy.config.core.v3.HeaderValue
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HeaderValue {
	#[prost(string, tag = "1")]
	pub key: ::prost::alloc::string::String,
	#[prost(string, tag = "2")]
	pub value: ::prost::alloc::string::String,
	#[prost(bytes = "vec", tag = "3")]
	pub raw_value: ::prost::alloc::vec::Vec<u8>,
}

impl HeaderValue {
	pub fn raw(&self) -> &[u8] {
		if self.raw_value.is_empty() {
			self.value.as_bytes()
		} else {
			&self.raw_value
		}
	}
}

/// envoy.config.core.v3.HeaderValueOption
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HeaderValueOption {
	#[prost(message, optional, tag = "1")]
	pub header: ::core::option::Option<HeaderValue>,
	#[prost(
		enumeration = "header_value_option::HeaderAppendAction",
		tag = "3"
	)]
	pub append_action: i32,
}

pub mod header_value_option {
	#[derive(
		Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
	)]
	#[repr(i32)]
	pub enum HeaderAppendAction {
		AppendIfExistsOrAdd = 0,
		AddIfAbsent = 1,
		OverwriteIfExistsOrAdd = 2,
		OverwriteIfExists = 3,
	}
}

/// envoy.config.core.v3.HeaderMap
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HeaderMap {
	#[prost(message, repeated, tag = "1")]
	pub headers: ::prost::alloc::vec::Vec<HeaderValue>,
}

/// envoy.type.v3.HttpStatus; the code rides as a plain i32.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HttpStatus {
	#[prost(int32, tag = "1")]
	pub code: i32,
}

/// envoy.extensions.filters.http.ext_proc.v3.ProcessingMode
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProcessingMode {
	#[prost(enumeration = "processing_mode::HeaderSendMode", tag = "1")]
	pub request_header_mode: i32,
	#[prost(enumeration = "processing_mode::HeaderSendMode", tag = "2")]
	pub response_header_mode: i32,
	#[prost(enumeration = "processing_mode::BodySendMode", tag = "3")]
	pub request_body_mode: i32,
	#[prost(enumeration = "processing_mode::BodySendMode", tag = "4")]
	pub response_body_mode: i32,
	#[prost(enumeration = "processing_mode::HeaderSendMode", tag = "5")]
	pub request_trailer_mode: i32,
	#[prost(enumeration = "processing_mode::HeaderSendMode", tag = "6")]
	pub response_trailer_mode: i32,
}

pub mod processing_mode {
	#[derive(
		Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
	)]
	#[repr(i32)]
	pub enum HeaderSendMode {
		Default = 0,
		Send = 1,
		Skip = 2,
	}

	#[derive(
		Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
	)]
	#[repr(i32)]
	pub enum BodySendMode {
		None = 0,
		Streamed = 1,
		Buffered = 2,
		BufferedPartial = 3,
		FullDuplexStreamed = 4,
	}
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HttpHeaders {
	#[prost(message, optional, tag = "1")]
	pub headers: ::core::option::Option<HeaderMap>,
	#[prost(bool, tag = "3")]
	pub end_of_stream: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HttpBody {
	#[prost(bytes = "vec", tag = "1")]
	pub body: ::prost::alloc::vec::Vec<u8>,
	#[prost(bool, tag = "2")]
	pub end_of_stream: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HttpTrailers {
	#[prost(message, optional, tag = "1")]
	pub trailers: ::core::option::Option<HeaderMap>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProcessingRequest {
	#[prost(bool, tag = "10")]
	pub observability_mode: bool,
	#[prost(oneof = "processing_request::Request", tags = "2, 3, 4, 5, 6, 7")]
	pub request: ::core::option::Option<processing_request::Request>,
}

pub mod processing_request {
	#[derive(Clone, PartialEq, ::prost::Oneof)]
	pub enum Request {
		#[prost(message, tag = "2")]
		RequestHeaders(super::HttpHeaders),
		#[prost(message, tag = "3")]
		ResponseHeaders(super::HttpHeaders),
		#[prost(message, tag = "4")]
		RequestBody(super::HttpBody),
		#[prost(message, tag = "5")]
		ResponseBody(super::HttpBody),
		#[prost(message, tag = "6")]
		RequestTrailers(super::HttpTrailers),
		#[prost(message, tag = "7")]
		ResponseTrailers(super::HttpTrailers),
	}
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProcessingResponse {
	#[prost(message, optional, tag = "9")]
	pub mode_override: ::core::option::Option<ProcessingMode>,
	#[prost(oneof = "processing_response::Response", tags = "1, 2, 3, 4, 5, 6, 7")]
	pub response: ::core::option::Option<processing_response::Response>,
}

pub mod processing_response {
	#[derive(Clone, PartialEq, ::prost::Oneof)]
	pub enum Response {
		#[prost(message, tag = "1")]
		RequestHeaders(super::HeadersResponse),
		#[prost(message, tag = "2")]
		ResponseHeaders(super::HeadersResponse),
		#[prost(message, tag = "3")]
		RequestBody(super::BodyResponse),
		#[prost(message, tag = "4")]
		ResponseBody(super::BodyResponse),
		#[prost(message, tag = "5")]
		RequestTrailers(super::TrailersResponse),
		#[prost(message, tag = "6")]
		ResponseTrailers(super::TrailersResponse),
		#[prost(message, tag = "7")]
		ImmediateResponse(super::ImmediateResponse),
	}
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HeadersResponse {
	#[prost(message, optional, tag = "1")]
	pub response: ::core::option::Option<CommonResponse>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BodyResponse {
	#[prost(message, optional, tag = "1")]
	pub response: ::core::option::Option<CommonResponse>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TrailersResponse {
	#[prost(message, optional, tag = "1")]
	pub header_mutation: ::core::option::Option<HeaderMutation>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommonResponse {
	#[prost(enumeration = "common_response::ResponseStatus", tag = "1")]
	pub status: i32,
	#[prost(message, optional, tag = "2")]
	pub header_mutation: ::core::option::Option<HeaderMutation>,
	#[prost(message, optional, tag = "3")]
	pub body_mutation: ::core::option::Option<BodyMutation>,
	#[prost(message, optional, tag = "4")]
	pub trailers: ::core::option::Option<HeaderMap>,
	#[prost(bool, tag = "5")]
	pub clear_route_cache: bool,
}

pub mod common_response {
	#[derive(
		Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
	)]
	#[repr(i32)]
	pub enum ResponseStatus {
		Continue = 0,
		ContinueAndReplace = 1,
	}
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HeaderMutation {
	#[prost(message, repeated, tag = "1")]
	pub set_headers: ::prost::alloc::vec::Vec<HeaderValueOption>,
	#[prost(string, repeated, tag = "2")]
	pub remove_headers: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BodyMutation {
	#[prost(oneof = "body_mutation::Mutation", tags = "1, 2, 3")]
	pub mutation: ::core::option::Option<body_mutation::Mutation>,
}

pub mod body_mutation {
	#[derive(Clone, PartialEq, ::prost::Oneof)]
	pub enum Mutation {
		/// The entire body to replace
		#[prost(bytes, tag = "1")]
		Body(::prost::alloc::vec::Vec<u8>),
		/// Clear the corresponding body chunk
		#[prost(bool, tag = "2")]
		ClearBody(bool),
		#[prost(message, tag = "3")]
		StreamedResponse(super::StreamedBodyResponse),
	}
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StreamedBodyResponse {
	#[prost(bytes = "vec", tag = "1")]
	pub body: ::prost::alloc::vec::Vec<u8>,
	#[prost(bool, tag = "2")]
	pub end_of_stream: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ImmediateResponse {
	#[prost(message, optional, tag = "1")]
	pub status: ::core::option::Option<HttpStatus>,
	#[prost(message, optional, tag = "2")]
	pub headers: ::core::option::Option<HeaderMutation>,
	#[prost(bytes = "vec", tag = "3")]
	pub body: ::prost::alloc::vec::Vec<u8>,
	#[prost(message, optional, tag = "4")]
	pub grpc_status: ::core::option::Option<GrpcStatus>,
	#[prost(string, tag = "5")]
	pub details: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GrpcStatus {
	#[prost(uint32, tag = "1")]
	pub status: u32,
}

/// Server plumbing for the `ExternalProcessor` bidirectional stream, shaped
/// the way tonic exposes generated streaming services.
pub mod external_processor_server {
	use std::convert::Infallible;
	use std::sync::Arc;
	use std::task::{Context, Poll};

	use futures::future::BoxFuture;
	use tonic::body::Body;
	use tonic::server::{Grpc, NamedService, StreamingService};

	pub const SERVICE_NAME: &str = "envoy.service.ext_proc.v3.ExternalProcessor";
	pub const PROCESS_PATH: &str = "/envoy.service.ext_proc.v3.ExternalProcessor/Process";

	#[tonic::async_trait]
	pub trait ExternalProcessor: Send + Sync + 'static {
		/// Server streaming response type for the Process method.
		type ProcessStream: futures::Stream<Item = Result<super::ProcessingResponse, tonic::Status>>
			+ Send
			+ 'static;

		/// Begins the bidirectional stream the proxy drives for the lifetime
		/// of one HTTP request.
		async fn process(
			&self,
			request: tonic::Request<tonic::Streaming<super::ProcessingRequest>>,
		) -> Result<tonic::Response<Self::ProcessStream>, tonic::Status>;
	}

	#[derive(Debug)]
	pub struct ExternalProcessorServer<T> {
		inner: Arc<T>,
	}

	impl<T> ExternalProcessorServer<T> {
		pub fn new(inner: T) -> Self {
			Self {
				inner: Arc::new(inner),
			}
		}
	}

	impl<T> Clone for ExternalProcessorServer<T> {
		fn clone(&self) -> Self {
			Self {
				inner: self.inner.clone(),
			}
		}
	}

	struct ProcessSvc<T>(Arc<T>);

	impl<T: ExternalProcessor> StreamingService<super::ProcessingRequest> for ProcessSvc<T> {
		type Response = super::ProcessingResponse;
		type ResponseStream = T::ProcessStream;
		type Future = BoxFuture<'static, Result<tonic::Response<Self::ResponseStream>, tonic::Status>>;

		fn call(
			&mut self,
			request: tonic::Request<tonic::Streaming<super::ProcessingRequest>>,
		) -> Self::Future {
			let inner = self.0.clone();
			Box::pin(async move { inner.process(request).await })
		}
	}

	impl<T: ExternalProcessor> tower::Service<http::Request<Body>> for ExternalProcessorServer<T> {
		type Response = http::Response<Body>;
		type Error = Infallible;
		type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

		fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
			Poll::Ready(Ok(()))
		}

		fn call(&mut self, req: http::Request<Body>) -> Self::Future {
			match req.uri().path() {
				PROCESS_PATH => {
					let inner = self.inner.clone();
					Box::pin(async move {
						let codec = tonic_prost::ProstCodec::<
							super::ProcessingResponse,
							super::ProcessingRequest,
						>::default();
						let mut grpc = Grpc::new(codec);
						Ok(grpc.streaming(ProcessSvc(inner), req).await)
					})
				},
				_ => Box::pin(async move { Ok(unimplemented_resp()) }),
			}
		}
	}

	fn unimplemented_resp() -> http::Response<Body> {
		let mut response = http::Response::new(Body::default());
		let headers = response.headers_mut();
		let _ = headers.insert(
			tonic::Status::GRPC_STATUS,
			(tonic::Code::Unimplemented as i32).into(),
		);
		let _ = headers.insert(
			http::header::CONTENT_TYPE,
			tonic::metadata::GRPC_CONTENT_TYPE,
		);
		response
	}

	impl<T: ExternalProcessor> NamedService for ExternalProcessorServer<T> {
		const NAME: &'static str = SERVICE_NAME;
	}
}
