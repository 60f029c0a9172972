use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue, LabelValueEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;

use crate::llm::{LLMRequest, TokenUsage};
use crate::*;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct GenAILabels {
	pub gen_ai_operation_name: String,
	pub gen_ai_request_model: String,
	pub gen_ai_system_name: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TokenLabels {
	pub gen_ai_operation_name: String,
	pub gen_ai_request_model: String,
	pub gen_ai_system_name: String,
	pub gen_ai_token_type: TokenType,
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum TokenType {
	Prompt,
	Completion,
	CachedTokens,
	ReasoningTokens,
}

impl EncodeLabelValue for TokenType {
	fn encode(&self, encoder: &mut LabelValueEncoder) -> Result<(), std::fmt::Error> {
		use std::fmt::Write;
		let v = match self {
			TokenType::Prompt => "prompt",
			TokenType::Completion => "completion",
			TokenType::CachedTokens => "cached_tokens",
			TokenType::ReasoningTokens => "reasoning_tokens",
		};
		encoder.write_str(v)
	}
}

/// Process-wide metric instruments; counters are atomic, labels are cheap
/// clones of small strings.
#[derive(Debug)]
pub struct Metrics {
	token_usage: Family<TokenLabels, Counter>,
	time_per_output_token: Family<GenAILabels, Histogram, fn() -> Histogram>,
	request_duration: Family<GenAILabels, Histogram, fn() -> Histogram>,
	requests: Family<GenAILabels, Counter>,
	errors: Family<GenAILabels, Counter>,
}

fn token_seconds_histogram() -> Histogram {
	Histogram::new(exponential_buckets(0.001, 2.0, 16))
}

fn duration_histogram() -> Histogram {
	Histogram::new(exponential_buckets(0.005, 2.0, 16))
}

impl Metrics {
	pub fn new(registry: &mut Registry) -> Self {
		let token_usage = Family::<TokenLabels, Counter>::default();
		registry.register(
			"gen_ai_client_token_usage",
			"Tokens consumed per request, split by role",
			token_usage.clone(),
		);
		let time_per_output_token =
			Family::<GenAILabels, Histogram, fn() -> Histogram>::new_with_constructor(
				token_seconds_histogram,
			);
		registry.register(
			"gen_ai_server_time_per_output_token_seconds",
			"Response time divided by emitted output tokens",
			time_per_output_token.clone(),
		);
		let request_duration = Family::<GenAILabels, Histogram, fn() -> Histogram>::new_with_constructor(
			duration_histogram,
		);
		registry.register(
			"gen_ai_server_request_duration_seconds",
			"End to end request duration",
			request_duration.clone(),
		);
		let requests = Family::<GenAILabels, Counter>::default();
		registry.register(
			"gen_ai_server_requests",
			"Requests processed",
			requests.clone(),
		);
		let errors = Family::<GenAILabels, Counter>::default();
		registry.register(
			"gen_ai_server_request_errors",
			"Requests that ended in an error",
			errors.clone(),
		);
		Self {
			token_usage,
			time_per_output_token,
			request_duration,
			requests,
			errors,
		}
	}

	fn labels(llm: &LLMRequest) -> GenAILabels {
		GenAILabels {
			gen_ai_operation_name: llm.route.operation_name().to_string(),
			gen_ai_request_model: llm.request_model.to_string(),
			gen_ai_system_name: llm.provider.to_string(),
		}
	}

	fn token_labels(llm: &LLMRequest, t: TokenType) -> TokenLabels {
		TokenLabels {
			gen_ai_operation_name: llm.route.operation_name().to_string(),
			gen_ai_request_model: llm.request_model.to_string(),
			gen_ai_system_name: llm.provider.to_string(),
			gen_ai_token_type: t,
		}
	}

	/// Records the final accounting for one request.
	pub fn record(&self, llm: &LLMRequest, usage: &TokenUsage, duration: Duration) {
		self.requests.get_or_create(&Self::labels(llm)).inc();
		self
			.request_duration
			.get_or_create(&Self::labels(llm))
			.observe(duration.as_secs_f64());

		let inc = |t: TokenType, v: u64| {
			if v > 0 {
				self
					.token_usage
					.get_or_create(&Self::token_labels(llm, t))
					.inc_by(v);
			}
		};
		inc(TokenType::Prompt, usage.input_tokens);
		inc(TokenType::Completion, usage.output_tokens);
		inc(TokenType::CachedTokens, usage.cached_tokens.unwrap_or(0));
		inc(
			TokenType::ReasoningTokens,
			usage.reasoning_tokens.unwrap_or(0),
		);

		if usage.output_tokens > 0 {
			self
				.time_per_output_token
				.get_or_create(&Self::labels(llm))
				.observe(duration.as_secs_f64() / usage.output_tokens as f64);
		}
	}

	pub fn record_error(&self, llm: &LLMRequest) {
		self.errors.get_or_create(&Self::labels(llm)).inc();
	}
}
