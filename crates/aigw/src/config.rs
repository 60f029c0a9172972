use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::*;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to read config: {0}")]
	Io(#[from] std::io::Error),
	#[error("failed to parse config: {0}")]
	Parse(#[from] serde_yaml::Error),
	#[error("no rules declared")]
	NoRules,
	#[error("rule {0:?} has no backends")]
	NoBackends(Strng),
	#[error("duplicate backend name {0:?}")]
	DuplicateBackend(Strng),
	#[error("backend {0:?}: {1}")]
	InvalidBackend(Strng, String),
}

/// Process-wide gateway configuration. Published atomically; readers never
/// observe a partial update.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
	/// The client-facing API dialect.
	#[serde(default)]
	pub schema: ApiSchema,
	/// Header carrying the selected route for the proxy's second pass.
	#[serde(default = "default_route_header")]
	pub selected_route_header: Strng,
	/// Header the extracted model name is copied to for metric labels.
	#[serde(default = "default_model_header")]
	pub model_name_header: Strng,
	/// Declared model catalog served by `GET /v1/models`.
	#[serde(default)]
	pub models: Vec<DeclaredModel>,
	pub rules: Vec<RouteRule>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub mcp: Option<McpConfig>,
	/// Statuses besides 5xx that are eligible for backend fallback.
	#[serde(default)]
	pub retryable_statuses: Vec<u16>,
	/// Inbound headers copied onto spans as attributes; keys compare
	/// case-insensitively.
	#[serde(default)]
	pub header_attributes: std::collections::HashMap<String, String>,
}

fn default_route_header() -> Strng {
	strng::literal!("x-ai-eg-selected-route")
}

fn default_model_header() -> Strng {
	strng::literal!("x-ai-eg-model")
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiSchema {
	#[default]
	OpenAI,
	Anthropic,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclaredModel {
	pub name: Strng,
	#[serde(default = "default_owned_by")]
	pub owned_by: Strng,
	#[serde(default)]
	pub created_at: u64,
}

fn default_owned_by() -> Strng {
	strng::literal!("ai-gateway")
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRule {
	pub name: Strng,
	#[serde(default)]
	pub headers: Vec<HeaderMatch>,
	pub backends: Vec<BackendConfig>,
	#[serde(default)]
	pub request_costs: Vec<LLMRequestCost>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderMatch {
	pub name: Strng,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub values: Option<Vec<String>>,
	#[serde(default)]
	pub match_type: HeaderMatchType,
	/// Values compare case-sensitively unless disabled; keys never do.
	#[serde(default = "default_true")]
	pub case_sensitive: bool,
}

fn default_true() -> bool {
	true
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HeaderMatchType {
	#[default]
	Exact,
	Prefix,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LLMRequestCost {
	pub metadata_key: Strng,
	#[serde(rename = "type")]
	pub kind: CostKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CostKind {
	InputToken,
	OutputToken,
	TotalToken,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
	pub name: Strng,
	pub schema: BackendSchema,
	#[serde(default = "default_weight")]
	pub weight: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub model_name_override: Option<Strng>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub host_override: Option<Strng>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub header_mutation: Option<HeaderMutationConfig>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub body_mutation: Option<BodyMutationConfig>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub auth: Option<BackendAuth>,
	/// Azure: the `api-version` query parameter.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub api_version: Option<Strng>,
}

fn default_weight() -> u32 {
	1
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendSchema {
	/// OpenAI or any OpenAI-compatible provider.
	OpenAI,
	AzureOpenAI,
	AWSBedrock,
	GCPVertexAI,
	Anthropic,
	CohereRerank,
}

impl BackendSchema {
	/// Telemetry label per GenAI semconv `gen_ai.system`.
	pub fn system_name(&self) -> Strng {
		match self {
			BackendSchema::OpenAI => strng::literal!("openai"),
			BackendSchema::AzureOpenAI => strng::literal!("az.ai.openai"),
			BackendSchema::AWSBedrock => strng::literal!("aws.bedrock"),
			BackendSchema::GCPVertexAI => strng::literal!("gcp.vertex_ai"),
			BackendSchema::Anthropic => strng::literal!("anthropic"),
			BackendSchema::CohereRerank => strng::literal!("cohere"),
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackendAuth {
	ApiKey {
		key: Strng,
	},
	Aws {
		access_key_id: Strng,
		secret_access_key: Strng,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		session_token: Option<Strng>,
		region: Strng,
	},
	Azure {
		token: Strng,
	},
	Gcp {
		token: Strng,
		project: Strng,
		region: Strng,
	},
	Anthropic {
		key: Strng,
	},
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderMutationConfig {
	#[serde(default)]
	pub set: Vec<HeaderValueConfig>,
	#[serde(default)]
	pub remove: Vec<Strng>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderValueConfig {
	pub name: Strng,
	pub value: Strng,
}

/// JSON-path mutations applied to the request body before translation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyMutationConfig {
	#[serde(default)]
	pub set: Vec<JsonPathSet>,
	#[serde(default)]
	pub remove: Vec<Strng>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonPathSet {
	/// Dot-separated path, e.g. `generation_config.temperature`.
	pub path: Strng,
	pub value: Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpConfig {
	pub backends: Vec<McpBackendConfig>,
	#[serde(default = "default_mcp_ttl_secs")]
	pub session_ttl_secs: u64,
	#[serde(default = "default_mcp_concurrency")]
	pub fanout_concurrency: usize,
	#[serde(default = "default_debounce_ms")]
	pub list_changed_debounce_ms: u64,
}

fn default_mcp_ttl_secs() -> u64 {
	30 * 60
}

fn default_mcp_concurrency() -> usize {
	8
}

fn default_debounce_ms() -> u64 {
	500
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpBackendConfig {
	pub name: Strng,
	pub url: Strng,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub bearer_token: Option<Strng>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tool_selector: Option<ToolSelector>,
}

/// Filters the tools a backend contributes before merging. Absent selector
/// passes everything.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSelector {
	#[serde(default)]
	pub include: Vec<Strng>,
	#[serde(default, with = "serde_regex_vec")]
	pub include_regex: Vec<regex::Regex>,
}

impl ToolSelector {
	pub fn matches(&self, tool: &str) -> bool {
		if self.include.is_empty() && self.include_regex.is_empty() {
			return true;
		}
		self.include.iter().any(|t| t.as_str() == tool)
			|| self.include_regex.iter().any(|re| re.is_match(tool))
	}
}

mod serde_regex_vec {
	use serde::{Deserialize, Deserializer, Serialize, Serializer};

	pub fn serialize<S: Serializer>(v: &[regex::Regex], s: S) -> Result<S::Ok, S::Error> {
		v.iter()
			.map(|r| r.as_str().to_string())
			.collect::<Vec<_>>()
			.serialize(s)
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<regex::Regex>, D::Error> {
		let raw = Vec::<String>::deserialize(d)?;
		raw
			.into_iter()
			.map(|s| regex::Regex::new(&s).map_err(serde::de::Error::custom))
			.collect()
	}
}

impl GatewayConfig {
	pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
		let cfg: GatewayConfig = serde_yaml::from_str(raw)?;
		cfg.validate()?;
		Ok(cfg)
	}

	pub async fn from_file(path: &Path) -> Result<Self, ConfigError> {
		let raw = tokio::fs::read_to_string(path).await?;
		Self::from_yaml(&raw)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.rules.is_empty() {
			return Err(ConfigError::NoRules);
		}
		let mut seen = HashSet::new();
		for rule in &self.rules {
			if rule.backends.is_empty() {
				return Err(ConfigError::NoBackends(rule.name.clone()));
			}
			for be in &rule.backends {
				if !seen.insert(be.name.clone()) {
					return Err(ConfigError::DuplicateBackend(be.name.clone()));
				}
				be.validate()?;
			}
		}
		Ok(())
	}

	pub fn find_backend(&self, name: &str) -> Option<&BackendConfig> {
		self
			.rules
			.iter()
			.flat_map(|r| r.backends.iter())
			.find(|b| b.name.as_str() == name)
	}
}

impl BackendConfig {
	fn validate(&self) -> Result<(), ConfigError> {
		let bad = |msg: &str| {
			Err(ConfigError::InvalidBackend(
				self.name.clone(),
				msg.to_string(),
			))
		};
		match (&self.schema, &self.auth) {
			(BackendSchema::AWSBedrock, Some(BackendAuth::Aws { .. })) => Ok(()),
			(BackendSchema::AWSBedrock, _) => bad("AWSBedrock requires aws auth"),
			(BackendSchema::GCPVertexAI, Some(BackendAuth::Gcp { .. })) => Ok(()),
			(BackendSchema::GCPVertexAI, _) => bad("GCPVertexAI requires gcp auth"),
			(BackendSchema::Anthropic, Some(BackendAuth::Anthropic { .. })) => Ok(()),
			(BackendSchema::Anthropic, _) => bad("Anthropic requires anthropic auth"),
			(BackendSchema::AzureOpenAI, Some(BackendAuth::Azure { .. })) => Ok(()),
			(BackendSchema::AzureOpenAI, _) => bad("AzureOpenAI requires azure auth"),
			(
				BackendSchema::OpenAI | BackendSchema::CohereRerank,
				None | Some(BackendAuth::ApiKey { .. }),
			) => Ok(()),
			(BackendSchema::OpenAI | BackendSchema::CohereRerank, _) => {
				bad("expected api key auth or none")
			},
		}
	}
}

/// Copy-on-publish configuration store; the read path is a single atomic
/// pointer load.
#[derive(Debug)]
pub struct ConfigStore {
	current: ArcSwap<GatewayConfig>,
}

impl ConfigStore {
	pub fn new(cfg: GatewayConfig) -> Self {
		Self {
			current: ArcSwap::from_pointee(cfg),
		}
	}

	pub fn load(&self) -> Arc<GatewayConfig> {
		self.current.load_full()
	}

	pub fn publish(&self, cfg: GatewayConfig) {
		self.current.store(Arc::new(cfg));
	}
}

/// Addresses and process-level knobs, separate from routed config.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
	#[serde(default = "default_extproc_addr")]
	pub extproc_addr: SocketAddr,
	#[serde(default = "default_mcp_addr")]
	pub mcp_addr: SocketAddr,
	#[serde(default = "default_admin_addr")]
	pub admin_addr: SocketAddr,
	#[serde(default = "default_drain_secs")]
	pub termination_drain_secs: u64,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self {
			extproc_addr: default_extproc_addr(),
			mcp_addr: default_mcp_addr(),
			admin_addr: default_admin_addr(),
			termination_drain_secs: default_drain_secs(),
		}
	}
}

fn default_extproc_addr() -> SocketAddr {
	"127.0.0.1:1063".parse().expect("static address")
}

fn default_mcp_addr() -> SocketAddr {
	"127.0.0.1:9856".parse().expect("static address")
}

fn default_admin_addr() -> SocketAddr {
	"127.0.0.1:15021".parse().expect("static address")
}

fn default_drain_secs() -> u64 {
	10
}
