use std::fmt;

#[derive(serde::Serialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
	pub version: String,
	pub rust_version: String,
}

impl BuildInfo {
	pub fn new() -> Self {
		BuildInfo {
			version: option_env!("BUILD_VERSION")
				.unwrap_or(env!("CARGO_PKG_VERSION"))
				.to_string(),
			rust_version: option_env!("BUILD_RUSTC_VERSION")
				.unwrap_or("unknown")
				.to_string(),
		}
	}
}

impl fmt::Display for BuildInfo {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "version: {}", self.version)
	}
}
