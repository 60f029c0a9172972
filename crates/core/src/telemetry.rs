use std::sync::Once;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

static SETUP: Once = Once::new();

/// Initializes the process-wide `tracing` subscriber. Filtering comes from
/// `RUST_LOG` and defaults to `info`. Safe to call more than once; only the
/// first call installs the subscriber (useful for tests).
pub fn setup_logging() {
	SETUP.call_once(|| {
		let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
		tracing_subscriber::registry()
			.with(filter)
			.with(fmt::layer().with_target(true))
			.init();
	});
}
