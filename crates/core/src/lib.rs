pub mod signal;
pub mod strng;
pub mod telemetry;
pub mod version;

pub mod prelude {
	pub use std::sync::Arc;
	pub use std::time::{Duration, Instant};

	pub use serde::{Deserialize, Serialize};
	pub use tracing::{debug, error, info, trace, warn};

	pub use crate::strng;
	pub use crate::strng::Strng;
}
