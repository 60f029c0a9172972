pub use aigw_core::prelude::*;

pub mod app;
pub mod config;
pub mod extproc;
pub mod llm;
pub mod mcp;
pub mod parse;
pub mod router;
pub mod telemetry;
