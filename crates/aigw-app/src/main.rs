use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

#[derive(Parser)]
#[command(name = "aigw", about = "AI gateway external processor")]
struct Args {
	/// Path to the gateway configuration file (YAML)
	#[arg(short, long)]
	config: PathBuf,

	/// Path to the server configuration file (YAML); defaults apply when
	/// omitted
	#[arg(long)]
	server_config: Option<PathBuf>,
}

fn main() -> ExitCode {
	aigw_core::telemetry::setup_logging();
	let args = Args::parse();

	let runtime = match tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()
	{
		Ok(rt) => rt,
		Err(e) => {
			error!("failed to build runtime: {e}");
			return ExitCode::from(1);
		},
	};

	runtime.block_on(async move {
		let gateway = match aigw::config::GatewayConfig::from_file(&args.config).await {
			Ok(cfg) => cfg,
			Err(e) => {
				error!("invalid configuration: {e}");
				return ExitCode::from(1);
			},
		};
		let server = match &args.server_config {
			Some(path) => {
				let raw = match tokio::fs::read_to_string(path).await {
					Ok(raw) => raw,
					Err(e) => {
						error!("failed to read server config: {e}");
						return ExitCode::from(1);
					},
				};
				match serde_yaml::from_str(&raw) {
					Ok(cfg) => cfg,
					Err(e) => {
						error!("invalid server config: {e}");
						return ExitCode::from(1);
					},
				}
			},
			None => aigw::config::ServerConfig::default(),
		};
		match aigw::app::run(server, gateway).await {
			Ok(()) => ExitCode::SUCCESS,
			Err(e) => {
				error!("fatal: {e}");
				ExitCode::from(2)
			},
		}
	})
}
