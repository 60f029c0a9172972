use aigw_core::signal::Shutdown;
use prometheus_client::registry::Registry;

use crate::config::{ConfigStore, GatewayConfig, ServerConfig};
use crate::extproc::ExtProcService;
use crate::extproc::proto::external_processor_server::ExternalProcessorServer;
use crate::telemetry::metrics::Metrics;
use crate::telemetry::recorder::{RedactionFlags, RequestTracer};
use crate::telemetry::trc::Tracing;
use crate::*;

/// Builds and runs the whole processor: telemetry, the ExtProc gRPC
/// listener, the MCP listener, and the admin endpoints. Returns once a
/// shutdown signal has been handled and telemetry is flushed.
pub async fn run(server: ServerConfig, gateway: GatewayConfig) -> anyhow::Result<()> {
	let tracing = Tracing::from_env()?;
	let mut registry = Registry::default();
	let metrics = Arc::new(Metrics::new(&mut registry));
	let registry = Arc::new(registry);

	let tracer = RequestTracer::new(
		tracing.clone(),
		RedactionFlags::from_env(),
		&gateway.header_attributes,
	);
	let config = Arc::new(ConfigStore::new(gateway));

	let shutdown = Shutdown::new();
	let trigger = shutdown.trigger();

	// Admin: health and metrics
	let admin = axum::Router::new()
		.route("/healthz", axum::routing::get(|| async { "ok" }))
		.route(
			"/metrics",
			axum::routing::get({
				let registry = registry.clone();
				move || async move {
					let mut out = String::new();
					match prometheus_client::encoding::text::encode(&mut out, &registry) {
						Ok(()) => (http::StatusCode::OK, out),
						Err(e) => (
							http::StatusCode::INTERNAL_SERVER_ERROR,
							format!("metrics encoding failed: {e}"),
						),
					}
				}
			}),
		);
	let admin_listener = tokio::net::TcpListener::bind(server.admin_addr).await?;
	info!(addr = %server.admin_addr, "admin listening");
	let admin_task = tokio::spawn(async move {
		if let Err(e) = axum::serve(admin_listener, admin).await {
			error!("admin server failed: {e}");
		}
	});

	// MCP multiplexer listener, when configured
	let mcp_task = if config.load().mcp.is_some() {
		let app = crate::mcp::App::new(config.clone(), tracing.clone());
		let listener = tokio::net::TcpListener::bind(server.mcp_addr).await?;
		info!(addr = %server.mcp_addr, "mcp listening");
		Some(tokio::spawn(async move {
			if let Err(e) = axum::serve(listener, app.router()).await {
				error!("mcp server failed: {e}");
			}
		}))
	} else {
		None
	};

	// The ExtProc gRPC service
	let svc = ExtProcService {
		config: config.clone(),
		metrics,
		tracer,
	};
	info!(addr = %server.extproc_addr, "ext_proc listening");
	let grpc = tonic::transport::Server::builder()
		.add_service(ExternalProcessorServer::new(svc))
		.serve_with_shutdown(server.extproc_addr, async move {
			shutdown.wait().await;
		});

	let result = grpc.await;
	// Stop accepting, then flush telemetry within the drain deadline
	trigger.shutdown_now();
	let drain = Duration::from_secs(server.termination_drain_secs);
	let _ = tokio::time::timeout(drain, async {
		admin_task.abort();
		if let Some(t) = mcp_task {
			t.abort();
		}
	})
	.await;
	tracing.shutdown();
	result?;
	info!("shutdown complete");
	Ok(())
}
