use tokio::sync::watch;
use tracing::info;

/// Shutdown coordinates process termination. Callers wait on [`Shutdown::wait`]
/// while the OS signal handlers (or a programmatic trigger) fire it exactly once.
pub struct Shutdown {
	tx: watch::Sender<bool>,
	rx: watch::Receiver<bool>,
}

impl Default for Shutdown {
	fn default() -> Self {
		Self::new()
	}
}

impl Shutdown {
	pub fn new() -> Self {
		let (tx, rx) = watch::channel(false);
		Shutdown { tx, rx }
	}

	/// trigger initiates shutdown without an OS signal (tests, fatal errors).
	pub fn trigger(&self) -> ShutdownTrigger {
		ShutdownTrigger {
			tx: self.tx.clone(),
		}
	}

	/// wait completes when SIGINT/SIGTERM is received or the trigger fires.
	pub async fn wait(&self) {
		let mut rx = self.rx.clone();
		tokio::select! {
			_ = wait_for_os_signal() => {},
			_ = rx.wait_for(|triggered| *triggered) => {},
		}
		info!("shutdown started");
	}
}

#[derive(Clone)]
pub struct ShutdownTrigger {
	tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
	pub fn shutdown_now(&self) {
		let _ = self.tx.send(true);
	}
}

#[cfg(unix)]
async fn wait_for_os_signal() {
	use tokio::signal::unix::{SignalKind, signal};
	let mut sigterm = signal(SignalKind::terminate()).expect("register SIGTERM handler");
	let mut sigint = signal(SignalKind::interrupt()).expect("register SIGINT handler");
	tokio::select! {
		_ = sigterm.recv() => info!("received SIGTERM"),
		_ = sigint.recv() => info!("received SIGINT"),
	};
}

#[cfg(not(unix))]
async fn wait_for_os_signal() {
	tokio::signal::ctrl_c()
		.await
		.expect("register ctrl-c handler");
	info!("received ctrl-c");
}
