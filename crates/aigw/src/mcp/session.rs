use std::collections::HashMap;

use parking_lot::{Mutex, RwLock};

use super::relay::Relay;
use crate::config::McpConfig;
use crate::*;

/// One gateway session: the client-visible session id plus the relay that
/// owns the per-backend child sessions.
#[derive(Debug)]
pub struct GatewaySession {
	pub id: Arc<str>,
	pub relay: Arc<Relay>,
	last_used: Mutex<Instant>,
}

impl GatewaySession {
	pub fn touch(&self) {
		*self.last_used.lock() = Instant::now();
	}

	pub fn idle_for(&self) -> Duration {
		self.last_used.lock().elapsed()
	}
}

fn session_id() -> Arc<str> {
	uuid::Uuid::new_v4().to_string().into()
}

#[derive(Debug)]
pub struct SessionManager {
	sessions: RwLock<HashMap<String, Arc<GatewaySession>>>,
	ttl: Duration,
}

impl SessionManager {
	pub fn new(ttl: Duration) -> Self {
		Self {
			sessions: Default::default(),
			ttl,
		}
	}

	/// Mints a gateway session around a fresh relay. Registered immediately;
	/// the client learns the id from the response header.
	pub fn create_session(&self, cfg: &McpConfig) -> Arc<GatewaySession> {
		let id = session_id();
		let session = Arc::new(GatewaySession {
			id: id.clone(),
			relay: Arc::new(Relay::new(id.clone(), cfg)),
			last_used: Mutex::new(Instant::now()),
		});
		self
			.sessions
			.write()
			.insert(id.to_string(), session.clone());
		session
	}

	pub fn get_session(&self, id: &str) -> Option<Arc<GatewaySession>> {
		let session = self.sessions.read().get(id).cloned();
		if let Some(s) = &session {
			s.touch();
		}
		session
	}

	pub async fn delete_session(&self, id: &str) -> bool {
		let Some(session) = self.sessions.write().remove(id) else {
			return false;
		};
		session.relay.close().await;
		true
	}

	pub fn len(&self) -> usize {
		self.sessions.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.sessions.read().is_empty()
	}

	/// Periodically closes sessions idle past the TTL and expires orphaned
	/// upstream id mappings. Children are closed exactly once.
	pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
		let manager = self.clone();
		tokio::spawn(async move {
			let tick = (manager.ttl / 4).max(Duration::from_secs(1));
			let mut interval = tokio::time::interval(tick);
			loop {
				interval.tick().await;
				let expired: Vec<Arc<GatewaySession>> = {
					let mut sessions = manager.sessions.write();
					let ids: Vec<String> = sessions
						.iter()
						.filter(|(_, s)| s.idle_for() > manager.ttl)
						.map(|(id, _)| id.clone())
						.collect();
					ids
						.into_iter()
						.filter_map(|id| sessions.remove(&id))
						.collect()
				};
				for session in expired {
					debug!(session = %session.id, "closing idle MCP session");
					session.relay.close().await;
				}
				for session in manager.sessions.read().values() {
					session.relay.expire_pending(manager.ttl);
				}
			}
		})
	}
}
