//! The set of currently-connected proxies and the event loop that
//! drains them.

use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

use crate::connection::ProxyConnection;
use crate::fanout::AgentContentRequest;

/// Thread-safe registry of live proxy connections. The accept loop adds
/// to it, the event loop drains and prunes it; nothing else touches it
/// directly.
pub struct ConnectionRegistry {
	connections: RwLock<Vec<Arc<ProxyConnection>>>,
}

impl ConnectionRegistry {
	pub fn new() -> Self {
		ConnectionRegistry { connections: RwLock::new(Vec::new()) }
	}

	pub fn add(&self, connection: Arc<ProxyConnection>) {
		self.connections.write().unwrap().push(connection);
	}

	fn snapshot(&self) -> Vec<Arc<ProxyConnection>> {
		self.connections.read().unwrap().clone()
	}

	/// Broadcasts a content request to every currently-connected proxy
	/// and returns the aggregate that will resolve to a single lead.
	pub fn request_log_content(&self, log_name: &str, begin_record: u64, end_record: u64) -> AgentContentRequest {
		let requests = self
			.snapshot()
			.into_iter()
			.filter_map(|con| match con.request_content(log_name, begin_record, end_record) {
				Ok(req) => Some((con, req)),
				Err(e) => {
					eprintln!("failed to send content request to {}: {}", con.peer_addr(), e);
					None
				}
			})
			.collect();
		AgentContentRequest::new(requests)
	}

	/// Drains every connection's pending messages once, dropping any
	/// connection whose peer has disconnected. Never returns on
	/// success; polls at the same 10ms cadence as the rest of this
	/// system.
	pub fn run_event_loop(&self) -> ! {
		loop {
			let connections = self.snapshot();
			let mut lost = Vec::new();
			for con in &connections {
				if let Err(e) = con.receive_messages() {
					eprintln!("connection with {} lost: {}", con.peer_addr(), e);
					lost.push(con.peer_addr());
				}
			}
			if !lost.is_empty() {
				let mut guard = self.connections.write().unwrap();
				guard.retain(|c| !lost.contains(&c.peer_addr()));
			}
			thread::sleep(Duration::from_millis(10));
		}
	}
}

impl Default for ConnectionRegistry {
	fn default() -> Self {
		Self::new()
	}
}
