//! Fan-out and lead election for a single content request broadcast to
//! every connected proxy.
//!
//! Exactly one proxy's reply "wins" per request: the first one to
//! report it has the log (`Receiving`) or has already finished sending
//! it (`Closed`). Every other proxy's copy of the request is dropped as
//! soon as a winner is found, so at most one producer ever streams
//! records for a given range.

use std::sync::{Arc, Mutex};

use crate::connection::ProxyConnection;
use crate::content_request::{ContentRequest, Status};

struct Pending {
	connection: Arc<ProxyConnection>,
	request: Arc<ContentRequest>,
}

struct Inner {
	pending: Vec<Pending>,
	lead: Option<Arc<ContentRequest>>,
}

/// One logical content request broadcast across every proxy that might
/// hold the log, tracking which (if any) proxy has won the race to
/// serve it.
pub struct AgentContentRequest {
	inner: Mutex<Inner>,
}

impl AgentContentRequest {
	pub fn new(requests: Vec<(Arc<ProxyConnection>, Arc<ContentRequest>)>) -> Self {
		let pending = requests.into_iter().map(|(connection, request)| Pending { connection, request }).collect();
		AgentContentRequest { inner: Mutex::new(Inner { pending, lead: None }) }
	}

	/// Returns the request that won the race, resolving it first if
	/// necessary. `None` while every proxy is still `Pending`.
	pub fn get_lead(&self) -> Option<Arc<ContentRequest>> {
		let mut inner = self.inner.lock().unwrap();
		if inner.lead.is_none() {
			Self::try_resolve_lead(&mut inner);
		}
		inner.lead.clone()
	}

	/// `true` once there is no lead and nothing left pending: every
	/// proxy came back `NotFound` or `Dropped` and the log simply isn't
	/// anywhere.
	pub fn is_dead(&self) -> bool {
		let inner = self.inner.lock().unwrap();
		inner.lead.is_none() && inner.pending.is_empty()
	}

	/// Scans newest-to-oldest (matching proxy connection order) looking
	/// for the first candidate in a winning state, pruning dead ends as
	/// it goes.
	fn try_resolve_lead(inner: &mut Inner) {
		let mut winner = None;
		let mut i = inner.pending.len();
		while i > 0 {
			i -= 1;
			let status = inner.pending[i].request.status();
			match status {
				Status::Receiving | Status::Closed => {
					winner = Some(i);
					break;
				}
				Status::NotFound | Status::Dropped => {
					inner.pending.remove(i);
				}
				Status::Pending => {}
			}
		}

		if let Some(i) = winner {
			let lead = inner.pending.remove(i).request;
			Self::select_lead(inner, lead);
		}
	}

	/// Commits to `lead` and drops every other pending proxy's copy of
	/// the request.
	fn select_lead(inner: &mut Inner, lead: Arc<ContentRequest>) {
		for losing in inner.pending.drain(..) {
			losing.connection.drop_content_request(&losing.request);
		}
		inner.lead = Some(lead);
	}
}
