//! Per-proxy content requests and the id→request map that owns them.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
	Pending,
	Receiving,
	Closed,
	NotFound,
	Dropped,
}

impl Status {
	pub fn is_terminal(self) -> bool {
		matches!(self, Status::Closed | Status::NotFound | Status::Dropped)
	}
}

struct Inner {
	status: Status,
	queue: VecDeque<String>,
	next_record_index: u64,
}

/// A single proxy's half of a content request. `begin_record`/`end_record`
/// are the originally-requested (inclusive) range; `next_record_index`
/// advances one-for-one with appended records.
pub struct ContentRequest {
	id: u64,
	begin_record: u64,
	end_record: u64,
	inner: Mutex<Inner>,
}

impl ContentRequest {
	fn new(id: u64, begin_record: u64, end_record: u64) -> Self {
		ContentRequest {
			id,
			begin_record,
			end_record,
			inner: Mutex::new(Inner { status: Status::Pending, queue: VecDeque::new(), next_record_index: begin_record }),
		}
	}

	pub fn id(&self) -> u64 {
		self.id
	}

	pub fn begin_record(&self) -> u64 {
		self.begin_record
	}

	pub fn end_record(&self) -> u64 {
		self.end_record
	}

	pub fn status(&self) -> Status {
		self.inner.lock().unwrap().status
	}

	pub fn set_status(&self, status: Status) {
		self.inner.lock().unwrap().status = status;
	}

	/// Pops the next buffered record, if any.
	pub fn pop_record(&self) -> Option<String> {
		self.inner.lock().unwrap().queue.pop_front()
	}

	pub fn next_record_index(&self) -> u64 {
		self.inner.lock().unwrap().next_record_index
	}

	pub fn got_all_requested_records(&self) -> bool {
		self.next_record_index() == self.end_record + 1
	}

	/// `true` once every requested record has both arrived and been
	/// popped from the queue.
	pub fn is_finished(&self) -> bool {
		let inner = self.inner.lock().unwrap();
		inner.next_record_index == self.end_record + 1 && inner.queue.is_empty()
	}

	fn append_records(&self, begin_record: u64, records: Vec<String>) -> Result<(), String> {
		let mut inner = self.inner.lock().unwrap();
		if inner.next_record_index == self.end_record + 1 {
			return Err("got next records for a request that already has all requested records".into());
		}
		if inner.next_record_index != begin_record {
			return Err(format!("invalid begin_record, expected {} got {}", inner.next_record_index, begin_record));
		}
		for record in records {
			inner.queue.push_back(record);
			inner.next_record_index += 1;
		}
		Ok(())
	}
}

/// Creates, looks up, and tears down [`ContentRequest`]s for one proxy
/// connection. Id allocation and the id→request map share one mutex.
pub struct ContentRequestHandler {
	requests: Mutex<HashMap<u64, std::sync::Arc<ContentRequest>>>,
	next_id: AtomicU64,
}

impl ContentRequestHandler {
	pub fn new() -> Self {
		ContentRequestHandler { requests: Mutex::new(HashMap::new()), next_id: AtomicU64::new(0) }
	}

	pub fn create_request(&self, begin_record: u64, end_record: u64) -> std::sync::Arc<ContentRequest> {
		let id = self.next_id.fetch_add(1, Ordering::SeqCst);
		let request = std::sync::Arc::new(ContentRequest::new(id, begin_record, end_record));
		self.requests.lock().unwrap().insert(id, request.clone());
		request
	}

	/// Validates strict `[begin, end]` batch ordering: a batch whose
	/// `begin_record` doesn't match the request's current cursor is a
	/// protocol-level validation error on that request, not a silent
	/// drop.
	pub fn add_records(&self, request_id: u64, begin_record: u64, records: Vec<String>) -> Result<(), String> {
		let request = {
			let requests = self.requests.lock().unwrap();
			match requests.get(&request_id) {
				Some(r) => r.clone(),
				None => return Ok(()), // unknown or already-dropped request: silently ignored
			}
		};
		request.append_records(begin_record, records)
	}

	/// Sets `request_id`'s status and prunes it from the map once it
	/// reaches a terminal state.
	pub fn set_status(&self, request_id: u64, status: Status) {
		let mut requests = self.requests.lock().unwrap();
		if let Some(request) = requests.get(&request_id) {
			request.set_status(status);
			if status.is_terminal() {
				requests.remove(&request_id);
			}
		}
	}
}

impl Default for ContentRequestHandler {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_out_of_order_batch() {
		let handler = ContentRequestHandler::new();
		let req = handler.create_request(0, 4);
		handler.add_records(req.id(), 0, vec!["a".into()]).unwrap();
		let err = handler.add_records(req.id(), 5, vec!["b".into()]).unwrap_err();
		assert!(err.contains("invalid begin_record"));
	}

	#[test]
	fn tracks_finish_state() {
		let handler = ContentRequestHandler::new();
		let req = handler.create_request(0, 1);
		assert!(!req.is_finished());
		handler.add_records(req.id(), 0, vec!["a".into(), "b".into()]).unwrap();
		assert!(req.got_all_requested_records());
		assert!(!req.is_finished());
		req.pop_record();
		req.pop_record();
		assert!(req.is_finished());
	}

	#[test]
	fn dropping_is_idempotent() {
		let handler = ContentRequestHandler::new();
		let req = handler.create_request(0, 1);
		handler.set_status(req.id(), Status::Dropped);
		handler.set_status(req.id(), Status::Dropped);
		assert_eq!(req.status(), Status::Dropped);
		// further wire events for this id are no-ops, not errors
		assert!(handler.add_records(req.id(), 0, vec!["x".into()]).is_ok());
	}
}
