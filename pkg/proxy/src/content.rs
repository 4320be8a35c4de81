//! Answers `GetLogContent` queries for a historical range of a log's
//! records.
//!
//! Streaming is modelled as a pure function from request to the
//! ordered sequence of reply messages, so it can be exercised without a
//! live socket; `connection.rs` is what actually puts these on the wire.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::Arc;

use wire::protocol::{ContentStatus, GetLogContentPayload, LogContentDataPayload, LogContentStatusPayload, Message};

use crate::watch::LogWatchManager;

/// Maximum records bundled into one `LogContentData` batch.
const BATCH_SIZE: usize = 20;

/// Capability contract for serving a content request, kept separate
/// from `FsWatchManager` so the fan-out-facing wire layer doesn't need
/// to know how watches are tracked.
pub trait LogContentManager: Send + Sync {
	fn serve(&self, request: GetLogContentPayload) -> Vec<Message>;
}

fn status(request_id: u64, status: ContentStatus) -> Message {
	Message::LogContentStatus(LogContentStatusPayload { request_id, status })
}

/// Re-opens the watched file fresh for every request rather than
/// reusing the tailing handle, so a concurrent content request never
/// perturbs the live tail position.
pub struct FileContentServer {
	watch_manager: Arc<dyn LogWatchManager>,
}

impl FileContentServer {
	pub fn new(watch_manager: Arc<dyn LogWatchManager>) -> Self {
		FileContentServer { watch_manager }
	}
}

impl LogContentManager for FileContentServer {
	fn serve(&self, request: GetLogContentPayload) -> Vec<Message> {
		if !self.watch_manager.contains_watch(&request.log_name) {
			return vec![status(request.request_id, ContentStatus::NotFound)];
		}

		let mut messages = vec![status(request.request_id, ContentStatus::Found)];

		let file = match File::open(&request.log_name) {
			Ok(f) => f,
			Err(e) => {
				eprintln!("failed to open {} for content request: {}", request.log_name, e);
				messages.push(status(request.request_id, ContentStatus::End));
				return messages;
			}
		};
		let mut lines = BufReader::new(file).lines();

		for _ in 0..request.begin_record {
			if lines.next().is_none() {
				// File ends before `begin_record`: nothing to stream.
				messages.push(status(request.request_id, ContentStatus::End));
				return messages;
			}
		}

		let mut batch: Vec<String> = Vec::with_capacity(BATCH_SIZE);
		let mut batch_start = request.begin_record;
		let mut next = request.begin_record;

		'stream: while next <= request.end_record {
			match lines.next() {
				Some(Ok(line)) => {
					batch.push(line.trim_end_matches('\r').to_string());
					next += 1;
				}
				Some(Err(e)) => {
					eprintln!("error reading {}: {}", request.log_name, e);
					break 'stream;
				}
				// File ends before `end_record + 1`: stream what we have.
				None => break 'stream,
			}

			if batch.len() == BATCH_SIZE || next > request.end_record {
				messages.push(Message::LogContentData(LogContentDataPayload {
					request_id: request.request_id,
					begin_record: batch_start,
					end_record: batch_start + batch.len() as u64 - 1,
					records: std::mem::replace(&mut batch, Vec::with_capacity(BATCH_SIZE)),
				}));
				batch_start = next;
			}
		}

		if !batch.is_empty() {
			messages.push(Message::LogContentData(LogContentDataPayload {
				request_id: request.request_id,
				begin_record: batch_start,
				end_record: batch_start + batch.len() as u64 - 1,
				records: batch,
			}));
		}

		// Always sent, even on a short read.
		messages.push(status(request.request_id, ContentStatus::End));
		messages
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct StubWatchManager(bool);

	impl LogWatchManager for StubWatchManager {
		fn initialize_watch(&self, _log_name: &str, _start_record: u64) {}
		fn contains_watch(&self, _log_name: &str) -> bool {
			self.0
		}
	}

	fn write_log(lines: &[&str]) -> tempfile::TempDir {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("a.log"), lines.join("\n") + "\n").unwrap();
		dir
	}

	#[test]
	fn reports_not_found_for_unwatched_log() {
		let server = FileContentServer::new(Arc::new(StubWatchManager(false)));
		let messages = server.serve(GetLogContentPayload {
			log_name: "/t/a.log".into(),
			request_id: 1,
			begin_record: 0,
			end_record: 4,
		});
		assert_eq!(messages.len(), 1);
		match &messages[0] {
			Message::LogContentStatus(p) => assert_eq!(p.status, ContentStatus::NotFound),
			_ => panic!("expected LogContentStatus"),
		}
	}

	/// A found log streams its records, batched, terminated by `End`.
	#[test]
	fn streams_requested_range_in_one_batch() {
		let dir = write_log(&["zero", "one", "two", "three", "four"]);
		let path = dir.path().join("a.log").to_string_lossy().into_owned();

		let server = FileContentServer::new(Arc::new(StubWatchManager(true)));
		let messages = server.serve(GetLogContentPayload { log_name: path, request_id: 7, begin_record: 0, end_record: 4 });

		assert_eq!(messages.len(), 3);
		match &messages[0] {
			Message::LogContentStatus(p) => assert_eq!(p.status, ContentStatus::Found),
			_ => panic!("expected Found"),
		}
		match &messages[1] {
			Message::LogContentData(p) => {
				assert_eq!(p.begin_record, 0);
				assert_eq!(p.end_record, 4);
				assert_eq!(p.records, vec!["zero", "one", "two", "three", "four"]);
			}
			_ => panic!("expected LogContentData"),
		}
		match &messages[2] {
			Message::LogContentStatus(p) => assert_eq!(p.status, ContentStatus::End),
			_ => panic!("expected End"),
		}
	}

	#[test]
	fn splits_into_twenty_record_batches() {
		let lines: Vec<String> = (0..45).map(|i| i.to_string()).collect();
		let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
		let dir = write_log(&refs);
		let path = dir.path().join("a.log").to_string_lossy().into_owned();

		let server = FileContentServer::new(Arc::new(StubWatchManager(true)));
		let messages = server.serve(GetLogContentPayload { log_name: path, request_id: 1, begin_record: 0, end_record: 44 });

		let data_batches: Vec<_> = messages
			.iter()
			.filter_map(|m| match m {
				Message::LogContentData(p) => Some(p),
				_ => None,
			})
			.collect();
		assert_eq!(data_batches.len(), 3);
		assert_eq!(data_batches[0].records.len(), 20);
		assert_eq!(data_batches[1].records.len(), 20);
		assert_eq!(data_batches[2].records.len(), 5);
	}

	/// A short file ends the stream early but still sends `End`.
	#[test]
	fn ends_early_when_file_is_shorter_than_requested() {
		let dir = write_log(&["only"]);
		let path = dir.path().join("a.log").to_string_lossy().into_owned();

		let server = FileContentServer::new(Arc::new(StubWatchManager(true)));
		let messages = server.serve(GetLogContentPayload { log_name: path, request_id: 1, begin_record: 0, end_record: 9 });

		match messages.last().unwrap() {
			Message::LogContentStatus(p) => assert_eq!(p.status, ContentStatus::End),
			_ => panic!("expected End"),
		}
		let data: Vec<_> = messages
			.iter()
			.filter_map(|m| match m {
				Message::LogContentData(p) => Some(p.records.clone()),
				_ => None,
			})
			.flatten()
			.collect();
		assert_eq!(data, vec!["only".to_string()]);
	}
}
