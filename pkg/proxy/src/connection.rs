//! Ties the file watcher and content server to the wire connection to
//! the agent: outbound records become `AddRecord`/`GetLogPosition`
//! messages, and inbound `LogPositionResponse`/`GetLogContent` messages
//! drive the watch manager and content server.

use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Utc};

use wire::connection::{Connection, MessageHandler};
use wire::protocol::{AddRecordPayload, GetLogPositionPayload, Message};

use crate::content::LogContentManager;
use crate::errors::*;
use crate::watch::{FileRecordCollector, LogWatchManager};

/// Turns watch events into outbound wire traffic. One instance is
/// shared by every `FileWatch` through the `FileRecordCollector`
/// contract.
pub struct WireRecordCollector {
	connection: Arc<Connection>,
}

impl WireRecordCollector {
	pub fn new(connection: Arc<Connection>) -> Self {
		WireRecordCollector { connection }
	}
}

impl FileRecordCollector for WireRecordCollector {
	/// Asks the agent where this log left off before any record is
	/// emitted for it.
	fn request_initialize(&self, filename: &str) {
		let msg = Message::GetLogPosition(GetLogPositionPayload { log_name: filename.to_string() });
		if let Err(e) = self.connection.send(&msg) {
			eprintln!("failed to request position for {}: {}", filename, e);
		}
	}

	fn on_record_added(&self, filename: &str, timestamp: DateTime<Utc>, data: &str) {
		let msg = Message::AddRecord(AddRecordPayload { log_name: filename.to_string(), data: data.to_string(), timestamp });
		if let Err(e) = self.connection.send(&msg) {
			eprintln!("failed to send record for {}: {}", filename, e);
		}
	}

	/// Warning only: a write notification with nothing yet readable
	/// carries no wire message of its own.
	fn on_empty_write(&self, filename: &str, _timestamp: DateTime<Utc>) {
		eprintln!("empty write reported for {}", filename);
	}

	/// Warning only, no retry.
	fn on_file_disappeared(&self, filename: &str, _timestamp: DateTime<Utc>) {
		eprintln!("file disappeared: {}", filename);
	}
}

/// Dispatches messages the agent sends to this proxy: a position
/// response feeds the watch manager's resume point, a content request
/// is served on its own thread so a long-running stream never stalls
/// the receive loop that drives it.
pub struct ProxyMessageDispatcher {
	watch_manager: Arc<dyn LogWatchManager>,
	connection: Arc<Connection>,
	content_manager: Arc<dyn LogContentManager>,
}

impl ProxyMessageDispatcher {
	pub fn new(
		watch_manager: Arc<dyn LogWatchManager>,
		connection: Arc<Connection>,
		content_manager: Arc<dyn LogContentManager>,
	) -> Self {
		ProxyMessageDispatcher { watch_manager, connection, content_manager }
	}
}

impl MessageHandler for ProxyMessageDispatcher {
	fn handle(&self, msg: Message) -> Result<Option<Message>> {
		match msg {
			Message::LogPositionResponse(p) => {
				self.watch_manager.initialize_watch(&p.log_name, p.position);
				Ok(None)
			}
			Message::GetLogContent(p) => {
				let connection = self.connection.clone();
				let content_manager = self.content_manager.clone();
				thread::spawn(move || {
					for reply in content_manager.serve(p) {
						if let Err(e) = connection.send(&reply) {
							eprintln!("failed to send content response: {}", e);
							break;
						}
					}
				});
				Ok(None)
			}
			other => bail!(ErrorKind::Msg(format!("unexpected message from agent: {:?}", other.type_code()))),
		}
	}
}
