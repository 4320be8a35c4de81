//! The agent's side of one proxy connection: dispatch for messages
//! coming from that proxy, plus the content-request API used to ask it
//! for log data.

use std::net::TcpStream;
use std::sync::Arc;

use wire::connection::{Connection, MessageHandler};
use wire::protocol::{
	AddRecordPayload, ContentStatus, GetLogContentPayload, GetLogPositionPayload, LogPositionResponsePayload, Message,
};

use crate::collector::LogCollector;
use crate::content_request::{ContentRequest, ContentRequestHandler, Status};
use crate::errors::*;

/// Everything a proxy says to the agent unprompted is routed through
/// here. The only reply this ever produces is the `LogPositionResponse`
/// a proxy needs before it can resume tailing a file.
struct AgentMessageDispatcher {
	collector: Arc<dyn LogCollector>,
	requests: Arc<ContentRequestHandler>,
}

impl MessageHandler for AgentMessageDispatcher {
	fn handle(&self, msg: Message) -> Result<Option<Message>> {
		match msg {
			Message::AddRecord(AddRecordPayload { log_name, data, .. }) => {
				self.collector.collect_record(&log_name, &data)?;
				Ok(None)
			}
			Message::GetLogPosition(GetLogPositionPayload { log_name }) => {
				let position = self.collector.get_log_position(&log_name);
				Ok(Some(Message::LogPositionResponse(LogPositionResponsePayload { log_name, position })))
			}
			Message::LogContentStatus(p) => {
				let status = match p.status {
					ContentStatus::Found => Status::Receiving,
					ContentStatus::End => Status::Closed,
					ContentStatus::NotFound => Status::NotFound,
				};
				self.requests.set_status(p.request_id, status);
				Ok(None)
			}
			Message::LogContentData(p) => {
				self.requests
					.add_records(p.request_id, p.begin_record, p.records)
					.map_err(|e| Error::from(format!("malformed content data from proxy: {}", e)))?;
				Ok(None)
			}
			other => bail!(ErrorKind::Msg(format!("unexpected message from proxy: {:?}", other.type_code()))),
		}
	}
}

/// A live connection to one proxy. Owns the content requests the agent
/// has outstanding against it, separate from every other proxy's.
pub struct ProxyConnection {
	connection: Connection,
	requests: Arc<ContentRequestHandler>,
	dispatcher: AgentMessageDispatcher,
}

impl ProxyConnection {
	pub fn from_stream(stream: TcpStream, collector: Arc<dyn LogCollector>) -> Result<Self> {
		let connection = Connection::from_stream(stream)?;
		let requests = Arc::new(ContentRequestHandler::new());
		let dispatcher = AgentMessageDispatcher { collector, requests: requests.clone() };
		Ok(ProxyConnection { connection, requests, dispatcher })
	}

	pub fn peer_addr(&self) -> std::net::SocketAddr {
		self.connection.peer_addr()
	}

	/// Drains every message currently available from this proxy without
	/// blocking.
	pub fn receive_messages(&self) -> Result<()> {
		self.connection.receive_messages(&self.dispatcher)?;
		Ok(())
	}

	/// Requests `[begin_record, end_record]` of `log_name` from this
	/// proxy and returns the tracking handle for the response.
	pub fn request_content(&self, log_name: &str, begin_record: u64, end_record: u64) -> Result<Arc<ContentRequest>> {
		let request = self.requests.create_request(begin_record, end_record);
		self.connection.send(&Message::GetLogContent(GetLogContentPayload {
			log_name: log_name.to_string(),
			request_id: request.id(),
			begin_record,
			end_record,
		}))?;
		Ok(request)
	}

	/// Marks `request` dropped; no further wire events for it will be
	/// delivered anywhere (the id is removed from the live-request map).
	pub fn drop_content_request(&self, request: &ContentRequest) {
		self.requests.set_status(request.id(), Status::Dropped);
	}
}
