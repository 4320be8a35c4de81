//! Ties the framed socket to the wire protocol: tracks the two-phase
//! header/body read, dispatches each complete message to a
//! [`MessageHandler`], and implements the response-on-request discipline
//! (if the handler returns a message, it is sent back on the same
//! connection immediately).

use std::net::{SocketAddr, TcpStream};
use std::sync::Mutex;

use crate::errors::*;
use crate::protocol::{Message, HEADER_LEN};
use crate::socket::FramedSocket;

/// Handles one decoded message and optionally produces a reply.
pub trait MessageHandler: Send + Sync {
	fn handle(&self, msg: Message) -> Result<Option<Message>>;
}

enum ReadPhase {
	AwaitingHeader,
	AwaitingBody { type_code: u8 },
}

struct ReadState {
	socket: FramedSocket,
	phase: ReadPhase,
}

/// A wire connection to one peer (agent↔proxy, in either direction).
/// The single mutex below is the per-connection send mutex: it also
/// happens to guard the read side, since both sides share one
/// underlying `FramedSocket` buffer, but in practice only one thread
/// (the owning event loop) ever calls `receive_one`.
pub struct Connection {
	state: Mutex<ReadState>,
	peer_addr: SocketAddr,
}

impl Connection {
	pub fn from_stream(stream: TcpStream) -> Result<Self> {
		let peer_addr = stream.peer_addr()?;
		let socket = FramedSocket::new(stream)?;
		Ok(Connection {
			state: Mutex::new(ReadState { socket, phase: ReadPhase::AwaitingHeader }),
			peer_addr,
		})
	}

	pub fn connect(addr: SocketAddr) -> Result<Self> {
		let stream = TcpStream::connect(addr)?;
		Self::from_stream(stream)
	}

	pub fn peer_addr(&self) -> SocketAddr {
		self.peer_addr
	}

	/// Serialises and queues `msg` for sending, draining what can be sent
	/// without blocking. Thread-safe: concurrent senders never interleave
	/// a partially-written message.
	pub fn send(&self, msg: &Message) -> Result<()> {
		let encoded = msg.encode()?;
		let mut state = self.state.lock().unwrap();
		state.socket.write(encoded)
	}

	/// Attempts to complete one message read and, if successful, hands it
	/// to `handler`. Returns `Ok(true)` if a message was fully processed
	/// (there may be more ready without blocking), `Ok(false)` if the
	/// socket would block.
	pub fn receive_one(&self, handler: &dyn MessageHandler) -> Result<bool> {
		let maybe_msg = {
			let mut state = self.state.lock().unwrap();
			loop {
				match state.phase {
					ReadPhase::AwaitingHeader => {
						state.socket.begin_read(HEADER_LEN);
						if !state.socket.read(false)? {
							break None;
						}
						let (type_code, len) = Message::parse_header(state.socket.buffer())?;
						state.socket.begin_read(len);
						state.phase = ReadPhase::AwaitingBody { type_code };
					}
					ReadPhase::AwaitingBody { type_code } => {
						if !state.socket.read(true)? {
							break None;
						}
						let msg = Message::decode(type_code, state.socket.buffer())?;
						state.phase = ReadPhase::AwaitingHeader;
						break Some(msg);
					}
				}
			}
		};

		let msg = match maybe_msg {
			Some(msg) => msg,
			None => return Ok(false),
		};

		if let Some(reply) = handler.handle(msg)? {
			self.send(&reply)?;
		}

		Ok(true)
	}

	/// Drains every complete message currently available without
	/// blocking.
	pub fn receive_messages(&self, handler: &dyn MessageHandler) -> Result<()> {
		while self.receive_one(handler)? {}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::protocol::{GetLogPositionPayload, LogPositionResponsePayload};
	use std::net::TcpListener;
	use std::thread;
	use std::time::Duration;

	struct EchoPosition;

	impl MessageHandler for EchoPosition {
		fn handle(&self, msg: Message) -> Result<Option<Message>> {
			match msg {
				Message::GetLogPosition(p) => Ok(Some(Message::LogPositionResponse(LogPositionResponsePayload {
					log_name: p.log_name,
					position: 7,
				}))),
				_ => Ok(None),
			}
		}
	}

	struct Capture(Mutex<Vec<Message>>);

	impl MessageHandler for Capture {
		fn handle(&self, msg: Message) -> Result<Option<Message>> {
			self.0.lock().unwrap().push(msg);
			Ok(None)
		}
	}

	fn poll_until<T>(mut attempt: impl FnMut() -> Result<Option<T>>) -> T {
		for _ in 0..200 {
			if let Some(v) = attempt().unwrap() {
				return v;
			}
			thread::sleep(Duration::from_millis(5));
		}
		panic!("timed out waiting for message");
	}

	/// Exercises the response-on-request discipline end to end: a real
	/// non-blocking TCP pair, a GetLogPosition sent one way, and the
	/// automatic LogPositionResponse coming back.
	#[test]
	fn round_trips_over_real_socket_with_auto_reply() {
		let listener = TcpListener::bind("127.0.0.1:0").unwrap();
		let addr = listener.local_addr().unwrap();

		let server_thread = thread::spawn(move || {
			let (stream, _) = listener.accept().unwrap();
			let server_conn = Connection::from_stream(stream).unwrap();
			let handler = EchoPosition;
			poll_until(|| {
				let progressed = server_conn.receive_one(&handler)?;
				Ok(if progressed { Some(()) } else { None })
			});
		});

		let client_conn = Connection::connect(addr).unwrap();
		client_conn
			.send(&Message::GetLogPosition(GetLogPositionPayload { log_name: "/t/a.log".into() }))
			.unwrap();

		let capture = Capture(Mutex::new(Vec::new()));
		let reply = poll_until(|| {
			client_conn.receive_one(&capture)?;
			Ok(capture.0.lock().unwrap().pop())
		});

		match reply {
			Message::LogPositionResponse(p) => {
				assert_eq!(p.log_name, "/t/a.log");
				assert_eq!(p.position, 7);
			}
			other => panic!("unexpected reply: {:?}", other),
		}

		server_thread.join().unwrap();
	}
}
