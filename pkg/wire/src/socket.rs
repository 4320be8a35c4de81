//! Non-blocking length-prefixed I/O over TCP.
//!
//! A caller declares how many bytes it wants with `begin_read`, then polls
//! `read` until it returns `true`. Writes go through a FIFO queue drained
//! on a best-effort basis by non-blocking `send`.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::TcpStream;

use crate::errors::*;

pub struct FramedSocket {
	stream: TcpStream,
	buffer: Vec<u8>,
	position: usize,
	count_to_read: usize,
	send_queue: VecDeque<Vec<u8>>,
}

impl FramedSocket {
	pub fn new(stream: TcpStream) -> Result<Self> {
		stream.set_nonblocking(true)?;
		Ok(FramedSocket {
			stream,
			buffer: Vec::new(),
			position: 0,
			count_to_read: 0,
			send_queue: VecDeque::new(),
		})
	}

	pub fn peer_addr(&self) -> io::Result<std::net::SocketAddr> {
		self.stream.peer_addr()
	}

	/// Declares the next read's target byte count and (re)sizes the
	/// buffer to hold it.
	pub fn begin_read(&mut self, byte_count: usize) {
		self.buffer.resize(byte_count, 0);
		self.position = 0;
		self.count_to_read = byte_count;
	}

	/// The bytes gathered by the in-progress (or just-completed) read.
	pub fn buffer(&self) -> &[u8] {
		&self.buffer[..self.count_to_read]
	}

	/// Attempts to finish the declared read.
	///
	/// `no_block`'s asymmetry: once a few bytes of this read have
	/// already trickled in (`position > 0`), passing
	/// `false` keeps retrying in a tight loop until the read completes
	/// rather than surfacing a partial read to the caller; passing `true`
	/// always bails out on the first would-block. The header read uses
	/// `false` (a frame header is small and worth waiting out); the body
	/// read uses `true` (bodies can be large and must not stall the
	/// event loop).
	pub fn read(&mut self, no_block: bool) -> Result<bool> {
		loop {
			if self.count_to_read == 0 {
				return Ok(true);
			}

			match self.stream.read(&mut self.buffer[self.position..self.count_to_read]) {
				Ok(0) => return Err(ErrorKind::ConnectionLost.into()),
				Ok(n) => {
					self.position += n;
					if self.position == self.count_to_read {
						return Ok(true);
					}
				}
				Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
					if no_block || self.position == 0 {
						return Ok(false);
					}
					// else: partial progress already made, spin until more arrives
				}
				Err(e) => return Err(e.into()),
			}
		}
	}

	/// Queues `bytes` for sending and attempts to drain the queue
	/// immediately. A partial send is re-queued at the head so the next
	/// call picks up where this one left off.
	pub fn write(&mut self, bytes: Vec<u8>) -> Result<()> {
		self.send_queue.push_back(bytes);

		while let Some(pending) = self.send_queue.pop_front() {
			let sent = self.send(&pending)?;
			if sent < pending.len() {
				self.send_queue.push_front(pending[sent..].to_vec());
				break;
			}
		}

		Ok(())
	}

	fn send(&mut self, bytes: &[u8]) -> Result<usize> {
		match self.stream.write(bytes) {
			Ok(n) => Ok(n),
			Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
			Err(e) => Err(e.into()),
		}
	}
}
