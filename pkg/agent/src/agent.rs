//! Top-level agent: owns the proxy registry and the log collector, and
//! wires the accept loop to both.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV6, TcpListener};
use std::sync::Arc;
use std::thread;

use socket2::{Domain, Socket, Type};

use crate::collector::LogCollector;
use crate::connection::ProxyConnection;
use crate::errors::*;
use crate::fanout::AgentContentRequest;
use crate::registry::ConnectionRegistry;

pub struct Agent {
	registry: Arc<ConnectionRegistry>,
	collector: Arc<dyn LogCollector>,
}

impl Agent {
	pub fn new(collector: Arc<dyn LogCollector>) -> Self {
		Agent { registry: Arc::new(ConnectionRegistry::new()), collector }
	}

	/// Binds the proxy-facing listener on an IPv6 socket with
	/// `SO_REUSEADDR` set, matching the original `AgentServer`'s explicit
	/// `socket.AF_INET6` + `SO_REUSEADDR` construction rather than
	/// whatever family `TcpListener::bind` would infer from the
	/// configured address. A plain IPv4 literal is accepted too (mapped
	/// onto `::ffff:a.b.c.d`) so existing `AGENT_ADDR` values of either
	/// family keep working.
	pub fn bind_listener(addr: &str, port: u16) -> Result<TcpListener> {
		let ip = match addr.parse::<Ipv6Addr>() {
			Ok(ip) => ip,
			Err(_) => addr
				.parse::<Ipv4Addr>()
				.map_err(|_| Error::from(format!("invalid bind address: {}", addr)))?
				.to_ipv6_mapped(),
		};

		let socket = Socket::new(Domain::IPV6, Type::STREAM, None)?;
		socket.set_reuse_address(true)?;
		socket.bind(&SocketAddr::V6(SocketAddrV6::new(ip, port, 0, 0)).into())?;
		socket.listen(128)?;
		Ok(socket.into())
	}

	pub fn collector(&self) -> Arc<dyn LogCollector> {
		self.collector.clone()
	}

	/// Spawns the event loop that drains every connected proxy's
	/// incoming messages. Runs for the lifetime of the process.
	pub fn spawn_event_loop(&self) {
		let registry = self.registry.clone();
		thread::spawn(move || registry.run_event_loop());
	}

	/// Accepts connections on `listener` forever, handing each one to
	/// the registry as it arrives.
	pub fn accept_loop(&self, listener: TcpListener) -> ! {
		loop {
			match listener.accept() {
				Ok((stream, addr)) => {
					let connection = match ProxyConnection::from_stream(stream, self.collector.clone()) {
						Ok(c) => c,
						Err(e) => {
							eprintln!("failed to set up connection from {}: {}", addr, e);
							continue;
						}
					};
					println!("Accepting new connection from {}", connection.peer_addr());
					self.registry.add(Arc::new(connection));
				}
				Err(e) => eprintln!("accept failed: {}", e),
			}
		}
	}

	pub fn request_log_content(&self, log_name: &str, begin_record: u64, end_record: u64) -> AgentContentRequest {
		self.registry.request_log_content(log_name, begin_record, end_record)
	}
}
