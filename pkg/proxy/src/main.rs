#[macro_use] extern crate error_chain;

extern crate clap;
extern crate logwarden_proxy as proxy;
extern crate logwarden_wire as wire;

use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{App, Arg};

use proxy::config::ProxyConfig;
use proxy::connection::{ProxyMessageDispatcher, WireRecordCollector};
use proxy::content::FileContentServer;
use proxy::errors::*;
use proxy::watch::FsWatchManager;
use wire::connection::Connection;

fn main_task() -> Result<()> {
	let matches = App::new("Log Forgery Watch Proxy")
		.about("Tails log files on this host and streams their records to the agent")
		.arg(
			Arg::with_name("addr")
				.long("addr")
				.short("a")
				.value_name("ADDRESS")
				.help("Agent address to connect to, falls back to AGENT_ADDR")
				.takes_value(true),
		)
		.arg(
			Arg::with_name("port")
				.long("port")
				.short("p")
				.value_name("PORT")
				.help("Agent port to connect to, falls back to AGENT_PORT")
				.takes_value(true),
		)
		.arg(
			Arg::with_name("watch")
				.long("watch")
				.short("w")
				.value_name("PATH")
				.help("Path to watch, may be repeated; falls back to FILEPROXY_WATCHED_PATHS")
				.takes_value(true)
				.multiple(true),
		)
		.get_matches();

	let config = ProxyConfig::from_args_and_env(
		matches.value_of("addr"),
		matches.value_of("port"),
		matches.values_of("watch").map(|v| v.collect()),
	)
	.map_err(|e| Error::from(format!("configuration error: {}", e)))?;

	println!("Connecting to agent at {}:{}", config.agent_addr, config.agent_port);
	let stream = TcpStream::connect((config.agent_addr.as_str(), config.agent_port))?;
	let connection = Arc::new(Connection::from_stream(stream)?);

	let collector = Arc::new(WireRecordCollector::new(connection.clone()));
	let (watch_manager, rx) = FsWatchManager::new(collector)?;

	for path in &config.watched_paths {
		println!("Watching {}", path);
		watch_manager.begin_watch(path)?;
	}

	let content_manager = Arc::new(FileContentServer::new(watch_manager.clone()));
	let dispatcher = ProxyMessageDispatcher::new(watch_manager.clone(), connection.clone(), content_manager);

	let notify_manager = watch_manager.clone();
	thread::spawn(move || notify_manager.listen(rx));

	loop {
		connection.receive_messages(&dispatcher)?;
		thread::sleep(Duration::from_millis(10));
	}
}

fn main() {
	if let Err(e) = main_task() {
		eprintln!("{}", e);
		std::process::exit(1);
	}
}
