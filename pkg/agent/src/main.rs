#[macro_use] extern crate error_chain;

extern crate clap;
extern crate logwarden_agent as agent;

use std::sync::Arc;

use clap::{App, Arg};

use agent::agent::Agent;
use agent::backend::BackendClient;
use agent::collector::ListLogCollector;
use agent::config::AgentConfig;
use agent::errors::*;
use agent::scheduler::Scheduler;
use agent::validator::LogValidator;

fn main_task() -> Result<()> {
	let matches = App::new("Log Forgery Watch Agent")
		.about("Collects log records pushed by file proxies and mirrors them to the backend")
		.arg(
			Arg::with_name("addr")
				.long("addr")
				.short("a")
				.value_name("ADDRESS")
				.help("Address to bind for incoming proxy connections, falls back to AGENT_ADDR")
				.takes_value(true),
		)
		.arg(
			Arg::with_name("port")
				.long("port")
				.short("p")
				.value_name("PORT")
				.help("Port to bind for incoming proxy connections, falls back to AGENT_PORT")
				.takes_value(true),
		)
		.get_matches();

	let config = AgentConfig::from_args_and_env(matches.value_of("addr"), matches.value_of("port"))
		.map_err(|e| Error::from(format!("configuration error: {}", e)))?;

	println!("Server listening on {}:{}", config.bind_addr, config.bind_port);
	let listener = Agent::bind_listener(&config.bind_addr, config.bind_port)?;

	let backend = Arc::new(BackendClient::new(&config));
	let collector: Arc<ListLogCollector> = Arc::new(ListLogCollector::new(backend.clone())?);

	let agent = Arc::new(Agent::new(collector));
	agent.spawn_event_loop();

	let validator = LogValidator::spawn(backend.clone());
	let scheduler =
		Arc::new(Scheduler::new(agent.clone(), backend, validator, config.state_control_interval, config.logs_control_interval));
	scheduler.start();

	agent.accept_loop(listener);
}

fn main() {
	if let Err(e) = main_task() {
		eprintln!("{}", e);
		std::process::exit(1);
	}
}
