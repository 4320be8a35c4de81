//! Startup configuration, built once in `main` and threaded explicitly
//! through every component rather than kept as a module-level global.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AgentConfig {
	pub bind_addr: String,
	pub bind_port: u16,
	pub backend_endpoint: String,
	pub token: String,
	pub state_control_interval: Duration,
	pub logs_control_interval: Duration,
}

impl AgentConfig {
	/// `--addr/-a`, `--port/-p`, falling back to `AGENT_ADDR`/`AGENT_PORT`;
	/// the rest come from the environment only.
	pub fn from_args_and_env(addr_flag: Option<&str>, port_flag: Option<&str>) -> Result<Self, String> {
		let bind_addr = addr_flag
			.map(str::to_owned)
			.or_else(|| std::env::var("AGENT_ADDR").ok())
			.ok_or("missing bind address (--addr or AGENT_ADDR)")?;

		let bind_port = port_flag
			.map(str::to_owned)
			.or_else(|| std::env::var("AGENT_PORT").ok())
			.ok_or("missing bind port (--port or AGENT_PORT)")?
			.parse::<u16>()
			.map_err(|e| format!("invalid port: {}", e))?;

		let backend_endpoint = std::env::var("BACKEND_ENDPOINT").map_err(|_| "missing BACKEND_ENDPOINT")?;
		let token = std::env::var("TOKEN").map_err(|_| "missing TOKEN")?;

		let state_control_interval = env_seconds("STATE_CONTROL_INTERVAL")?;
		let logs_control_interval = env_seconds("LOGS_CONTROL_INTERVAL")?;

		Ok(AgentConfig {
			bind_addr,
			bind_port,
			backend_endpoint,
			token,
			state_control_interval,
			logs_control_interval,
		})
	}
}

fn env_seconds(name: &'static str) -> Result<Duration, String> {
	let raw = std::env::var(name).map_err(|_| format!("missing {}", name))?;
	let secs: u64 = raw.parse().map_err(|e| format!("invalid {}: {}", name, e))?;
	Ok(Duration::from_secs(secs))
}
