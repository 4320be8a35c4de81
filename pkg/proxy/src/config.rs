//! Startup configuration, built once in `main` and threaded explicitly
//! through every component rather than kept as a module-level global.

#[derive(Debug, Clone)]
pub struct ProxyConfig {
	pub agent_addr: String,
	pub agent_port: u16,
	pub watched_paths: Vec<String>,
}

impl ProxyConfig {
	/// `--addr/-a`, `--port/-p`, `--watch/-w` (repeatable), falling back
	/// to `AGENT_ADDR`/`AGENT_PORT`/`FILEPROXY_WATCHED_PATHS`
	/// (`;`-separated).
	pub fn from_args_and_env(
		addr_flag: Option<&str>,
		port_flag: Option<&str>,
		watch_flags: Option<Vec<&str>>,
	) -> Result<Self, String> {
		let agent_addr = addr_flag
			.map(str::to_owned)
			.or_else(|| std::env::var("AGENT_ADDR").ok())
			.ok_or("missing agent address (--addr or AGENT_ADDR)")?;

		let agent_port = port_flag
			.map(str::to_owned)
			.or_else(|| std::env::var("AGENT_PORT").ok())
			.ok_or("missing agent port (--port or AGENT_PORT)")?
			.parse::<u16>()
			.map_err(|e| format!("invalid port: {}", e))?;

		let watched_paths = match watch_flags {
			Some(paths) if !paths.is_empty() => paths.into_iter().map(str::to_owned).collect(),
			_ => {
				let raw = std::env::var("FILEPROXY_WATCHED_PATHS")
					.map_err(|_| "missing watched paths (--watch or FILEPROXY_WATCHED_PATHS)")?;
				split_watched_paths(&raw)
			}
		};

		if watched_paths.is_empty() {
			return Err("no watched paths given".into());
		}

		Ok(ProxyConfig { agent_addr, agent_port, watched_paths })
	}
}

fn split_watched_paths(raw: &str) -> Vec<String> {
	raw.split(';').filter(|s| !s.is_empty()).map(str::to_owned).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cli_watch_flags_take_priority_over_env() {
		let config =
			ProxyConfig::from_args_and_env(Some("127.0.0.1"), Some("9000"), Some(vec!["/t/a.log", "/t/b.log"])).unwrap();
		assert_eq!(config.watched_paths, vec!["/t/a.log".to_string(), "/t/b.log".to_string()]);
	}

	#[test]
	fn splits_semicolon_separated_paths() {
		assert_eq!(split_watched_paths("/t/a.log;/t/b.log"), vec!["/t/a.log".to_string(), "/t/b.log".to_string()]);
		assert_eq!(split_watched_paths("/t/a.log;;/t/b.log;"), vec!["/t/a.log".to_string(), "/t/b.log".to_string()]);
	}
}
