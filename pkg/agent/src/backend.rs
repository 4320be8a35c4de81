//! Agent↔Backend HTTP/JSON client: a blocking client, bearer-token
//! auth, and one shared response handler.
//!
//! Every backend call is fatal on failure: the agent holds no durable
//! state of its own, so a backend error forces a clean restart rather
//! than limping along with a stale view of the world.

use logcore::model::SnapshotView;
use serde::de::DeserializeOwned;

use crate::config::AgentConfig;
use crate::errors::*;

#[derive(Deserialize)]
struct Envelope {
	success: bool,
	data: serde_json::Value,
}

#[derive(Serialize)]
struct LogNameRequest<'a> {
	name: &'a str,
}

#[derive(Deserialize)]
struct LogIdResponse {
	id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotUploadRequest<'a> {
	first_line: u64,
	last_line: u64,
	log_id: &'a str,
	fingerprint: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerificationRequest {
	is_correct: bool,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AgentLogInfo {
	pub name: String,
	pub id: String,
	/// The next line index the agent should resume this log's snapshot
	/// from. Not a record count.
	pub records: u64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BackendSnapshot {
	pub first_line: u64,
	pub last_line: u64,
	pub fingerprint: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AgentBackendConfig {
	pub snapshot_interval: i64,
	pub max_record_count: i64,
}

pub struct BackendClient {
	client: reqwest::blocking::Client,
	base_url: String,
	token: String,
}

impl BackendClient {
	pub fn new(config: &AgentConfig) -> Self {
		BackendClient {
			client: reqwest::blocking::Client::new(),
			base_url: config.backend_endpoint.clone(),
			token: config.token.clone(),
		}
	}

	pub fn register_log(&self, name: &str) -> Result<String> {
		let resp: LogIdResponse = self.post("log", &LogNameRequest { name })?;
		Ok(resp.id)
	}

	/// No-op when `view` carries no records.
	pub fn post_snapshot(&self, view: &SnapshotView) -> Result<()> {
		let last_line = match view.last_line() {
			Some(l) => l,
			None => return Ok(()),
		};
		let log_id = view.log_id.as_deref().unwrap_or_default();
		let _: serde_json::Value = self.post(
			"snapshot",
			&SnapshotUploadRequest {
				first_line: view.first_line,
				last_line,
				log_id,
				fingerprint: &view.fingerprint,
			},
		)?;
		Ok(())
	}

	pub fn post_verification(&self, log_id: &str, is_correct: bool) -> Result<()> {
		let _: serde_json::Value =
			self.post(&format!("log/{}/verification", log_id), &VerificationRequest { is_correct })?;
		Ok(())
	}

	pub fn get_logs_for_agent(&self) -> Result<Vec<AgentLogInfo>> {
		self.get("log/for_agent")
	}

	pub fn get_snapshots_for_log(&self, log_id: &str) -> Result<Vec<BackendSnapshot>> {
		self.get(&format!("snapshot/agent_for_log/{}", log_id))
	}

	pub fn get_config(&self) -> Result<AgentBackendConfig> {
		self.get("agent/config")
	}

	fn post<T: DeserializeOwned, B: serde::Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> Result<T> {
		let resp = self
			.client
			.post(format!("{}/{}", self.base_url, endpoint))
			.bearer_auth(&self.token)
			.json(body)
			.send()?;
		self.handle_response(resp)
	}

	fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
		let resp = self.client.get(format!("{}/{}", self.base_url, endpoint)).bearer_auth(&self.token).send()?;
		self.handle_response(resp)
	}

	fn handle_response<T: DeserializeOwned>(&self, resp: reqwest::blocking::Response) -> Result<T> {
		let envelope: Envelope = resp.json()?;
		if !envelope.success {
			eprintln!("Server Response Error\n{}", envelope.data);
			std::process::exit(1);
		}
		Ok(serde_json::from_value(envelope.data)?)
	}
}
