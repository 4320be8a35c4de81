//! Log identity, the record entity, and the rolling-fingerprint snapshot.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::fingerprint;

/// A log is identified by a path-like `name`, unique per proxy. `id` is
/// assigned by the backend the first time the log is registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
	pub name: String,
	pub id: Option<String>,
}

impl Log {
	pub fn new(name: impl Into<String>) -> Self {
		Log { name: name.into(), id: None }
	}

	pub fn with_id(name: impl Into<String>, id: impl Into<String>) -> Self {
		Log { name: name.into(), id: Some(id.into()) }
	}
}

/// One line of a log. Timestamps are advisory: carried end-to-end, never
/// part of the fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
	pub log: Log,
	pub data: String,
	pub timestamp: DateTime<Utc>,
}

struct SnapshotState {
	first_line: u64,
	line_count: u64,
	cum_hash: String,
}

/// The cumulative fingerprint over a contiguous, currently-open prefix of
/// a log. `add_record`, `next_line`, and `upload_prep` are all serialized
/// through the same mutex so an upload-in-flight and a concurrent record
/// arrival can never corrupt the running state.
pub struct Snapshot {
	log: Log,
	state: Mutex<SnapshotState>,
}

/// The serialisable view of a snapshot handed to the backend, produced by
/// [`Snapshot::upload_prep`].
#[derive(Debug, Clone)]
pub struct SnapshotView {
	pub log_id: Option<String>,
	pub first_line: u64,
	pub line_count: u64,
	pub fingerprint: String,
}

impl SnapshotView {
	/// `None` when the snapshot held no records (the "empty snapshot"
	/// case: `first_line > last_line`).
	pub fn last_line(&self) -> Option<u64> {
		if self.line_count == 0 {
			None
		} else {
			Some(self.first_line + self.line_count - 1)
		}
	}

	pub fn is_empty(&self) -> bool {
		self.line_count == 0
	}
}

impl Snapshot {
	pub fn new(log: Log) -> Self {
		Self::starting_at(log, 0)
	}

	/// Used to rehydrate a snapshot at agent startup from the backend's
	/// reported resume position (`GET /log/for_agent`).
	pub fn starting_at(log: Log, first_line: u64) -> Self {
		Snapshot {
			log,
			state: Mutex::new(SnapshotState {
				first_line,
				line_count: 0,
				cum_hash: fingerprint::empty(),
			}),
		}
	}

	pub fn log(&self) -> &Log {
		&self.log
	}

	/// Appends one record's data to the running fingerprint. One record
	/// at a time.
	pub fn add_record(&self, data: &str) {
		let mut state = self.state.lock().unwrap();
		state.cum_hash = fingerprint::fold(&state.cum_hash, data);
		state.line_count += 1;
	}

	/// The exclusive upper bound of lines currently held by this snapshot.
	pub fn next_line(&self) -> u64 {
		let state = self.state.lock().unwrap();
		state.first_line + state.line_count
	}

	pub fn line_count(&self) -> u64 {
		self.state.lock().unwrap().line_count
	}

	/// Atomically serialises the current snapshot and resets it to a
	/// fresh, empty snapshot starting where this one left off. Never
	/// split into a "peek" and a "reset" (a record added in between
	/// would otherwise be silently lost).
	pub fn upload_prep(&self) -> SnapshotView {
		let mut state = self.state.lock().unwrap();

		let view = SnapshotView {
			log_id: self.log.id.clone(),
			first_line: state.first_line,
			line_count: state.line_count,
			fingerprint: state.cum_hash.clone(),
		};

		state.first_line += state.line_count;
		state.line_count = 0;
		state.cum_hash = fingerprint::empty();

		view
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_snapshot_has_no_last_line() {
		let snap = Snapshot::new(Log::with_id("a.log", "L1"));
		let view = snap.upload_prep();
		assert!(view.is_empty());
		assert_eq!(view.last_line(), None);
	}

	#[test]
	fn fingerprint_folds_records_in_order() {
		let snap = Snapshot::new(Log::with_id("/t/a.log", "L1"));
		snap.add_record("x");
		snap.add_record("y");
		let view = snap.upload_prep();

		assert_eq!(view.first_line, 0);
		assert_eq!(view.last_line(), Some(1));
		let expected = fingerprint::fold(&fingerprint::fold(&fingerprint::empty(), "x"), "y");
		assert_eq!(view.fingerprint, expected);
	}

	/// Uploading mid-stream and continuing must cover `[0, k)` exactly
	/// once, with no gap or overlap.
	#[test]
	fn no_record_loss_across_upload() {
		let snap = Snapshot::new(Log::with_id("a.log", "L1"));
		snap.add_record("1");
		snap.add_record("2");
		let first = snap.upload_prep();
		assert_eq!((first.first_line, first.last_line().unwrap()), (0, 1));

		snap.add_record("3");
		let second = snap.upload_prep();
		assert_eq!((second.first_line, second.last_line().unwrap()), (2, 2));

		snap.add_record("4");
		snap.add_record("5");
		let third = snap.upload_prep();
		assert_eq!((third.first_line, third.last_line().unwrap()), (3, 4));

		assert_eq!(snap.next_line(), 5);
	}

	#[test]
	fn resumes_from_backend_position() {
		// A prior snapshot reported 5 records.
		let snap = Snapshot::starting_at(Log::with_id("/t/a.log", "L1"), 5);
		assert_eq!(snap.next_line(), 5);
		snap.add_record("line5");
		snap.add_record("line6");
		assert_eq!(snap.next_line(), 7);
	}
}
