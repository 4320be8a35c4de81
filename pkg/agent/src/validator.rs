//! Background re-verification of already-uploaded log content against
//! the backend's recorded snapshots.
//!
//! Each job re-downloads the bytes it once uploaded (via a content
//! request against whichever proxy still has them), refolds the
//! fingerprint locally, and reports whether it still matches what the
//! backend stored. A log with no snapshots at all is trivially correct
//! (nothing to mismatch against).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use logcore::fingerprint;
use logcore::model::Log;

use crate::agent::Agent;
use crate::backend::{BackendClient, BackendSnapshot};
use crate::content_request::Status;
use crate::fanout::AgentContentRequest;

struct ValidatorJob {
	request: AgentContentRequest,
	log: Log,
	remaining_snapshots: VecDeque<BackendSnapshot>,
	fingerprint: String,
	records_counter: u64,
	finished: bool,
}

impl ValidatorJob {
	fn new(snapshots: Vec<BackendSnapshot>, request: AgentContentRequest, log: Log, backend: &BackendClient) -> Self {
		let mut job = ValidatorJob {
			request,
			log,
			remaining_snapshots: snapshots.into(),
			fingerprint: fingerprint::empty(),
			records_counter: 0,
			finished: false,
		};
		if job.remaining_snapshots.is_empty() {
			let expected = fingerprint::empty();
			job.finish_validation(backend, expected);
		}
		job
	}

	/// `false` once the job has nothing further to report: either it
	/// already finished, or its fan-out died with no lead, or its lead
	/// stopped streaming (closed, not found, or dropped) before every
	/// remaining snapshot was consumed (a proxy with fewer records than
	/// the backend's snapshots require is a failed verification, not a
	/// silently abandoned job).
	fn work_in_progress(&mut self, backend: &BackendClient) -> bool {
		if self.finished {
			return false;
		}
		if self.request.is_dead() {
			self.finish_validation(backend, String::new());
			return false;
		}
		match self.request.get_lead() {
			None => true,
			Some(lead) => match lead.status() {
				Status::Pending | Status::Receiving => true,
				_ => {
					// The lead stopped streaming (closed, not found, or
					// dropped). `finish_validation` is a no-op if a prior
					// `handle_new_record` call already finished the job
					// (e.g. by consuming the last snapshot); otherwise
					// remaining snapshots are unreachable and this is a
					// failed verification.
					self.finish_validation(backend, String::new());
					false
				}
			},
		}
	}

	fn do_work(&mut self, backend: &BackendClient) {
		let lead = match self.request.get_lead() {
			Some(lead) => lead,
			None => return,
		};
		while let Some(record) = lead.pop_record() {
			self.handle_new_record(backend, &record);
		}
	}

	fn handle_new_record(&mut self, backend: &BackendClient, record: &str) {
		if self.finished {
			return;
		}

		self.records_counter += 1;
		self.fingerprint = fingerprint::fold(&self.fingerprint, record);

		let current_done = match self.remaining_snapshots.front() {
			Some(next) => next.last_line < self.records_counter,
			None => false,
		};
		if !current_done {
			return;
		}

		let next = self.remaining_snapshots.pop_front().unwrap();
		if self.fingerprint != next.fingerprint || self.remaining_snapshots.is_empty() {
			self.finish_validation(backend, next.fingerprint);
		}
		self.fingerprint = fingerprint::empty();
	}

	fn finish_validation(&mut self, backend: &BackendClient, expected_fingerprint: String) {
		if self.finished {
			return;
		}
		self.finished = true;
		let is_correct = self.remaining_snapshots.is_empty() && self.fingerprint == expected_fingerprint;
		let log_id = match &self.log.id {
			Some(id) => id,
			None => return,
		};
		if let Err(e) = backend.post_verification(log_id, is_correct) {
			eprintln!("failed to post verification for {}: {}", self.log.name, e);
		}
	}
}

/// Runs the re-verification jobs handed to it by [`verify_log`] on a
/// dedicated worker thread, one pass per second.
pub struct LogValidator {
	backend: Arc<BackendClient>,
	jobs: Mutex<Vec<ValidatorJob>>,
}

impl LogValidator {
	pub fn spawn(backend: Arc<BackendClient>) -> Arc<Self> {
		let validator = Arc::new(LogValidator { backend, jobs: Mutex::new(Vec::new()) });
		let worker = validator.clone();
		thread::spawn(move || worker.worker_loop());
		validator
	}

	fn worker_loop(&self) -> ! {
		loop {
			let mut jobs = std::mem::take(&mut *self.jobs.lock().unwrap());
			jobs.retain_mut(|job| {
				job.do_work(&self.backend);
				job.work_in_progress(&self.backend)
			});
			self.jobs.lock().unwrap().extend(jobs);
			thread::sleep(Duration::from_secs(1));
		}
	}

	/// Starts a fresh verification pass for `log` against `agent`'s
	/// connected proxies.
	pub fn verify_log(&self, agent: &Agent, log: Log) {
		let log_id = match &log.id {
			Some(id) => id.clone(),
			None => return,
		};

		let snapshots = match self.backend.get_snapshots_for_log(&log_id) {
			Ok(s) => s,
			Err(e) => {
				eprintln!("failed to fetch snapshots for {}: {}", log.name, e);
				return;
			}
		};

		let (first_line, last_line) = match (snapshots.first(), snapshots.last()) {
			(Some(first), Some(last)) => (first.first_line, last.last_line),
			_ => (0, 0),
		};

		let request = agent.request_log_content(&log.name, first_line, last_line);
		let job = ValidatorJob::new(snapshots, request, log, &self.backend);
		self.jobs.lock().unwrap().push(job);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::AgentConfig;

	fn backend() -> BackendClient {
		BackendClient::new(&AgentConfig {
			bind_addr: "127.0.0.1".into(),
			bind_port: 0,
			backend_endpoint: "http://127.0.0.1:1".into(),
			token: "t".into(),
			state_control_interval: Duration::from_secs(1),
			logs_control_interval: Duration::from_secs(1),
		})
	}

	/// A log with no recorded snapshots is vacuously correct and a job
	/// with no id never touches the backend, so constructing it (with
	/// an already-dead fan-out) must finish immediately without
	/// panicking or hanging.
	#[test]
	fn empty_snapshot_history_finishes_immediately() {
		let log = Log::new("/t/a.log");
		let request = AgentContentRequest::new(Vec::new());
		assert!(request.is_dead());

		let job = ValidatorJob::new(Vec::new(), request, log, &backend());
		assert!(job.finished);
	}

	/// A fingerprint that folds exactly the bytes a snapshot claims,
	/// split across snapshot boundaries, is reported correct; one whose
	/// folded fingerprint diverges from what's recorded is not.
	#[test]
	fn folds_records_against_recorded_boundaries() {
		let fp_a = fingerprint::fold(&fingerprint::empty(), "line0");
		let snapshots = vec![BackendSnapshot { first_line: 0, last_line: 0, fingerprint: fp_a }];

		let mut job = ValidatorJob {
			request: AgentContentRequest::new(Vec::new()),
			log: Log::new("/t/a.log"),
			remaining_snapshots: snapshots.into(),
			fingerprint: fingerprint::empty(),
			records_counter: 0,
			finished: false,
		};

		let backend = backend();
		job.handle_new_record(&backend, "line0");
		assert!(job.finished);
		assert!(job.remaining_snapshots.is_empty());
	}

	fn dummy_connection() -> Arc<crate::connection::ProxyConnection> {
		use std::net::{TcpListener, TcpStream};

		struct NullCollector;
		impl crate::collector::LogCollector for NullCollector {
			fn collect_record(&self, _log_name: &str, _data: &str) -> crate::errors::Result<()> {
				Ok(())
			}
			fn upload_records(&self) -> crate::errors::Result<()> {
				Ok(())
			}
			fn logs(&self) -> Vec<logcore::model::Log> {
				Vec::new()
			}
			fn log_size(&self) -> u64 {
				0
			}
			fn get_log_position(&self, _log_name: &str) -> u64 {
				0
			}
			fn log_id(&self, _log_name: &str) -> Option<String> {
				None
			}
		}

		let listener = TcpListener::bind("127.0.0.1:0").unwrap();
		let addr = listener.local_addr().unwrap();
		let client = TcpStream::connect(addr).unwrap();
		let (server, _) = listener.accept().unwrap();
		drop(server);

		let collector: Arc<dyn crate::collector::LogCollector> = Arc::new(NullCollector);
		Arc::new(crate::connection::ProxyConnection::from_stream(client, collector).unwrap())
	}

	/// A lead that closes (finishes streaming) before every remaining
	/// snapshot has been consumed (the proxy had fewer records than the
	/// backend's snapshots require) must finish the job as a failed
	/// verification, not drop it silently out of the worker queue.
	#[test]
	fn lead_closing_early_finishes_as_failed() {
		let connection = dummy_connection();
		let handler = crate::content_request::ContentRequestHandler::new();
		let request = handler.create_request(0, 4);
		request.set_status(Status::Closed);

		let agent_request = AgentContentRequest::new(vec![(connection, request)]);
		assert!(!agent_request.is_dead());

		let fp_a = fingerprint::fold(&fingerprint::empty(), "line0");
		let fp_b = fingerprint::fold(&fp_a, "line1");
		let snapshots = vec![
			BackendSnapshot { first_line: 0, last_line: 0, fingerprint: fp_a },
			BackendSnapshot { first_line: 1, last_line: 1, fingerprint: fp_b },
		];

		let mut job = ValidatorJob {
			request: agent_request,
			log: Log::with_id("/t/a.log", "L1"),
			remaining_snapshots: snapshots.into(),
			fingerprint: fingerprint::empty(),
			records_counter: 0,
			finished: false,
		};

		let backend = backend();
		job.do_work(&backend);
		assert!(!job.finished);

		// The lead already closed with nothing queued: the job must give
		// up and report failure rather than keep polling a dead stream
		// forever or get dropped from the queue unfinished.
		assert!(!job.work_in_progress(&backend));
		assert!(job.finished);
		assert!(!job.remaining_snapshots.is_empty());
	}
}
