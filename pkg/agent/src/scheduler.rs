//! Periodic backend synchronization: config refresh, the dynamically
//! rescheduled snapshot-upload job, size-triggered uploads, and log
//! re-verification. Each job kind runs on its own ticking thread rather
//! than through a shared scheduler, matching how this codebase favors
//! one thread per concern over a central dispatcher.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::agent::Agent;
use crate::backend::BackendClient;
use crate::collector::LogCollector;
use crate::validator::LogValidator;

/// The backend-governed periodic upload job. `interval` is reconciled
/// in place on every state-maintenance pass rather than torn down and
/// rebuilt: replacing an existing interval reschedules it, it doesn't
/// remove and re-add the job.
struct UploadJob {
	interval: Duration,
	next_run: Instant,
}

pub struct Scheduler {
	agent: Arc<Agent>,
	backend: Arc<BackendClient>,
	validator: Arc<LogValidator>,
	state_control_interval: Duration,
	logs_control_interval: Duration,
	max_log_size: AtomicU64,
	upload_job: Mutex<Option<UploadJob>>,
}

impl Scheduler {
	pub fn new(
		agent: Arc<Agent>,
		backend: Arc<BackendClient>,
		validator: Arc<LogValidator>,
		state_control_interval: Duration,
		logs_control_interval: Duration,
	) -> Self {
		Scheduler {
			agent,
			backend,
			validator,
			state_control_interval,
			logs_control_interval,
			max_log_size: AtomicU64::new(0),
			upload_job: Mutex::new(None),
		}
	}

	/// Fetches the agent's current config once synchronously (so the
	/// first tick of every job sees an up-to-date `max_log_size` and
	/// upload interval) then spawns the three ticking threads.
	pub fn start(self: Arc<Self>) {
		self.sync_config();

		let state_sched = self.clone();
		thread::spawn(move || loop {
			thread::sleep(state_sched.state_control_interval);
			state_sched.state_maintenance_sync();
		});

		let logs_sched = self.clone();
		thread::spawn(move || loop {
			thread::sleep(logs_sched.logs_control_interval);
			logs_sched.verify_logs();
		});

		let upload_sched = self;
		thread::spawn(move || loop {
			thread::sleep(Duration::from_secs(1));
			upload_sched.run_upload_job_tick();
		});
	}

	fn state_maintenance_sync(&self) {
		self.sync_config();

		let max_log_size = self.max_log_size.load(Ordering::Relaxed);
		if max_log_size > 0 && self.agent.collector().log_size() > max_log_size {
			if let Err(e) = self.agent.collector().upload_records() {
				eprintln!("failed to upload records: {}", e);
			}
		}
	}

	fn verify_logs(&self) {
		for log in self.agent.collector().logs() {
			self.validator.verify_log(&self.agent, log);
		}
	}

	fn sync_config(&self) {
		match self.backend.get_config() {
			Ok(config) => {
				self.max_log_size.store(config.max_record_count.max(0) as u64, Ordering::Relaxed);
				self.reconcile_upload_job(config.snapshot_interval);
			}
			Err(e) => eprintln!("failed to sync agent config: {}", e),
		}
	}

	/// Adds, reschedules, or removes the periodic upload job based on
	/// the backend's current `snapshotInterval`. An interval `<= 0`
	/// removes the job; an unchanged interval is left alone so an
	/// in-flight wait isn't reset on every state-maintenance pass.
	fn reconcile_upload_job(&self, snapshot_interval_secs: i64) {
		let mut job = self.upload_job.lock().unwrap();

		if snapshot_interval_secs <= 0 {
			if job.take().is_some() {
				println!("Removing periodic upload job");
			}
			return;
		}

		let interval = Duration::from_secs(snapshot_interval_secs as u64);
		match job.as_mut() {
			Some(existing) if existing.interval == interval => {}
			Some(existing) => {
				println!("Rescheduling periodic upload job to every {}s", snapshot_interval_secs);
				existing.interval = interval;
			}
			None => {
				println!("Adding periodic upload job with interval {}s", snapshot_interval_secs);
				*job = Some(UploadJob { interval, next_run: Instant::now() + interval });
			}
		}
	}

	/// Runs the upload job if its interval has elapsed, rescheduling its
	/// next run relative to now so a slow upload doesn't cause it to
	/// fire back-to-back to make up lost time.
	fn run_upload_job_tick(&self) {
		let now = Instant::now();
		let due = {
			let mut job = self.upload_job.lock().unwrap();
			match job.as_mut() {
				Some(j) if now >= j.next_run => {
					j.next_run = now + j.interval;
					true
				}
				_ => false,
			}
		};
		if due {
			if let Err(e) = self.agent.collector().upload_records() {
				eprintln!("failed to upload records: {}", e);
			}
		}
	}
}
