//! Watches files and directories for changes and turns them into
//! complete log records. Cross-platform via `notify`, the file-watching
//! crate the rest of this workspace reaches for.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::errors::*;

/// Sink for everything a watched file can report, including
/// `on_empty_write`, which fires when a modification notification
/// arrives but no new bytes are actually readable yet (a write that
/// raced the notification, or a zero-byte write).
pub trait FileRecordCollector: Send + Sync {
	fn request_initialize(&self, filename: &str);
	fn on_record_added(&self, filename: &str, timestamp: DateTime<Utc>, data: &str);
	fn on_empty_write(&self, filename: &str, timestamp: DateTime<Utc>);
	fn on_file_disappeared(&self, filename: &str, timestamp: DateTime<Utc>);
}

/// Contract for launching a watch at a specific resume position, used
/// by the agent-facing message dispatcher once it learns where a log
/// left off.
pub trait LogWatchManager: Send + Sync {
	fn initialize_watch(&self, log_name: &str, start_record: u64);
	fn contains_watch(&self, log_name: &str) -> bool;
}

/// One watched file: its open handle, whether it has received its
/// resume position yet, and the tail of the last incomplete line
/// carried over between reads.
struct FileWatch {
	path: String,
	reader: BufReader<File>,
	pending_line: String,
	initialized: bool,
	to_skip: u64,
}

impl FileWatch {
	fn open(path: &Path, collector: &dyn FileRecordCollector) -> Result<Self> {
		let path_str = path.to_string_lossy().into_owned();
		let reader = BufReader::new(File::open(path)?);
		collector.request_initialize(&path_str);
		Ok(FileWatch { path: path_str, reader, pending_line: String::new(), initialized: false, to_skip: 0 })
	}

	/// Skips `start_line` already-accounted-for records, then catches
	/// up on whatever is left in the file.
	fn initialize(&mut self, start_line: u64, collector: &dyn FileRecordCollector) {
		self.to_skip = start_line;
		self.drain_complete_lines(collector);
		self.initialized = true;
	}

	/// Reads whatever new bytes are available and emits one record per
	/// completed line; a write that lands with no readable bytes yet is
	/// reported as `on_empty_write` rather than silently ignored.
	fn handle_modify(&mut self, collector: &dyn FileRecordCollector) {
		if !self.initialized {
			return;
		}
		if !self.drain_complete_lines(collector) {
			collector.on_empty_write(&self.path, Utc::now());
		}
	}

	/// Returns `true` if any bytes were read at all (even if they only
	/// extended the pending partial line).
	fn drain_complete_lines(&mut self, collector: &dyn FileRecordCollector) -> bool {
		let mut chunk = String::new();
		let n = match self.reader.read_to_string(&mut chunk) {
			Ok(n) => n,
			Err(e) => {
				eprintln!("failed to read {}: {}", self.path, e);
				return false;
			}
		};
		if n == 0 {
			return false;
		}

		let timestamp = Utc::now();
		let mut data = std::mem::take(&mut self.pending_line);
		data.push_str(&chunk);

		let ends_with_newline = data.ends_with('\n');
		let mut lines: Vec<&str> = data.split_inclusive('\n').collect();
		let carry = if ends_with_newline { None } else { lines.pop() };

		for line in lines {
			if self.to_skip > 0 {
				self.to_skip -= 1;
			} else {
				collector.on_record_added(&self.path, timestamp, line.trim_end_matches(['\n', '\r'].as_ref()));
			}
		}

		self.pending_line = carry.map(str::to_owned).unwrap_or_default();
		true
	}
}

/// Tracks every watched file and directory and dispatches `notify`
/// events to them, adding or dropping file watches as directory
/// contents change.
pub struct FsWatchManager {
	collector: Arc<dyn FileRecordCollector>,
	files: Mutex<HashMap<String, FileWatch>>,
	dirs: Mutex<HashSet<String>>,
	watcher: Mutex<RecommendedWatcher>,
}

impl FsWatchManager {
	pub fn new(collector: Arc<dyn FileRecordCollector>) -> Result<(Arc<Self>, Receiver<notify::Result<Event>>)> {
		let (tx, rx) = std::sync::mpsc::channel();
		let watcher = notify::recommended_watcher(tx)?;
		let manager = Arc::new(FsWatchManager {
			collector,
			files: Mutex::new(HashMap::new()),
			dirs: Mutex::new(HashSet::new()),
			watcher: Mutex::new(watcher),
		});
		Ok((manager, rx))
	}

	/// Adds a watch for `path`. Directories are watched non-recursively
	/// for membership changes and every current entry is watched in
	/// turn, recursing into sub-directories as it goes.
	pub fn begin_watch(&self, path: &str) -> Result<()> {
		let p = Path::new(path);
		self.watcher.lock().unwrap().watch(p, RecursiveMode::NonRecursive)?;

		if p.is_dir() {
			self.dirs.lock().unwrap().insert(path.to_string());
			for entry in std::fs::read_dir(p)? {
				let entry = entry?;
				self.begin_watch(&entry.path().to_string_lossy())?;
			}
		} else {
			let watch = FileWatch::open(p, &*self.collector)?;
			self.files.lock().unwrap().insert(path.to_string(), watch);
		}
		Ok(())
	}

	pub fn end_watch(&self, path: &str) -> Result<()> {
		let p = Path::new(path);
		self.watcher.lock().unwrap().unwatch(p)?;
		self.files.lock().unwrap().remove(path);
		self.dirs.lock().unwrap().remove(path);
		Ok(())
	}

	/// Dispatches one batch of filesystem events: file content changes
	/// go to the matching `FileWatch`, directory membership changes
	/// add or drop watches dynamically.
	pub fn process_event(&self, event: Event) {
		match event.kind {
			EventKind::Modify(_) => {
				for path in &event.paths {
					let path_str = path.to_string_lossy().into_owned();
					let mut files = self.files.lock().unwrap();
					if let Some(watch) = files.get_mut(&path_str) {
						watch.handle_modify(&*self.collector);
					}
				}
			}
			EventKind::Create(_) => {
				for path in &event.paths {
					let is_under_watched_dir = path
						.parent()
						.map(|parent| self.dirs.lock().unwrap().contains(&parent.to_string_lossy().into_owned()))
						.unwrap_or(false);
					if is_under_watched_dir {
						let path_str = path.to_string_lossy().into_owned();
						if let Err(e) = self.begin_watch(&path_str) {
							eprintln!("failed to watch {}: {}", path_str, e);
						}
					}
				}
			}
			EventKind::Remove(_) => {
				for path in &event.paths {
					let path_str = path.to_string_lossy().into_owned();
					if self.files.lock().unwrap().contains_key(&path_str) {
						self.collector.on_file_disappeared(&path_str, Utc::now());
						let _ = self.end_watch(&path_str);
					} else if self.dirs.lock().unwrap().contains(&path_str) {
						let _ = self.end_watch(&path_str);
					}
				}
			}
			_ => {}
		}
	}

	/// Drains `rx` forever. Matches `listen_watches`: any unexpected
	/// channel failure is fatal to the whole process.
	pub fn listen(&self, rx: Receiver<notify::Result<Event>>) -> ! {
		for res in rx {
			match res {
				Ok(event) => self.process_event(event),
				Err(e) => {
					eprintln!("watch error: {}", e);
					std::process::exit(1);
				}
			}
		}
		eprintln!("watch channel closed unexpectedly");
		std::process::exit(1);
	}
}

impl LogWatchManager for FsWatchManager {
	fn initialize_watch(&self, log_name: &str, start_record: u64) {
		let mut files = self.files.lock().unwrap();
		if let Some(watch) = files.get_mut(log_name) {
			println!("Initializing {} on record {}", log_name, start_record);
			watch.initialize(start_record, &*self.collector);
		}
	}

	fn contains_watch(&self, log_name: &str) -> bool {
		self.files.lock().unwrap().contains_key(log_name)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;
	use std::sync::Mutex as StdMutex;
	use tempfile;

	#[derive(Default)]
	struct RecordingCollector {
		records: StdMutex<Vec<String>>,
		empty_writes: StdMutex<u32>,
	}

	impl FileRecordCollector for RecordingCollector {
		fn request_initialize(&self, _filename: &str) {}
		fn on_record_added(&self, _filename: &str, _timestamp: DateTime<Utc>, data: &str) {
			self.records.lock().unwrap().push(data.to_string());
		}
		fn on_empty_write(&self, _filename: &str, _timestamp: DateTime<Utc>) {
			*self.empty_writes.lock().unwrap() += 1;
		}
		fn on_file_disappeared(&self, _filename: &str, _timestamp: DateTime<Utc>) {}
	}

	/// A line split across two writes is only reported once it's
	/// terminated by a newline; the partial prefix is carried over.
	#[test]
	fn carries_partial_line_across_reads() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("a.log");
		std::fs::write(&path, "").unwrap();

		let collector = Arc::new(RecordingCollector::default());
		let mut watch = FileWatch::open(&path, &*collector).unwrap();
		watch.initialized = true;

		let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
		write!(file, "hel").unwrap();
		file.flush().unwrap();
		watch.handle_modify(&*collector);
		assert!(collector.records.lock().unwrap().is_empty());

		write!(file, "lo\n").unwrap();
		file.flush().unwrap();
		watch.handle_modify(&*collector);
		assert_eq!(collector.records.lock().unwrap().as_slice(), &["hello".to_string()]);
	}

	/// Lines already accounted for by the backend's resume position are
	/// skipped rather than re-reported.
	#[test]
	fn initialize_skips_already_recorded_lines() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("a.log");
		std::fs::write(&path, "one\ntwo\nthree\n").unwrap();

		let collector = Arc::new(RecordingCollector::default());
		let mut watch = FileWatch::open(&path, &*collector).unwrap();
		watch.initialize(2, &*collector);

		assert_eq!(collector.records.lock().unwrap().as_slice(), &["three".to_string()]);
	}
}
