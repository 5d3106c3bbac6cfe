//! Application log store.
//!
//! Entries live in a bounded newest-first cache and are appended, one JSON
//! object per line, to `<dir>/app-<YYYY-MM-DD>.log`. File I/O failures are
//! reported through `tracing` and never interrupt the in-memory update.
//!
//! Writers raise an [`UpdateSignal`] for subscribers, throttled against the
//! last read:
//! - ERROR entries always signal ([`UpdateSignal::Urgent`]);
//! - other entries signal when the last read is older than the throttle
//!   window, or when they are the first write since that read.

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::error::{log_io_err, LogError};
use crate::paths::log_file_name;
use crate::types::{ErrorDetails, LogEntry, LogLevel, OsInfo, ProcessInfo};

pub const DEFAULT_CAPACITY: usize = 100;
pub const DEFAULT_READ_THROTTLE: Duration = Duration::from_millis(1000);

const SIGNAL_BUFFER: usize = 64;

/// Raised by a write that clients should hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSignal {
    Normal,
    /// An ERROR entry; coalesce with the short delay.
    Urgent,
}

#[derive(Debug, Clone)]
pub struct LogStoreOptions {
    pub capacity: usize,
    pub read_throttle: Duration,
    pub environment: Option<String>,
    /// Echo every entry to `tracing` at info level instead of debug.
    pub mirror_to_console: bool,
}

impl Default for LogStoreOptions {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            read_throttle: DEFAULT_READ_THROTTLE,
            environment: None,
            mirror_to_console: false,
        }
    }
}

#[derive(Debug, Default)]
struct LogState {
    recent: VecDeque<LogEntry>,
    /// Entries written since the last read.
    unread: u64,
    last_read: Option<Instant>,
    update_pending: bool,
}

pub struct LogStore {
    dir: PathBuf,
    options: LogStoreOptions,
    os: OsInfo,
    process: ProcessInfo,
    state: Mutex<LogState>,
    signals: broadcast::Sender<UpdateSignal>,
}

impl LogStore {
    /// Open (and create if needed) a log store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>, options: LogStoreOptions) -> Result<Self, LogError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| log_io_err(&dir, e))?;
        let (signals, _) = broadcast::channel(SIGNAL_BUFFER);
        Ok(Self {
            process: ProcessInfo::current(options.environment.clone()),
            os: OsInfo::current(),
            dir,
            options,
            state: Mutex::new(LogState::default()),
            signals,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Today's log file (UTC calendar day).
    pub fn current_file(&self) -> PathBuf {
        self.dir.join(log_file_name(Utc::now().date_naive()))
    }

    /// Observe update signals raised by writes.
    pub fn subscribe(&self) -> broadcast::Receiver<UpdateSignal> {
        self.signals.subscribe()
    }

    pub fn info(&self, message: impl Into<String>, details: Option<Value>) {
        self.write(LogLevel::Info, message.into(), details);
    }

    pub fn warn(&self, message: impl Into<String>, details: Option<Value>) {
        self.write(LogLevel::Warn, message.into(), details);
    }

    pub fn error(&self, message: impl Into<String>, details: Option<Value>) {
        self.write(LogLevel::Error, message.into(), details);
    }

    /// ERROR entry whose details are the normalized `{message, stack, name}`.
    pub fn error_from(&self, message: impl Into<String>, err: &(dyn std::error::Error + 'static)) {
        let details = serde_json::to_value(ErrorDetails::from_error(err)).ok();
        self.write(LogLevel::Error, message.into(), details);
    }

    /// Up to `limit` entries, newest first.
    ///
    /// Served from memory; when the cache is empty the current log file is
    /// parsed instead and the cache refilled from it. Marks the log as read.
    pub fn recent_logs(&self, limit: usize) -> Vec<LogEntry> {
        let mut state = self.lock();
        state.last_read = Some(Instant::now());
        state.unread = 0;
        state.update_pending = false;

        if !state.recent.is_empty() {
            return state.recent.iter().take(limit).cloned().collect();
        }

        let entries = self.read_file();
        state.recent = entries.iter().take(self.options.capacity).cloned().collect();
        entries.into_iter().take(limit).collect()
    }

    /// Time since the last [`recent_logs`](Self::recent_logs) call, `None` before the first.
    pub fn time_since_last_request(&self) -> Option<Duration> {
        self.lock().last_read.map(|at| at.elapsed())
    }

    /// Whether anything was written since the last read.
    pub fn has_unread(&self) -> bool {
        self.lock().unread > 0
    }

    /// Whether a write since the last read raised an update signal.
    pub fn update_pending(&self) -> bool {
        self.lock().update_pending
    }

    fn write(&self, level: LogLevel, message: String, details: Option<Value>) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            message,
            details,
            os: self.os.clone(),
            process: self.process.clone(),
        };

        let signal = {
            let mut state = self.lock();
            state.recent.push_front(entry.clone());
            state.recent.truncate(self.options.capacity);
            state.unread += 1;

            let signal = self.throttle(&state, level);
            if signal.is_some() {
                state.update_pending = true;
            }
            signal
        };

        self.append(&entry);
        self.mirror(&entry);

        if let Some(signal) = signal {
            // No subscribers is fine.
            let _ = self.signals.send(signal);
        }
    }

    fn throttle(&self, state: &LogState, level: LogLevel) -> Option<UpdateSignal> {
        if level == LogLevel::Error {
            return Some(UpdateSignal::Urgent);
        }
        let stale_read = state
            .last_read
            .map_or(true, |at| at.elapsed() > self.options.read_throttle);
        if stale_read || state.unread == 1 {
            Some(UpdateSignal::Normal)
        } else {
            None
        }
    }

    fn append(&self, entry: &LogEntry) {
        let path = self.current_file();
        let line = match serde_json::to_string(entry) {
            Ok(line) => line,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize log entry");
                return;
            }
        };
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| writeln!(file, "{line}"));
        if let Err(err) = result {
            tracing::warn!(path = %path.display(), error = %err, "error writing to log file");
        }
    }

    fn read_file(&self) -> Vec<LogEntry> {
        let path = self.current_file();
        let contents = match std::fs::read(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "error reading log file");
                return Vec::new();
            }
        };
        // Lines are parsed as bytes so a torn append only costs its own line.
        contents
            .split(|byte| *byte == b'\n')
            .rev()
            .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
            .map(|line| {
                serde_json::from_slice(line)
                    .unwrap_or_else(|_| LogEntry::unparseable(&String::from_utf8_lossy(line)))
            })
            .collect()
    }

    fn mirror(&self, entry: &LogEntry) {
        let details = entry
            .details
            .as_ref()
            .map(Value::to_string)
            .unwrap_or_default();
        if self.options.mirror_to_console {
            tracing::info!(level = %entry.level, details = %details, "{}", entry.message);
        } else {
            tracing::debug!(level = %entry.level, details = %details, "{}", entry.message);
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
