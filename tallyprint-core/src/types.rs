//! Domain types shared by the daemon, its clients and the log store.
//!
//! Everything here is serde-serializable; the JSON shapes are the wire
//! format of the command socket and the on-disk log lines.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Log entries
// ---------------------------------------------------------------------------

/// Severity of a [`LogEntry`]. Serialized upper-case (`"INFO"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Operating system the entry was written on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsInfo {
    pub platform: String,
    pub release: String,
}

impl OsInfo {
    pub fn current() -> Self {
        Self {
            platform: std::env::consts::OS.to_string(),
            release: os_release(),
        }
    }
}

/// Process that wrote the entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub env: Option<String>,
}

impl ProcessInfo {
    pub fn current(env: Option<String>) -> Self {
        Self {
            pid: std::process::id(),
            env,
        }
    }
}

/// One immutable line of the application log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub details: Option<Value>,
    #[serde(default)]
    pub os: OsInfo,
    #[serde(default)]
    pub process: ProcessInfo,
}

impl LogEntry {
    /// Placeholder returned in place of a log line that failed to parse.
    pub fn unparseable(raw_line: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            level: LogLevel::Error,
            message: "Failed to parse log entry".to_string(),
            details: Some(Value::String(raw_line.to_string())),
            os: OsInfo::default(),
            process: ProcessInfo::default(),
        }
    }
}

/// Normalized shape of an error recorded in [`LogEntry::details`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub message: String,
    /// Source chain, outermost first.
    pub stack: Vec<String>,
    pub name: String,
}

impl ErrorDetails {
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut stack = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            stack.push(cause.to_string());
            source = cause.source();
        }
        Self {
            message: err.to_string(),
            stack,
            name: error_name(&format!("{err:?}")),
        }
    }
}

/// Leading identifier of a `Debug` rendering: `Io { .. }` → `Io`.
fn error_name(debug: &str) -> String {
    let name: String = debug
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if name.is_empty() {
        "Error".to_string()
    } else {
        name
    }
}

// ---------------------------------------------------------------------------
// Command surface
// ---------------------------------------------------------------------------

/// Result of dispatching a command. Always produced, never an `Err`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Completion payload pushed on a notification channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusNotice {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Asynchronous event delivered to subscribed clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    /// Completion of a dispatched command on `<channel>-status` (or override).
    Status { channel: String, notice: StatusNotice },
    /// New log entries are available; clients should re-read.
    LogUpdate,
}

// ---------------------------------------------------------------------------
// Platform helpers
// ---------------------------------------------------------------------------

fn os_release() -> String {
    sysinfo::System::kernel_version().unwrap_or_default()
}
