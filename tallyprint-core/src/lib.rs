//! tallyprint core library — domain types, the application log store,
//! debounced notifications, configuration and filesystem layout.
//!
//! Public API surface:
//! - [`types`] — log entries, command responses, host events
//! - [`log_store`] — bounded in-memory + daily-file [`LogStore`]
//! - [`notify`] — cancel-and-reschedule [`Debouncer`]
//! - [`config`] — YAML [`Config`] loading
//! - [`paths`] — `~/.tallyprint/` layout helpers
//! - [`error`] — [`LogError`], [`ConfigError`]

pub mod config;
pub mod error;
pub mod log_store;
pub mod notify;
pub mod paths;
pub mod types;

pub use config::{Config, LocatorConfig, NotifyConfig};
pub use error::{ConfigError, LogError};
pub use log_store::{LogStore, LogStoreOptions, UpdateSignal};
pub use notify::{Debouncer, NotifyDelays};
pub use types::{
    CommandResponse, ErrorDetails, HostEvent, LogEntry, LogLevel, OsInfo, ProcessInfo,
    StatusNotice,
};
