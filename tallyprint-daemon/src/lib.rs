//! tallyprint daemon: command registry, application context and the
//! socket runtime that exposes them to front-end clients.

pub mod context;
mod error;
pub mod handlers;
pub mod protocol;
pub mod registry;
pub mod retention;
mod runtime;
pub mod suppression;

pub use context::AppContext;
pub use error::DaemonError;
pub use protocol::{invoke, request_status, request_stop, send_request, subscribe, HostRequest};
pub use registry::{CommandRegistry, HandlerResult, RegisterOptions, NEVER_LOG_CHANNELS};
pub use runtime::{run, start_blocking};
