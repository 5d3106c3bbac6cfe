//! Command dispatch registry.
//!
//! Channels map to async handlers. [`CommandRegistry::dispatch`] never
//! fails: handler errors and panics come back as a failed
//! [`CommandResponse`], and every completion is pushed to subscribers as a
//! [`HostEvent::Status`] unless the registration opted out.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::time::Instant;

use tallyprint_core::{CommandResponse, ErrorDetails, HostEvent, LogStore, StatusNotice};

use crate::suppression::RequestLogCache;

/// Channels never written to the log store, to avoid read/notify feedback loops.
pub const NEVER_LOG_CHANNELS: &[&str] = &["get-logs"];

pub type HandlerResult = anyhow::Result<Value>;

type BoxedFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;
type Handler = Arc<dyn Fn(Value) -> BoxedFuture + Send + Sync>;

#[derive(Debug, Clone)]
pub struct RegisterOptions {
    /// Log each request (subject to suppression).
    pub log_requests: bool,
    /// Push a status notice after each dispatch.
    pub notify: bool,
    /// Defaults to `<channel>-status`.
    pub notification_channel: Option<String>,
}

impl Default for RegisterOptions {
    fn default() -> Self {
        Self {
            log_requests: true,
            notify: true,
            notification_channel: None,
        }
    }
}

impl RegisterOptions {
    pub fn quiet() -> Self {
        Self {
            log_requests: false,
            ..Self::default()
        }
    }
}

struct Registration {
    handler: Handler,
    log_requests: bool,
    exempt: bool,
    notification_channel: Option<String>,
}

pub struct CommandRegistry {
    handlers: Mutex<HashMap<String, Arc<Registration>>>,
    request_log: Mutex<RequestLogCache>,
    logs: Arc<LogStore>,
    events: broadcast::Sender<HostEvent>,
}

impl CommandRegistry {
    pub fn new(logs: Arc<LogStore>, events: broadcast::Sender<HostEvent>) -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
            request_log: Mutex::new(RequestLogCache::default()),
            logs,
            events,
        }
    }

    /// Register `handler` on `channel`. Returns `false` without touching the
    /// existing registration if the channel is already taken.
    pub fn register<F, Fut>(&self, channel: &str, handler: F, options: RegisterOptions) -> bool
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let exempt = is_exempt(channel);
        {
            let mut handlers = self.handlers();
            if handlers.contains_key(channel) {
                drop(handlers);
                self.logs.info(
                    format!("Command handler for '{channel}' already registered, skipping"),
                    None,
                );
                return false;
            }

            let handler: Handler = Arc::new(move |args| Box::pin(handler(args)) as BoxedFuture);
            let notification_channel = options
                .notify
                .then(|| {
                    options
                        .notification_channel
                        .unwrap_or_else(|| format!("{channel}-status"))
                });
            handlers.insert(
                channel.to_string(),
                Arc::new(Registration {
                    handler,
                    log_requests: options.log_requests && !exempt,
                    exempt,
                    notification_channel,
                }),
            );
        }

        if !exempt {
            self.logs.info(
                format!("Registered command handler for channel: {channel}"),
                None,
            );
        }
        true
    }

    /// Remove `channel`. Unknown channels are ignored.
    pub fn unregister(&self, channel: &str) {
        if self.handlers().remove(channel).is_some() {
            tracing::debug!(channel, "command handler unregistered");
        }
    }

    pub fn unregister_all(&self) {
        let removed = {
            let mut handlers = self.handlers();
            let count = handlers.len();
            handlers.clear();
            count
        };
        tracing::debug!(removed, "all command handlers unregistered");
    }

    /// Active channels, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.handlers().keys().cloned().collect();
        channels.sort();
        channels
    }

    pub fn is_registered(&self, channel: &str) -> bool {
        self.handlers().contains_key(channel)
    }

    /// Run the handler for `channel`. Always resolves to a response.
    pub async fn dispatch(&self, channel: &str, args: Value) -> CommandResponse {
        let registration = self.handlers().get(channel).cloned();
        let Some(registration) = registration else {
            if !is_exempt(channel) {
                self.logs.warn(
                    format!("No command handler for channel: {channel}"),
                    None,
                );
            }
            return CommandResponse::failure(format!("no handler registered for channel '{channel}'"));
        };

        if registration.log_requests {
            let key = RequestLogCache::key(channel, &args);
            let log_it = self
                .request_log
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .should_log(&key, Instant::now());
            if log_it {
                self.logs.info(
                    format!("Handling command request: {channel}"),
                    Some(json!({ "args": args })),
                );
            }
        }

        // Run on its own task so a panicking handler cannot take the caller down.
        let outcome = match tokio::spawn((registration.handler)(args)).await {
            Ok(result) => result,
            Err(join_err) if join_err.is_panic() => Err(anyhow::anyhow!(
                "command handler panicked: {}",
                panic_message(join_err.into_panic())
            )),
            Err(join_err) => Err(anyhow::anyhow!("command handler cancelled: {join_err}")),
        };

        match outcome {
            Ok(data) => {
                self.notify(
                    &registration,
                    StatusNotice {
                        success: true,
                        message: format!("Operation {channel} completed successfully"),
                        data: Some(data.clone()),
                    },
                );
                CommandResponse::ok(data)
            }
            Err(err) => {
                let message = err.to_string();
                if !registration.exempt {
                    let details = ErrorDetails::from_error(err.as_ref());
                    self.logs.error(
                        format!("Error handling command request: {channel}"),
                        Some(json!({ "error": message, "stack": details.stack })),
                    );
                }
                self.notify(
                    &registration,
                    StatusNotice {
                        success: false,
                        message: message.clone(),
                        data: None,
                    },
                );
                CommandResponse::failure(message)
            }
        }
    }

    fn notify(&self, registration: &Registration, notice: StatusNotice) {
        if let Some(channel) = &registration.notification_channel {
            // No subscribers is fine.
            let _ = self.events.send(HostEvent::Status {
                channel: channel.clone(),
                notice,
            });
        }
    }

    fn handlers(&self) -> MutexGuard<'_, HashMap<String, Arc<Registration>>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn is_exempt(channel: &str) -> bool {
    NEVER_LOG_CHANNELS.contains(&channel)
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_string(),
            Err(_) => "non-string panic payload".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_are_rendered() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(7_u8)), "non-string panic payload");
    }

    #[test]
    fn get_logs_is_exempt() {
        assert!(is_exempt("get-logs"));
        assert!(!is_exempt("print-summary"));
    }
}
