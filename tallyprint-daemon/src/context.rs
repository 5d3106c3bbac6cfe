//! Process-wide application context, built once at daemon start-up.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use tallyprint_core::{Config, Debouncer, HostEvent, LogStore, NotifyDelays, UpdateSignal};
use tallyprint_print::DefaultPipeline;

use crate::error::DaemonError;
use crate::handlers;
use crate::registry::CommandRegistry;

const EVENT_BUFFER: usize = 256;

pub struct AppContext {
    pub config: Config,
    pub logs: Arc<LogStore>,
    pub registry: Arc<CommandRegistry>,
    pub pipeline: Arc<DefaultPipeline>,
    events: broadcast::Sender<HostEvent>,
    debouncer: Arc<Debouncer>,
    forwarder: JoinHandle<()>,
}

impl AppContext {
    /// Open the log store, wire update notifications and register every
    /// command handler. Must be called from within a tokio runtime.
    pub fn init(config: Config, home: &Path) -> Result<Self, DaemonError> {
        let logs = Arc::new(LogStore::open(
            config.log_dir_at(home),
            config.log_store_options(),
        )?);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (debouncer, forwarder) = spawn_log_notifier(&logs, events.clone(), config.notify_delays());

        let registry = Arc::new(CommandRegistry::new(logs.clone(), events.clone()));
        let pipeline = Arc::new(DefaultPipeline::from_config(&config, logs.clone())?);
        handlers::register_all_handlers(&registry, &logs, &pipeline);

        Ok(Self {
            config,
            logs,
            registry,
            pipeline,
            events,
            debouncer,
            forwarder,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }

    /// Drop every handler and stop update notifications.
    pub fn teardown(&self) {
        self.registry.unregister_all();
        self.forwarder.abort();
        self.debouncer.cancel();
    }
}

/// Forward log-store update signals through a [`Debouncer`] that emits
/// [`HostEvent::LogUpdate`].
pub fn spawn_log_notifier(
    logs: &LogStore,
    events: broadcast::Sender<HostEvent>,
    delays: NotifyDelays,
) -> (Arc<Debouncer>, JoinHandle<()>) {
    let debouncer = Arc::new(Debouncer::new(move || {
        let _ = events.send(HostEvent::LogUpdate);
    }));
    let mut signals = logs.subscribe();
    let task = {
        let debouncer = Arc::clone(&debouncer);
        tokio::spawn(async move {
            loop {
                match signals.recv().await {
                    Ok(signal) => debouncer.schedule(delays.for_signal(signal)),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "log update signals lagged");
                        debouncer.schedule(delays.for_signal(UpdateSignal::Normal));
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    };
    (debouncer, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tallyprint_core::LogStoreOptions;
    use tempfile::TempDir;
    use tokio::time::sleep;

    fn store(dir: &TempDir) -> Arc<LogStore> {
        Arc::new(LogStore::open(dir.path(), LogStoreOptions::default()).unwrap())
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn error_after_read_is_pushed_quickly() {
        let dir = TempDir::new().unwrap();
        let logs = store(&dir);
        let (events, mut rx) = broadcast::channel(16);
        let (_debouncer, task) = spawn_log_notifier(&logs, events, NotifyDelays::default());

        logs.recent_logs(10);
        logs.error("printer jammed", None);
        assert!(logs.update_pending());

        sleep(Duration::from_millis(101)).await;
        assert_eq!(rx.try_recv().unwrap(), HostEvent::LogUpdate);
        task.abort();
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn burst_of_writes_yields_one_update() {
        let dir = TempDir::new().unwrap();
        let logs = store(&dir);
        let (events, mut rx) = broadcast::channel(16);
        let (_debouncer, task) = spawn_log_notifier(&logs, events, NotifyDelays::default());

        for i in 0..5 {
            logs.info(format!("step {i}"), None);
        }
        sleep(Duration::from_millis(499)).await;
        assert!(rx.try_recv().is_err());
        sleep(Duration::from_millis(2)).await;

        assert_eq!(rx.try_recv().unwrap(), HostEvent::LogUpdate);
        assert!(rx.try_recv().is_err());
        task.abort();
    }

    #[tokio::test]
    async fn init_registers_handlers_and_teardown_clears_them() {
        let home = TempDir::new().unwrap();
        let config = Config {
            log_dir: Some(home.path().join("logs")),
            temp_dir: Some(home.path().join("tmp")),
            ..Config::default()
        };
        let ctx = AppContext::init(config, home.path()).unwrap();
        assert_eq!(ctx.registry.channels(), vec!["get-logs", "print-summary"]);

        ctx.teardown();
        assert!(ctx.registry.channels().is_empty());
    }
}
