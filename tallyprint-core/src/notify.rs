//! Cancel-and-reschedule debouncing for host notifications.
//!
//! A [`Debouncer`] owns at most one pending task. Scheduling while a task is
//! pending aborts it and starts a new one whose delay is the shorter of the
//! pending and requested delays, so a burst collapses into a single firing
//! and an urgent request is never slowed down by a normal one.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::log_store::UpdateSignal;

/// Delays applied per [`UpdateSignal`] kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyDelays {
    pub normal: Duration,
    pub urgent: Duration,
}

impl Default for NotifyDelays {
    fn default() -> Self {
        Self {
            normal: Duration::from_millis(500),
            urgent: Duration::from_millis(100),
        }
    }
}

impl NotifyDelays {
    pub fn for_signal(&self, signal: UpdateSignal) -> Duration {
        match signal {
            UpdateSignal::Normal => self.normal,
            UpdateSignal::Urgent => self.urgent,
        }
    }
}

type Action = Arc<dyn Fn() + Send + Sync>;

struct Pending {
    delay: Duration,
    task: JoinHandle<()>,
}

pub struct Debouncer {
    action: Action,
    pending: Mutex<Option<Pending>>,
}

impl Debouncer {
    pub fn new(action: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            action: Arc::new(action),
            pending: Mutex::new(None),
        }
    }

    /// Schedule the action after `delay`, replacing any pending run.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, delay: Duration) {
        let mut pending = self.lock();
        let delay = match pending.take() {
            Some(prev) if !prev.task.is_finished() => {
                prev.task.abort();
                prev.delay.min(delay)
            }
            _ => delay,
        };
        let action = Arc::clone(&self.action);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action();
        });
        *pending = Some(Pending { delay, task });
    }

    pub fn cancel(&self) {
        if let Some(prev) = self.lock().take() {
            prev.task.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.lock()
            .as_ref()
            .map_or(false, |pending| !pending.task.is_finished())
    }

    fn lock(&self) -> MutexGuard<'_, Option<Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
