//! Idle auto-lock timer
//!
//! A single tokio task sleeps until `last_activity + timeout`. Activity
//! signals move the deadline forward through a watch channel; when the
//! deadline passes with no newer activity the `on_idle` callback runs once and
//! the task ends.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::debug;

/// Default quiet period before an unlocked vault locks itself
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Cancellable idle countdown
///
/// Dropping the monitor aborts its task.
pub struct IdleMonitor {
    timeout: Duration,
    activity: watch::Sender<Instant>,
    task: Option<JoinHandle<()>>,
}

impl IdleMonitor {
    /// Spawn the countdown. `on_idle` runs at most once.
    pub fn start<F, Fut>(timeout: Duration, on_idle: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (activity, mut rx) = watch::channel(Instant::now());

        let task = tokio::spawn(async move {
            loop {
                let deadline = *rx.borrow_and_update() + timeout;
                tokio::select! {
                    _ = time::sleep_until(deadline) => {
                        if *rx.borrow() + timeout <= Instant::now() {
                            break;
                        }
                    }
                    changed = rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
            }
            debug!("Idle timeout of {:?} elapsed", timeout);
            on_idle().await;
        });

        Self {
            timeout,
            activity,
            task: Some(task),
        }
    }

    /// Reset the countdown
    pub fn record_activity(&self) {
        self.activity.send_replace(Instant::now());
    }

    /// When the countdown will fire if no further activity arrives
    pub fn deadline(&self) -> Instant {
        *self.activity.borrow() + self.timeout
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether the countdown task is still alive
    pub fn is_active(&self) -> bool {
        self.task.as_ref().map_or(false, |task| !task.is_finished())
    }

    /// Cancel the countdown
    pub fn stop(mut self) {
        self.abort();
    }

    /// Consume a monitor from inside its own `on_idle` callback, where the
    /// task is already finishing and must not abort itself.
    pub(crate) fn release(mut self) {
        self.task.take();
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for IdleMonitor {
    fn drop(&mut self) {
        self.abort();
    }
}
