//! Debounced autosave
//!
//! Rapid edits are coalesced: each [`Autosave::schedule`] replaces the pending
//! payload and restarts the quiet window, so only the last edit is encrypted
//! and written. Cancelling drops the pending payload without writing it.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;

/// Default quiet window before a pending save is written
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Holds at most one pending payload and the timer that will flush it
pub struct Autosave<P> {
    window: Duration,
    pending: Option<P>,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl<P> Autosave<P> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
            generation: 0,
            task: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Replace the pending payload and restart the window
    ///
    /// When the window elapses `on_due(generation)` runs; it should claim the
    /// payload with [`take_due`](Self::take_due), which yields nothing if the
    /// schedule was superseded or cancelled in the meantime.
    pub fn schedule<F, Fut>(&mut self, items: P, on_due: F)
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.abort_timer();
        self.generation += 1;
        self.pending = Some(items);

        let generation = self.generation;
        let window = self.window;
        self.task = Some(tokio::spawn(async move {
            time::sleep(window).await;
            on_due(generation).await;
        }));
    }

    /// Claim the payload from the timer callback of `generation`
    pub fn take_due(&mut self, generation: u64) -> Option<P> {
        if generation != self.generation {
            return None;
        }
        // The timer task is the caller; detach instead of aborting it.
        self.task = None;
        self.pending.take()
    }

    /// Claim the payload early and stop the timer
    pub fn take(&mut self) -> Option<P> {
        self.abort_timer();
        self.pending.take()
    }

    /// Put back a payload whose write failed, unless a newer edit arrived
    pub fn restore(&mut self, items: P) {
        if self.pending.is_none() {
            self.pending = Some(items);
        }
    }

    /// Drop the pending payload without writing it. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        self.abort_timer();
        self.pending.take().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn abort_timer(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl<P> Drop for Autosave<P> {
    fn drop(&mut self) {
        self.abort_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    type Shared = Arc<Mutex<(Autosave<u32>, Vec<u32>)>>;

    async fn schedule(shared: &Shared, value: u32) {
        let weak = Arc::downgrade(shared);
        shared.lock().await.0.schedule(value, move |generation| async move {
            if let Some(shared) = weak.upgrade() {
                let mut guard = shared.lock().await;
                if let Some(items) = guard.0.take_due(generation) {
                    guard.1.push(items);
                }
            }
        });
    }

    fn shared() -> Shared {
        Arc::new(Mutex::new((Autosave::new(DEFAULT_DEBOUNCE), Vec::new())))
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_edits_coalesce() {
        let shared = shared();
        for value in 1..=5 {
            schedule(&shared, value).await;
            time::sleep(Duration::from_millis(100)).await;
        }
        assert!(shared.lock().await.1.is_empty());

        time::sleep(Duration::from_millis(500)).await;
        let guard = shared.lock().await;
        assert_eq!(guard.1, vec![5]);
        assert!(!guard.0.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending() {
        let shared = shared();
        schedule(&shared, 7).await;
        assert!(shared.lock().await.0.cancel());

        time::sleep(Duration::from_secs(2)).await;
        assert!(shared.lock().await.1.is_empty());
        assert!(!shared.lock().await.0.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_flushes_early() {
        let shared = shared();
        schedule(&shared, 9).await;
        assert_eq!(shared.lock().await.0.take(), Some(9));

        time::sleep(Duration::from_secs(2)).await;
        assert!(shared.lock().await.1.is_empty());
    }

    #[test]
    fn test_restore_keeps_newer_edit() {
        let mut autosave = Autosave::new(DEFAULT_DEBOUNCE);
        autosave.restore(1);
        assert!(autosave.is_pending());
        autosave.restore(2);
        assert_eq!(autosave.take(), Some(1));
    }

    #[test]
    fn test_stale_generation_yields_nothing() {
        let mut autosave: Autosave<u32> = Autosave::new(DEFAULT_DEBOUNCE);
        autosave.restore(3);
        assert_eq!(autosave.take_due(42), None);
        assert!(autosave.is_pending());
    }
}
