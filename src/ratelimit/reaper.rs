//! Background eviction of expired windows.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::store::WindowStore;
use super::window::Timestamp;

/// Default interval between purge cycles.
pub const DEFAULT_REAPER_INTERVAL: Duration = Duration::from_secs(3600);

type PurgeFn = Arc<dyn Fn(&WindowStore, Timestamp) -> usize + Send + Sync>;

/// Periodically removes idle windows from a [`WindowStore`].
///
/// Only windows that ended more than one full window length ago are removed,
/// leaving a margin for requests that still reference a just-expired window.
pub struct Reaper {
    store: Arc<WindowStore>,
    interval: Duration,
    purge: PurgeFn,
}

/// Handle to a running reaper task.
///
/// Dropping the handle without calling [`ReaperHandle::stop`] also ends the task.
pub struct ReaperHandle {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Reaper {
    /// Create a reaper for `store` that runs every `interval`.
    ///
    /// Intervals shorter than one second are raised to one second.
    pub fn new(store: Arc<WindowStore>, interval: Duration) -> Self {
        Self {
            store,
            interval: interval.max(Duration::from_secs(1)),
            purge: Arc::new(|store: &WindowStore, now| store.purge_idle(now)),
        }
    }

    #[cfg(test)]
    fn with_purge<F>(mut self, purge: F) -> Self
    where
        F: Fn(&WindowStore, Timestamp) -> usize + Send + Sync + 'static,
    {
        self.purge = Arc::new(purge);
        self
    }

    /// Run a single purge cycle at `now`, returning the number of windows removed.
    pub fn run_once(&self, now: Timestamp) -> usize {
        (self.purge)(&self.store, now)
    }

    /// Start the reaper on the current tokio runtime.
    ///
    /// The first purge happens one interval after spawning.
    pub fn spawn(self) -> ReaperHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        info!(interval_secs = self.interval.as_secs(), "Starting window reaper");

        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + self.interval;
            let mut ticker = tokio::time::interval_at(start, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => self.tick(),
                }
            }

            debug!("Window reaper stopped");
        });

        ReaperHandle { shutdown_tx, task }
    }

    fn tick(&self) {
        let now = Timestamp::now();
        self.guarded(|| self.run_once(now));
    }

    /// Run one purge cycle, containing any panic so the loop survives it.
    ///
    /// Returns `None` when the cycle panicked.
    fn guarded(&self, purge: impl FnOnce() -> usize) -> Option<usize> {
        match panic::catch_unwind(AssertUnwindSafe(purge)) {
            Ok(removed) => {
                info!(
                    removed,
                    remaining = self.store.len(),
                    "Purged expired rate limit windows"
                );
                Some(removed)
            }
            Err(_) => {
                error!("Purge cycle panicked, retrying on the next tick");
                None
            }
        }
    }
}

impl ReaperHandle {
    /// Stop the reaper and wait for the task to finish.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            error!(error = %e, "Window reaper task failed");
        }
    }

    /// Whether the reaper task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::WindowKey;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn at(millis: u64) -> Timestamp {
        Timestamp::from_millis(millis)
    }

    #[test]
    fn test_run_once_keeps_live_windows() {
        let store = Arc::new(WindowStore::new());
        store
            .get_or_create(WindowKey::new("a", "default"), at(0), 1_000)
            .increment();
        store
            .get_or_create(WindowKey::new("b", "default"), at(10_000), 1_000)
            .increment();

        let reaper = Reaper::new(store.clone(), DEFAULT_REAPER_INTERVAL);
        assert_eq!(reaper.run_once(at(10_500)), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.count(&WindowKey::new("b", "default")), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_reaper_purges_on_tick() {
        let store = Arc::new(WindowStore::new());
        // Opened at the epoch, so it is long idle by wall-clock time.
        store
            .get_or_create(WindowKey::new("stale", "default"), at(0), 1_000)
            .increment();

        let handle = Reaper::new(store.clone(), Duration::from_secs(60)).spawn();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(store.len(), 1);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(store.is_empty());

        handle.stop().await;
    }

    #[test]
    fn test_guarded_contains_panic() {
        let reaper = Reaper::new(Arc::new(WindowStore::new()), DEFAULT_REAPER_INTERVAL);

        assert_eq!(reaper.guarded(|| panic!("purge failed")), None);
        assert_eq!(reaper.guarded(|| 3), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_survives_panicking_cycle() {
        let store = Arc::new(WindowStore::new());
        store
            .get_or_create(WindowKey::new("stale", "default"), at(0), 1_000)
            .increment();

        let cycles = Arc::new(AtomicUsize::new(0));
        let seen = cycles.clone();
        let handle = Reaper::new(store.clone(), Duration::from_secs(60))
            .with_purge(move |store: &WindowStore, now| {
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first purge cycle fails");
                }
                store.purge_idle(now)
            })
            .spawn();

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(cycles.load(Ordering::SeqCst), 1);
        assert_eq!(store.len(), 1);
        assert!(!handle.is_finished());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(cycles.load(Ordering::SeqCst), 2);
        assert!(store.is_empty());

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_stop_terminates_task() {
        let store = Arc::new(WindowStore::new());
        let handle = Reaper::new(store, Duration::from_secs(3600)).spawn();
        assert!(!handle.is_finished());

        handle.stop().await;
    }
}
