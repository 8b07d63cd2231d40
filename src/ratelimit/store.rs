//! Authoritative in-memory mapping from window key to counting window.

use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use tracing::trace;

use super::key::WindowKey;
use super::window::{RateWindow, Timestamp};

/// Store of live counting windows.
///
/// The map is sharded, so windows for different keys are normally guarded by
/// different locks and never block one another. Read-modify-write on one key is
/// serialized through [`WindowGuard`].
#[derive(Debug, Default)]
pub struct WindowStore {
    windows: DashMap<WindowKey, RateWindow>,
}

/// Exclusive access to one key's live window.
///
/// Holds the shard lock for the key until dropped. Do not call back into the
/// store (including the purge operations) while a guard is alive on the same
/// thread.
pub struct WindowGuard<'a> {
    entry: RefMut<'a, WindowKey, RateWindow>,
}

impl WindowGuard<'_> {
    /// Count one request and return the post-increment count.
    pub fn increment(&mut self) -> u64 {
        self.entry.increment()
    }

    /// The window as currently stored.
    pub fn window(&self) -> &RateWindow {
        self.entry.value()
    }

    /// The key this window belongs to.
    pub fn key(&self) -> &WindowKey {
        self.entry.key()
    }
}

impl WindowStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with room for `capacity` windows before reallocating.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            windows: DashMap::with_capacity(capacity),
        }
    }

    /// Return the live window for `key`, opening a new one if it is absent or expired.
    ///
    /// The new window starts at `now` with a count of zero and lasts `window_ms`.
    pub fn get_or_create(&self, key: WindowKey, now: Timestamp, window_ms: u64) -> WindowGuard<'_> {
        let entry = match self.windows.entry(key) {
            Entry::Occupied(occupied) => {
                let mut entry = occupied.into_ref();
                if entry.is_expired(now) {
                    trace!(
                        key = %entry.key(),
                        previous_count = entry.count(),
                        "Window expired, opening a new one"
                    );
                    *entry = RateWindow::open(now, window_ms);
                }
                entry
            }
            Entry::Vacant(vacant) => {
                trace!(key = %vacant.key(), window_ms, "Opening first window for key");
                vacant.insert(RateWindow::open(now, window_ms))
            }
        };

        WindowGuard { entry }
    }

    /// Remove every window that has expired at `now`.
    ///
    /// Returns the number of windows removed.
    pub fn purge_expired(&self, now: Timestamp) -> usize {
        self.purge_where(|window| window.is_expired(now))
    }

    /// Remove windows that ended more than one full window length before `now`.
    ///
    /// Returns the number of windows removed.
    pub fn purge_idle(&self, now: Timestamp) -> usize {
        self.purge_where(|window| window.is_idle(now))
    }

    fn purge_where(&self, mut remove: impl FnMut(&RateWindow) -> bool) -> usize {
        let mut removed = 0;
        self.windows.retain(|_, window| {
            if remove(window) {
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    /// Current count for `key`, or `None` if no window is stored.
    pub fn count(&self, key: &WindowKey) -> Option<u64> {
        self.windows.get(key).map(|window| window.count())
    }

    /// Number of stored windows.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether the store holds no windows.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Remove all windows.
    pub fn clear(&self) {
        self.windows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(client: &str) -> WindowKey {
        WindowKey::new(client, "default")
    }

    fn at(millis: u64) -> Timestamp {
        Timestamp::from_millis(millis)
    }

    #[test]
    fn test_get_or_create_opens_empty_window() {
        let store = WindowStore::new();

        let guard = store.get_or_create(key("1.1.1.1"), at(100), 1_000);
        assert_eq!(guard.window().count(), 0);
        assert_eq!(guard.window().reset_at(), at(1_100));
        assert_eq!(guard.key(), &key("1.1.1.1"));
        drop(guard);

        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_increment_persists() {
        let store = WindowStore::new();

        assert_eq!(store.get_or_create(key("a"), at(0), 1_000).increment(), 1);
        assert_eq!(store.get_or_create(key("a"), at(10), 1_000).increment(), 2);
        assert_eq!(store.count(&key("a")), Some(2));
    }

    #[test]
    fn test_live_window_is_reused_through_reset_instant() {
        let store = WindowStore::new();
        store.get_or_create(key("a"), at(0), 1_000).increment();

        let guard = store.get_or_create(key("a"), at(1_000), 1_000);
        assert_eq!(guard.window().count(), 1);
        assert_eq!(guard.window().reset_at(), at(1_000));
    }

    #[test]
    fn test_expired_window_is_replaced() {
        let store = WindowStore::new();
        store.get_or_create(key("a"), at(0), 1_000).increment();

        let mut guard = store.get_or_create(key("a"), at(1_001), 1_000);
        assert_eq!(guard.window().count(), 0);
        assert_eq!(guard.window().reset_at(), at(2_001));
        assert_eq!(guard.increment(), 1);
    }

    #[test]
    fn test_purge_expired_only_removes_expired() {
        let store = WindowStore::new();
        store.get_or_create(key("old"), at(0), 1_000).increment();
        store.get_or_create(key("new"), at(5_000), 1_000).increment();

        assert_eq!(store.purge_expired(at(2_000)), 1);
        assert_eq!(store.count(&key("old")), None);
        assert_eq!(store.count(&key("new")), Some(1));
    }

    #[test]
    fn test_purge_idle_keeps_recently_expired() {
        let store = WindowStore::new();
        store.get_or_create(key("a"), at(0), 1_000).increment();

        assert_eq!(store.purge_idle(at(1_500)), 0);
        assert_eq!(store.len(), 1);

        assert_eq!(store.purge_idle(at(2_001)), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear() {
        let store = WindowStore::with_capacity(16);
        store.get_or_create(key("a"), at(0), 1_000).increment();
        store.get_or_create(key("b"), at(0), 1_000).increment();
        assert_eq!(store.len(), 2);

        store.clear();
        assert!(store.is_empty());
    }
}
