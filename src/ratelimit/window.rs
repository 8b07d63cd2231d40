//! Fixed counting windows and the clock values they are measured in.

use std::fmt;
use std::time::Duration;

/// A point in time, in milliseconds since the UNIX epoch.
///
/// Evaluation always receives `now` explicitly, so the limiter never reads the
/// clock on its own. Only the edge layer and the reaper call [`Timestamp::now`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a timestamp from milliseconds since the UNIX epoch.
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis().max(0) as u64)
    }

    /// Milliseconds since the UNIX epoch.
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Add a number of milliseconds, saturating at the maximum representable time.
    pub const fn saturating_add_millis(self, millis: u64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// Time elapsed from `earlier` to `self`, or zero if `earlier` is later.
    pub fn saturating_duration_since(self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }

    /// Render as an RFC 3339 UTC string with millisecond precision.
    pub fn to_rfc3339(self) -> String {
        let millis = i64::try_from(self.0).unwrap_or(i64::MAX);
        match chrono::DateTime::from_timestamp_millis(millis) {
            Some(dt) => dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            None => self.0.to_string(),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Which side of `reset_at` the exact expiry instant falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryBoundary {
    /// `now == reset_at` still belongs to the current window; only `now > reset_at` expires it.
    AfterResetAt,
    /// `now == reset_at` already starts a new window.
    AtResetAt,
}

/// The boundary used by every [`RateWindow`].
pub const EXPIRY_BOUNDARY: ExpiryBoundary = ExpiryBoundary::AfterResetAt;

/// One key's current counting window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateWindow {
    count: u64,
    window_start: Timestamp,
    reset_at: Timestamp,
    duration_ms: u64,
}

impl RateWindow {
    /// Open a fresh, empty window starting at `now`.
    pub fn open(now: Timestamp, duration_ms: u64) -> Self {
        Self {
            count: 0,
            window_start: now,
            reset_at: now.saturating_add_millis(duration_ms),
            duration_ms,
        }
    }

    /// Requests counted in this window.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// When this window was opened.
    pub fn window_start(&self) -> Timestamp {
        self.window_start
    }

    /// When this window ends.
    pub fn reset_at(&self) -> Timestamp {
        self.reset_at
    }

    /// Length this window was opened with.
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// Whether `now` lies past the end of this window.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        match EXPIRY_BOUNDARY {
            ExpiryBoundary::AfterResetAt => now > self.reset_at,
            ExpiryBoundary::AtResetAt => now >= self.reset_at,
        }
    }

    /// Whether the window ended more than one full window length before `now`.
    pub fn is_idle(&self, now: Timestamp) -> bool {
        now > self.reset_at.saturating_add_millis(self.duration_ms)
    }

    /// Time left until the window resets, zero once it has passed.
    pub fn duration_until_reset(&self, now: Timestamp) -> Duration {
        self.reset_at.saturating_duration_since(now)
    }

    pub(crate) fn increment(&mut self) -> u64 {
        self.count = self.count.saturating_add(1);
        self.count
    }
}
