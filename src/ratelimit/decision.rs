//! The allow/deny verdict returned for one evaluated request.

use super::window::Timestamp;

/// Outcome of admitting one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Requests left in the current window, never negative
    pub remaining: u64,
    /// When the current window ends
    pub reset_at: Timestamp,
    /// Seconds the client should wait before retrying; zero when allowed
    pub retry_after_secs: u64,
    /// Ceiling of the policy that was applied
    pub limit: u64,
    /// Name of the policy that was applied
    pub policy: String,
}

impl AdmissionDecision {
    pub(crate) fn allow(policy: &str, limit: u64, count: u64, reset_at: Timestamp) -> Self {
        Self {
            allowed: true,
            remaining: limit.saturating_sub(count),
            reset_at,
            retry_after_secs: 0,
            limit,
            policy: policy.to_string(),
        }
    }

    pub(crate) fn deny(policy: &str, limit: u64, reset_at: Timestamp, now: Timestamp) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reset_at,
            retry_after_secs: retry_after_secs(reset_at, now),
            limit,
            policy: policy.to_string(),
        }
    }
}

/// `ceil((reset_at - now) / 1000)`, never less than one second.
fn retry_after_secs(reset_at: Timestamp, now: Timestamp) -> u64 {
    let millis = reset_at.as_millis().saturating_sub(now.as_millis());
    millis.div_ceil(1_000).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(millis: u64) -> Timestamp {
        Timestamp::from_millis(millis)
    }

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(retry_after_secs(at(60_000), at(500)), 60);
        assert_eq!(retry_after_secs(at(60_000), at(0)), 60);
        assert_eq!(retry_after_secs(at(60_000), at(59_999)), 1);
        assert_eq!(retry_after_secs(at(1_000), at(1)), 1);
    }

    #[test]
    fn test_retry_after_never_zero() {
        assert_eq!(retry_after_secs(at(1_000), at(1_000)), 1);
        assert_eq!(retry_after_secs(at(1_000), at(5_000)), 1);
    }

    #[test]
    fn test_allow_computes_remaining() {
        let decision = AdmissionDecision::allow("default", 10, 3, at(1_000));
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 7);
        assert_eq!(decision.retry_after_secs, 0);
        assert_eq!(decision.policy, "default");
    }

    #[test]
    fn test_deny_has_no_remaining() {
        let decision = AdmissionDecision::deny("auth", 5, at(60_000), at(500));
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.retry_after_secs, 60);
        assert_eq!(decision.limit, 5);
    }
}
