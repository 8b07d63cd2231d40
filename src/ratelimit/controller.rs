//! Core admission controller.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, trace};

use super::decision::AdmissionDecision;
use super::key::WindowKey;
use super::policy::RoutePolicies;
use super::store::WindowStore;
use super::window::Timestamp;

/// Decides whether each request is admitted under its route's policy.
///
/// This struct is thread-safe and can be shared across multiple tasks. The
/// store is injected so that the reaper and the controller operate on the same
/// instance.
pub struct AdmissionController {
    /// Counting windows indexed by client and policy
    store: Arc<WindowStore>,
    /// Current route table; swapped wholesale on reload
    policies: RwLock<Arc<RoutePolicies>>,
}

impl AdmissionController {
    /// Create a controller over an existing store.
    pub fn new(store: Arc<WindowStore>, policies: RoutePolicies) -> Self {
        Self {
            store,
            policies: RwLock::new(Arc::new(policies)),
        }
    }

    /// Evaluate one request from `client_key` for `path` at `now`.
    ///
    /// Counts the request against the window for the client and the policy the
    /// path resolves to. The `max_requests`-th request in a window is admitted;
    /// every later request in the same window is denied.
    pub fn evaluate(&self, client_key: &str, path: &str, now: Timestamp) -> AdmissionDecision {
        let policies = self.policies();
        let policy = policies.resolve(path);
        let key = WindowKey::new(client_key, policy.name());

        trace!(key = %key, path = %path, now = %now, "Evaluating request");

        let (count, reset_at) = {
            let mut window = self.store.get_or_create(key, now, policy.window_ms());
            let count = window.increment();
            (count, window.window().reset_at())
        };

        if count > policy.max_requests() {
            debug!(
                client = %client_key,
                policy = %policy.name(),
                count,
                limit = policy.max_requests(),
                "Rate limit exceeded"
            );
            AdmissionDecision::deny(policy.name(), policy.max_requests(), reset_at, now)
        } else {
            AdmissionDecision::allow(policy.name(), policy.max_requests(), count, reset_at)
        }
    }

    /// Snapshot of the current route table.
    pub fn policies(&self) -> Arc<RoutePolicies> {
        self.policies.read().clone()
    }

    /// Replace the route table.
    ///
    /// Existing windows keep the length they were opened with until they expire.
    pub fn replace_policies(&self, policies: RoutePolicies) {
        info!(policies = policies.len(), "Replacing policy table");
        *self.policies.write() = Arc::new(policies);
    }

    /// The underlying window store.
    pub fn store(&self) -> &Arc<WindowStore> {
        &self.store
    }
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new(Arc::new(WindowStore::new()), RoutePolicies::default())
    }
}
