//! Fixed-window admission control and state management.

mod controller;
mod decision;
mod key;
mod policy;
mod reaper;
mod store;
mod window;

pub use controller::AdmissionController;
pub use decision::AdmissionDecision;
pub use key::{WindowKey, UNKNOWN_CLIENT};
pub use policy::{
    DefaultPolicyConfig, PolicyTableConfig, RatePolicy, RoutePolicies, RouteRuleConfig,
    DEFAULT_POLICY,
};
pub use reaper::{Reaper, ReaperHandle, DEFAULT_REAPER_INTERVAL};
pub use store::{WindowGuard, WindowStore};
pub use window::{ExpiryBoundary, RateWindow, Timestamp, EXPIRY_BOUNDARY};
