//! HTTP edge: client identification, admission middleware and security headers.

mod client;
mod exempt;
mod headers;
mod middleware;
mod server;

pub use client::client_key;
pub use exempt::ExemptPaths;
pub use headers::SecurityHeaders;
pub use middleware::{
    admission_middleware, apply_quota_headers, rejection_response, EdgeState, REJECTION_MESSAGE,
    X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET,
};
pub use server::{default_routes, EdgeServer};
