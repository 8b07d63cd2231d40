//! Sitegate - per-IP admission control for a multi-tenant site builder
//!
//! Every request is classified by path, counted against a fixed-window quota
//! keyed by client address, and either admitted with quota and security headers
//! or rejected with `429 Too Many Requests`.

pub mod config;
pub mod edge;
pub mod error;
pub mod ratelimit;
