//! Worker module - the supervised message-consuming loop.
//!
//! This module provides:
//! - WorkerController, which owns one poll/dispatch/check loop
//! - RateLimiter, an optional per-receiver throttle
//! - RunReport and WorkerMetadata, what a worker reports about itself

mod controller;
mod rate_limit;
mod report;

pub use controller::{ResetHook, WorkerController, WorkerSetup};
pub use rate_limit::RateLimiter;
pub use report::{RunReport, WorkerMetadata, startup_banner};
