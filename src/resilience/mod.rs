//! Resilience patterns for eventually-consistent checks
//!
//! - [`retry`]: bounded retry with a fixed delay

pub mod retry;

pub use retry::{RetryConfig, RetryPolicy, DEFAULT_ATTEMPTS, DEFAULT_DELAY};
