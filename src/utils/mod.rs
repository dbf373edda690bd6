/// Backoff schedule and rate-limit wait computation
pub mod retry;

pub use retry::{rate_limit_wait, RetryPolicy, DEFAULT_RATE_LIMIT_WAITS};
