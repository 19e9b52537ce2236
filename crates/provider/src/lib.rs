//! Plumbing shared by every external provider adapter: the error taxonomy,
//! the retry policy and the per-provider rate limiter.

pub mod error;
pub mod limiter;
pub mod retry;

pub use error::{ErrorClass, ProviderError, retry_after};
pub use limiter::{LimiterStats, ProviderLimiter};
pub use retry::{RetryError, RetryPolicy};
