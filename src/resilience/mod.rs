//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call from orchestrator or dispatcher:
//!     → retries.rs (attempt, classify, decide)
//!     → backoff.rs (delay for the next attempt)
//!     → outcome.rs (Success / Failure / Cancelled)
//! ```
//!
//! # Design Decisions
//! - Only network, timeout and 5xx failures are retried
//! - Auth failures are never retried
//! - Cancellation is a tagged outcome, not an error

pub mod backoff;
pub mod outcome;
pub mod retries;

pub use outcome::Outcome;
pub use retries::{with_retry, Retry, RetryAttempt, RetryObserver, RetryPolicy};
