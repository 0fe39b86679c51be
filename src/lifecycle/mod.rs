//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Session authenticated → ScheduledTask::every (token refresh)
//! Query enabled         → ScheduledTask::every (interval refetch)
//! Client built          → ScheduledTask::spawn (offline replay worker)
//!
//! Logout / teardown / drop → cancel handle → task exits
//! ```
//!
//! # Design Decisions
//! - Every timer is owned by exactly one component
//! - Cancellation is explicit and also happens on drop

pub mod scheduler;

pub use scheduler::ScheduledTask;
