//! Offline resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Orchestrator call with OfflinePolicy
//!     → dispatcher.rs (online? execute : decide)
//!         → cache.rs   (fresh value for cache_key)
//!         → fallback   (caller-provided producer)
//!         → queue.rs   (defer for replay)
//!
//! Connectivity restored
//!     → replay worker drains queue.rs in FIFO order
//! ```
//!
//! # Design Decisions
//! - The cache lives in memory only; it is never persisted
//! - A queued call settles immediately with `OfflineQueued`
//! - Replay results are logged, not delivered to the original caller

pub mod cache;
pub mod dispatcher;
pub mod queue;

pub use cache::ResponseCache;
pub use dispatcher::{OfflineDispatcher, OfflinePolicy};
pub use queue::{DeferredOp, ReplayQueue, ReplayReport};
