//! Call orchestration: the surface UI code binds to.
//!
//! # Data Flow
//! ```text
//! execute(params)
//!     → call.rs   (supersede previous, child token of the session scope)
//!     → OfflineDispatcher (when an offline policy is set)
//!     → Retry     (is_retrying published through the observer)
//!     → Transport
//!     → state.rs  (CallState published, callbacks, notify.rs)
//!
//! query.rs    = Call + enabled / interval / focus triggers
//! infinite.rs = Call + page cursor and accumulated items
//! ```
//!
//! # Design Decisions
//! - Only the most recently issued call of an instance may publish state
//! - Cancellation yields `Outcome::Cancelled`, never an error
//! - State is exposed through `tokio::sync::watch` for any renderer to follow

pub mod call;
pub mod infinite;
pub mod notify;
pub mod query;
pub mod state;

pub use crate::resilience::Outcome;
pub use call::{Call, CallContext, CallOptions, Operation, Payload};
pub use infinite::{InfiniteQuery, InfiniteState, Page};
pub use notify::{DedupNotifier, Notification, NotificationKind, Notifier, TracingNotifier};
pub use query::{Query, QueryOptions};
pub use state::CallState;
