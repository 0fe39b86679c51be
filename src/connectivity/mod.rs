//! Connectivity subsystem.
//!
//! # Data Flow
//! ```text
//! Runtime connectivity signal
//!     → monitor.rs (set_online, deduplicated)
//!     → subscribers (offline replay worker)
//!     → is_online() queries (offline dispatcher)
//! ```

pub mod monitor;

pub use monitor::ConnectivityMonitor;
