//! Transport subsystem.
//!
//! # Data Flow
//! ```text
//! Call from retry engine:
//!     → request.rs (verb, body, headers, timeout override)
//!     → client.rs (URL + headers + bearer, timeout, send, decode)
//!     → error.rs (classify outcome)
//!     → 401: CredentialSource::credential_rejected → ApiError::Auth
//! ```
//!
//! # Design Decisions
//! - One call per `send`; retries live in `resilience`
//! - Every outcome is classified into a fixed error taxonomy
//! - The session is reached through a trait, never owned

pub mod client;
pub mod error;
pub mod request;

pub use client::{CredentialSource, Transport};
pub use error::{ApiError, ApiResult, ErrorCategory};
pub use request::{Method, RequestOptions};
