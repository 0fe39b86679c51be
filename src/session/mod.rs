//! Session lifecycle subsystem.
//!
//! # Data Flow
//! ```text
//! startup          → manager.rs restore() → record.rs ← storage.rs
//! login / refresh  → api.rs (AuthApi) → manager.rs → storage.rs (whole-record replace)
//! Transport 401    → CredentialSource::credential_rejected → manager.rs end_session
//!                      → storage cleared, scope cancelled, navigator.rs redirect
//! ```
//!
//! # Design Decisions
//! - The manager is the only writer of the record and its storage
//! - Transport reads the token through `CredentialSource`, never holding the manager directly
//! - The auth endpoints go through an anonymous transport so their own 401s don't recurse

pub mod api;
pub mod manager;
pub mod navigator;
pub mod record;
pub mod storage;

pub use api::{AuthApi, AuthResponse, Credentials, HttpAuthApi};
pub use manager::{LogoutReason, SessionError, SessionEvent, SessionManager, SessionState};
pub use navigator::{Navigator, RouteTracker};
pub use record::{SessionRecord, UserIdentity, SESSION_KEYS};
pub use storage::{FileStorage, MemoryStorage, SessionStorage, StorageError};
