//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!     → cloned into each subsystem at construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::ApiConfig;
pub use schema::ClientConfig;
pub use schema::NotificationConfig;
pub use schema::ObservabilityConfig;
pub use schema::OfflineConfig;
pub use schema::RetryConfig;
pub use schema::SessionConfig;
pub use validation::{validate_config, ValidationError};
