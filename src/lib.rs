//! Resilient API client library.
//!
//! Request resilience and session lifecycle for applications talking to a
//! remote HTTP API.
//!
//! # Architecture Overview
//!
//! ```text
//!   UI / caller
//!       │
//!       ▼
//!  ┌──────────────┐    ┌───────────────┐    ┌──────────────┐    ┌─────────────┐
//!  │ orchestrator │───▶│    offline    │───▶│  resilience  │───▶│  transport  │───▶ API
//!  │ call / query │    │  dispatcher   │    │ retry engine │    │   reqwest   │
//!  └──────┬───────┘    └───────┬───────┘    └──────────────┘    └──────┬──────┘
//!         │                    │                                       │ token / 401
//!         │ scope              │ online?                               ▼
//!         │             ┌──────┴───────┐                        ┌─────────────┐
//!         └────────────▶│ connectivity │                        │   session   │
//!                       └──────────────┘                        │   manager   │
//!                                                               └─────────────┘
//!  Cross-cutting: config, observability (tracing + metrics), lifecycle (scheduled tasks)
//! ```

// Core subsystems
pub mod client;
pub mod config;
pub mod transport;

// Resilience
pub mod connectivity;
pub mod offline;
pub mod resilience;

// Session and call surface
pub mod orchestrator;
pub mod session;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use client::{ApiClient, ApiClientBuilder, ClientError};
pub use config::ClientConfig;
pub use orchestrator::{Call, CallOptions, CallState, InfiniteQuery, Outcome, Query, QueryOptions};
pub use session::{SessionManager, SessionState};
pub use transport::{ApiError, ApiResult, Transport};
