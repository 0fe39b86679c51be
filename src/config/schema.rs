//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the resilient client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Remote API location and transport budget.
    pub api: ApiConfig,

    /// Default retry policy applied to calls.
    pub retries: RetryConfig,

    /// Offline cache and replay queue settings.
    pub offline: OfflineConfig,

    /// Session lifecycle settings.
    pub session: SessionConfig,

    /// User-visible notification settings.
    pub notifications: NotificationConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Remote API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the API server (e.g., "http://localhost:3000").
    pub base_url: String,

    /// Versioned path prefix prepended to every endpoint.
    pub api_prefix: String,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            api_prefix: "/api/v1".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,

    /// Base delay between attempts in milliseconds.
    pub delay_ms: u64,

    /// Double the delay after every failed attempt.
    pub backoff: bool,

    /// Upper bound for a single inter-attempt delay in milliseconds.
    pub max_delay_ms: u64,

    /// Add up to 10% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 1000,
            backoff: true,
            max_delay_ms: 30_000,
            jitter: false,
        }
    }
}

/// Offline dispatcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OfflineConfig {
    /// TTL for cache entries written without an explicit duration, in seconds.
    pub default_cache_secs: u64,

    /// Maximum number of deferred operations kept for replay.
    pub max_queue_len: usize,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            default_cache_secs: 300,
            max_queue_len: 100,
        }
    }
}

/// Session lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum age of a persisted session in seconds.
    pub max_age_secs: u64,

    /// Interval between scheduled token refreshes in seconds.
    pub refresh_interval_secs: u64,

    /// Route the user is sent to after a forced logout.
    pub login_route: String,

    /// File backing the persisted session. In-memory when unset.
    pub storage_path: Option<String>,

    /// Endpoint that exchanges credentials for a token.
    pub login_endpoint: String,

    /// Endpoint that exchanges a valid token for a fresh one.
    pub refresh_endpoint: String,

    /// Endpoint notified on logout (best effort).
    pub logout_endpoint: String,

    /// Treat 403 responses like 401 and end the session.
    pub forbidden_terminates_session: bool,
}

impl SessionConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_age_secs: 24 * 60 * 60,
            refresh_interval_secs: 30 * 60,
            login_route: "/login".to_string(),
            storage_path: None,
            login_endpoint: "/auth/login".to_string(),
            refresh_endpoint: "/auth/refresh".to_string(),
            logout_endpoint: "/auth/logout".to_string(),
            forbidden_terminates_session: false,
        }
    }
}

/// Notification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Identical messages within this window are shown once.
    pub dedupe_window_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            dedupe_window_ms: 3000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines instead of human-readable text.
    pub json_logs: bool,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.api.timeout(), Duration::from_secs(10));
        assert_eq!(config.retries.max_attempts, 3);
        assert_eq!(config.session.max_age(), Duration::from_secs(86_400));
        assert_eq!(config.session.refresh_interval(), Duration::from_secs(1800));
        assert!(!config.session.forbidden_terminates_session);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            [api]
            base_url = "https://api.example.com"

            [retries]
            max_attempts = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.api.base_url, "https://api.example.com");
        assert_eq!(config.api.api_prefix, "/api/v1");
        assert_eq!(config.retries.max_attempts, 5);
        assert_eq!(config.retries.delay_ms, 1000);
        assert_eq!(config.session.login_route, "/login");
    }
}
