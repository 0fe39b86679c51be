//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, attempts >= 1)
//! - Check the API base URL is usable
//! - Detect conflicting session timing
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;
use url::Url;

use crate::config::schema::ClientConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("api.base_url is empty")]
    EmptyBaseUrl,

    #[error("api.base_url '{0}' is not a valid URL")]
    InvalidBaseUrl(String),

    #[error("api.timeout_secs must be greater than zero")]
    ZeroTimeout,

    #[error("retries.max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("retries.max_delay_ms ({max}) is below retries.delay_ms ({base})")]
    DelayCapBelowBase { base: u64, max: u64 },

    #[error("session.max_age_secs must be greater than zero")]
    ZeroMaxAge,

    #[error("session.refresh_interval_secs ({interval}) must be shorter than session.max_age_secs ({max_age})")]
    RefreshNotBeforeExpiry { interval: u64, max_age: u64 },

    #[error("session.login_route '{0}' must start with '/'")]
    RelativeLoginRoute(String),
}

/// Validate a parsed configuration, collecting every problem.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.api.base_url.trim().is_empty() {
        errors.push(ValidationError::EmptyBaseUrl);
    } else if Url::parse(&config.api.base_url).is_err() {
        errors.push(ValidationError::InvalidBaseUrl(config.api.base_url.clone()));
    }

    if config.api.timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }

    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::ZeroAttempts);
    }

    if config.retries.max_delay_ms < config.retries.delay_ms {
        errors.push(ValidationError::DelayCapBelowBase {
            base: config.retries.delay_ms,
            max: config.retries.max_delay_ms,
        });
    }

    let session = &config.session;
    if session.max_age_secs == 0 {
        errors.push(ValidationError::ZeroMaxAge);
    } else if session.refresh_interval_secs == 0 || session.refresh_interval_secs >= session.max_age_secs {
        errors.push(ValidationError::RefreshNotBeforeExpiry {
            interval: session.refresh_interval_secs,
            max_age: session.max_age_secs,
        });
    }

    if !session.login_route.starts_with('/') {
        errors.push(ValidationError::RelativeLoginRoute(session.login_route.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ClientConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ClientConfig::default();
        config.api.base_url = "not a url".to_string();
        config.retries.max_attempts = 0;
        config.session.login_route = "login".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::ZeroAttempts));
        assert!(errors.contains(&ValidationError::RelativeLoginRoute("login".into())));
    }

    #[test]
    fn test_refresh_must_precede_expiry() {
        let mut config = ClientConfig::default();
        config.session.refresh_interval_secs = config.session.max_age_secs;

        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(errors[0], ValidationError::RefreshNotBeforeExpiry { .. }));
    }
}
