//! The persisted identity record.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Storage key holding the bearer token.
pub const TOKEN_KEY: &str = "auth-token";
/// Storage key holding the serialized user identity.
pub const USER_KEY: &str = "auth-user";
/// Storage key holding the ISO-8601 issue instant.
pub const TIMESTAMP_KEY: &str = "auth-timestamp";

/// All session keys. Always written or cleared together.
pub const SESSION_KEYS: [&str; 3] = [TOKEN_KEY, USER_KEY, TIMESTAMP_KEY];

/// Identity of the signed-in user, kept as the server sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserIdentity(pub Value);

impl UserIdentity {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// String-valued field, e.g. `email` or `role`.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// The `id` field rendered as text, whether numeric or string.
    pub fn id(&self) -> Option<String> {
        match self.0.get("id")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Why a stored record could not be restored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("stored session is missing '{0}'")]
    Missing(&'static str),

    #[error("stored user is not valid JSON: {0}")]
    InvalidUser(String),

    #[error("stored timestamp is not ISO-8601: {0}")]
    InvalidTimestamp(String),
}

/// An authenticated session: token and user are always present together.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub token: String,
    pub user: UserIdentity,
    pub issued_at: DateTime<Utc>,
}

impl SessionRecord {
    /// A record issued now.
    pub fn new(token: impl Into<String>, user: UserIdentity) -> Self {
        Self {
            token: token.into(),
            user,
            issued_at: Utc::now(),
        }
    }

    /// True if the record is at least `max_age` old at `now`.
    pub fn is_expired_at(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.issued_at);
        match chrono::Duration::from_std(max_age) {
            Ok(max_age) => age >= max_age,
            Err(_) => false,
        }
    }

    pub fn is_expired(&self, max_age: Duration) -> bool {
        self.is_expired_at(max_age, Utc::now())
    }

    /// The three storage entries for this record.
    pub fn to_entries(&self) -> Result<[(&'static str, String); 3], serde_json::Error> {
        Ok([
            (TOKEN_KEY, self.token.clone()),
            (USER_KEY, serde_json::to_string(&self.user)?),
            (TIMESTAMP_KEY, self.issued_at.to_rfc3339()),
        ])
    }

    /// Rebuild a record from stored entries.
    ///
    /// `Ok(None)` when nothing is stored; an error when the entries are
    /// partial or malformed.
    pub fn from_entries(
        token: Option<String>,
        user: Option<String>,
        timestamp: Option<String>,
    ) -> Result<Option<Self>, RecordError> {
        if token.is_none() && user.is_none() && timestamp.is_none() {
            return Ok(None);
        }

        let token = token.filter(|t| !t.is_empty()).ok_or(RecordError::Missing(TOKEN_KEY))?;
        let user = user.ok_or(RecordError::Missing(USER_KEY))?;
        let timestamp = timestamp.ok_or(RecordError::Missing(TIMESTAMP_KEY))?;

        let user: UserIdentity = serde_json::from_str(&user).map_err(|e| RecordError::InvalidUser(e.to_string()))?;
        if user.0.is_null() {
            return Err(RecordError::Missing(USER_KEY));
        }

        let issued_at = DateTime::parse_from_rfc3339(&timestamp)
            .map_err(|e| RecordError::InvalidTimestamp(e.to_string()))?
            .with_timezone(&Utc);

        Ok(Some(Self { token, user, issued_at }))
    }
}
