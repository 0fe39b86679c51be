//! Remote authentication endpoints.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::session::record::UserIdentity;
use crate::transport::error::ApiResult;
use crate::transport::{RequestOptions, Transport};

/// Login credentials.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Token grant returned by login and refresh.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthResponse {
    #[serde(alias = "access_token", alias = "accessToken")]
    pub token: String,

    /// Refresh responses may omit the user.
    #[serde(default)]
    pub user: Option<UserIdentity>,
}

/// The authentication operations the session manager depends on.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> ApiResult<AuthResponse>;

    async fn refresh(&self, token: &str) -> ApiResult<AuthResponse>;

    async fn logout(&self, token: &str) -> ApiResult<()>;
}

/// `AuthApi` over HTTP.
///
/// Uses an anonymous transport and passes the token explicitly, so a 401 on
/// these endpoints is reported to the session manager as a plain error.
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    transport: Transport,
    login_endpoint: String,
    refresh_endpoint: String,
    logout_endpoint: String,
}

impl HttpAuthApi {
    pub fn new(transport: Transport, config: &SessionConfig) -> Self {
        Self {
            transport,
            login_endpoint: config.login_endpoint.clone(),
            refresh_endpoint: config.refresh_endpoint.clone(),
            logout_endpoint: config.logout_endpoint.clone(),
        }
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, credentials: &Credentials) -> ApiResult<AuthResponse> {
        self.transport
            .send_json(&self.login_endpoint, RequestOptions::post().json(credentials)?)
            .await
    }

    async fn refresh(&self, token: &str) -> ApiResult<AuthResponse> {
        self.transport
            .send_json(&self.refresh_endpoint, RequestOptions::post().bearer(token))
            .await
    }

    async fn logout(&self, token: &str) -> ApiResult<()> {
        self.transport
            .send(&self.logout_endpoint, RequestOptions::post().bearer(token))
            .await
            .map(|_| ())
    }
}
