//! HTTP transport with timeout and outcome classification.
//!
//! # Responsibilities
//! - Build the request URL from base URL, versioned prefix and endpoint
//! - Attach JSON headers, a request ID and the current bearer token
//! - Enforce the per-call timeout
//! - Parse the body, tolerating mislabelled content types
//! - Classify every outcome into a value or an `ApiError`
//! - Report rejected credentials to the session owner
//!
//! # Design Decisions
//! - Never retries; that is the retry engine's job
//! - A 204 (or empty body) is `Value::Null`, not an error
//! - Dropping the returned future cancels the in-flight request

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use url::Url;
use uuid::Uuid;

use crate::config::ApiConfig;
use crate::observability::metrics;
use crate::transport::error::{ApiError, ApiResult};
use crate::transport::request::RequestOptions;

/// Source of the bearer credential, notified when the server rejects it.
pub trait CredentialSource: Send + Sync {
    /// Current token, if a session is active.
    fn bearer_token(&self) -> Option<String>;

    /// Called when the server rejected the credential (401, or 403 when configured).
    fn credential_rejected(&self, status: u16);
}

/// HTTP transport for the remote API.
#[derive(Clone)]
pub struct Transport {
    client: Client,
    base_url: String,
    timeout: Duration,
    credentials: Option<Arc<dyn CredentialSource>>,
    forbidden_is_auth: bool,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("has_credentials", &self.credentials.is_some())
            .finish()
    }
}

impl Transport {
    /// Create an anonymous transport for the configured API.
    pub fn new(config: &ApiConfig) -> ApiResult<Self> {
        let base = config.base_url.trim_end_matches('/');
        Url::parse(base).map_err(|e| ApiError::InvalidRequest(format!("invalid base URL '{}': {}", base, e)))?;

        let prefix = config.api_prefix.trim_matches('/');
        let base_url = if prefix.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base, prefix)
        };

        let client = Client::builder()
            .build()
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            timeout: config.timeout(),
            credentials: None,
            forbidden_is_auth: false,
        })
    }

    /// Attach the session credential to every call made by this transport.
    pub fn with_credentials(mut self, source: Arc<dyn CredentialSource>) -> Self {
        self.credentials = Some(source);
        self
    }

    /// Treat 403 as a rejected credential.
    pub fn forbidden_terminates_session(mut self, enabled: bool) -> Self {
        self.forbidden_is_auth = enabled;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve an endpoint against the base URL and prefix.
    pub fn endpoint_url(&self, endpoint: &str) -> ApiResult<Url> {
        let raw = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
        };
        Url::parse(&raw).map_err(|e| ApiError::InvalidRequest(format!("invalid endpoint '{}': {}", endpoint, e)))
    }

    /// Issue one call and return the parsed body.
    pub async fn send(&self, endpoint: &str, options: RequestOptions) -> ApiResult<Value> {
        let timeout = options.timeout.unwrap_or(self.timeout);
        let method = options.method.clone();
        let url = self.endpoint_url(endpoint)?;
        let request_id = Uuid::new_v4();
        let start = Instant::now();

        tracing::debug!(
            request_id = %request_id,
            method = %method,
            url = %url,
            "Sending request"
        );

        let result = match tokio::time::timeout(timeout, self.dispatch(url, options, request_id)).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout(timeout)),
        };

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.status().unwrap_or(0),
        };
        metrics::record_request(method.as_str(), status, start);

        match &result {
            Err(ApiError::Auth(message)) => {
                tracing::warn!(request_id = %request_id, endpoint = %endpoint, message = %message, "Credential rejected");
            }
            Err(e) => {
                tracing::debug!(request_id = %request_id, endpoint = %endpoint, error = %e, "Request failed");
            }
            Ok(_) => {}
        }

        result
    }

    /// Issue one call and decode the body into `T`.
    pub async fn send_json<T: DeserializeOwned>(&self, endpoint: &str, options: RequestOptions) -> ApiResult<T> {
        let value = self.send(endpoint, options).await?;
        serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> ApiResult<T> {
        self.send_json(endpoint, RequestOptions::get()).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> ApiResult<T> {
        self.send_json(endpoint, RequestOptions::post().json(body)?).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> ApiResult<T> {
        self.send_json(endpoint, RequestOptions::put().json(body)?).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> ApiResult<T> {
        self.send_json(endpoint, RequestOptions::patch().json(body)?).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> ApiResult<T> {
        self.send_json(endpoint, RequestOptions::delete()).await
    }

    async fn dispatch(&self, url: Url, options: RequestOptions, request_id: Uuid) -> ApiResult<Value> {
        let headers = self.headers(&options, request_id)?;

        let mut builder = self.client.request(options.method, url).headers(headers);
        if !options.query.is_empty() {
            builder = builder.query(&options.query);
        }
        if let Some(body) = &options.body {
            builder = builder.body(body.to_string());
        }

        let response = builder.send().await.map_err(classify_reqwest_error)?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        let text = response.text().await.map_err(classify_reqwest_error)?;

        if status.is_success() {
            return decode_body(content_type.as_deref(), &text);
        }

        let message = error_message(status, &text);
        let rejected = status == StatusCode::UNAUTHORIZED || (self.forbidden_is_auth && status == StatusCode::FORBIDDEN);
        if rejected {
            if let Some(credentials) = &self.credentials {
                credentials.credential_rejected(status.as_u16());
            }
            return Err(ApiError::Auth(message));
        }

        Err(ApiError::Http {
            status: status.as_u16(),
            message,
        })
    }

    fn headers(&self, options: &RequestOptions, request_id: Uuid) -> ApiResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static("x-request-id"),
            HeaderValue::from_str(&request_id.to_string()).map_err(|e| ApiError::InvalidRequest(e.to_string()))?,
        );

        let token = options
            .bearer
            .clone()
            .or_else(|| self.credentials.as_ref().and_then(|c| c.bearer_token()));
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ApiError::InvalidRequest(format!("invalid bearer token: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }

        for (name, value) in &options.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
            let value = HeaderValue::from_str(value).map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
            headers.insert(name, value);
        }

        Ok(headers)
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_builder() {
        ApiError::InvalidRequest(err.to_string())
    } else {
        ApiError::Network(err.to_string())
    }
}

/// Decode a success body.
///
/// JSON content types are parsed directly. Anything else is still tried as
/// JSON, since some servers mislabel their responses.
pub(crate) fn decode_body(content_type: Option<&str>, text: &str) -> ApiResult<Value> {
    let trimmed = text.trim_start_matches('\u{feff}').trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }

    let declared_json = content_type
        .map(|ct| ct.to_ascii_lowercase().contains("json"))
        .unwrap_or(false);

    match serde_json::from_str::<Value>(text) {
        Ok(value) => Ok(value),
        Err(first) => match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => Ok(value),
            Err(_) if declared_json => Err(ApiError::Decode(first.to_string())),
            Err(_) => Err(ApiError::Decode(format!(
                "unexpected content type '{}'",
                content_type.unwrap_or("none")
            ))),
        },
    }
}

/// Pull a human-readable message out of an error body.
pub(crate) fn error_message(status: StatusCode, text: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
        for key in ["message", "error", "detail"] {
            if let Some(Value::String(message)) = map.get(key) {
                return message.clone();
            }
        }
    }

    let text = text.trim();
    if !text.is_empty() && text.len() <= 512 {
        return text.to_string();
    }

    status.canonical_reason().unwrap_or("request failed").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU16, Ordering};

    #[test]
    fn test_endpoint_url_joins_prefix() {
        let transport = Transport::new(&ApiConfig {
            base_url: "http://localhost:3000/".into(),
            api_prefix: "/api/v1/".into(),
            timeout_secs: 10,
        })
        .unwrap();

        let url = transport.endpoint_url("/classes?page=2").unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/v1/classes?page=2");

        let url = transport.endpoint_url("bookings/7").unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/v1/bookings/7");

        let url = transport.endpoint_url("https://other.example.com/x").unwrap();
        assert_eq!(url.as_str(), "https://other.example.com/x");
    }

    #[test]
    fn test_invalid_base_url() {
        let err = Transport::new(&ApiConfig {
            base_url: "::nope".into(),
            ..ApiConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));
    }

    #[test]
    fn test_decode_body() {
        assert_eq!(decode_body(Some("application/json"), "").unwrap(), Value::Null);
        assert_eq!(decode_body(Some("application/json"), "{\"a\":1}").unwrap()["a"], 1);
        // Mislabelled as text but still JSON.
        assert_eq!(decode_body(Some("text/plain"), " [1,2] ").unwrap()[1], 2);
        assert_eq!(decode_body(None, "\u{feff}{\"ok\":true}").unwrap()["ok"], true);

        assert!(matches!(decode_body(Some("application/json"), "{oops"), Err(ApiError::Decode(_))));
        assert!(matches!(decode_body(Some("text/html"), "<html>"), Err(ApiError::Decode(_))));
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(StatusCode::BAD_REQUEST, r#"{"message":"bad email"}"#), "bad email");
        assert_eq!(error_message(StatusCode::BAD_REQUEST, r#"{"detail":"nope"}"#), "nope");
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, "upstream died"), "upstream died");
        assert_eq!(error_message(StatusCode::NOT_FOUND, ""), "Not Found");
    }

    struct FixedToken(AtomicU16);

    impl CredentialSource for FixedToken {
        fn bearer_token(&self) -> Option<String> {
            Some("abc123".into())
        }

        fn credential_rejected(&self, status: u16) {
            self.0.store(status, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_headers_attach_bearer() {
        let transport = Transport::new(&ApiConfig::default())
            .unwrap()
            .with_credentials(Arc::new(FixedToken(AtomicU16::new(0))));

        let headers = transport.headers(&RequestOptions::get(), Uuid::new_v4()).unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer abc123");
        assert_eq!(headers.get(ACCEPT).unwrap(), "application/json");
        assert!(headers.contains_key("x-request-id"));

        let headers = transport
            .headers(&RequestOptions::get().bearer("override"), Uuid::new_v4())
            .unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer override");
    }

    #[test]
    fn test_anonymous_has_no_authorization() {
        let transport = Transport::new(&ApiConfig::default()).unwrap();
        let headers = transport.headers(&RequestOptions::get(), Uuid::new_v4()).unwrap();
        assert!(headers.get(AUTHORIZATION).is_none());
    }
}
