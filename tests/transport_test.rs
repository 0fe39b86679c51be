//! Transport behavior against a live mock backend.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use resilient_client::config::ApiConfig;
use resilient_client::resilience::{with_retry, RetryPolicy};
use resilient_client::transport::{ApiError, CredentialSource, ErrorCategory, RequestOptions, Transport};
use serde::Deserialize;
use serde_json::{json, Value};

mod common;
use common::{start_programmable_backend, MockResponse};

fn transport(base_url: &str) -> Transport {
    Transport::new(&ApiConfig {
        base_url: base_url.to_string(),
        api_prefix: "/api/v1".to_string(),
        timeout_secs: 5,
    })
    .unwrap()
}

struct StaticToken {
    token: &'static str,
    rejected: AtomicU32,
}

impl CredentialSource for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        Some(self.token.to_string())
    }

    fn credential_rejected(&self, _status: u16) {
        self.rejected.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_no_content_yields_null() {
    let (url, _) = start_programmable_backend(|_| async { MockResponse::no_content() }).await;

    let value = transport(&url)
        .send("/bookings/7", RequestOptions::delete())
        .await
        .unwrap();
    assert_eq!(value, Value::Null);
}

#[tokio::test]
async fn test_headers_and_bearer_token() {
    let (url, log) = start_programmable_backend(|_| async { MockResponse::json(200, json!({ "ok": true })) }).await;
    let source = Arc::new(StaticToken {
        token: "secret-token",
        rejected: AtomicU32::new(0),
    });
    let transport = transport(&url).with_credentials(source);

    let body = json!({ "name": "Morning yoga" });
    let _: Value = transport.post("/classes", &body).await.unwrap();

    let requests = log.lock().unwrap();
    let request = &requests[0];
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/api/v1/classes");
    assert_eq!(request.header("authorization"), Some("Bearer secret-token"));
    assert_eq!(request.header("content-type"), Some("application/json"));
    assert_eq!(request.header("accept"), Some("application/json"));
    assert!(request.header("x-request-id").is_some());
    assert_eq!(serde_json::from_str::<Value>(&request.body).unwrap(), body);
}

#[tokio::test]
async fn test_anonymous_transport_sends_no_authorization() {
    let (url, log) = start_programmable_backend(|_| async { MockResponse::json(200, json!([])) }).await;

    let _: Value = transport(&url).get("/classes").await.unwrap();
    assert!(log.lock().unwrap()[0].header("authorization").is_none());
}

#[tokio::test]
async fn test_unauthorized_reports_rejection() {
    let (url, _) = start_programmable_backend(|_| async {
        MockResponse::json(401, json!({ "message": "token expired" }))
    })
    .await;
    let source = Arc::new(StaticToken {
        token: "stale",
        rejected: AtomicU32::new(0),
    });
    let transport = transport(&url).with_credentials(source.clone());

    let err = transport.send("/me", RequestOptions::get()).await.unwrap_err();
    assert_eq!(err, ApiError::Auth("token expired".to_string()));
    assert_eq!(source.rejected.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_forbidden_is_not_auth_by_default() {
    let (url, _) = start_programmable_backend(|_| async { MockResponse::json(403, json!({ "error": "admins only" })) }).await;
    let source = Arc::new(StaticToken {
        token: "user",
        rejected: AtomicU32::new(0),
    });

    let err = transport(&url)
        .with_credentials(source.clone())
        .send("/finance", RequestOptions::get())
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Forbidden);
    assert_eq!(source.rejected.load(Ordering::SeqCst), 0);

    let err = transport(&url)
        .with_credentials(source.clone())
        .forbidden_terminates_session(true)
        .send("/finance", RequestOptions::get())
        .await
        .unwrap_err();
    assert!(err.is_auth());
    assert_eq!(source.rejected.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_mislabelled_json_is_decoded() {
    let (url, _) = start_programmable_backend(|_| async {
        MockResponse::text(200, "text/html", r#"{"items":[1,2],"hasMore":false}"#)
    })
    .await;

    let value = transport(&url).send("/classes", RequestOptions::get()).await.unwrap();
    assert_eq!(value["items"], json!([1, 2]));
}

#[tokio::test]
async fn test_undecodable_body_is_decode_error() {
    let (url, _) = start_programmable_backend(|_| async { MockResponse::text(200, "text/html", "<html>oops</html>") }).await;

    let err = transport(&url).send("/classes", RequestOptions::get()).await.unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)));
}

#[tokio::test]
async fn test_validation_message_extracted() {
    let (url, _) = start_programmable_backend(|_| async {
        MockResponse::json(422, json!({ "detail": "capacity must be positive" }))
    })
    .await;

    let err = transport(&url).send("/classes", RequestOptions::post()).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Validation);
    assert_eq!(err.user_message(), "capacity must be positive");
}

#[tokio::test]
async fn test_timeout() {
    let (url, _) = start_programmable_backend(|_| async {
        MockResponse::json(200, json!({})).delayed(Duration::from_secs(2))
    })
    .await;

    let err = transport(&url)
        .send("/slow", RequestOptions::get().timeout(Duration::from_millis(200)))
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::Timeout(Duration::from_millis(200)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = transport(&format!("http://{}", addr))
        .send("/classes", RequestOptions::get())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Network(_)));
}

#[tokio::test]
async fn test_server_errors_are_retried_until_success() {
    let count = Arc::new(AtomicU32::new(0));
    let counter = count.clone();
    let (url, _) = start_programmable_backend(move |_| {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                MockResponse::json(503, json!({ "message": "warming up" }))
            } else {
                MockResponse::json(200, json!({ "items": ["a"] }))
            }
        }
    })
    .await;
    let transport = transport(&url);
    let policy = RetryPolicy::new(3, Duration::from_millis(10), true);

    #[derive(Deserialize)]
    struct Listing {
        items: Vec<String>,
    }

    let listing: Listing = with_retry(|| transport.get("/classes"), &policy).await.unwrap();
    assert_eq!(listing.items, vec!["a".to_string()]);
    assert_eq!(count.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let count = Arc::new(AtomicU32::new(0));
    let counter = count.clone();
    let (url, _) = start_programmable_backend(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { MockResponse::json(404, json!({ "message": "no such class" })) }
    })
    .await;
    let transport = transport(&url);

    let err = with_retry(
        || transport.send("/classes/99", RequestOptions::get()),
        &RetryPolicy::new(3, Duration::from_millis(10), true),
    )
    .await
    .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::NotFound);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}
