//! Client façade wiring every component from one configuration.
//!
//! # Wiring
//! ```text
//! ClientConfig
//!   → Transport (anonymous) → HttpAuthApi → SessionManager
//!   → Transport (with SessionManager as CredentialSource)
//!   → ConnectivityMonitor → OfflineDispatcher (+ replay worker)
//!   → DedupNotifier(TracingNotifier)
//!   → CallContext(dispatcher, session, notifier)
//! ```
//!
//! Must be built inside a Tokio runtime: the replay worker and the session
//! refresh timer are spawned during `build`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::{validate_config, ClientConfig, ConfigError};
use crate::connectivity::ConnectivityMonitor;
use crate::lifecycle::ScheduledTask;
use crate::offline::OfflineDispatcher;
use crate::orchestrator::{
    Call, CallContext, CallOptions, DedupNotifier, InfiniteQuery, Notifier, Page, Payload, Query, QueryOptions,
    TracingNotifier,
};
use crate::resilience::RetryPolicy;
use crate::session::{AuthApi, FileStorage, HttpAuthApi, MemoryStorage, Navigator, RouteTracker, SessionManager, SessionStorage};
use crate::transport::{ApiError, ApiResult, Transport};

/// Errors building the client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] ApiError),
}

/// Builder for `ApiClient`, allowing any collaborator to be replaced.
pub struct ApiClientBuilder {
    config: ClientConfig,
    storage: Option<Arc<dyn SessionStorage>>,
    navigator: Option<Arc<dyn Navigator>>,
    notifier: Option<Arc<dyn Notifier>>,
    auth_api: Option<Arc<dyn AuthApi>>,
    connectivity: Option<ConnectivityMonitor>,
}

impl ApiClientBuilder {
    pub fn storage(mut self, storage: Arc<dyn SessionStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn auth_api(mut self, auth_api: Arc<dyn AuthApi>) -> Self {
        self.auth_api = Some(auth_api);
        self
    }

    pub fn connectivity(mut self, connectivity: ConnectivityMonitor) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    /// Validate the configuration, wire the components and restore any stored session.
    pub fn build(self) -> Result<ApiClient, ClientError> {
        let config = self.config;
        validate_config(&config).map_err(ConfigError::Validation)?;

        let anonymous = Transport::new(&config.api)?;

        let storage: Arc<dyn SessionStorage> = match (self.storage, &config.session.storage_path) {
            (Some(storage), _) => storage,
            (None, Some(path)) => Arc::new(FileStorage::new(path)),
            (None, None) => Arc::new(MemoryStorage::new()),
        };
        let navigator: Arc<dyn Navigator> = match self.navigator {
            Some(navigator) => navigator,
            None => Arc::new(RouteTracker::default()),
        };
        let auth_api: Arc<dyn AuthApi> = match self.auth_api {
            Some(auth_api) => auth_api,
            None => Arc::new(HttpAuthApi::new(anonymous.clone(), &config.session)),
        };

        let session = SessionManager::new(config.session.clone(), storage, auth_api, navigator);
        let transport = anonymous
            .with_credentials(Arc::new(session.clone()))
            .forbidden_terminates_session(config.session.forbidden_terminates_session);

        let connectivity = self.connectivity.unwrap_or_default();
        let dispatcher = OfflineDispatcher::new(connectivity.clone(), &config.offline);
        let replay_worker = dispatcher.start_replay_worker();

        let notifier: Arc<dyn Notifier> = match self.notifier {
            Some(notifier) => notifier,
            None => Arc::new(DedupNotifier::new(
                Arc::new(TracingNotifier),
                Duration::from_millis(config.notifications.dedupe_window_ms),
            )),
        };
        let context = CallContext::new(dispatcher.clone(), notifier).with_session(session.clone());

        let restored = session.restore();
        tracing::info!(
            base_url = %config.api.base_url,
            session = ?restored,
            "Client ready"
        );

        Ok(ApiClient {
            config,
            transport,
            session,
            connectivity,
            dispatcher,
            context,
            _replay_worker: replay_worker,
        })
    }
}

/// Entry point for UI code: owns the session and hands out call bindings.
pub struct ApiClient {
    config: ClientConfig,
    transport: Transport,
    session: SessionManager,
    connectivity: ConnectivityMonitor,
    dispatcher: OfflineDispatcher,
    context: CallContext,
    _replay_worker: ScheduledTask,
}

impl ApiClient {
    pub fn builder(config: ClientConfig) -> ApiClientBuilder {
        ApiClientBuilder {
            config,
            storage: None,
            navigator: None,
            notifier: None,
            auth_api: None,
            connectivity: None,
        }
    }

    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Transport carrying the session's bearer token.
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    pub fn dispatcher(&self) -> &OfflineDispatcher {
        &self.dispatcher
    }

    pub fn context(&self) -> &CallContext {
        &self.context
    }

    /// The configured default retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.config.retries)
    }

    /// Default call options: configured retries, error notifications.
    pub fn call_options<T>(&self) -> CallOptions<T> {
        CallOptions::new().retry(self.retry_policy())
    }

    /// Bind a one-shot call with default options.
    pub fn call<P, T, F, Fut>(&self, operation: F) -> Call<P, T>
    where
        P: Clone + Send + Sync + 'static,
        T: Payload,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<T>> + Send + 'static,
    {
        self.call_with(operation, self.call_options())
    }

    pub fn call_with<P, T, F, Fut>(&self, operation: F, options: CallOptions<T>) -> Call<P, T>
    where
        P: Clone + Send + Sync + 'static,
        T: Payload,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<T>> + Send + 'static,
    {
        Call::new(self.context.clone(), operation, options)
    }

    /// Bind a mutation: a call that announces success.
    pub fn mutation<P, T, F, Fut>(&self, operation: F) -> Call<P, T>
    where
        P: Clone + Send + Sync + 'static,
        T: Payload,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<T>> + Send + 'static,
    {
        self.call_with(operation, CallOptions::mutation().retry(self.retry_policy()))
    }

    pub fn query<P, T, F, Fut>(&self, operation: F, params: P, options: QueryOptions) -> Query<P, T>
    where
        P: Clone + Send + Sync + 'static,
        T: Payload,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<T>> + Send + 'static,
    {
        Query::new(self.call(operation), params, options)
    }

    pub fn infinite_query<I, F, Fut>(&self, fetch_page: F) -> InfiniteQuery<I>
    where
        I: Payload,
        F: Fn(u32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<Page<I>>> + Send + 'static,
    {
        InfiniteQuery::new(self.context.clone(), fetch_page, self.call_options())
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("transport", &self.transport)
            .field("session", &self.session)
            .field("online", &self.connectivity.is_online())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::Outcome;
    use crate::session::{AuthResponse, Credentials, SessionRecord, SessionState, UserIdentity};
    use async_trait::async_trait;
    use serde_json::json;

    struct NoopAuth;

    #[async_trait]
    impl AuthApi for NoopAuth {
        async fn login(&self, _credentials: &Credentials) -> ApiResult<AuthResponse> {
            Err(ApiError::Auth("not supported".into()))
        }

        async fn refresh(&self, _token: &str) -> ApiResult<AuthResponse> {
            Err(ApiError::Auth("not supported".into()))
        }

        async fn logout(&self, _token: &str) -> ApiResult<()> {
            Ok(())
        }
    }

    fn stored_session() -> Arc<MemoryStorage> {
        let storage = Arc::new(MemoryStorage::new());
        let record = SessionRecord::new("tok", UserIdentity::new(json!({ "id": 3 })));
        storage.set_all(&record.to_entries().unwrap()).unwrap();
        storage
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = ClientConfig::default();
        config.retries.max_attempts = 0;
        assert!(matches!(ApiClient::new(config), Err(ClientError::Config(_))));
    }

    #[tokio::test]
    async fn test_build_restores_session() {
        let client = ApiClient::builder(ClientConfig::default())
            .storage(stored_session())
            .auth_api(Arc::new(NoopAuth))
            .build()
            .unwrap();

        assert_eq!(client.session().state(), SessionState::Authenticated);
        assert_eq!(client.session().token().as_deref(), Some("tok"));
        assert_eq!(client.retry_policy().max_attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_end_cancels_in_flight_calls() {
        let client = ApiClient::builder(ClientConfig::default())
            .storage(stored_session())
            .auth_api(Arc::new(NoopAuth))
            .build()
            .unwrap();

        let call = client.call(|_: ()| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(1u8)
        });
        let mut rx = call.subscribe();
        let handle = {
            let call = call.clone();
            tokio::spawn(async move { call.execute(()).await })
        };
        rx.wait_for(|s| s.is_loading).await.unwrap();

        client.session().handle_auth_failure();

        assert_eq!(handle.await.unwrap(), Outcome::Cancelled);
        assert!(!call.is_loading());
        assert_eq!(client.session().state(), SessionState::Anonymous);
    }
}
