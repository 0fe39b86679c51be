//! One-shot calls and mutations.
//!
//! # Responsibilities
//! - Cancel the previous in-flight call when a new one is issued
//! - Run the operation through the retry engine and, when configured, the offline dispatcher
//! - Publish `CallState` and discard results of superseded calls
//! - Invoke callbacks and emit notifications before the caller sees the outcome
//!
//! # Cancellation
//! ```text
//! execute(B) while A in flight → A's token cancelled, A settles as Cancelled
//! session ended               → scope cancelled, every child call settles as Cancelled
//! cancel() / drop             → current call settles as Cancelled
//! ```
//! A cancelled call never touches state, callbacks or notifications.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::OfflineConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::offline::{OfflineDispatcher, OfflinePolicy};
use crate::orchestrator::notify::{Notification, Notifier, TracingNotifier};
use crate::orchestrator::state::CallState;
use crate::resilience::{Outcome, Retry, RetryAttempt, RetryObserver, RetryPolicy};
use crate::session::SessionManager;
use crate::transport::error::{ApiError, ApiResult, ErrorCategory};

/// Values a call can produce: cloneable into state and cacheable as JSON.
pub trait Payload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Payload for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// A bound remote operation.
pub type Operation<P, T> = Arc<dyn Fn(P) -> BoxFuture<'static, ApiResult<T>> + Send + Sync>;

pub type SuccessCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&ApiError) + Send + Sync>;

const DEFAULT_SUCCESS_MESSAGE: &str = "Operation completed successfully";

/// Collaborators shared by every orchestrator instance.
#[derive(Clone)]
pub struct CallContext {
    dispatcher: OfflineDispatcher,
    session: Option<SessionManager>,
    notifier: Arc<dyn Notifier>,
}

impl CallContext {
    pub fn new(dispatcher: OfflineDispatcher, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            dispatcher,
            session: None,
            notifier,
        }
    }

    /// Scope every call to the session: ending it cancels them.
    pub fn with_session(mut self, session: SessionManager) -> Self {
        self.session = Some(session);
        self
    }

    /// Always-online context without a session, logging notifications.
    pub fn standalone() -> Self {
        Self::new(
            OfflineDispatcher::new(ConnectivityMonitor::default(), &OfflineConfig::default()),
            Arc::new(TracingNotifier),
        )
    }

    pub fn dispatcher(&self) -> &OfflineDispatcher {
        &self.dispatcher
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    fn call_token(&self) -> CancellationToken {
        match &self.session {
            Some(session) => session.scope().child_token(),
            None => CancellationToken::new(),
        }
    }
}

impl std::fmt::Debug for CallContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallContext")
            .field("dispatcher", &self.dispatcher)
            .field("session", &self.session)
            .finish()
    }
}

/// Per-binding call behavior.
pub struct CallOptions<T> {
    pub retry: RetryPolicy,
    pub offline: Option<OfflinePolicy<T>>,
    pub on_success: Option<SuccessCallback<T>>,
    pub on_error: Option<ErrorCallback>,
    pub show_success: bool,
    pub show_error: bool,
    pub success_message: Option<String>,
}

impl<T> CallOptions<T> {
    pub fn new() -> Self {
        Self {
            retry: RetryPolicy::default(),
            offline: None,
            on_success: None,
            on_error: None,
            show_success: false,
            show_error: true,
            success_message: None,
        }
    }

    /// Options for a mutation: success notifications on.
    pub fn mutation() -> Self {
        Self {
            show_success: true,
            ..Self::new()
        }
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn offline(mut self, policy: OfflinePolicy<T>) -> Self {
        self.offline = Some(policy);
        self
    }

    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(callback));
        self
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ApiError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn show_success(mut self, show: bool) -> Self {
        self.show_success = show;
        self
    }

    pub fn show_error(mut self, show: bool) -> Self {
        self.show_error = show;
        self
    }

    pub fn success_message(mut self, message: impl Into<String>) -> Self {
        self.success_message = Some(message.into());
        self
    }
}

impl<T> Default for CallOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for CallOptions<T> {
    fn clone(&self) -> Self {
        Self {
            retry: self.retry.clone(),
            offline: self.offline.clone(),
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
            show_success: self.show_success,
            show_error: self.show_error,
            success_message: self.success_message.clone(),
        }
    }
}

impl<T> std::fmt::Debug for CallOptions<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallOptions")
            .field("retry", &self.retry)
            .field("offline", &self.offline)
            .field("show_success", &self.show_success)
            .field("show_error", &self.show_error)
            .field("success_message", &self.success_message)
            .finish()
    }
}

struct InFlight {
    id: u64,
    token: CancellationToken,
}

struct CallInner<P, T> {
    operation: Operation<P, T>,
    options: CallOptions<T>,
    context: CallContext,
    state: watch::Sender<CallState<T>>,
    current: Mutex<Option<InFlight>>,
    next_id: AtomicU64,
}

/// One logical call site. Newer calls always win over older in-flight ones.
pub struct Call<P, T> {
    inner: Arc<CallInner<P, T>>,
}

impl<P, T> Clone for Call<P, T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P, T> Call<P, T> {
    /// Cancel the in-flight call, if any.
    pub fn cancel(&self) {
        if let Some(in_flight) = self.inner.lock_current().take() {
            tracing::debug!(call = in_flight.id, "Call cancelled");
            in_flight.token.cancel();
            self.inner.state.send_modify(CallState::abandon);
        }
    }
}

impl<P, T> Call<P, T>
where
    P: Clone + Send + Sync + 'static,
    T: Payload,
{
    pub fn new<F, Fut>(context: CallContext, operation: F, options: CallOptions<T>) -> Self
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<T>> + Send + 'static,
    {
        let operation: Operation<P, T> = Arc::new(move |params| operation(params).boxed());
        let (state, _) = watch::channel(CallState::idle());
        Self {
            inner: Arc::new(CallInner {
                operation,
                options,
                context,
                state,
                current: Mutex::new(None),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Snapshot of the published state.
    pub fn state(&self) -> CallState<T> {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CallState<T>> {
        self.inner.state.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().is_loading
    }

    /// Issue a call, superseding any call still in flight on this instance.
    pub async fn execute(&self, params: P) -> Outcome<T> {
        let token = self.inner.context.call_token();
        let id = self.inner.begin(token.clone());

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            result = self.inner.run(params, id) => Some(result),
        };

        match self.inner.finish(id, result) {
            Some(result) => self.inner.settle(result),
            None => {
                tracing::debug!(call = id, "Call cancelled before settling, result discarded");
                Outcome::Cancelled
            }
        }
    }
}

impl<P, T> CallInner<P, T> {
    fn lock_current(&self) -> MutexGuard<'_, Option<InFlight>> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<P, T> CallInner<P, T>
where
    P: Clone + Send + Sync + 'static,
    T: Payload,
{
    fn begin(&self, token: CancellationToken) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut current = self.lock_current();
        if let Some(previous) = current.replace(InFlight { id, token }) {
            tracing::debug!(superseded = previous.id, call = id, "Superseding in-flight call");
            previous.token.cancel();
        }
        self.state.send_modify(CallState::start);
        id
    }

    /// Apply `update` to the state only while `id` holds the in-flight slot.
    fn publish_if_current(&self, id: u64, update: impl FnOnce(&mut CallState<T>)) {
        let current = self.lock_current();
        if current.as_ref().map(|c| c.id == id).unwrap_or(false) {
            self.state.send_modify(update);
        }
    }

    /// Release the in-flight slot and publish the result under the same lock.
    ///
    /// Returns `None` if the call was superseded, cancelled or produced no result.
    fn finish(&self, id: u64, result: Option<ApiResult<T>>) -> Option<ApiResult<T>> {
        let mut current = self.lock_current();
        if !current.as_ref().map(|c| c.id == id).unwrap_or(false) {
            return None;
        }
        *current = None;

        match &result {
            Some(Ok(value)) => self.state.send_modify(|s| s.succeed(value.clone())),
            Some(Err(error)) => self.state.send_modify(|s| s.fail(error.clone())),
            None => self.state.send_modify(CallState::abandon),
        }
        result
    }

    async fn run(self: &Arc<Self>, params: P, id: u64) -> ApiResult<T> {
        let operation = self.operation.clone();
        let policy = self.options.retry.clone();

        let weak = Arc::downgrade(self);
        let observer: RetryObserver = Arc::new(move |_attempt: &RetryAttempt<'_>| {
            if let Some(inner) = weak.upgrade() {
                inner.publish_if_current(id, |s| s.is_retrying = true);
            }
        });

        let attempt = move || async move {
            Retry::new(policy)
                .on_retry(observer)
                .run_to_result(move || operation(params.clone()))
                .await
        };

        match &self.options.offline {
            Some(offline) => self.context.dispatcher.offline_capable_request(attempt, offline).await,
            None => attempt().await,
        }
    }

    /// Callbacks and notifications for a result already published by `finish`.
    fn settle(&self, result: ApiResult<T>) -> Outcome<T> {
        match result {
            Ok(value) => {
                if let Some(callback) = &self.options.on_success {
                    callback(&value);
                }
                if self.options.show_success {
                    let message = self
                        .options
                        .success_message
                        .clone()
                        .unwrap_or_else(|| DEFAULT_SUCCESS_MESSAGE.to_string());
                    self.context.notifier.notify(Notification::success(message));
                }
                Outcome::Success(value)
            }
            Err(error) => {
                tracing::debug!(error = %error, "Call failed");
                if let Some(callback) = &self.options.on_error {
                    callback(&error);
                }
                if self.options.show_error {
                    self.context.notifier.notify(notification_for(&error));
                }
                Outcome::Failure(error)
            }
        }
    }
}

impl<P, T> Drop for CallInner<P, T> {
    fn drop(&mut self) {
        let current = match self.current.get_mut() {
            Ok(current) => current.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(in_flight) = current {
            in_flight.token.cancel();
        }
    }
}

fn notification_for(error: &ApiError) -> Notification {
    match error.category() {
        ErrorCategory::Pending => Notification::info(error.user_message()),
        _ => Notification::error(error.user_message()),
    }
}
