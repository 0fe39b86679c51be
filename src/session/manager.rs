//! Session lifecycle state machine.
//!
//! # States
//! - Anonymous: no credential, calls go out unauthenticated
//! - Authenticated: token attached to every call, refresh timer running
//! - Refreshing: token exchange in flight, old token still attached
//!
//! # State Transitions
//! ```text
//! Anonymous     → Authenticated: login success, or restore of a record younger than max age
//! Anonymous     → Anonymous:     restore of an expired or malformed record (storage cleared)
//! Authenticated → Refreshing:    scheduled tick or explicit refresh
//! Refreshing    → Authenticated: refresh success (new token + issued_at persisted)
//! Refreshing    → Anonymous:     refresh failure
//! Authenticated → Anonymous:     logout (always, whatever the remote call does)
//! any           → Anonymous:     credential rejected by the server
//! ```
//!
//! # Design Decisions
//! - Single writer: all mutation goes through the transition functions under one lock
//! - Readers load the current record lock-free
//! - Leaving a session bumps an epoch so late refresh results are discarded
//! - Leaving a session cancels its scope, aborting calls issued under it
//! - The token exchange runs on its own task, so a caller giving up never strands `Refreshing`
//! - Redirect to the login route only when not already there

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use arc_swap::ArcSwapOption;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::config::SessionConfig;
use crate::lifecycle::ScheduledTask;
use crate::observability::metrics;
use crate::session::api::{AuthApi, Credentials};
use crate::session::navigator::Navigator;
use crate::session::record::{SessionRecord, UserIdentity, SESSION_KEYS, TIMESTAMP_KEY, TOKEN_KEY, USER_KEY};
use crate::session::storage::{SessionStorage, StorageError};
use crate::transport::error::ApiError;
use crate::transport::CredentialSource;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticated,
    Refreshing,
}

impl SessionState {
    fn label(self) -> &'static str {
        match self {
            SessionState::Anonymous => "anonymous",
            SessionState::Authenticated => "authenticated",
            SessionState::Refreshing => "refreshing",
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    UserRequested,
    RefreshFailed,
    CredentialRejected,
    Expired,
}

/// Broadcast on every session transition.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    LoggedIn,
    Restored,
    Refreshed,
    LoggedOut { reason: LogoutReason },
}

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("session storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("no active session")]
    NotAuthenticated,

    #[error("session expired")]
    Expired,

    #[error("login response did not include a user")]
    MissingUser,

    #[error("session refresh did not complete")]
    RefreshInterrupted,
}

struct Lifecycle {
    state: SessionState,
    epoch: u64,
    scope: CancellationToken,
    refresh_task: Option<ScheduledTask>,
    /// Flips to true when the running token exchange has settled.
    refresh_done: Option<watch::Receiver<bool>>,
}

struct SessionInner {
    config: SessionConfig,
    storage: Arc<dyn SessionStorage>,
    api: Arc<dyn AuthApi>,
    navigator: Arc<dyn Navigator>,
    record: ArcSwapOption<SessionRecord>,
    lifecycle: Mutex<Lifecycle>,
    events: broadcast::Sender<SessionEvent>,
}

/// Owner of the process-wide session record.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state())
            .finish()
    }
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        storage: Arc<dyn SessionStorage>,
        api: Arc<dyn AuthApi>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(SessionInner {
                config,
                storage,
                api,
                navigator,
                record: ArcSwapOption::empty(),
                lifecycle: Mutex::new(Lifecycle {
                    state: SessionState::Anonymous,
                    epoch: 0,
                    scope: CancellationToken::new(),
                    refresh_task: None,
                    refresh_done: None,
                }),
                events,
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle().state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state() != SessionState::Anonymous
    }

    pub fn record(&self) -> Option<Arc<SessionRecord>> {
        self.inner.record.load_full()
    }

    pub fn token(&self) -> Option<String> {
        self.inner.record.load().as_ref().map(|r| r.token.clone())
    }

    pub fn user(&self) -> Option<UserIdentity> {
        self.inner.record.load().as_ref().map(|r| r.user.clone())
    }

    /// Cancellation scope of the current session.
    ///
    /// Cancelled when the session ends; calls should derive child tokens from it.
    pub fn scope(&self) -> CancellationToken {
        self.lifecycle().scope.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// True while the periodic refresh timer is running.
    pub fn refresh_scheduled(&self) -> bool {
        self.lifecycle()
            .refresh_task
            .as_ref()
            .map(|t| !t.is_cancelled())
            .unwrap_or(false)
    }

    /// Restore a persisted session. Expired or malformed records are cleared
    /// without a network round trip.
    pub fn restore(&self) -> SessionState {
        let stored = self.read_stored();
        let record = match stored {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::debug!("No stored session");
                return SessionState::Anonymous;
            }
            Err(reason) => {
                tracing::warn!(reason = %reason, "Discarding invalid stored session");
                self.clear_storage();
                return SessionState::Anonymous;
            }
        };

        if record.is_expired(self.inner.config.max_age()) {
            tracing::info!(issued_at = %record.issued_at, "Stored session expired");
            self.clear_storage();
            metrics::record_session_transition(SessionState::Anonymous.label());
            return SessionState::Anonymous;
        }

        tracing::info!(user = ?record.user.id(), issued_at = %record.issued_at, "Session restored");
        self.begin_session(record);
        self.emit(SessionEvent::Restored);
        SessionState::Authenticated
    }

    /// Exchange credentials for a session.
    ///
    /// A failed login leaves the state untouched and never redirects.
    pub async fn login(&self, credentials: &Credentials) -> Result<Arc<SessionRecord>, SessionError> {
        let response = self.inner.api.login(credentials).await.map_err(|e| {
            tracing::warn!(email = %credentials.email, error = %e, "Login failed");
            e
        })?;
        let user = response.user.ok_or(SessionError::MissingUser)?;
        let record = SessionRecord::new(response.token, user);

        self.persist(&record)?;
        tracing::info!(user = ?record.user.id(), "Logged in");
        self.begin_session(record);
        self.emit(SessionEvent::LoggedIn);

        self.record().ok_or(SessionError::NotAuthenticated)
    }

    /// End the session. Local state is always cleared; the remote call is best effort.
    pub async fn logout(&self) {
        let token = self.token();
        self.end_session(LogoutReason::UserRequested);

        if let Some(token) = token {
            if let Err(e) = self.inner.api.logout(&token).await {
                tracing::warn!(error = %e, "Remote logout failed");
            }
        }
    }

    /// Exchange the current token for a fresh one.
    ///
    /// If a refresh is already running, waits for it and reports whether the
    /// session survived it. The exchange itself runs on a spawned task and
    /// settles even if the caller stops waiting. Failure ends the session.
    pub async fn refresh(&self) -> Result<(), SessionError> {
        let (token, epoch, done) = match self.begin_refresh()? {
            RefreshStart::Exchange { token, epoch, done } => (token, epoch, done),
            RefreshStart::Join(running) => {
                tracing::debug!("Refresh already in progress, waiting for it");
                return self.join_running_refresh(running).await;
            }
        };

        let guard = RefreshInFlight {
            manager: self.clone(),
            epoch,
            done,
        };
        let exchange = tokio::spawn(async move {
            let result = guard.manager.exchange_token(&token, epoch).await;
            drop(guard);
            result
        });

        match exchange.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "Refresh task failed");
                Err(SessionError::RefreshInterrupted)
            }
        }
    }

    fn begin_refresh(&self) -> Result<RefreshStart, SessionError> {
        let mut lifecycle = self.lifecycle();
        match lifecycle.state {
            SessionState::Anonymous => return Err(SessionError::NotAuthenticated),
            SessionState::Refreshing => return Ok(RefreshStart::Join(lifecycle.refresh_done.clone())),
            SessionState::Authenticated => {}
        }

        let record = match self.inner.record.load_full() {
            Some(record) => record,
            None => return Err(SessionError::NotAuthenticated),
        };
        if record.is_expired(self.inner.config.max_age()) {
            drop(lifecycle);
            self.end_session(LogoutReason::Expired);
            return Err(SessionError::Expired);
        }

        let (done, finished) = watch::channel(false);
        lifecycle.state = SessionState::Refreshing;
        lifecycle.refresh_done = Some(finished);
        metrics::record_session_transition(SessionState::Refreshing.label());
        Ok(RefreshStart::Exchange {
            token: record.token.clone(),
            epoch: lifecycle.epoch,
            done,
        })
    }

    async fn join_running_refresh(&self, running: Option<watch::Receiver<bool>>) -> Result<(), SessionError> {
        if let Some(mut running) = running {
            let _ = running.wait_for(|finished| *finished).await;
        }
        match self.state() {
            SessionState::Anonymous => Err(SessionError::NotAuthenticated),
            SessionState::Authenticated | SessionState::Refreshing => Ok(()),
        }
    }

    async fn exchange_token(&self, token: &str, epoch: u64) -> Result<(), SessionError> {
        tracing::debug!("Refreshing session token");
        let result = self.inner.api.refresh(token).await;

        match result {
            Ok(response) => {
                let mut lifecycle = self.lifecycle();
                if lifecycle.epoch != epoch || lifecycle.state != SessionState::Refreshing {
                    tracing::debug!("Session changed during refresh, discarding new token");
                    return Ok(());
                }

                let user = match response.user {
                    Some(user) => user,
                    None => match self.inner.record.load().as_ref() {
                        Some(current) => current.user.clone(),
                        None => return Err(SessionError::NotAuthenticated),
                    },
                };
                let record = SessionRecord::new(response.token, user);

                if let Err(e) = self.persist(&record) {
                    drop(lifecycle);
                    tracing::error!(error = %e, "Failed to persist refreshed session");
                    self.end_session(LogoutReason::RefreshFailed);
                    return Err(e.into());
                }

                self.inner.record.store(Some(Arc::new(record)));
                lifecycle.state = SessionState::Authenticated;
                drop(lifecycle);

                tracing::info!("Session token refreshed");
                metrics::record_session_transition(SessionState::Authenticated.label());
                self.emit(SessionEvent::Refreshed);
                Ok(())
            }
            Err(e) => {
                let current_epoch = self.lifecycle().epoch;
                if current_epoch == epoch {
                    tracing::warn!(error = %e, "Token refresh failed, ending session");
                    self.end_session(LogoutReason::RefreshFailed);
                }
                Err(e.into())
            }
        }
    }

    /// React to the server rejecting the current credential.
    pub fn handle_auth_failure(&self) {
        self.end_session(LogoutReason::CredentialRejected);
    }

    fn begin_session(&self, record: SessionRecord) {
        let task = self.start_refresh_timer();
        let mut lifecycle = self.lifecycle();
        lifecycle.epoch += 1;
        lifecycle.state = SessionState::Authenticated;
        lifecycle.refresh_task = Some(task);
        lifecycle.refresh_done = None;
        self.inner.record.store(Some(Arc::new(record)));
        drop(lifecycle);

        metrics::record_session_transition(SessionState::Authenticated.label());
    }

    /// Move to Anonymous. Returns false if already there.
    fn end_session(&self, reason: LogoutReason) -> bool {
        let mut lifecycle = self.lifecycle();
        if lifecycle.state == SessionState::Anonymous {
            return false;
        }

        lifecycle.state = SessionState::Anonymous;
        lifecycle.epoch += 1;
        lifecycle.scope.cancel();
        lifecycle.scope = CancellationToken::new();
        let refresh_task = lifecycle.refresh_task.take();
        lifecycle.refresh_done = None;
        self.inner.record.store(None);
        self.clear_storage();
        drop(lifecycle);

        if let Some(task) = refresh_task {
            task.cancel();
        }

        tracing::info!(reason = ?reason, "Session ended");
        metrics::record_session_transition(SessionState::Anonymous.label());
        self.emit(SessionEvent::LoggedOut { reason });

        let login_route = &self.inner.config.login_route;
        if self.inner.navigator.current_route() != *login_route {
            self.inner.navigator.redirect(login_route);
        }
        true
    }

    fn start_refresh_timer(&self) -> ScheduledTask {
        let weak: Weak<SessionInner> = Arc::downgrade(&self.inner);
        ScheduledTask::every("session-refresh", self.inner.config.refresh_interval(), move || {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    let manager = SessionManager { inner };
                    if let Err(e) = manager.refresh().await {
                        tracing::debug!(error = %e, "Scheduled refresh did not complete");
                    }
                }
            }
        })
    }

    fn read_stored(&self) -> Result<Option<SessionRecord>, String> {
        let storage = &self.inner.storage;
        let read = |key: &str| storage.get(key).map_err(|e| e.to_string());
        SessionRecord::from_entries(read(TOKEN_KEY)?, read(USER_KEY)?, read(TIMESTAMP_KEY)?).map_err(|e| e.to_string())
    }

    fn persist(&self, record: &SessionRecord) -> Result<(), StorageError> {
        let entries = record.to_entries()?;
        self.inner.storage.set_all(&entries)
    }

    fn clear_storage(&self) {
        if let Err(e) = self.inner.storage.remove_all(&SESSION_KEYS) {
            tracing::error!(error = %e, "Failed to clear stored session");
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.inner.events.send(event);
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.inner.lifecycle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

enum RefreshStart {
    Exchange {
        token: String,
        epoch: u64,
        done: watch::Sender<bool>,
    },
    Join(Option<watch::Receiver<bool>>),
}

/// Settles a token exchange when its task ends, however it ends.
///
/// Returns `Refreshing` to `Authenticated` if the exchange never applied a
/// result for its own session, then wakes callers waiting on it.
struct RefreshInFlight {
    manager: SessionManager,
    epoch: u64,
    done: watch::Sender<bool>,
}

impl Drop for RefreshInFlight {
    fn drop(&mut self) {
        let mut lifecycle = self.manager.lifecycle();
        if lifecycle.epoch == self.epoch {
            if lifecycle.state == SessionState::Refreshing {
                tracing::warn!("Token exchange abandoned, keeping current token");
                lifecycle.state = SessionState::Authenticated;
                metrics::record_session_transition(SessionState::Authenticated.label());
            }
            lifecycle.refresh_done = None;
        }
        drop(lifecycle);
        let _ = self.done.send(true);
    }
}

impl CredentialSource for SessionManager {
    fn bearer_token(&self) -> Option<String> {
        self.token()
    }

    fn credential_rejected(&self, status: u16) {
        tracing::warn!(status, "Server rejected credential");
        self.handle_auth_failure();
    }
}
