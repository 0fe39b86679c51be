//! Auto-fetching queries.
//!
//! # Responsibilities
//! - Fetch once when enabled
//! - Refetch on a fixed interval when configured
//! - Refetch on regained focus only when the data is stale
//!
//! # Design Decisions
//! - Every fetch goes through the same `Call`, so a refetch supersedes a slower one
//! - The interval timer is an owned `ScheduledTask`; dropping the query stops it

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::lifecycle::ScheduledTask;
use crate::orchestrator::call::{Call, Payload};
use crate::orchestrator::state::CallState;
use crate::resilience::Outcome;

/// When a query fetches.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub enabled: bool,
    pub refetch_interval: Option<Duration>,
    pub refetch_on_window_focus: bool,
    /// Data younger than this is fresh; `None` means always stale.
    pub stale_time: Option<Duration>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            refetch_interval: None,
            refetch_on_window_focus: true,
            stale_time: None,
        }
    }
}

impl QueryOptions {
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn refetch_interval(mut self, interval: Duration) -> Self {
        self.refetch_interval = Some(interval);
        self
    }

    pub fn refetch_on_window_focus(mut self, refetch: bool) -> Self {
        self.refetch_on_window_focus = refetch;
        self
    }

    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }
}

struct QueryInner<P, T> {
    call: Call<P, T>,
    params: Mutex<P>,
    options: QueryOptions,
    enabled: AtomicBool,
    last_fetched: Mutex<Option<Instant>>,
    interval: Mutex<Option<ScheduledTask>>,
}

impl<P, T> QueryInner<P, T>
where
    P: Clone + Send + Sync + 'static,
    T: Payload,
{
    async fn fetch(&self) -> Outcome<T> {
        let params = lock(&self.params).clone();
        let outcome = self.call.execute(params).await;
        if outcome.is_success() {
            *lock(&self.last_fetched) = Some(Instant::now());
        }
        outcome
    }

    fn is_stale(&self) -> bool {
        match (self.options.stale_time, *lock(&self.last_fetched)) {
            (Some(stale_time), Some(at)) => at.elapsed() > stale_time,
            _ => true,
        }
    }
}

/// A query binding: a `Call` plus its fetch triggers.
pub struct Query<P, T> {
    inner: Arc<QueryInner<P, T>>,
}

impl<P, T> Query<P, T>
where
    P: Clone + Send + Sync + 'static,
    T: Payload,
{
    /// Bind `call` to `params`. Starts fetching immediately when enabled.
    pub fn new(call: Call<P, T>, params: P, options: QueryOptions) -> Self {
        let enabled = options.enabled;
        let query = Self {
            inner: Arc::new(QueryInner {
                call,
                params: Mutex::new(params),
                options,
                enabled: AtomicBool::new(false),
                last_fetched: Mutex::new(None),
                interval: Mutex::new(None),
            }),
        };
        if enabled {
            query.set_enabled(true);
        }
        query
    }

    pub fn state(&self) -> CallState<T> {
        self.inner.call.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<CallState<T>> {
        self.inner.call.subscribe()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub fn is_stale(&self) -> bool {
        self.inner.is_stale()
    }

    /// Fetch now, whether or not the query is enabled.
    pub async fn refetch(&self) -> Outcome<T> {
        self.inner.fetch().await
    }

    /// Enable or disable the query. Enabling fetches; disabling stops the
    /// interval and cancels the in-flight fetch.
    pub fn set_enabled(&self, enabled: bool) {
        let was_enabled = self.inner.enabled.swap(enabled, Ordering::SeqCst);
        match (was_enabled, enabled) {
            (false, true) => {
                self.start_interval();
                self.spawn_fetch();
            }
            (true, false) => {
                lock(&self.inner.interval).take();
                self.inner.call.cancel();
            }
            _ => {}
        }
    }

    /// Replace the parameters and fetch again when enabled.
    pub fn set_params(&self, params: P) {
        *lock(&self.inner.params) = params;
        if self.is_enabled() {
            self.spawn_fetch();
        }
    }

    /// The window regained focus. Refetches only if enabled and stale.
    pub async fn focus_gained(&self) -> Option<Outcome<T>> {
        if !self.is_enabled() || !self.inner.options.refetch_on_window_focus {
            return None;
        }
        if !self.inner.is_stale() {
            tracing::trace!("Query still fresh, focus refetch skipped");
            return None;
        }
        Some(self.inner.fetch().await)
    }

    fn spawn_fetch(&self) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.fetch().await;
        });
    }

    fn start_interval(&self) {
        let Some(period) = self.inner.options.refetch_interval else {
            return;
        };
        let weak = Arc::downgrade(&self.inner);
        let task = ScheduledTask::every("query-refetch", period, move || {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    if inner.enabled.load(Ordering::SeqCst) {
                        inner.fetch().await;
                    }
                }
            }
        });
        *lock(&self.inner.interval) = Some(task);
    }
}

impl<P, T> Drop for Query<P, T> {
    fn drop(&mut self) {
        if let Ok(mut interval) = self.inner.interval.lock() {
            interval.take();
        }
        self.inner.enabled.store(false, Ordering::SeqCst);
        self.inner.call.cancel();
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::call::{CallContext, CallOptions};
    use std::sync::atomic::AtomicU32;

    fn counting_call(calls: &Arc<AtomicU32>) -> Call<String, u32> {
        let calls = calls.clone();
        Call::new(
            CallContext::standalone(),
            move |_key: String| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Ok(n) }
            },
            CallOptions::new(),
        )
    }

    async fn settle<P, T>(query: &Query<P, T>)
    where
        P: Clone + Send + Sync + 'static,
        T: Payload,
    {
        let mut rx = query.subscribe();
        rx.wait_for(|s| s.is_settled()).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetches_when_enabled() {
        let calls = Arc::new(AtomicU32::new(0));
        let query = Query::new(counting_call(&calls), "classes".to_string(), QueryOptions::default());

        settle(&query).await;
        assert_eq!(query.state().data, Some(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_query_does_not_fetch() {
        let calls = Arc::new(AtomicU32::new(0));
        let query = Query::new(
            counting_call(&calls),
            "classes".to_string(),
            QueryOptions::default().enabled(false).refetch_interval(Duration::from_secs(10)),
        );

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(query.focus_gained().await.is_none());

        query.set_enabled(true);
        settle(&query).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refetch_interval() {
        let calls = Arc::new(AtomicU32::new(0));
        let query = Query::new(
            counting_call(&calls),
            "bookings".to_string(),
            QueryOptions::default().refetch_interval(Duration::from_secs(10)),
        );

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        drop(query);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_refetch_interval_fetches_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let query = Query::new(
            counting_call(&calls),
            "bookings".to_string(),
            QueryOptions::default().refetch_interval(Duration::ZERO),
        );

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(query.state().data, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_focus_refetch_respects_stale_time() {
        let calls = Arc::new(AtomicU32::new(0));
        let query = Query::new(
            counting_call(&calls),
            "users".to_string(),
            QueryOptions::default().stale_time(Duration::from_secs(30)),
        );
        settle(&query).await;

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(query.focus_gained().await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(query.focus_gained().await, Some(Outcome::Success(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_focus_refetch_without_stale_time_always_fetches() {
        let calls = Arc::new(AtomicU32::new(0));
        let query = Query::new(counting_call(&calls), "users".to_string(), QueryOptions::default());
        settle(&query).await;

        assert_eq!(query.focus_gained().await, Some(Outcome::Success(2)));
        assert_eq!(query.focus_gained().await, Some(Outcome::Success(3)));
    }
}
