//! Offline-aware request dispatch.
//!
//! # Responsibilities
//! - Execute directly while online and cache keyed successes
//! - While offline, serve a fresh cached value, then a fallback, then queue
//! - Replay queued operations on the next offline → online transition
//!
//! # Decision Order (offline)
//! ```text
//! fresh cache entry for cache_key → cached value
//! fallback configured            → fallback()
//! queue_if_offline               → enqueue, Err(OfflineQueued)
//! otherwise                      → Err(Offline)
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::OfflineConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::lifecycle::ScheduledTask;
use crate::observability::metrics;
use crate::offline::cache::ResponseCache;
use crate::offline::queue::ReplayQueue;
use crate::transport::error::{ApiError, ApiResult};

/// Offline behavior for one call.
pub struct OfflinePolicy<T> {
    /// Produces a substitute value while offline.
    pub fallback: Option<Arc<dyn Fn() -> T + Send + Sync>>,
    /// Defer the call until connectivity returns.
    pub queue_if_offline: bool,
    /// Cache successful results under this key for later offline reads.
    pub cache_key: Option<String>,
    /// Maximum age of a cached value served offline.
    pub cache_duration: Option<Duration>,
}

impl<T> OfflinePolicy<T> {
    pub fn new() -> Self {
        Self {
            fallback: None,
            queue_if_offline: false,
            cache_key: None,
            cache_duration: None,
        }
    }

    pub fn fallback<F>(mut self, fallback: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(fallback));
        self
    }

    pub fn queue_if_offline(mut self) -> Self {
        self.queue_if_offline = true;
        self
    }

    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn cache_duration(mut self, duration: Duration) -> Self {
        self.cache_duration = Some(duration);
        self
    }
}

impl<T> Default for OfflinePolicy<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for OfflinePolicy<T> {
    fn clone(&self) -> Self {
        Self {
            fallback: self.fallback.clone(),
            queue_if_offline: self.queue_if_offline,
            cache_key: self.cache_key.clone(),
            cache_duration: self.cache_duration,
        }
    }
}

impl<T> std::fmt::Debug for OfflinePolicy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflinePolicy")
            .field("has_fallback", &self.fallback.is_some())
            .field("queue_if_offline", &self.queue_if_offline)
            .field("cache_key", &self.cache_key)
            .field("cache_duration", &self.cache_duration)
            .finish()
    }
}

/// Dispatcher deciding between execution, cached data, fallback and deferral.
#[derive(Debug, Clone)]
pub struct OfflineDispatcher {
    connectivity: ConnectivityMonitor,
    cache: ResponseCache,
    queue: ReplayQueue,
    default_ttl: Duration,
}

impl OfflineDispatcher {
    pub fn new(connectivity: ConnectivityMonitor, config: &OfflineConfig) -> Self {
        Self {
            connectivity,
            cache: ResponseCache::new(),
            queue: ReplayQueue::new(config.max_queue_len),
            default_ttl: Duration::from_secs(config.default_cache_secs),
        }
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn queue(&self) -> &ReplayQueue {
        &self.queue
    }

    /// Run `operation` according to connectivity and `policy`.
    pub async fn offline_capable_request<T, F, Fut>(&self, operation: F, policy: &OfflinePolicy<T>) -> ApiResult<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ApiResult<T>> + Send + 'static,
    {
        if self.connectivity.is_online() {
            metrics::record_offline_decision("execute");
            let value = operation().await?;
            if let Some(key) = &policy.cache_key {
                match serde_json::to_value(&value) {
                    Ok(json) => self.cache.insert(key, json),
                    Err(e) => tracing::debug!(cache_key = %key, error = %e, "Response not cacheable"),
                }
            }
            return Ok(value);
        }

        if let Some(key) = &policy.cache_key {
            let ttl = policy.cache_duration.unwrap_or(self.default_ttl);
            if let Some(json) = self.cache.get_fresh(key, ttl) {
                match serde_json::from_value::<T>(json) {
                    Ok(value) => {
                        tracing::debug!(cache_key = %key, "Offline, serving cached response");
                        metrics::record_offline_decision("cache");
                        return Ok(value);
                    }
                    Err(e) => {
                        tracing::warn!(cache_key = %key, error = %e, "Cached response no longer decodes");
                    }
                }
            }
        }

        if let Some(fallback) = &policy.fallback {
            tracing::debug!("Offline, serving fallback value");
            metrics::record_offline_decision("fallback");
            return Ok(fallback());
        }

        if policy.queue_if_offline {
            let label = policy.cache_key.clone().unwrap_or_else(|| "deferred request".to_string());
            self.queue
                .enqueue(label, Box::new(move || operation().map(|result| result.map(|_| ())).boxed()));
            metrics::record_offline_decision("queued");
            return Err(ApiError::OfflineQueued);
        }

        metrics::record_offline_decision("rejected");
        Err(ApiError::Offline)
    }

    /// Replay the queue every time connectivity returns, until cancelled.
    pub fn start_replay_worker(&self) -> ScheduledTask {
        let queue = self.queue.clone();
        let mut rx = self.connectivity.subscribe();

        ScheduledTask::spawn("offline-replay", move |cancel| async move {
            loop {
                let online = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    online = ConnectivityMonitor::wait_online(&mut rx) => online,
                };
                if !online {
                    break;
                }
                if queue.is_empty() {
                    continue;
                }

                let report = queue.replay().await;
                tracing::info!(
                    succeeded = report.succeeded,
                    failed = report.failed,
                    "Offline queue replayed"
                );
            }
        })
    }
}
