//! Replay queue for operations deferred while offline.
//!
//! Operations are held in memory in FIFO order and replayed, one at a time,
//! when connectivity returns. The queue is bounded; when full the oldest
//! operation is dropped.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use tokio::time::Instant;

use crate::observability::metrics;
use crate::transport::error::ApiResult;

/// A deferred operation. Its result is discarded on replay.
pub type DeferredOp = Box<dyn FnOnce() -> BoxFuture<'static, ApiResult<()>> + Send>;

struct QueuedRequest {
    label: String,
    queued_at: Instant,
    op: DeferredOp,
}

/// Summary of one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub succeeded: usize,
    pub failed: usize,
}

/// Bounded FIFO of deferred operations.
#[derive(Clone)]
pub struct ReplayQueue {
    inner: Arc<Mutex<VecDeque<QueuedRequest>>>,
    capacity: usize,
}

impl std::fmt::Debug for ReplayQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl ReplayQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }

    /// Enqueue an operation for replay.
    pub fn enqueue(&self, label: impl Into<String>, op: DeferredOp) {
        let label = label.into();
        let mut queue = self.lock();

        if queue.len() >= self.capacity {
            if let Some(dropped) = queue.pop_front() {
                tracing::warn!(
                    dropped = %dropped.label,
                    capacity = self.capacity,
                    "Offline queue full, dropping oldest request"
                );
            }
        }

        tracing::info!(request = %label, depth = queue.len() + 1, "Request queued for replay");
        queue.push_back(QueuedRequest {
            label,
            queued_at: Instant::now(),
            op,
        });
        metrics::record_queue_depth(queue.len());
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Labels of queued requests, oldest first.
    pub fn labels(&self) -> Vec<String> {
        self.lock().iter().map(|r| r.label.clone()).collect()
    }

    /// Replay every queued operation in order.
    ///
    /// Operations enqueued while the replay runs wait for the next pass.
    pub async fn replay(&self) -> ReplayReport {
        let pending: Vec<QueuedRequest> = {
            let mut queue = self.lock();
            let drained = queue.drain(..).collect();
            metrics::record_queue_depth(0);
            drained
        };

        let mut report = ReplayReport::default();
        for request in pending {
            let waited = request.queued_at.elapsed();
            match (request.op)().await {
                Ok(()) => {
                    tracing::info!(request = %request.label, waited = ?waited, "Replayed queued request");
                    report.succeeded += 1;
                }
                Err(e) => {
                    tracing::warn!(request = %request.label, error = %e, "Replay of queued request failed");
                    report.failed += 1;
                }
            }
        }

        report
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<QueuedRequest>> {
        // A panic while holding the lock leaves the deque itself consistent.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::error::ApiError;
    use futures_util::FutureExt;

    fn recording_op(log: Arc<Mutex<Vec<&'static str>>>, name: &'static str, ok: bool) -> DeferredOp {
        Box::new(move || {
            async move {
                log.lock().unwrap().push(name);
                if ok {
                    Ok(())
                } else {
                    Err(ApiError::Http {
                        status: 500,
                        message: "boom".into(),
                    })
                }
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn test_replay_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let queue = ReplayQueue::new(10);

        queue.enqueue("a", recording_op(log.clone(), "a", true));
        queue.enqueue("b", recording_op(log.clone(), "b", false));
        queue.enqueue("c", recording_op(log.clone(), "c", true));
        assert_eq!(queue.len(), 3);

        let report = queue.replay().await;
        assert_eq!(report, ReplayReport { succeeded: 2, failed: 1 });
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_capacity_drops_oldest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let queue = ReplayQueue::new(2);

        queue.enqueue("a", recording_op(log.clone(), "a", true));
        queue.enqueue("b", recording_op(log.clone(), "b", true));
        queue.enqueue("c", recording_op(log.clone(), "c", true));

        assert_eq!(queue.labels(), vec!["b".to_string(), "c".to_string()]);
        queue.replay().await;
        assert_eq!(*log.lock().unwrap(), vec!["b", "c"]);
    }
}
