//! User-visible notifications.
//!
//! # Responsibilities
//! - Carry one message per settled call to whatever renders notifications
//! - Collapse identical messages repeated within a short window
//!
//! # Design Decisions
//! - Only settled calls notify; scheduled retries never do
//! - Rendering is an external concern; the default sink logs

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Success,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Success,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Error,
            message: message.into(),
        }
    }
}

/// Sink for user-visible notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification.kind {
            NotificationKind::Error => tracing::warn!(message = %notification.message, "Notification"),
            _ => tracing::info!(message = %notification.message, "Notification"),
        }
    }
}

/// Drops a notification identical to the previous one within `window`.
pub struct DedupNotifier {
    inner: Arc<dyn Notifier>,
    window: Duration,
    last: Mutex<Option<(Notification, Instant)>>,
}

impl DedupNotifier {
    pub fn new(inner: Arc<dyn Notifier>, window: Duration) -> Self {
        Self {
            inner,
            window,
            last: Mutex::new(None),
        }
    }
}

impl std::fmt::Debug for DedupNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupNotifier").field("window", &self.window).finish()
    }
}

impl Notifier for DedupNotifier {
    fn notify(&self, notification: Notification) {
        let now = Instant::now();
        {
            let mut last = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some((previous, at)) = last.as_ref() {
                if *previous == notification && now.duration_since(*at) < self.window {
                    tracing::trace!(message = %notification.message, "Duplicate notification suppressed");
                    return;
                }
            }
            *last = Some((notification.clone(), now));
        }
        self.inner.notify(notification);
    }
}
