//! Navigation seam used for the forced-logout redirect.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// The routing collaborator the session manager redirects through.
pub trait Navigator: Send + Sync {
    fn current_route(&self) -> String;

    fn redirect(&self, route: &str);
}

/// Navigator that tracks the current route in memory.
///
/// Suitable for headless use (CLI, tests); a UI shell supplies its own.
#[derive(Debug)]
pub struct RouteTracker {
    current: Mutex<String>,
    redirects: AtomicUsize,
}

impl RouteTracker {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            current: Mutex::new(initial.into()),
            redirects: AtomicUsize::new(0),
        }
    }

    /// Record a user-initiated navigation.
    pub fn navigate(&self, route: impl Into<String>) {
        *self.lock() = route.into();
    }

    /// Number of redirects performed so far.
    pub fn redirect_count(&self) -> usize {
        self.redirects.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, String> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for RouteTracker {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Navigator for RouteTracker {
    fn current_route(&self) -> String {
        self.lock().clone()
    }

    fn redirect(&self, route: &str) {
        tracing::info!(route = %route, "Redirecting");
        *self.lock() = route.to_string();
        self.redirects.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_tracker() {
        let nav = RouteTracker::new("/dashboard");
        assert_eq!(nav.current_route(), "/dashboard");

        nav.redirect("/login");
        assert_eq!(nav.current_route(), "/login");
        assert_eq!(nav.redirect_count(), 1);

        nav.navigate("/classes");
        assert_eq!(nav.current_route(), "/classes");
        assert_eq!(nav.redirect_count(), 1);
    }
}
