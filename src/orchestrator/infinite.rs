//! Cumulative paginated queries.
//!
//! # Responsibilities
//! - Fetch the next page on demand and append its items
//! - Suppress `load_more` while a page is loading or when no more pages exist
//! - Reset the cursor and accumulated items, cancelling any in-flight page

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::orchestrator::call::{Call, CallContext, CallOptions, Payload};
use crate::resilience::Outcome;
use crate::transport::error::{ApiError, ApiResult};

/// Number of the first page requested.
pub const FIRST_PAGE: u32 = 1;

/// One page as returned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<I> {
    pub items: Vec<I>,
    #[serde(default, alias = "hasMore")]
    pub has_more: bool,
}

/// Accumulated pagination state.
#[derive(Debug, Clone, PartialEq)]
pub struct InfiniteState<I> {
    pub items: Vec<I>,
    pub next_page: u32,
    pub has_more: bool,
    pub is_loading: bool,
    pub error: Option<ApiError>,
}

impl<I> Default for InfiniteState<I> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            next_page: FIRST_PAGE,
            has_more: true,
            is_loading: false,
            error: None,
        }
    }
}

/// Clears the loading flag unless a reset already did.
struct LoadingGuard<'a> {
    loading: &'a AtomicBool,
    generation: &'a AtomicU64,
    started_in: u64,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.generation.load(Ordering::SeqCst) == self.started_in {
            self.loading.store(false, Ordering::SeqCst);
        }
    }
}

/// A paginated query accumulating items across pages.
pub struct InfiniteQuery<I> {
    call: Call<u32, Page<I>>,
    loading: AtomicBool,
    generation: AtomicU64,
    state: watch::Sender<InfiniteState<I>>,
}

impl<I> InfiniteQuery<I>
where
    I: Payload,
{
    /// `fetch_page` receives the 1-based page number to load.
    pub fn new<F, Fut>(context: CallContext, fetch_page: F, options: CallOptions<Page<I>>) -> Self
    where
        F: Fn(u32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<Page<I>>> + Send + 'static,
    {
        let (state, _) = watch::channel(InfiniteState::default());
        Self {
            call: Call::new(context, fetch_page, options),
            loading: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            state,
        }
    }

    pub fn state(&self) -> InfiniteState<I> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<InfiniteState<I>> {
        self.state.subscribe()
    }

    pub fn items(&self) -> Vec<I> {
        self.state.borrow().items.clone()
    }

    pub fn has_more(&self) -> bool {
        self.state.borrow().has_more
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// Fetch the next page. `None` when suppressed.
    pub async fn load_more(&self) -> Option<Outcome<Page<I>>> {
        if self.loading.swap(true, Ordering::SeqCst) {
            tracing::trace!("Page already loading, load_more suppressed");
            return None;
        }
        let generation = self.generation.load(Ordering::SeqCst);
        let _guard = LoadingGuard {
            loading: &self.loading,
            generation: &self.generation,
            started_in: generation,
        };

        let (page, has_more) = {
            let state = self.state.borrow();
            (state.next_page, state.has_more)
        };
        if !has_more {
            return None;
        }

        self.state.send_modify(|s| {
            s.is_loading = true;
            s.error = None;
        });

        let outcome = self.call.execute(page).await;

        if self.generation.load(Ordering::SeqCst) == generation {
            self.state.send_modify(|s| {
                s.is_loading = false;
                match &outcome {
                    Outcome::Success(fetched) => {
                        s.items.extend(fetched.items.iter().cloned());
                        s.next_page = page + 1;
                        s.has_more = fetched.has_more;
                    }
                    Outcome::Failure(error) => s.error = Some(error.clone()),
                    Outcome::Cancelled => {}
                }
            });
        }

        Some(outcome)
    }

    /// Clear the cursor and accumulated items, cancelling any in-flight page.
    pub fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.call.cancel();
        self.state.send_replace(InfiniteState::default());
        self.loading.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;
    use std::time::Duration;

    fn paged(calls: &Arc<AtomicU32>, pages: u32) -> InfiniteQuery<u32> {
        let calls = calls.clone();
        InfiniteQuery::new(
            CallContext::standalone(),
            move |page: u32| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(Page {
                        items: vec![page * 10, page * 10 + 1],
                        has_more: page < pages,
                    })
                }
            },
            CallOptions::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_pages_accumulate_until_exhausted() {
        let calls = Arc::new(AtomicU32::new(0));
        let query = paged(&calls, 2);

        assert!(query.load_more().await.unwrap().is_success());
        assert!(query.load_more().await.unwrap().is_success());
        assert!(query.load_more().await.is_none());

        let state = query.state();
        assert_eq!(state.items, vec![10, 11, 20, 21]);
        assert_eq!(state.next_page, 3);
        assert!(!state.has_more);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_load_more_fetches_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let query = paged(&calls, 5);

        let (first, second) = tokio::join!(query.load_more(), query.load_more());
        assert!(first.unwrap().is_success());
        assert!(second.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(query.items(), vec![10, 11]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_cancels_and_clears() {
        let calls = Arc::new(AtomicU32::new(0));
        let query = Arc::new(paged(&calls, 5));

        assert!(query.load_more().await.unwrap().is_success());

        let pending = {
            let query = query.clone();
            tokio::spawn(async move { query.load_more().await })
        };
        let mut rx = query.subscribe();
        rx.wait_for(|s| s.is_loading).await.unwrap();

        query.reset();
        assert_eq!(pending.await.unwrap(), Some(Outcome::Cancelled));

        let state = query.state();
        assert!(state.items.is_empty());
        assert_eq!(state.next_page, FIRST_PAGE);
        assert!(state.has_more);
        assert!(!query.is_loading());

        assert!(query.load_more().await.unwrap().is_success());
        assert_eq!(query.items(), vec![10, 11]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_page_keeps_cursor() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let query: InfiniteQuery<u32> = InfiniteQuery::new(
            CallContext::standalone(),
            move |page: u32| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(ApiError::Http {
                            status: 400,
                            message: "bad page".into(),
                        })
                    } else {
                        Ok(Page {
                            items: vec![page],
                            has_more: true,
                        })
                    }
                }
            },
            CallOptions::new(),
        );

        assert!(query.load_more().await.unwrap().is_failure());
        assert_eq!(query.state().next_page, FIRST_PAGE);
        assert!(query.state().error.is_some());

        assert!(query.load_more().await.unwrap().is_success());
        assert_eq!(query.items(), vec![FIRST_PAGE]);
        assert!(query.state().error.is_none());
    }

    #[test]
    fn test_page_accepts_camel_case() {
        let page: Page<u8> = serde_json::from_str(r#"{"items":[1],"hasMore":true}"#).unwrap();
        assert!(page.has_more);
    }
}
