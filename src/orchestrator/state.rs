//! Observable per-call state.

use crate::transport::error::ApiError;

/// State published by one orchestrator instance.
///
/// After a settled call exactly one of `data` and `error` is set; both are
/// cleared while a call is loading.
#[derive(Debug, Clone, PartialEq)]
pub struct CallState<T> {
    pub data: Option<T>,
    pub error: Option<ApiError>,
    pub is_loading: bool,
    /// A retryable failure occurred and another attempt is scheduled.
    pub is_retrying: bool,
}

impl<T> CallState<T> {
    pub fn idle() -> Self {
        Self {
            data: None,
            error: None,
            is_loading: false,
            is_retrying: false,
        }
    }

    pub(crate) fn start(&mut self) {
        self.data = None;
        self.error = None;
        self.is_loading = true;
        self.is_retrying = false;
    }

    pub(crate) fn succeed(&mut self, data: T) {
        self.data = Some(data);
        self.error = None;
        self.is_loading = false;
        self.is_retrying = false;
    }

    pub(crate) fn fail(&mut self, error: ApiError) {
        self.data = None;
        self.error = Some(error);
        self.is_loading = false;
        self.is_retrying = false;
    }

    /// The call was torn down before settling.
    pub(crate) fn abandon(&mut self) {
        self.is_loading = false;
        self.is_retrying = false;
    }

    pub fn is_settled(&self) -> bool {
        !self.is_loading && (self.data.is_some() || self.error.is_some())
    }
}

impl<T> Default for CallState<T> {
    fn default() -> Self {
        Self::idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_keep_data_and_error_exclusive() {
        let mut state = CallState::idle();
        state.succeed(1);
        assert!(state.is_settled());

        state.start();
        assert_eq!(state.data, None);
        assert!(state.is_loading);
        assert!(!state.is_settled());

        state.fail(ApiError::Offline);
        assert_eq!(state.data, None);
        assert_eq!(state.error, Some(ApiError::Offline));
        assert!(state.is_settled());

        state.start();
        state.abandon();
        assert!(!state.is_loading);
        assert!(!state.is_settled());
    }
}
