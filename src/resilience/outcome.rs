//! Tagged call outcome.

use crate::transport::error::{ApiError, ApiResult};

/// Result of a cancellable call.
///
/// `Cancelled` means the call was superseded or torn down; it is neither a
/// success nor a failure and must not be reported as either.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Success(T),
    Failure(ApiError),
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    /// `None` when cancelled.
    pub fn into_result(self) -> Option<ApiResult<T>> {
        match self {
            Outcome::Success(value) => Some(Ok(value)),
            Outcome::Failure(err) => Some(Err(err)),
            Outcome::Cancelled => None,
        }
    }

    pub fn error(&self) -> Option<&ApiError> {
        match self {
            Outcome::Failure(err) => Some(err),
            _ => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::Failure(err) => Outcome::Failure(err),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }
}

impl<T> From<ApiResult<T>> for Outcome<T> {
    fn from(result: ApiResult<T>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(err) => Outcome::Failure(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        let ok: Outcome<u8> = Ok(3).into();
        assert_eq!(ok.clone().into_result(), Some(Ok(3)));
        assert_eq!(ok.map(|v| v * 2), Outcome::Success(6));

        let err: Outcome<u8> = Err(ApiError::Offline).into();
        assert!(err.is_failure());
        assert_eq!(err.error(), Some(&ApiError::Offline));

        let cancelled: Outcome<u8> = Outcome::Cancelled;
        assert!(cancelled.is_cancelled());
        assert_eq!(cancelled.into_result(), None);
    }
}
