//! Core primitives for the arbor storage backends.

/// The common backend error.
///
/// Every capability trait (expressions, tasks, schedules) reports through this
/// type so the state machine can propagate storage faults with `?`.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// Utility type alias for backend results.
pub type BackendResult<T> = Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_error_converts() {
        let err = serde_json::from_str::<serde_json::Value>("{").expect_err("invalid json");
        let backend: BackendError = err.into();
        assert!(matches!(backend, BackendError::Serialization(_)));
    }
}
