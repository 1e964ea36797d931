//! Backend Errors
//!
//! `TigerStyle`: Explicit error types with context.

use thiserror::Error;

use super::BackendId;

/// Errors from backend operations.
///
/// These never cross the [`StorageManager`](crate::manager::StorageManager)
/// boundary; the protocols convert them into results.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Key-value quota would be exceeded by a write
    #[error("quota exceeded writing {key}: needs {needed_bytes} bytes, quota {quota_bytes}")]
    QuotaExceeded {
        /// Key being written
        key: String,
        /// Total bytes the store would hold after the write
        needed_bytes: usize,
        /// Configured quota
        quota_bytes: usize,
    },

    /// An object store transaction aborted or errored
    #[error("transaction aborted for {id}: {reason}")]
    TransactionAborted {
        /// Entry id of the failed transaction
        id: String,
        /// Abort reason
        reason: String,
    },

    /// Stored data could not be parsed
    #[error("malformed stored data at {key}: {reason}")]
    MalformedStoredData {
        /// Key or entry id holding the data
        key: String,
        /// Parse failure
        reason: String,
    },

    /// The backend cannot be used in this environment
    #[error("{backend} unavailable: {reason}")]
    Unavailable {
        /// Which backend
        backend: BackendId,
        /// Why it cannot be used
        reason: String,
    },

    /// Key or entry id is not acceptable
    #[error("invalid key: {reason}")]
    InvalidKey {
        /// Why the key was rejected
        reason: String,
    },

    /// Underlying I/O failure
    #[error("io error: {0}")]
    Io(String),

    /// Encoding of a value failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Simulated fault (for DST)
    #[error("simulated fault: {fault_type}")]
    SimulatedFault {
        /// Type of simulated fault
        fault_type: String,
    },
}

impl BackendError {
    /// Create a quota exceeded error.
    #[must_use]
    pub fn quota_exceeded(key: impl Into<String>, needed_bytes: usize, quota_bytes: usize) -> Self {
        Self::QuotaExceeded {
            key: key.into(),
            needed_bytes,
            quota_bytes,
        }
    }

    /// Create a transaction aborted error.
    #[must_use]
    pub fn transaction_aborted(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransactionAborted {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Create a malformed data error.
    #[must_use]
    pub fn malformed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedStoredData {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create an unavailable backend error.
    #[must_use]
    pub fn unavailable(backend: BackendId, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            backend,
            reason: reason.into(),
        }
    }

    /// Create an invalid key error.
    #[must_use]
    pub fn invalid_key(reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            reason: reason.into(),
        }
    }

    /// Create a simulated fault error.
    #[must_use]
    pub fn simulated_fault(fault_type: impl Into<String>) -> Self {
        Self::SimulatedFault {
            fault_type: fault_type.into(),
        }
    }

    /// Check if this is a transient error (the same write may succeed on retry).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TransactionAborted { .. } | Self::SimulatedFault { .. }
        )
    }

    /// Check if this is a capacity error.
    #[must_use]
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_constructors() {
        let err = BackendError::quota_exceeded("k", 10, 5);
        assert!(matches!(
            err,
            BackendError::QuotaExceeded { ref key, needed_bytes: 10, quota_bytes: 5 } if key == "k"
        ));

        let err = BackendError::malformed("batch_3", "eof");
        assert_eq!(err.to_string(), "malformed stored data at batch_3: eof");
    }

    #[test]
    fn test_is_transient() {
        assert!(BackendError::transaction_aborted("batch_0", "abort").is_transient());
        assert!(BackendError::simulated_fault("write").is_transient());

        assert!(!BackendError::quota_exceeded("k", 1, 0).is_transient());
        assert!(!BackendError::unavailable(BackendId::ObjectStore, "none").is_transient());
        assert!(!BackendError::malformed("k", "bad").is_transient());
    }

    #[test]
    fn test_unavailable_display_names_backend() {
        let err = BackendError::unavailable(BackendId::KeyValue, "disabled");
        assert_eq!(err.to_string(), "localStorage unavailable: disabled");
    }
}
