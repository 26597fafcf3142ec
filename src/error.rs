//! Error types for contact resolution.
//!
//! All errors are strongly typed using thiserror so callers can match on
//! the exact failure. Store failures are carried unchanged inside
//! [`ResolverError::StoreUnavailable`]; the engine never retries them.

use thiserror::Error;

use crate::storage::StorageError;

/// Validation errors that occur during input validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Customer name cannot be empty")]
    EmptyName,

    #[error("Customer name '{raw}' has no matchable content after normalization")]
    NoMatchableContent {
        raw: String,
    },

    #[error("Identifier '{field}' cannot be empty")]
    EmptyIdentifier {
        field: &'static str,
    },

    #[error("Confidence value {value} is out of range [0.0, 1.0]")]
    ConfidenceOutOfRange {
        value: f64,
    },

    #[error("Contact {id} does not exist or is not visible from scope {scope}")]
    UnknownContact {
        id: String,
        scope: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Execution errors raised by the worker-pool runtime.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Queue full for {path} path (capacity {capacity})")]
    QueueFull {
        path: String,
        capacity: usize,
    },

    #[error("Worker pool disconnected for {path} path")]
    Disconnected {
        path: String,
    },
}

/// Top-level error type for the resolution engine.
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StorageError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl ResolverError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if a backing store failed.
    #[must_use]
    pub const fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// Returns true if this is a runtime execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if the caller may reasonably retry the same request.
    ///
    /// The engine itself never retries; this is a hint for orchestrators.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Internal { .. } => false,
            Self::StoreUnavailable(e) => matches!(
                e,
                StorageError::ConnectionError(_) | StorageError::Inconsistent(_)
            ),
            Self::Execution(e) => matches!(
                e,
                ExecutionError::Timeout { .. } | ExecutionError::QueueFull { .. }
            ),
        }
    }
}

/// Result type alias for resolution operations.
pub type ResolverResult<T> = Result<T, ResolverError>;
