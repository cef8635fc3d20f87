//! Collection error types
//!
//! Compiler errors bubble through unchanged; document store failures are
//! wrapped with the operation and resource while keeping the original error
//! as the source.

use thiserror::Error;

use crate::query::{ErrorCategory, QueryError};

/// Result type for collection operations
pub type CollectionResult<T> = Result<T, CollectionError>;

/// Failure reported by a document store client
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StoreError {
    /// Human-readable message
    pub message: String,
    /// Status code reported by the store, if any
    pub status: Option<u16>,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(message: impl Into<String>, status: u16) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
        }
    }
}

/// Collection errors
#[derive(Debug, Error)]
pub enum CollectionError {
    /// Compilation or validation failure
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Delete without any condition tree
    #[error("Refusing to delete from '{collection}' without a condition tree")]
    EmptyDeleteFilter { collection: String },

    /// Unpaginated list materialized too many rows
    #[error("Result set too large in '{collection}': {rows} rows exceeds {max} without pagination")]
    ResultSetTooLarge {
        collection: String,
        rows: usize,
        max: usize,
    },

    /// Operation not available on this collection
    #[error("Operation not supported on '{collection}': {operation}")]
    OperationNotSupported {
        collection: String,
        operation: String,
    },

    /// Record lacks the field linking it to its parent
    #[error("Record for '{collection}' is missing parent id field '{field}'")]
    MissingParentId { collection: String, field: String },

    /// Parent document does not exist
    #[error("Parent '{parent_id}' not found for '{collection}'")]
    ParentNotFound {
        collection: String,
        parent_id: String,
    },

    /// Parent collection has been dropped
    #[error("Parent collection of '{collection}' is no longer available")]
    ParentUnavailable { collection: String },

    /// Record is not shaped as expected
    #[error("Invalid record for '{collection}': {reason}")]
    InvalidRecord { collection: String, reason: String },

    /// Document store failure with context
    #[error("{operation} failed on '{resource}': {source}")]
    Store {
        operation: String,
        resource: String,
        #[source]
        source: StoreError,
    },
}

impl CollectionError {
    /// Wraps a store error with the failing operation and resource
    pub fn store(
        operation: impl Into<String>,
        resource: impl Into<String>,
        source: StoreError,
    ) -> Self {
        Self::Store {
            operation: operation.into(),
            resource: resource.into(),
            source,
        }
    }

    /// Get error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::Query(err) => err.code().code(),
            Self::EmptyDeleteFilter { .. } => "COSMOS_EMPTY_DELETE_FILTER",
            Self::ResultSetTooLarge { .. } => "COSMOS_RESULT_SET_TOO_LARGE",
            Self::OperationNotSupported { .. } => "COSMOS_OPERATION_NOT_SUPPORTED",
            Self::MissingParentId { .. } => "COSMOS_MISSING_PARENT_ID",
            Self::ParentNotFound { .. } => "COSMOS_PARENT_NOT_FOUND",
            Self::ParentUnavailable { .. } => "COSMOS_PARENT_UNAVAILABLE",
            Self::InvalidRecord { .. } => "COSMOS_INVALID_RECORD",
            Self::Store { .. } => "COSMOS_STORE_FAILED",
        }
    }

    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Query(err) => err.category(),
            Self::EmptyDeleteFilter { .. } | Self::ResultSetTooLarge { .. } => {
                ErrorCategory::SafetyGuard
            }
            Self::OperationNotSupported { .. } => ErrorCategory::Unsupported,
            Self::MissingParentId { .. }
            | Self::ParentNotFound { .. }
            | Self::ParentUnavailable { .. }
            | Self::InvalidRecord { .. } => ErrorCategory::Structural,
            Self::Store { .. } => ErrorCategory::Store,
        }
    }
}
