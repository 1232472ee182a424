//! Dataset error types.

use thiserror::Error;

use framelab_store::StoreError;

/// Result type for dataset operations.
pub type DatasetResult<T> = Result<T, DatasetError>;

/// Errors that can occur during dataset operations.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Field '{field}' not found")]
    FieldNotFound { field: String },

    #[error("Field '{field}' must be one of [{}]; found {found}", supported.join(", "))]
    UnsupportedLabelType {
        field: String,
        found: String,
        supported: Vec<String>,
    },

    #[error("Expected a {expected} collection; found {found}")]
    MediaType { expected: String, found: String },

    #[error("Dataset name '{0}' is already in use")]
    NameInUse(String),

    #[error("Dataset '{0}' does not exist")]
    DoesNotExist(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl DatasetError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn field_not_found(field: impl Into<String>) -> Self {
        Self::FieldNotFound {
            field: field.into(),
        }
    }
}
