//! Clip materialization error types.

use thiserror::Error;

use framelab_dataset::DatasetError;
use framelab_models::SupportError;
use framelab_store::StoreError;

/// Result type for clip operations.
pub type ClipsResult<T> = Result<T, ClipsError>;

/// Errors that can occur while materializing or synchronizing clips.
#[derive(Debug, Error)]
pub enum ClipsError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid clip support: {0}")]
    Support(#[from] SupportError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ClipsError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
