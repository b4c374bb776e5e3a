//! Error taxonomy shared by every engine component

use crate::models::ItemId;
use thiserror::Error;

/// Errors raised by feature engineering, similarity, storage and queries
#[derive(Error, Debug)]
pub enum RecsysError {
    #[error("Item not found: {item_id}")]
    NotFound { item_id: ItemId },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Uninitialized state: {message}")]
    UninitializedState { message: String },

    #[error("Artifact corruption: {message}")]
    ArtifactCorruption { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RecsysError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn uninitialized(message: impl Into<String>) -> Self {
        Self::UninitializedState {
            message: message.into(),
        }
    }

    pub fn corruption(message: impl Into<String>) -> Self {
        Self::ArtifactCorruption {
            message: message.into(),
        }
    }

    /// Per-request conditions the caller is expected to handle during normal
    /// operation. Everything else means the engine is not serving.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::InvalidInput { .. })
    }
}
