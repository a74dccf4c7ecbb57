/// Core error types for Starling
use thiserror::Error;

/// Result type alias using `StarlingError`
pub type Result<T> = std::result::Result<T, StarlingError>;

/// Core error type for Starling
#[derive(Error, Debug)]
pub enum StarlingError {
    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Remote source errors
    #[error("Source error: {0}")]
    Source(String),

    /// Entity not found
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl StarlingError {
    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a source error
    pub fn source(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    /// Create a not found error
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }
}
