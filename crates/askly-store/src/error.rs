use thiserror::Error;

/// Storage error type
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session not found: {id}")]
    SessionNotFound { id: String },

    #[error("Storage error: {message}")]
    Other { message: String },
}

impl StorageError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

/// Storage result type
pub type StorageResult<T> = Result<T, StorageError>;
