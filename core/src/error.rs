use thiserror::Error;

/// Why a write was refused before reaching the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationFailure {
    MissingToken,
    InvalidToken,
    PermissionDenied,
}

impl std::fmt::Display for AuthorizationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            AuthorizationFailure::MissingToken => "missing token",
            AuthorizationFailure::InvalidToken => "invalid token",
            AuthorizationFailure::PermissionDenied => "permission denied",
        };
        f.write_str(text)
    }
}

#[derive(Error, Debug)]
pub enum PostNotesError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Authorization error: {0}")]
    Authorization(AuthorizationFailure),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid item ID: {0}")]
    InvalidItemId(String),

    #[error("IPC error: {0}")]
    Ipc(String),

    #[error("Connection lost")]
    ConnectionLost,

    #[error("Invalid message format")]
    InvalidMessage,
}

impl PostNotesError {
    /// True when the underlying store (or its file) failed
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            PostNotesError::Io(_) | PostNotesError::Json(_) | PostNotesError::Storage(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PostNotesError>;
