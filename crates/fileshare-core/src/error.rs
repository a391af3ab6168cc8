//! Error types for fileshare

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the configuration store and share model
#[derive(Error, Debug)]
pub enum ShareError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("share '{0}' has no hash assigned")]
    MissingHash(String),

    #[error("invalid share path: {0}")]
    InvalidPath(String),

    #[error("invalid username: {0}")]
    InvalidName(String),

    #[error("no readable config among {tried:?}")]
    ConfigUnreadable { tried: Vec<PathBuf> },

    #[error("failed to persist config to {path:?}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    #[error("auth key is not set")]
    EmptyKey,

    #[error("auth key is not valid hex: {0}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ShareError>;

/// Status codes handed to the request layer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    BadRequest = 400,
    NotFound = 404,
    Conflict = 409,
    Internal = 500,
}

impl From<&ShareError> for ErrorCode {
    fn from(e: &ShareError) -> Self {
        match e {
            ShareError::NotFound(_) => ErrorCode::NotFound,
            ShareError::AlreadyExists(_) => ErrorCode::Conflict,
            ShareError::InvalidPath(_) | ShareError::InvalidName(_) => ErrorCode::BadRequest,
            ShareError::InvalidKey(_) => ErrorCode::BadRequest,
            ShareError::MissingHash(_)
            | ShareError::ConfigUnreadable { .. }
            | ShareError::Persistence { .. }
            | ShareError::EmptyKey
            | ShareError::Io(_)
            | ShareError::Json(_) => ErrorCode::Internal,
        }
    }
}

impl ShareError {
    /// Status code for this error when reported to a client
    pub fn code(&self) -> ErrorCode {
        ErrorCode::from(self)
    }
}
