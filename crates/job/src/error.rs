use thiserror::Error;

use tif_core::TifError;
use tif_lock::LockError;
use tif_storage::{FetchError, StorageError};

/// Terminal outcome of a failed put-job request.
#[derive(Error, Debug)]
pub enum JobError {
    /// Another node holds the lock on this job name. Retry later.
    #[error("another processor is holding a lock on the resource. Try again later")]
    Contention(String),

    #[error("job '{0}' already exists")]
    AlreadyExists(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    #[error("store error: {0}")]
    Store(#[from] StorageError),

    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("{0}")]
    Internal(String),
}

impl From<TifError> for JobError {
    fn from(e: TifError) -> Self {
        Self::InvalidRequest(e.to_string())
    }
}

impl JobError {
    /// Map to an HTTP status code for API responses.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Contention(_) | Self::AlreadyExists(_) => 409,
            Self::Forbidden(_) => 403,
            Self::InvalidRequest(_) => 400,
            Self::Lock(_) | Self::Store(_) | Self::Fetch(_) | Self::Internal(_) => 500,
        }
    }

    /// Whether the same request may succeed if retried later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Contention(_) | Self::Lock(LockError::Unavailable(_)))
    }
}
