//! Lock service error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock store unavailable: {0}")]
    Unavailable(String),

    #[error("lock {lock_id} on '{resource}' is no longer held by this owner")]
    NotHolder { resource: String, lock_id: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
