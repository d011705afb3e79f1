use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("core error: {0}")]
    Core(#[from] tif_core::TifError),

    #[error("duplicate key '{0}': a record with this id already exists")]
    DuplicateKey(String),

    #[error("version conflict on '{name}': expected seq_no {expected}")]
    VersionConflict { name: String, expected: u64 },

    #[error("not found: {0}")]
    NotFound(String),
}

/// Failures of one feed fetch.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid source config: {0}")]
    InvalidConfig(String),

    #[error("feed source unreachable: {0}")]
    Source(#[from] object_store::Error),

    #[error("malformed IOC in {key} line {line}: {reason}")]
    Malformed { key: String, line: usize, reason: String },

    #[error("feed object {key} is not valid UTF-8")]
    Encoding { key: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("bulk write to {index} failed for {failed} of {total} records")]
    PartialWrite { index: String, failed: usize, total: usize },
}
