//! Durable store for job parameter records.
//!
//! Records are keyed by job name. Creation is create-only (a second create of
//! the same name is a [`StorageError::DuplicateKey`]); updates are guarded by
//! the record's `seq_no` so a stale snapshot cannot overwrite a newer one.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{error, info};

use tif_core::{JobParameter, JOB_INDEX_NAME};

use crate::error::StorageError;

#[async_trait]
pub trait JobParameterStore: Send + Sync {
    /// Create the backing index (table) if missing. Idempotent.
    async fn ensure_index_exists(&self) -> Result<(), StorageError>;

    /// Persist a new record. Returns it with its assigned `seq_no`.
    async fn create_if_absent(&self, job: &JobParameter) -> Result<JobParameter, StorageError>;

    /// Overwrite an existing record whose stored `seq_no` equals `job.seq_no`.
    /// Returns the record with its bumped `seq_no`.
    async fn update_existing(&self, job: &JobParameter) -> Result<JobParameter, StorageError>;

    async fn get(&self, name: &str) -> Result<Option<JobParameter>, StorageError>;

    async fn delete(&self, name: &str) -> Result<(), StorageError>;
}

// ── In-memory ────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryJobParameterStore {
    index_created: Mutex<bool>,
    records: Mutex<HashMap<String, JobParameter>>,
}

impl InMemoryJobParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index_exists(&self) -> bool {
        *self.index_created.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl JobParameterStore for InMemoryJobParameterStore {
    async fn ensure_index_exists(&self) -> Result<(), StorageError> {
        *self.index_created.lock().unwrap_or_else(|e| e.into_inner()) = true;
        Ok(())
    }

    async fn create_if_absent(&self, job: &JobParameter) -> Result<JobParameter, StorageError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        if records.contains_key(&job.name) {
            return Err(StorageError::DuplicateKey(job.name.clone()));
        }
        let stored = JobParameter { seq_no: 1, ..job.clone() };
        records.insert(job.name.clone(), stored.clone());
        Ok(stored)
    }

    async fn update_existing(&self, job: &JobParameter) -> Result<JobParameter, StorageError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let current = records
            .get_mut(&job.name)
            .ok_or_else(|| StorageError::NotFound(job.name.clone()))?;
        if current.seq_no != job.seq_no {
            return Err(StorageError::VersionConflict {
                name: job.name.clone(),
                expected: job.seq_no,
            });
        }
        *current = JobParameter { seq_no: job.seq_no + 1, ..job.clone() };
        Ok(current.clone())
    }

    async fn get(&self, name: &str) -> Result<Option<JobParameter>, StorageError> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(name).cloned())
    }

    async fn delete(&self, name: &str) -> Result<(), StorageError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }
}

// ── PostgreSQL ───────────────────────────────────────────────

/// Job records as JSONB documents in a table named after [`JOB_INDEX_NAME`].
pub struct PgJobParameterStore {
    pool: PgPool,
}

impl PgJobParameterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn table() -> String {
    format!("\"{}\"", JOB_INDEX_NAME)
}

#[async_trait]
impl JobParameterStore for PgJobParameterStore {
    async fn ensure_index_exists(&self) -> Result<(), StorageError> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                name       TEXT PRIMARY KEY,
                seq_no     BIGINT NOT NULL,
                doc        JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            table()
        );
        sqlx::query(&ddl).execute(&self.pool).await?;
        info!(index = JOB_INDEX_NAME, "job parameter index ready");
        Ok(())
    }

    async fn create_if_absent(&self, job: &JobParameter) -> Result<JobParameter, StorageError> {
        let stored = JobParameter { seq_no: 1, ..job.clone() };
        let doc = serde_json::to_value(&stored)?;

        let sql = format!("INSERT INTO {} (name, seq_no, doc) VALUES ($1, $2, $3)", table());
        let result = sqlx::query(&sql)
            .bind(&stored.name)
            .bind(stored.seq_no as i64)
            .bind(&doc)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(stored),
            Err(e) => Err(map_unique_violation(e, &job.name)),
        }
    }

    async fn update_existing(&self, job: &JobParameter) -> Result<JobParameter, StorageError> {
        let stored = JobParameter { seq_no: job.seq_no + 1, ..job.clone() };
        let doc = serde_json::to_value(&stored)?;

        let sql = format!(
            "UPDATE {} SET seq_no = $2, doc = $3, updated_at = now()
             WHERE name = $1 AND seq_no = $4",
            table()
        );
        let result = sqlx::query(&sql)
            .bind(&stored.name)
            .bind(stored.seq_no as i64)
            .bind(&doc)
            .bind(job.seq_no as i64)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return match self.get(&job.name).await? {
                Some(_) => Err(StorageError::VersionConflict {
                    name: job.name.clone(),
                    expected: job.seq_no,
                }),
                None => Err(StorageError::NotFound(job.name.clone())),
            };
        }
        Ok(stored)
    }

    async fn get(&self, name: &str) -> Result<Option<JobParameter>, StorageError> {
        let sql = format!("SELECT doc FROM {} WHERE name = $1", table());
        let row: Option<(serde_json::Value,)> = sqlx::query_as(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some((doc,)) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, name: &str) -> Result<(), StorageError> {
        let sql = format!("DELETE FROM {} WHERE name = $1", table());
        let result = sqlx::query(&sql).bind(name).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(name.to_string()));
        }
        Ok(())
    }
}

// ── Helpers ──────────────────────────────────────────────────

/// Map a PostgreSQL unique violation (23505) to `DuplicateKey`.
fn map_unique_violation(e: sqlx::Error, name: &str) -> StorageError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.code().as_deref() == Some("23505") {
            return StorageError::DuplicateKey(name.to_string());
        }
    }
    error!("job parameter store database error: {}", e);
    StorageError::Database(e)
}
