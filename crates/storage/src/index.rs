//! Per-feed IOC indices.
//!
//! Every source config gets its own index named by
//! [`tif_core::feed_index_name`]. Writes are bulk and report per-item
//! failures instead of failing the whole batch, so the caller decides what a
//! partial write means.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{debug, info};

use tif_core::Ioc;

use crate::error::StorageError;

/// Metadata kept for each index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub source_config_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkItemFailure {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct BulkResponse {
    pub indexed: usize,
    pub failures: Vec<BulkItemFailure>,
}

impl BulkResponse {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

#[async_trait]
pub trait IocIndex: Send + Sync {
    /// Create `index` if it does not exist. Idempotent.
    async fn ensure_index(&self, index: &str, source_config_id: &str) -> Result<(), StorageError>;

    /// Write `iocs` into `index`, upserting by id.
    async fn bulk_index(&self, index: &str, iocs: &[Ioc]) -> Result<BulkResponse, StorageError>;

    /// All documents currently in `index`.
    async fn documents(&self, index: &str) -> Result<Vec<Ioc>, StorageError>;

    async fn index_info(&self, index: &str) -> Result<Option<IndexInfo>, StorageError>;
}

// ── In-memory ────────────────────────────────────────────────

struct MemoryIndex {
    info: IndexInfo,
    docs: BTreeMap<String, Ioc>,
}

#[derive(Default)]
pub struct InMemoryIocIndex {
    indices: Mutex<HashMap<String, MemoryIndex>>,
}

impl InMemoryIocIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IocIndex for InMemoryIocIndex {
    async fn ensure_index(&self, index: &str, source_config_id: &str) -> Result<(), StorageError> {
        let mut indices = self.indices.lock().unwrap_or_else(|e| e.into_inner());
        indices.entry(index.to_string()).or_insert_with(|| {
            debug!(index, "created in-memory IOC index");
            MemoryIndex {
                info: IndexInfo {
                    name: index.to_string(),
                    source_config_id: source_config_id.to_string(),
                    created_at: Utc::now(),
                },
                docs: BTreeMap::new(),
            }
        });
        Ok(())
    }

    async fn bulk_index(&self, index: &str, iocs: &[Ioc]) -> Result<BulkResponse, StorageError> {
        let mut indices = self.indices.lock().unwrap_or_else(|e| e.into_inner());
        let target = indices
            .get_mut(index)
            .ok_or_else(|| StorageError::NotFound(format!("index {}", index)))?;

        let mut response = BulkResponse::default();
        for ioc in iocs {
            if ioc.id.is_empty() {
                response.failures.push(BulkItemFailure {
                    id: String::new(),
                    reason: "document id must not be empty".into(),
                });
                continue;
            }
            target.docs.insert(ioc.id.clone(), ioc.clone());
            response.indexed += 1;
        }
        Ok(response)
    }

    async fn documents(&self, index: &str) -> Result<Vec<Ioc>, StorageError> {
        let indices = self.indices.lock().unwrap_or_else(|e| e.into_inner());
        Ok(indices
            .get(index)
            .map(|i| i.docs.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn index_info(&self, index: &str) -> Result<Option<IndexInfo>, StorageError> {
        let indices = self.indices.lock().unwrap_or_else(|e| e.into_inner());
        Ok(indices.get(index).map(|i| i.info.clone()))
    }
}

// ── PostgreSQL ───────────────────────────────────────────────

const CREATE_IOC_TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS tif_ioc_indices (
        name             TEXT PRIMARY KEY,
        source_config_id TEXT NOT NULL,
        created_at       TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS tif_iocs (
        index_name TEXT NOT NULL REFERENCES tif_ioc_indices(name) ON DELETE CASCADE,
        id         TEXT NOT NULL,
        doc        JSONB NOT NULL,
        PRIMARY KEY (index_name, id)
    )",
];

/// IOC indices stored as rows of JSONB documents.
pub struct PgIocIndex {
    pool: PgPool,
}

impl PgIocIndex {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), StorageError> {
        for ddl in CREATE_IOC_TABLES {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        info!("IOC index tables ready");
        Ok(())
    }
}

#[async_trait]
impl IocIndex for PgIocIndex {
    async fn ensure_index(&self, index: &str, source_config_id: &str) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO tif_ioc_indices (name, source_config_id) VALUES ($1, $2)
             ON CONFLICT (name) DO NOTHING",
        )
        .bind(index)
        .bind(source_config_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn bulk_index(&self, index: &str, iocs: &[Ioc]) -> Result<BulkResponse, StorageError> {
        let mut response = BulkResponse::default();
        let mut tx = self.pool.begin().await?;

        for ioc in iocs {
            let doc = serde_json::to_value(ioc)?;
            let result = sqlx::query(
                "INSERT INTO tif_iocs (index_name, id, doc) VALUES ($1, $2, $3)
                 ON CONFLICT (index_name, id) DO UPDATE SET doc = EXCLUDED.doc",
            )
            .bind(index)
            .bind(&ioc.id)
            .bind(&doc)
            .execute(&mut *tx)
            .await;

            match result {
                Ok(_) => response.indexed += 1,
                Err(sqlx::Error::Database(db_err)) => {
                    // A rejected row aborts the transaction; report the rest as failed.
                    let reason = db_err.message().to_string();
                    response.indexed = 0;
                    response.failures = iocs
                        .iter()
                        .map(|i| BulkItemFailure { id: i.id.clone(), reason: reason.clone() })
                        .collect();
                    tx.rollback().await?;
                    return Ok(response);
                }
                Err(e) => return Err(e.into()),
            }
        }

        tx.commit().await?;
        Ok(response)
    }

    async fn documents(&self, index: &str) -> Result<Vec<Ioc>, StorageError> {
        let rows: Vec<(serde_json::Value,)> =
            sqlx::query_as("SELECT doc FROM tif_iocs WHERE index_name = $1 ORDER BY id")
                .bind(index)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter()
            .map(|(doc,)| serde_json::from_value(doc).map_err(StorageError::from))
            .collect()
    }

    async fn index_info(&self, index: &str) -> Result<Option<IndexInfo>, StorageError> {
        let row: Option<(String, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT name, source_config_id, created_at FROM tif_ioc_indices WHERE name = $1",
        )
        .bind(index)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(name, source_config_id, created_at)| IndexInfo {
            name,
            source_config_id,
            created_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ioc(id: &str, value: &str) -> Ioc {
        let line = format!(r#"{{"id":"{}","name":"n-{}","type":"ipv4-addr","value":"{}"}}"#, id, id, value);
        Ioc::parse_line(&line, "feed").unwrap()
    }

    #[tokio::test]
    async fn ensure_index_is_idempotent() {
        let index = InMemoryIocIndex::new();
        index.ensure_index("tif-ioc-a", "a").await.unwrap();
        let first = index.index_info("tif-ioc-a").await.unwrap().unwrap();
        index.ensure_index("tif-ioc-a", "other").await.unwrap();
        let second = index.index_info("tif-ioc-a").await.unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(second.source_config_id, "a");
    }

    #[tokio::test]
    async fn bulk_index_upserts_by_id() {
        let index = InMemoryIocIndex::new();
        index.ensure_index("tif-ioc-a", "a").await.unwrap();

        let resp = index
            .bulk_index("tif-ioc-a", &[ioc("1", "10.0.0.1"), ioc("2", "10.0.0.2")])
            .await
            .unwrap();
        assert_eq!(resp.indexed, 2);
        assert!(!resp.has_failures());

        index.bulk_index("tif-ioc-a", &[ioc("1", "10.0.0.9")]).await.unwrap();
        let docs = index.documents("tif-ioc-a").await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].value, "10.0.0.9");
    }

    #[tokio::test]
    async fn empty_ids_are_item_failures() {
        let index = InMemoryIocIndex::new();
        index.ensure_index("tif-ioc-a", "a").await.unwrap();
        let mut bad = ioc("1", "10.0.0.1");
        bad.id.clear();

        let resp = index.bulk_index("tif-ioc-a", &[bad, ioc("2", "10.0.0.2")]).await.unwrap();
        assert_eq!(resp.indexed, 1);
        assert_eq!(resp.failures.len(), 1);
    }

    #[tokio::test]
    async fn writing_to_missing_index_fails() {
        let index = InMemoryIocIndex::new();
        let err = index.bulk_index("tif-ioc-missing", &[ioc("1", "x")]).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
        assert!(index.documents("tif-ioc-missing").await.unwrap().is_empty());
    }
}
