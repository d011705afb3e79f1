//! PostgreSQL-backed lock service shared by every node of a cluster.
//!
//! One row per resource name. Acquisition is a single upsert that only
//! replaces a row whose lease has already expired, so two nodes racing for
//! the same name cannot both win. Expiry is always compared against the
//! database's `now()`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, info};

use crate::error::LockError;
use crate::model::LockModel;
use crate::service::LockService;

const CREATE_LOCK_TABLE: &str = "CREATE TABLE IF NOT EXISTS tif_locks (
    resource_name       TEXT PRIMARY KEY,
    lock_id             TEXT NOT NULL,
    acquired_at         TIMESTAMPTZ NOT NULL,
    lease_duration_secs BIGINT NOT NULL,
    expires_at          TIMESTAMPTZ NOT NULL
)";

// Lease times come from the database clock, never the caller's.
const ACQUIRE_LOCK: &str = "INSERT INTO tif_locks (resource_name, lock_id, acquired_at, lease_duration_secs, expires_at)
     VALUES ($1, $2, now(), $3, now() + make_interval(secs => $4))
     ON CONFLICT (resource_name) DO UPDATE SET
        lock_id = EXCLUDED.lock_id,
        acquired_at = EXCLUDED.acquired_at,
        lease_duration_secs = EXCLUDED.lease_duration_secs,
        expires_at = EXCLUDED.expires_at
     WHERE tif_locks.expires_at <= now()
     RETURNING lock_id, acquired_at, expires_at";

const RENEW_LOCK: &str = "UPDATE tif_locks
     SET acquired_at = now(), expires_at = now() + make_interval(secs => $3)
     WHERE resource_name = $1 AND lock_id = $2 AND expires_at > now()
     RETURNING acquired_at, expires_at";

/// `lock_id, acquired_at, expires_at` as returned by an upsert.
type LeaseRow = (String, DateTime<Utc>, DateTime<Utc>);

pub struct PgLockService {
    pool: PgPool,
}

impl PgLockService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the lock table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), LockError> {
        sqlx::query(CREATE_LOCK_TABLE)
            .execute(&self.pool)
            .await
            .map_err(map_unavailable)?;
        info!("lock table ready");
        Ok(())
    }
}

#[async_trait]
impl LockService for PgLockService {
    async fn acquire_lock(
        &self,
        resource_name: &str,
        lease_duration_secs: u64,
    ) -> Result<Option<LockModel>, LockError> {
        let requested = LockModel::new(resource_name, lease_duration_secs, Utc::now());
        let secs = clamp_secs(lease_duration_secs);

        let row = sqlx::query_as::<_, LeaseRow>(ACQUIRE_LOCK)
            .bind(&requested.resource_name)
            .bind(&requested.lock_id)
            .bind(secs)
            .bind(secs as f64)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_unavailable)?;

        match row.and_then(|row| granted(requested, row)) {
            Some(lock) => Ok(Some(lock)),
            None => {
                debug!(resource = resource_name, "lock is held by another owner");
                Ok(None)
            }
        }
    }

    async fn renew_lock(&self, lock: &LockModel) -> Result<LockModel, LockError> {
        let row = sqlx::query_as::<_, (DateTime<Utc>, DateTime<Utc>)>(RENEW_LOCK)
            .bind(&lock.resource_name)
            .bind(&lock.lock_id)
            .bind(clamp_secs(lock.lease_duration_secs) as f64)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_unavailable)?;

        match row {
            Some((acquired_at, expires_at)) => Ok(LockModel {
                acquired_at,
                expires_at,
                ..lock.clone()
            }),
            None => Err(not_holder(lock)),
        }
    }

    async fn release_lock(&self, lock: &LockModel) -> Result<(), LockError> {
        let result = sqlx::query("DELETE FROM tif_locks WHERE resource_name = $1 AND lock_id = $2")
            .bind(&lock.resource_name)
            .bind(&lock.lock_id)
            .execute(&self.pool)
            .await
            .map_err(map_unavailable)?;

        if result.rows_affected() == 0 {
            return Err(not_holder(lock));
        }
        Ok(())
    }
}

/// The lock we asked for, stamped with the database's times, if our id won.
fn granted(requested: LockModel, (lock_id, acquired_at, expires_at): LeaseRow) -> Option<LockModel> {
    (lock_id == requested.lock_id).then(|| LockModel {
        acquired_at,
        expires_at,
        ..requested
    })
}

fn clamp_secs(secs: u64) -> i64 {
    secs.min(i64::MAX as u64) as i64
}

fn not_holder(lock: &LockModel) -> LockError {
    LockError::NotHolder {
        resource: lock.resource_name.clone(),
        lock_id: lock.lock_id.clone(),
    }
}

/// Connection-level failures mean the lock store is unreachable; anything
/// else is reported as a plain database error.
fn map_unavailable(e: sqlx::Error) -> LockError {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Tls(_) => LockError::Unavailable(e.to_string()),
        other => LockError::Database(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_errors_map_to_unavailable() {
        assert!(matches!(
            map_unavailable(sqlx::Error::PoolTimedOut),
            LockError::Unavailable(_)
        ));
        assert!(matches!(
            map_unavailable(sqlx::Error::RowNotFound),
            LockError::Database(_)
        ));
    }

    #[test]
    fn winning_row_carries_database_times() {
        let requested = LockModel::new("feed-a", 60, Utc::now());
        let db_now = requested.acquired_at - chrono::Duration::hours(3);
        let row = (requested.lock_id.clone(), db_now, db_now + chrono::Duration::seconds(60));

        let lock = granted(requested.clone(), row).unwrap();
        assert!(lock.same_grant(&requested));
        assert_eq!(lock.acquired_at, db_now);
        assert_eq!(lock.expires_at, db_now + chrono::Duration::seconds(60));
        assert_eq!(lock.lease_duration_secs, 60);
    }

    #[test]
    fn row_owned_by_another_id_is_not_granted() {
        let requested = LockModel::new("feed-a", 60, Utc::now());
        let row = ("someone-else".to_string(), Utc::now(), Utc::now());
        assert!(granted(requested, row).is_none());
    }

    #[test]
    fn expiry_is_judged_by_the_database_clock() {
        assert!(ACQUIRE_LOCK.contains("WHERE tif_locks.expires_at <= now()"));
        assert!(RENEW_LOCK.contains("expires_at > now()"));
        for sql in [ACQUIRE_LOCK, RENEW_LOCK] {
            assert!(sql.contains("now() + make_interval(secs =>"));
            assert!(sql.contains("RETURNING"));
        }
    }

    #[test]
    fn not_holder_names_the_lock() {
        let lock = LockModel::new("feed-a", 60, Utc::now());
        let msg = not_holder(&lock).to_string();
        assert!(msg.contains("feed-a"));
        assert!(msg.contains(&lock.lock_id));
    }
}
