//! In-process lock service for single-node deployments and tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::LockError;
use crate::model::LockModel;
use crate::service::LockService;

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Lock table held in memory. Expired leases are replaced on acquisition.
pub struct InMemoryLockService {
    locks: Mutex<HashMap<String, LockModel>>,
    clock: Clock,
}

impl InMemoryLockService {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(Utc::now))
    }

    /// Use a custom time source (lets tests move past lease expiry).
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Current holder of `resource_name`, if the lease is live.
    pub fn holder(&self, resource_name: &str) -> Option<LockModel> {
        let now = (self.clock)();
        let locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .get(resource_name)
            .filter(|lock| !lock.is_expired(now))
            .cloned()
    }
}

impl Default for InMemoryLockService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LockService for InMemoryLockService {
    async fn acquire_lock(
        &self,
        resource_name: &str,
        lease_duration_secs: u64,
    ) -> Result<Option<LockModel>, LockError> {
        let now = (self.clock)();
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = locks.get(resource_name) {
            if !existing.is_expired(now) {
                debug!(resource = resource_name, lock_id = %existing.lock_id, "lock is held");
                return Ok(None);
            }
        }

        let lock = LockModel::new(resource_name, lease_duration_secs, now);
        locks.insert(resource_name.to_string(), lock.clone());
        Ok(Some(lock))
    }

    async fn renew_lock(&self, lock: &LockModel) -> Result<LockModel, LockError> {
        let now = (self.clock)();
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());

        match locks.get_mut(&lock.resource_name) {
            Some(current) if current.same_grant(lock) && !current.is_expired(now) => {
                *current = current.renewed(now);
                Ok(current.clone())
            }
            _ => Err(LockError::NotHolder {
                resource: lock.resource_name.clone(),
                lock_id: lock.lock_id.clone(),
            }),
        }
    }

    async fn release_lock(&self, lock: &LockModel) -> Result<(), LockError> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());

        match locks.get(&lock.resource_name) {
            Some(current) if current.same_grant(lock) => {
                locks.remove(&lock.resource_name);
                Ok(())
            }
            _ => Err(LockError::NotHolder {
                resource: lock.resource_name.clone(),
                lock_id: lock.lock_id.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn manual_clock() -> (Arc<AtomicI64>, Clock) {
        let start = Utc::now().timestamp();
        let offset = Arc::new(AtomicI64::new(0));
        let offset2 = offset.clone();
        let clock: Clock = Arc::new(move || {
            DateTime::from_timestamp(start + offset2.load(Ordering::SeqCst), 0).unwrap_or_else(Utc::now)
        });
        (offset, clock)
    }

    #[tokio::test]
    async fn second_acquire_sees_contention() {
        let service = InMemoryLockService::new();
        let first = service.acquire_lock("feed-a", 60).await.unwrap();
        assert!(first.is_some());
        let second = service.acquire_lock("feed-a", 60).await.unwrap();
        assert!(second.is_none());
        assert!(service.acquire_lock("feed-b", 60).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn release_makes_name_acquirable() {
        let service = InMemoryLockService::new();
        let lock = service.acquire_lock("feed-a", 60).await.unwrap().unwrap();
        service.release_lock(&lock).await.unwrap();
        assert!(service.holder("feed-a").is_none());
        assert!(service.acquire_lock("feed-a", 60).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn expired_lease_can_be_taken_over() {
        let (offset, clock) = manual_clock();
        let service = InMemoryLockService::with_clock(clock);
        let old = service.acquire_lock("feed-a", 60).await.unwrap().unwrap();

        offset.store(61, Ordering::SeqCst);
        let new = service.acquire_lock("feed-a", 60).await.unwrap().unwrap();
        assert!(!new.same_grant(&old));

        // The previous owner can neither renew nor release the new grant.
        assert!(matches!(service.renew_lock(&old).await, Err(LockError::NotHolder { .. })));
        assert!(service.release_lock(&old).await.is_err());
        assert_eq!(service.holder("feed-a"), Some(new));
    }

    #[tokio::test]
    async fn renew_extends_expiry() {
        let (offset, clock) = manual_clock();
        let service = InMemoryLockService::with_clock(clock);
        let lock = service.acquire_lock("feed-a", 60).await.unwrap().unwrap();

        offset.store(50, Ordering::SeqCst);
        let renewed = service.renew_lock(&lock).await.unwrap();
        assert_eq!(renewed.expires_at, lock.expires_at + Duration::seconds(50));

        offset.store(100, Ordering::SeqCst);
        assert!(service.holder("feed-a").is_some());
    }

    #[tokio::test]
    async fn double_release_fails() {
        let service = InMemoryLockService::new();
        let lock = service.acquire_lock("feed-a", 60).await.unwrap().unwrap();
        service.release_lock(&lock).await.unwrap();
        assert!(service.release_lock(&lock).await.is_err());
    }
}
