//! Lease handle: the held lock plus the throttled renewal used during ingestion.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tif_core::LockRenewer;
use tracing::{debug, warn};

use crate::error::LockError;
use crate::model::LockModel;
use crate::service::LockService;

/// A lock acquired for one job-creation attempt.
///
/// Renewals replace the stored lock snapshot. `release` consumes the handle,
/// so a lease can be given back at most once.
pub struct LeaseHandle {
    service: Arc<dyn LockService>,
    lock: Mutex<LockModel>,
    renew_after: Duration,
}

impl LeaseHandle {
    pub fn new(service: Arc<dyn LockService>, lock: LockModel, renew_after_secs: u64) -> Self {
        Self {
            service,
            lock: Mutex::new(lock),
            renew_after: Duration::seconds(renew_after_secs.min(i64::MAX as u64) as i64),
        }
    }

    /// Latest snapshot of the held lock.
    pub fn current(&self) -> LockModel {
        self.lock.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub async fn release(self) -> Result<(), LockError> {
        let lock = self.lock.into_inner().unwrap_or_else(|e| e.into_inner());
        self.service.release_lock(&lock).await?;
        debug!(resource = %lock.resource_name, lock_id = %lock.lock_id, "lock released");
        Ok(())
    }
}

#[async_trait]
impl LockRenewer for LeaseHandle {
    async fn renew_lock(&self) {
        let lock = self.current();
        if Utc::now() < lock.acquired_at + self.renew_after {
            return;
        }

        match self.service.renew_lock(&lock).await {
            Ok(renewed) => {
                debug!(
                    resource = %renewed.resource_name,
                    expires_at = %renewed.expires_at,
                    "lock renewed"
                );
                *self.lock.lock().unwrap_or_else(|e| e.into_inner()) = renewed;
            }
            Err(e) => {
                warn!(
                    resource = %lock.resource_name,
                    lock_id = %lock.lock_id,
                    error = %e,
                    "failed to renew lock"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls; renewals succeed unless `fail_renew` is set.
    struct CountingLocks {
        renewals: AtomicUsize,
        releases: AtomicUsize,
        fail_renew: bool,
    }

    impl CountingLocks {
        fn new(fail_renew: bool) -> Arc<Self> {
            Arc::new(Self {
                renewals: AtomicUsize::new(0),
                releases: AtomicUsize::new(0),
                fail_renew,
            })
        }
    }

    #[async_trait]
    impl LockService for CountingLocks {
        async fn acquire_lock(&self, name: &str, secs: u64) -> Result<Option<LockModel>, LockError> {
            Ok(Some(LockModel::new(name, secs, Utc::now())))
        }

        async fn renew_lock(&self, lock: &LockModel) -> Result<LockModel, LockError> {
            self.renewals.fetch_add(1, Ordering::SeqCst);
            if self.fail_renew {
                return Err(LockError::Unavailable("store down".into()));
            }
            Ok(lock.renewed(Utc::now()))
        }

        async fn release_lock(&self, _lock: &LockModel) -> Result<(), LockError> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn aged_lock(age_secs: i64) -> LockModel {
        LockModel::new("feed-a", 300, Utc::now() - Duration::seconds(age_secs))
    }

    #[tokio::test]
    async fn young_lease_is_not_renewed() {
        let locks = CountingLocks::new(false);
        let handle = LeaseHandle::new(locks.clone(), aged_lock(10), 120);
        handle.renew_lock().await;
        handle.renew_lock().await;
        assert_eq!(locks.renewals.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn old_lease_is_renewed_and_replaced() {
        let locks = CountingLocks::new(false);
        let before = aged_lock(200);
        let handle = LeaseHandle::new(locks.clone(), before.clone(), 120);

        handle.renew_lock().await;
        let after = handle.current();
        assert_eq!(locks.renewals.load(Ordering::SeqCst), 1);
        assert!(after.same_grant(&before));
        assert!(after.acquired_at > before.acquired_at);

        // The refreshed lease is young again, so the next call is throttled.
        handle.renew_lock().await;
        assert_eq!(locks.renewals.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_renewal_keeps_previous_lock() {
        let locks = CountingLocks::new(true);
        let before = aged_lock(200);
        let handle = LeaseHandle::new(locks.clone(), before.clone(), 120);

        handle.renew_lock().await;
        assert_eq!(locks.renewals.load(Ordering::SeqCst), 1);
        assert_eq!(handle.current(), before);
    }

    #[tokio::test]
    async fn release_goes_to_the_service() {
        let locks = CountingLocks::new(false);
        let handle = LeaseHandle::new(locks.clone(), aged_lock(0), 120);
        handle.release().await.unwrap();
        assert_eq!(locks.releases.load(Ordering::SeqCst), 1);
    }
}
