//! Lock service trait.

use async_trait::async_trait;

use crate::error::LockError;
use crate::model::LockModel;

/// Default lease granted to a job-creation attempt.
pub const LOCK_DURATION_SECS: u64 = 300;

/// Minimum age of a lease before a renewal is actually sent.
pub const RENEW_AFTER_SECS: u64 = 120;

/// Cluster-wide named leases.
///
/// At most one live lock exists per resource name. Implementations must make
/// acquisition atomic with respect to other nodes sharing the same backend.
#[async_trait]
pub trait LockService: Send + Sync {
    /// Try to take the lock on `resource_name`.
    ///
    /// Returns `Ok(None)` when another holder has a live lease, so callers can
    /// tell contention apart from a store failure.
    async fn acquire_lock(
        &self,
        resource_name: &str,
        lease_duration_secs: u64,
    ) -> Result<Option<LockModel>, LockError>;

    /// Extend the lease of a lock still held by the caller.
    async fn renew_lock(&self, lock: &LockModel) -> Result<LockModel, LockError>;

    /// Give the lock up. Fails if the caller no longer holds it.
    async fn release_lock(&self, lock: &LockModel) -> Result<(), LockError>;
}
