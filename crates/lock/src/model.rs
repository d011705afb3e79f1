use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A time-bounded lease over one resource name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockModel {
    pub resource_name: String,
    pub lock_id: String,
    /// Time of acquisition or of the latest renewal.
    pub acquired_at: DateTime<Utc>,
    pub lease_duration_secs: u64,
    pub expires_at: DateTime<Utc>,
}

impl LockModel {
    /// A new lease with a fresh lock id.
    pub fn new(resource_name: &str, lease_duration_secs: u64, now: DateTime<Utc>) -> Self {
        Self {
            resource_name: resource_name.to_string(),
            lock_id: Uuid::new_v4().to_string(),
            acquired_at: now,
            lease_duration_secs,
            expires_at: now + lease(lease_duration_secs),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Same lock, lease restarted at `now`.
    pub fn renewed(&self, now: DateTime<Utc>) -> Self {
        Self {
            acquired_at: now,
            expires_at: now + lease(self.lease_duration_secs),
            ..self.clone()
        }
    }

    /// Whether `other` is the same grant (resource and lock id match).
    pub fn same_grant(&self, other: &LockModel) -> bool {
        self.resource_name == other.resource_name && self.lock_id == other.lock_id
    }
}

fn lease(secs: u64) -> Duration {
    Duration::seconds(secs.min(i64::MAX as u64) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_lock_expires_after_lease() {
        let now = Utc::now();
        let lock = LockModel::new("feed-a", 300, now);
        assert_eq!(lock.expires_at, now + Duration::seconds(300));
        assert!(!lock.is_expired(now + Duration::seconds(299)));
        assert!(lock.is_expired(now + Duration::seconds(300)));
    }

    #[test]
    fn renewed_keeps_identity() {
        let now = Utc::now();
        let lock = LockModel::new("feed-a", 60, now);
        let later = now + Duration::seconds(30);
        let renewed = lock.renewed(later);
        assert!(renewed.same_grant(&lock));
        assert_eq!(renewed.acquired_at, later);
        assert_eq!(renewed.expires_at, later + Duration::seconds(60));
    }

    #[test]
    fn fresh_locks_get_distinct_ids() {
        let now = Utc::now();
        let a = LockModel::new("feed-a", 60, now);
        let b = LockModel::new("feed-a", 60, now);
        assert!(!a.same_grant(&b));
    }
}
