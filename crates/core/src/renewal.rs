use async_trait::async_trait;

/// Keeps a held lock alive during long-running work.
///
/// Called between units of work. Implementations are best-effort: a failed
/// renewal is logged, never returned, so the caller carries on and risks
/// losing the lease only if renewals keep failing until it expires.
#[async_trait]
pub trait LockRenewer: Send + Sync {
    async fn renew_lock(&self);
}

/// Renewer for callers that hold no lock.
pub struct NoopRenewer;

#[async_trait]
impl LockRenewer for NoopRenewer {
    async fn renew_lock(&self) {}
}
