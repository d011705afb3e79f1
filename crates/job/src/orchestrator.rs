//! Job creation workflow.
//!
//! One attempt runs `lock → ensure index → save CREATING record → ingest →
//! AVAILABLE | CREATE_FAILED`. Every exit after the lock is taken goes through
//! a single release, and secondary failures (release, failure marking) are
//! logged without replacing the error the caller sees.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use tif_core::config::LockConfig;
use tif_core::{JobParameter, PutJobRequest, SystemContext};
use tif_lock::{LeaseHandle, LockService};
use tif_storage::{JobParameterStore, StorageError};

use crate::error::JobError;
use crate::ingestion::FeedIngestion;

pub const FEED_CREATION_FAILED: &str = "creation of threat intel feed data failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Acknowledged {
    pub acknowledged: bool,
}

/// Furthest point a creation attempt reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationStage {
    /// Lock not obtained; nothing was touched.
    Aborted,
    Locked,
    IndexReady,
    MetadataSaved,
    Ingesting,
    Done,
    CreateFailed,
}

impl fmt::Display for CreationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CreationStage::Aborted => "aborted",
            CreationStage::Locked => "locked",
            CreationStage::IndexReady => "index_ready",
            CreationStage::MetadataSaved => "metadata_saved",
            CreationStage::Ingesting => "ingesting",
            CreationStage::Done => "done",
            CreationStage::CreateFailed => "create_failed",
        };
        f.write_str(s)
    }
}

#[derive(Clone)]
pub struct JobCreator {
    locks: Arc<dyn LockService>,
    store: Arc<dyn JobParameterStore>,
    ingestion: Arc<dyn FeedIngestion>,
    lease_secs: u64,
    renew_after_secs: u64,
}

impl JobCreator {
    pub fn new(
        locks: Arc<dyn LockService>,
        store: Arc<dyn JobParameterStore>,
        ingestion: Arc<dyn FeedIngestion>,
        lock_config: &LockConfig,
    ) -> Self {
        Self {
            locks,
            store,
            ingestion,
            lease_secs: lock_config.lease_duration_secs,
            renew_after_secs: lock_config.renew_after_secs,
        }
    }

    /// Create the job named by `request` under a cluster-wide lock on its name.
    ///
    /// The caller must already be authorized; `ctx` only names the initiator.
    /// Everything from lock acquisition to release runs on its own task, so the
    /// attempt completes and the lock is returned even if this future is dropped.
    pub async fn create_job(
        &self,
        ctx: &SystemContext,
        request: PutJobRequest,
    ) -> Result<Acknowledged, JobError> {
        request.validate()?;

        let creator = self.clone();
        let initiator = ctx.initiator().to_string();
        let name = request.name.clone();
        let attempt = tokio::spawn(async move { creator.run_attempt(&initiator, request).await });

        match attempt.await {
            Ok(result) => result,
            Err(e) => {
                error!(job = %name, error = %e, "job creation task aborted");
                Err(JobError::Internal(format!("job creation task for {name} aborted: {e}")))
            }
        }
    }

    async fn run_attempt(&self, initiator: &str, request: PutJobRequest) -> Result<Acknowledged, JobError> {
        let Some(lock) = self.locks.acquire_lock(&request.name, self.lease_secs).await? else {
            info!(
                job = %request.name,
                initiator,
                stage = %CreationStage::Aborted,
                "job creation skipped, lock is held elsewhere"
            );
            return Err(JobError::Contention(request.name));
        };
        info!(job = %request.name, lock_id = %lock.lock_id, initiator, "lock acquired");

        let lease = LeaseHandle::new(self.locks.clone(), lock, self.renew_after_secs);
        let mut stage = CreationStage::Locked;
        let result = self.run_locked(&request, &lease, &mut stage).await;

        if let Err(e) = lease.release().await {
            error!(job = %request.name, error = %e, "failed to release lock");
        }

        match &result {
            Ok(_) => info!(job = %request.name, stage = %stage, "job created"),
            Err(e) => warn!(job = %request.name, stage = %stage, error = %e, "job creation failed"),
        }
        result
    }

    async fn run_locked(
        &self,
        request: &PutJobRequest,
        lease: &LeaseHandle,
        stage: &mut CreationStage,
    ) -> Result<Acknowledged, JobError> {
        self.store.ensure_index_exists().await?;
        *stage = CreationStage::IndexReady;

        let job = JobParameter::from_request(request, Utc::now());
        let job = self.store.create_if_absent(&job).await.map_err(|e| match e {
            StorageError::DuplicateKey(name) => JobError::AlreadyExists(name),
            other => JobError::Store(other),
        })?;
        *stage = CreationStage::MetadataSaved;
        debug!(job = %job.name, seq_no = job.seq_no, stage = %stage, "job record saved");

        *stage = CreationStage::Ingesting;
        let started = Instant::now();
        let outcome = if job.is_creating() {
            self.ingestion.create_feed_data(&job, lease).await
        } else {
            Err(JobError::Internal(format!(
                "invalid state {} for job {}, expected CREATING",
                job.state, job.name
            )))
        };

        match outcome {
            Ok(response) if response.acknowledged => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                let available = job.clone().mark_available(Utc::now(), elapsed_ms, response.indices);
                if let Err(e) = self.store.update_existing(&available).await {
                    self.mark_create_failed(job).await;
                    *stage = CreationStage::CreateFailed;
                    return Err(e.into());
                }
                *stage = CreationStage::Done;
                Ok(Acknowledged { acknowledged: true })
            }
            Ok(_) => {
                self.mark_create_failed(job).await;
                *stage = CreationStage::CreateFailed;
                Err(JobError::Internal(FEED_CREATION_FAILED.into()))
            }
            Err(e) => {
                self.mark_create_failed(job).await;
                *stage = CreationStage::CreateFailed;
                Err(e)
            }
        }
    }

    /// Best-effort: a failed write is logged, the caller keeps the original error.
    async fn mark_create_failed(&self, job: JobParameter) {
        let name = job.name.clone();
        let failed = job.mark_create_failed(Utc::now());
        match self.store.update_existing(&failed).await {
            Ok(_) => info!(job = %name, "job marked CREATE_FAILED"),
            Err(e) => error!(job = %name, error = %e, "failed to mark job as CREATE_FAILED"),
        }
    }
}
