//! Feed data creation for a freshly saved job.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use tif_core::{JobParameter, LockRenewer};
use tif_storage::IocFetchService;

use crate::error::JobError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionResponse {
    /// Whether the feed data is in place and the job may become available.
    pub acknowledged: bool,
    /// Indices written for the job.
    pub indices: Vec<String>,
    pub ioc_count: usize,
}

/// Populates the data index of a job.
///
/// `renewer` keeps the caller's lock alive; implementations call it between
/// long units of work.
#[async_trait]
pub trait FeedIngestion: Send + Sync {
    async fn create_feed_data(
        &self,
        job: &JobParameter,
        renewer: &dyn LockRenewer,
    ) -> Result<IngestionResponse, JobError>;
}

/// Ingestion that pulls the job's source through [`IocFetchService`].
pub struct FetchIngestionEngine {
    fetch: Arc<IocFetchService>,
    allow_empty: bool,
}

impl FetchIngestionEngine {
    pub fn new(fetch: Arc<IocFetchService>, allow_empty: bool) -> Self {
        Self { fetch, allow_empty }
    }
}

#[async_trait]
impl FeedIngestion for FetchIngestionEngine {
    async fn create_feed_data(
        &self,
        job: &JobParameter,
        renewer: &dyn LockRenewer,
    ) -> Result<IngestionResponse, JobError> {
        renewer.renew_lock().await;
        let response = self
            .fetch
            .fetch_iocs_with_renewal(&job.source_config, renewer)
            .await?;
        renewer.renew_lock().await;

        let ioc_count = response.iocs.len();
        let acknowledged = ioc_count > 0 || self.allow_empty;
        if acknowledged {
            info!(job = %job.name, iocs = ioc_count, "feed data created");
        } else {
            warn!(job = %job.name, source = %job.source_config.source_config_id(), "feed source yielded no IOCs");
        }

        Ok(IngestionResponse {
            acknowledged,
            indices: vec![job.feed_index()],
            ioc_count,
        })
    }
}
