use std::sync::Arc;

use tracing::info;

use tif_core::{CallerContext, PutJobRequest};

use crate::auth::{AuthDecision, Authorizer};
use crate::error::JobError;
use crate::orchestrator::{Acknowledged, JobCreator};

/// Entry point for a put-job request: validate, authorize, then create under
/// system privilege.
pub struct PutJobAction {
    authorizer: Arc<dyn Authorizer>,
    creator: Arc<JobCreator>,
}

impl PutJobAction {
    pub fn new(authorizer: Arc<dyn Authorizer>, creator: Arc<JobCreator>) -> Self {
        Self { authorizer, creator }
    }

    pub async fn execute(
        &self,
        ctx: CallerContext,
        request: PutJobRequest,
    ) -> Result<Acknowledged, JobError> {
        request.validate()?;

        if let AuthDecision::Deny(reason) = self.authorizer.authorize(&ctx) {
            info!(job = %request.name, reason = %reason, "put-job denied");
            return Err(JobError::Forbidden(reason));
        }

        let system = ctx.stash();
        self.creator.create_job(&system, request).await
    }
}
