pub mod action;
pub mod auth;
pub mod error;
pub mod ingestion;
pub mod orchestrator;

pub use action::PutJobAction;
pub use auth::{AuthDecision, Authorizer, BackendRoleFilter, NO_PERMISSIONS};
pub use error::JobError;
pub use ingestion::{FeedIngestion, FetchIngestionEngine, IngestionResponse};
pub use orchestrator::{Acknowledged, CreationStage, JobCreator, FEED_CREATION_FAILED};
