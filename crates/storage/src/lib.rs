pub mod backend;
pub mod db;
pub mod error;
pub mod fetch;
pub mod index;
pub mod job_store;

pub use backend::{S3SourceFactory, SourceStoreFactory, StaticSourceFactory};
pub use db::init_pg_pool;
pub use error::{FetchError, StorageError};
pub use fetch::{FetchResponse, IocFetchService};
pub use index::{BulkItemFailure, BulkResponse, InMemoryIocIndex, IndexInfo, IocIndex, PgIocIndex};
pub use job_store::{InMemoryJobParameterStore, JobParameterStore, PgJobParameterStore};
