pub mod error;
pub mod lease;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod service;

pub use error::LockError;
pub use lease::LeaseHandle;
pub use memory::InMemoryLockService;
pub use model::LockModel;
pub use postgres::PgLockService;
pub use service::{LockService, LOCK_DURATION_SECS, RENEW_AFTER_SECS};
