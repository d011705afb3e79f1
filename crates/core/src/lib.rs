pub mod config;
pub mod context;
pub mod error;
pub mod ioc;
pub mod job;
pub mod renewal;
pub mod source;

pub use config::Config;
pub use context::*;
pub use error::*;
pub use ioc::*;
pub use job::*;
pub use renewal::*;
pub use source::*;
