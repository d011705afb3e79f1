use thiserror::Error;

#[derive(Error, Debug)]
pub enum TifError {
    #[error("Invalid job name: {0}")]
    InvalidName(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid source config: {0}")]
    InvalidSourceConfig(String),

    #[error("Malformed IOC record: {0}")]
    MalformedIoc(String),
}
