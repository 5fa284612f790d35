use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid sensor id: {0}")]
    InvalidSensorId(String),

    #[error("Invalid user id: {0}")]
    InvalidUserId(String),

    #[error("Malformed command payload: {0}")]
    MalformedCommand(String),

    #[error("Ingress queue is closed")]
    IngressClosed,

    #[error("Repository lookup timed out after {0:?}")]
    RepositoryTimeout(Duration),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}

pub type DomainResult<T> = Result<T, DomainError>;
