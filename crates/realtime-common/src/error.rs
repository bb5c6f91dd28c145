use thiserror::Error;

#[derive(Error, Debug)]
pub enum RealtimeError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("predicate error: {0}")]
    Predicate(#[from] crate::predicate::PredicateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RealtimeError>;
