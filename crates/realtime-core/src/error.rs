use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JoinError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("channel '{0}' already exists with a conflicting visibility")]
    ConflictingVisibility(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegisterError {
    #[error("connection already registered")]
    AlreadyRegistered,
}
