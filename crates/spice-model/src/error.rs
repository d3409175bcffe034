use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("edit name cannot be empty")]
    EmptyEditName,
    #[error("invalid status: '{0}' (valid: pending, running, succeeded, failed, timedOut)")]
    InvalidStatus(String),
}
