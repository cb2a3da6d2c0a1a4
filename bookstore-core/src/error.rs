use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Common result type for core operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// A single rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed: {}", join_fields(.0))]
    Validation(Vec<FieldError>),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("account locked out until {0}")]
    LockedOut(chrono::DateTime<chrono::Utc>),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("role provisioning failed: {0}")]
    Provisioning(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("other error: {0}")]
    Other(String),
}

impl ServiceError {
    /// Shorthand for a validation failure on one field.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ServiceError::Validation(vec![FieldError::new(field, message)])
    }

    /// The generic sign-in failure. Never says whether the account exists.
    pub fn invalid_credentials() -> Self {
        ServiceError::Unauthorized("invalid credentials".into())
    }
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
