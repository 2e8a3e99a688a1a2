use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// No usable credential; the user has to supply one before generating.
    CredentialRequired,
    /// The generation service failed; retrying may help.
    Remote,
    /// An imported document is missing required fields.
    InvalidFormat,
    Validation,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn requires_credential(&self) -> bool {
        self.code == ErrorCode::CredentialRequired
    }
}

#[derive(Debug, Error)]
#[error("{code:?}: {message}")]
pub struct AppException {
    pub code: ErrorCode,
    pub message: String,
}

impl From<AppError> for AppException {
    fn from(value: AppError) -> Self {
        Self {
            code: value.code,
            message: value.message,
        }
    }
}
