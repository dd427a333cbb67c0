//! Error kinds surfaced by every survey operation.
//!
//! Each variant maps to one HTTP status when the `web` feature is enabled,
//! and is rendered to the client as a `{"error": "..."}` payload.

use thiserror::Error;

/// Closed set of failures the application can report
#[derive(Debug, Error)]
pub enum SurveyError {
    /// The uploaded file is missing, empty, or not a readable spreadsheet
    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    /// The spreadsheet parsed but does not describe a valid survey
    #[error("Row {row}: {reason}")]
    InvalidSchema { row: usize, reason: String },

    /// No survey (or user) with the requested identifier
    #[error("Not found: {0}")]
    NotFound(String),

    /// Submitted answers do not match the survey
    #[error("Invalid submission: {0}")]
    InvalidSubmission(String),

    /// Email address failed validation
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    /// No valid session, or bad credentials
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Session is valid but does not own the resource
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The mail transport refused or could not send the message
    #[error("Email could not be sent: {0}")]
    Mail(String),

    /// Stored data could not be encoded or decoded
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SurveyError {
    /// Shorthand for a schema error at a 1-based sheet row
    pub fn schema(row: usize, reason: impl Into<String>) -> Self {
        SurveyError::InvalidSchema {
            row,
            reason: reason.into(),
        }
    }

    /// Whether the failure was caused by the caller rather than the server
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            SurveyError::Mail(_) | SurveyError::Storage(_) | SurveyError::Io(_)
        )
    }
}

impl From<serde_json::Error> for SurveyError {
    fn from(e: serde_json::Error) -> Self {
        SurveyError::Storage(e.to_string())
    }
}

impl From<bincode::Error> for SurveyError {
    fn from(e: bincode::Error) -> Self {
        SurveyError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SurveyError>;

#[cfg(feature = "web")]
mod response {
    use super::SurveyError;
    use axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    };

    impl SurveyError {
        pub fn status_code(&self) -> StatusCode {
            match self {
                SurveyError::InvalidUpload(_)
                | SurveyError::InvalidSchema { .. }
                | SurveyError::InvalidSubmission(_)
                | SurveyError::InvalidEmail(_) => StatusCode::BAD_REQUEST,
                SurveyError::NotFound(_) => StatusCode::NOT_FOUND,
                SurveyError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                SurveyError::Forbidden(_) => StatusCode::FORBIDDEN,
                SurveyError::Mail(_) => StatusCode::BAD_GATEWAY,
                SurveyError::Storage(_) | SurveyError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            }
        }
    }

    impl IntoResponse for SurveyError {
        fn into_response(self) -> Response {
            if self.is_client_error() {
                log::warn!("{}", self);
            } else {
                log::error!("{}", self);
            }

            let body = Json(serde_json::json!({ "error": self.to_string() }));
            (self.status_code(), body).into_response()
        }
    }
}
