use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Failures surfaced by the record store, the renderers and the API.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// Missing required field, non-numeric value, malformed priorities,
    /// disallowed upload type or size.
    #[error("{message}")]
    Validation { field: String, message: String },

    /// Unknown record, or a record without the requested attachment.
    #[error("{0} not found")]
    NotFound(String),

    /// The backing store failed or is unreachable.
    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    /// Workbook or PDF generation failed as a whole.
    #[error("report rendering failed: {0}")]
    Render(String),
}

impl RegistrationError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub(crate) fn missing(field: &str, label: &str) -> Self {
        Self::validation(field, format!("{label} is required"))
    }

    pub(crate) fn not_a_number(field: &str, label: &str) -> Self {
        Self::validation(field, format!("{label} must be a valid number"))
    }

    /// Name of the offending field for validation failures
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } => Some(field),
            _ => None,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Persistence(_) | Self::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
            Self::Render(_) => "RENDER_ERROR",
        }
    }
}

impl From<rust_xlsxwriter::XlsxError> for RegistrationError {
    fn from(e: rust_xlsxwriter::XlsxError) -> Self {
        Self::Render(e.to_string())
    }
}

impl From<printpdf::Error> for RegistrationError {
    fn from(e: printpdf::Error) -> Self {
        Self::Render(format!("{e:?}"))
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for RegistrationError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal details stay in the logs
        let message = match &self {
            Self::Persistence(e) => {
                error!(error = %e, "Registration store failure");
                "Internal server error".to_string()
            }
            Self::Render(detail) => {
                error!(error = %detail, "Report rendering failure");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            message,
            code: self.code().to_string(),
            field: self.field().map(str::to_owned),
        };

        (status, Json(body)).into_response()
    }
}
