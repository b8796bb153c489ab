//! Error types for the PDF tools server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use download_gate::GateError;
use pdftools_core::PdfToolsError;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Server error types
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    InvalidSelection(String),

    #[error("Failed to read PDF: {0}")]
    CorruptDocument(String),

    #[error("Conversion failed: {0}")]
    ConversionFailed(String),

    #[error("At least 2 PDF files are required to merge, got {0}")]
    EmptyInputSet(usize),

    #[error("At most {max} PDF files can be merged at once, got {count}")]
    TooManyInputs { count: usize, max: usize },

    #[error("User {0} is not authorized")]
    UnauthorizedPrincipal(String),

    #[error("Invalid download token: {0}")]
    InvalidClaim(String),

    #[error("Download token has expired")]
    ExpiredClaim,

    /// Unknown artifact and someone else's artifact look the same to callers
    #[error("File not found or no longer available")]
    ArtifactUnavailable,

    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    #[error("Directory lookup failed: {0}")]
    DirectoryUnavailable(String),

    #[error("Email delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Gated delivery is not configured on this server")]
    GatedDeliveryDisabled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_)
            | ApiError::InvalidSelection(_)
            | ApiError::CorruptDocument(_)
            | ApiError::EmptyInputSet(_)
            | ApiError::TooManyInputs { .. } => StatusCode::BAD_REQUEST,
            ApiError::UnauthorizedPrincipal(_) => StatusCode::FORBIDDEN,
            ApiError::InvalidClaim(_) | ApiError::ExpiredClaim => StatusCode::UNAUTHORIZED,
            ApiError::ArtifactUnavailable => StatusCode::NOT_FOUND,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::DirectoryUnavailable(_) | ApiError::DeliveryFailed(_) => {
                StatusCode::BAD_GATEWAY
            }
            ApiError::GatedDeliveryDisabled => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::ConversionFailed(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "INVALID_REQUEST",
            ApiError::InvalidSelection(_) => "INVALID_SELECTION",
            ApiError::CorruptDocument(_) => "CORRUPT_DOCUMENT",
            ApiError::ConversionFailed(_) => "CONVERSION_FAILED",
            ApiError::EmptyInputSet(_) => "EMPTY_INPUT_SET",
            ApiError::TooManyInputs { .. } => "TOO_MANY_INPUTS",
            ApiError::UnauthorizedPrincipal(_) => "UNAUTHORIZED_PRINCIPAL",
            ApiError::InvalidClaim(_) => "INVALID_CLAIM",
            ApiError::ExpiredClaim => "EXPIRED_CLAIM",
            ApiError::ArtifactUnavailable => "ARTIFACT_UNAVAILABLE",
            ApiError::Timeout(_) => "TIMEOUT",
            ApiError::DirectoryUnavailable(_) => "DIRECTORY_UNAVAILABLE",
            ApiError::DeliveryFailed(_) => "DELIVERY_FAILED",
            ApiError::GatedDeliveryDisabled => "GATED_DELIVERY_DISABLED",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{}: {}", self.code(), self);
        } else {
            warn!("{}: {}", self.code(), self);
        }

        // Internal details stay in the log
        let message = match &self {
            ApiError::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        let body = ErrorResponse {
            success: false,
            error: message,
            code: self.code(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<PdfToolsError> for ApiError {
    fn from(err: PdfToolsError) -> Self {
        match err {
            PdfToolsError::InvalidSelection(msg) => ApiError::InvalidSelection(msg),
            PdfToolsError::CorruptDocument(msg) => ApiError::CorruptDocument(msg),
            PdfToolsError::EmptyInputSet { count } => ApiError::EmptyInputSet(count),
            PdfToolsError::TooManyInputs { count, max } => ApiError::TooManyInputs { count, max },
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<GateError> for ApiError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::MissingSecret | GateError::WeakSecret { .. } => {
                ApiError::GatedDeliveryDisabled
            }
            GateError::InvalidClaim(msg) => ApiError::InvalidClaim(msg),
            GateError::ExpiredClaim => ApiError::ExpiredClaim,
            GateError::NotFound(id) => {
                warn!("Download of unknown artifact {}", id);
                ApiError::ArtifactUnavailable
            }
            GateError::Forbidden(id) => {
                warn!("Download of artifact {} by a principal that does not own it", id);
                ApiError::ArtifactUnavailable
            }
            GateError::UnauthorizedPrincipal(email) => ApiError::UnauthorizedPrincipal(email),
            GateError::DirectoryUnavailable(msg) => ApiError::DirectoryUnavailable(msg),
            GateError::DeliveryFailed(msg) => ApiError::DeliveryFailed(msg),
            GateError::Signing(msg) => ApiError::Internal(msg),
        }
    }
}
