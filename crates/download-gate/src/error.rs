use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("No signing secret configured")]
    MissingSecret,

    #[error("Signing secret must be at least {min} bytes, got {len}")]
    WeakSecret { len: usize, min: usize },

    #[error("Invalid download token: {0}")]
    InvalidClaim(String),

    #[error("Download token has expired")]
    ExpiredClaim,

    #[error("Failed to sign download token: {0}")]
    Signing(String),

    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("Artifact {0} belongs to another user")]
    Forbidden(String),

    #[error("User {0} is not authorized")]
    UnauthorizedPrincipal(String),

    #[error("Directory lookup failed: {0}")]
    DirectoryUnavailable(String),

    #[error("Email delivery failed: {0}")]
    DeliveryFailed(String),
}

impl GateError {
    /// Stable machine-readable kind, shared with the HTTP error codes.
    ///
    /// `NotFound` and `Forbidden` share a kind so callers cannot tell an
    /// artifact that exists for someone else from one that does not exist.
    pub fn kind(&self) -> &'static str {
        match self {
            GateError::MissingSecret | GateError::WeakSecret { .. } => "GATED_DELIVERY_DISABLED",
            GateError::InvalidClaim(_) => "INVALID_CLAIM",
            GateError::ExpiredClaim => "EXPIRED_CLAIM",
            GateError::Signing(_) => "INTERNAL_ERROR",
            GateError::NotFound(_) | GateError::Forbidden(_) => "ARTIFACT_UNAVAILABLE",
            GateError::UnauthorizedPrincipal(_) => "UNAUTHORIZED_PRINCIPAL",
            GateError::DirectoryUnavailable(_) => "DIRECTORY_UNAVAILABLE",
            GateError::DeliveryFailed(_) => "DELIVERY_FAILED",
        }
    }
}
