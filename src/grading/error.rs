//! Grading Error Types
//!
//! Every failure of a grading or admin call is one of these categories.
//! All of them are terminal for the request that produced them.

use crate::execution::ExecutionError;

/// Error types for grading and admin operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GradeError {
    /// No caller identity
    #[error("User must be authenticated")]
    Unauthenticated,

    /// Caller lacks the admin capability
    #[error("Admin capability required")]
    PermissionDenied,

    /// Request rejected before any quota or upstream work
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Per-user quota exhausted
    #[error("Rate limit exceeded. Please try again later.")]
    AdmissionDenied,

    /// The execution service is throttling
    #[error("Execution service rate limit exceeded. Please try again later.")]
    UpstreamRateLimited,

    /// Any other execution failure
    #[error("Error executing code: {0}")]
    UpstreamError(String),
}

impl GradeError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            GradeError::Unauthenticated => "unauthenticated",
            GradeError::PermissionDenied => "permission-denied",
            GradeError::InvalidInput(_) => "invalid-argument",
            GradeError::AdmissionDenied => "resource-exhausted",
            GradeError::UpstreamRateLimited => "upstream-rate-limited",
            GradeError::UpstreamError(_) => "upstream-error",
        }
    }
}

impl From<ExecutionError> for GradeError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::RateLimited => GradeError::UpstreamRateLimited,
            other => GradeError::UpstreamError(other.to_string()),
        }
    }
}
