use std::path::PathBuf;
use thiserror::Error;

/// Caller input that cannot be turned into a model's feature vector.
///
/// Display strings are returned to clients verbatim, so they name the
/// offending field.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Request body must be a JSON object")]
    NotAnObject,

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("{field} must be a valid number")]
    InvalidNumber { field: String },

    #[error("Invalid {field} \"{value}\". Valid values: {valid}")]
    UnknownLabel {
        field: String,
        value: String,
        valid: String,
    },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("Invalid {field} value")]
    InvalidValue { field: String },
}

impl ValidationError {
    /// Name of the field the error refers to, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            ValidationError::NotAnObject => None,
            ValidationError::MissingField(field) => Some(field),
            ValidationError::InvalidNumber { field }
            | ValidationError::UnknownLabel { field, .. }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::InvalidValue { field } => Some(field),
        }
    }
}

/// Errors raised by the prediction core.
#[derive(Error, Debug)]
pub enum PredictError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Model not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Inference execution failed: {0}")]
    Inference(String),
}

impl PredictError {
    /// HTTP status the boundary layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            PredictError::Validation(_) | PredictError::InvalidImage(_) => 400,
            PredictError::ModelNotFound(_) | PredictError::Deserialization(_) => 503,
            PredictError::Inference(_) => 500,
        }
    }

    /// Stable label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PredictError::Validation(_) => "validation",
            PredictError::ModelNotFound(_) => "model_not_found",
            PredictError::Deserialization(_) => "deserialization",
            PredictError::InvalidImage(_) => "invalid_image",
            PredictError::Inference(_) => "inference",
        }
    }

    /// True when the artifact itself is unusable; retrying will not help
    /// until storage is fixed.
    pub fn is_artifact_failure(&self) -> bool {
        matches!(
            self,
            PredictError::ModelNotFound(_) | PredictError::Deserialization(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PredictError>;

/// Failure of the generative-text service call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpstreamError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl UpstreamError {
    /// Check if a caller could reasonably try again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            UpstreamError::Network(_) | UpstreamError::RateLimited(_) => true,
            UpstreamError::Api { status, .. } => *status >= 500,
            UpstreamError::Authentication(_) | UpstreamError::MalformedResponse(_) => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::Network(_) => "network",
            UpstreamError::Authentication(_) => "authentication",
            UpstreamError::RateLimited(_) => "rate_limited",
            UpstreamError::Api { .. } => "api",
            UpstreamError::MalformedResponse(_) => "malformed_response",
        }
    }
}

/// Failure outcomes of the remediation advisor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemediationError {
    #[error("Gemini API key not provided. Pass api_key in the request or set GEMINI_API_KEY")]
    MissingCredential,

    #[error("Error generating solution: {0}")]
    Upstream(#[from] UpstreamError),
}

impl RemediationError {
    pub fn kind(&self) -> &'static str {
        match self {
            RemediationError::MissingCredential => "missing_credential",
            RemediationError::Upstream(e) => e.kind(),
        }
    }
}
