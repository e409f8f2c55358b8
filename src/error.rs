//! Error types for the Neon provider.

use thiserror::Error;

use crate::api::ApiError;

/// Errors returned by the lifecycle operations and the provider adapter.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Missing or invalid credentials, or the provider was used before `configure`.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The project (or a sub-resource) no longer exists remotely.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The service declined the request (validation, quota, conflict).
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// The service refused the credentials.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The API client could not reach the service.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// The remote data could not be projected into a project state.
    #[error("Inconsistent remote state: {0}")]
    Inconsistency(String),

    /// The operation was cancelled before it completed.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// The change can only be applied by replacing the project.
    #[error("Unsupported change: {0}")]
    UnsupportedChange(String),

    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProviderError {
    /// Wrap an API client error, prefixing it with the step that failed.
    ///
    /// `step` should name the intent and the identifiers involved, e.g.
    /// `list databases on branch 'br-1' of project 'p-1'`.
    pub fn from_api(step: &str, err: ApiError) -> Self {
        match err {
            ApiError::NotFound(msg) => Self::NotFound(format!("{}: {}", step, msg)),
            ApiError::Rejected { status, message } => {
                Self::Rejected(format!("{}: {} (HTTP {})", step, message, status))
            },
            ApiError::Unauthorized(msg) => Self::PermissionDenied(format!("{}: {}", step, msg)),
            ApiError::Transport(msg) => Self::Unavailable(format!("{}: {}", step, msg)),
        }
    }

    /// Get the error message as a string.
    pub fn message(&self) -> &str {
        match self {
            Self::Configuration(msg) => msg,
            Self::NotFound(msg) => msg,
            Self::Rejected(msg) => msg,
            Self::PermissionDenied(msg) => msg,
            Self::Unavailable(msg) => msg,
            Self::Inconsistency(msg) => msg,
            Self::Cancelled(msg) => msg,
            Self::UnsupportedChange(msg) => msg,
            Self::Validation(msg) => msg,
            Self::UnknownResource(msg) => msg,
            Self::Serialization(_err) => "serialization error (see Debug output)",
        }
    }

    /// Whether the host should treat the resource as deleted.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::NotFound("get project 'p-123': no such project".to_string());
        assert_eq!(
            format!("{}", err),
            "Resource not found: get project 'p-123': no such project"
        );

        let err = ProviderError::Inconsistency("no default branch".to_string());
        assert_eq!(
            format!("{}", err),
            "Inconsistent remote state: no default branch"
        );

        let err = ProviderError::UnknownResource("neon_branch".to_string());
        assert_eq!(format!("{}", err), "Unknown resource type: neon_branch");
    }

    #[test]
    fn test_from_api_keeps_step_and_message() {
        let err = ProviderError::from_api(
            "create project",
            ApiError::Rejected {
                status: 422,
                message: "projects limit exceeded".to_string(),
            },
        );
        assert!(matches!(err, ProviderError::Rejected(_)));
        assert_eq!(
            err.message(),
            "create project: projects limit exceeded (HTTP 422)"
        );

        let err = ProviderError::from_api(
            "get project 'p-1'",
            ApiError::NotFound("project not found".to_string()),
        );
        assert!(err.is_not_found());
        assert!(err.message().contains("p-1"));

        let err = ProviderError::from_api(
            "delete project 'p-1'",
            ApiError::Unauthorized("bad key".into()),
        );
        assert!(matches!(err, ProviderError::PermissionDenied(_)));

        let err = ProviderError::from_api("list branches", ApiError::Transport("timeout".into()));
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }

    #[test]
    fn test_message_method() {
        let err = ProviderError::Configuration("api key is missing".to_string());
        assert_eq!(err.message(), "api key is missing");

        let err = ProviderError::Cancelled("list endpoints".to_string());
        assert_eq!(err.message(), "list endpoints");
        assert!(!err.is_not_found());
    }
}
