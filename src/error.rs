//! # Error Handling
//!
//! Unified error handling for the Integrations API: a problem+json
//! [`ApiError`] at the HTTP boundary with trace ID propagation, and the
//! [`SyncFailure`] taxonomy every pipeline component converts its
//! provider/network failures into. Nothing crosses a component boundary
//! as a generic opaque error.

use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::providers::{Provider, ProviderError, RegistryError};
use crate::telemetry;

/// Domain failure taxonomy for the OAuth and sync pipeline.
#[derive(Debug, Clone, Error)]
pub enum SyncFailure {
    /// Redirect state could not be decoded; recoverable via defaults
    #[error("malformed redirect state")]
    MalformedState,

    /// Provider token endpoint rejected the authorization code
    #[error("token exchange failed: {details}")]
    TokenExchangeFailed { details: String },

    /// Access token expired and no refresh token is stored
    #[error("credential expired and no refresh token is stored")]
    CredentialExpiredNoRefresh,

    /// Provider refused the refresh token (revoked or rotated externally)
    #[error("provider rejected the refresh token: {details}")]
    RefreshRejected { details: String },

    /// Provider rejected the access token on a data call after refresh
    #[error("provider rejected the access token: {details}")]
    ProviderUnauthorized { details: String },

    /// No resource binding exists for the (project, provider) pair
    #[error("no {provider} resource bound for project {project_id}")]
    NoResourceBound { project_id: i64, provider: Provider },

    /// No credential row exists for the (project, provider) pair
    #[error("no {provider} credential stored for project {project_id}")]
    NoCredential { project_id: i64, provider: Provider },

    /// Rate limit persisted through every local retry
    #[error("provider rate limit exhausted after {attempts} attempts")]
    ProviderRateLimited {
        attempts: u32,
        retry_after: Option<u64>,
    },

    /// Transient provider failure persisted through every local retry
    #[error("provider request failed: {details}")]
    ProviderUnavailable { details: String },

    /// No client registered for the requested provider
    #[error("provider '{provider}' is not configured")]
    ProviderNotConfigured { provider: Provider },

    /// Another sync for the same (project, provider) holds the advisory lock
    #[error("a sync for this project and provider is already running")]
    SyncInProgress,

    /// The run was cancelled or timed out; committed rows remain
    #[error("sync run cancelled")]
    Cancelled,

    /// Storage failure
    #[error("storage error: {details}")]
    Storage { details: String },
}

impl SyncFailure {
    /// Stable machine-readable code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            SyncFailure::MalformedState => "malformed_state",
            SyncFailure::TokenExchangeFailed { .. } => "token_exchange_failed",
            SyncFailure::CredentialExpiredNoRefresh => "credential_expired_no_refresh",
            SyncFailure::RefreshRejected { .. } => "refresh_rejected",
            SyncFailure::ProviderUnauthorized { .. } => "provider_unauthorized",
            SyncFailure::NoResourceBound { .. } => "no_resource_bound",
            SyncFailure::NoCredential { .. } => "no_credential",
            SyncFailure::ProviderRateLimited { .. } => "provider_rate_limited",
            SyncFailure::ProviderUnavailable { .. } => "provider_unavailable",
            SyncFailure::ProviderNotConfigured { .. } => "provider_not_configured",
            SyncFailure::SyncInProgress => "sync_in_progress",
            SyncFailure::Cancelled => "sync_cancelled",
            SyncFailure::Storage { .. } => "storage_error",
        }
    }

    /// Whether the user must re-authorize the integration to recover.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(
            self,
            SyncFailure::CredentialExpiredNoRefresh
                | SyncFailure::RefreshRejected { .. }
                | SyncFailure::ProviderUnauthorized { .. }
        )
    }

    /// HTTP status the failure maps to on the sync-trigger endpoint.
    pub fn status_code(&self) -> StatusCode {
        match self {
            SyncFailure::MalformedState | SyncFailure::TokenExchangeFailed { .. } => {
                StatusCode::BAD_REQUEST
            }
            SyncFailure::CredentialExpiredNoRefresh
            | SyncFailure::RefreshRejected { .. }
            | SyncFailure::ProviderUnauthorized { .. } => StatusCode::UNAUTHORIZED,
            SyncFailure::NoResourceBound { .. }
            | SyncFailure::NoCredential { .. }
            | SyncFailure::ProviderNotConfigured { .. } => StatusCode::NOT_FOUND,
            SyncFailure::SyncInProgress => StatusCode::CONFLICT,
            SyncFailure::ProviderRateLimited { .. } | SyncFailure::ProviderUnavailable { .. } => {
                StatusCode::BAD_GATEWAY
            }
            SyncFailure::Cancelled => StatusCode::GATEWAY_TIMEOUT,
            SyncFailure::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Retry-After hint for rate-limited failures.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            SyncFailure::ProviderRateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<sea_orm::DbErr> for SyncFailure {
    fn from(error: sea_orm::DbErr) -> Self {
        tracing::error!(error = ?error, "Storage operation failed");
        SyncFailure::Storage {
            details: error.to_string(),
        }
    }
}

impl From<RegistryError> for SyncFailure {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::ProviderNotConfigured { provider } => {
                SyncFailure::ProviderNotConfigured { provider }
            }
        }
    }
}

/// Classify a provider error encountered on a data call, after local
/// retries are exhausted (or skipped because the error is not retryable).
impl SyncFailure {
    pub fn from_provider_error(error: ProviderError, attempts: u32) -> Self {
        match error {
            ProviderError::RateLimited { retry_after } => SyncFailure::ProviderRateLimited {
                attempts,
                retry_after,
            },
            ProviderError::Auth { details } => SyncFailure::ProviderUnauthorized { details },
            other => SyncFailure::ProviderUnavailable {
                details: other.to_string(),
            },
        }
    }
}

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Suggested retry delay in seconds (optional)
    pub retry_after: Option<u64>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            retry_after: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Set retry after delay
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Extract current trace ID from the active trace context (falls back
    /// to a generated correlation ID)
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                Some(format!("corr-{}", &uuid::Uuid::new_v4().to_string()[..8]).into_boxed_str())
            })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        if let Some(retry_after) = self.retry_after
            && let Ok(header_value) = HeaderValue::from_str(&retry_after.to_string())
        {
            headers.insert("retry-after", header_value);
        }

        (self.status, headers, axum::Json(self)).into_response()
    }
}

// Error mappers for common sources

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", error);

        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        match error {
            sea_orm::DbErr::RecordNotFound(record) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Record not found: {}", record),
            ),
            sea_orm::DbErr::Conn(connection_err) => {
                tracing::error!("Database connection error: {:?}", connection_err);
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service unavailable",
                )
            }
            other => {
                tracing::error!("Database error: {:?}", other);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Database error occurred",
                )
            }
        }
    }
}

impl From<SyncFailure> for ApiError {
    fn from(failure: SyncFailure) -> Self {
        let mut error = ApiError::new(
            failure.status_code(),
            failure.error_code(),
            &failure.to_string(),
        );
        if let Some(retry_after) = failure.retry_after() {
            error = error.with_retry_after(retry_after);
        }
        error
    }
}

/// Create an unauthorized error (401)
pub fn unauthorized(message: Option<&str>) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg)
}

/// Create an unauthorized error (401) with explicit trace_id
pub fn unauthorized_with_trace_id(message: Option<&str>, trace_id: String) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    let mut error = ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg);
    error.trace_id = Some(trace_id.into_boxed_str());
    error
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_api_error_basic() {
        let error = ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "Test error message",
        );

        assert_eq!(error.code, Box::from("VALIDATION_FAILED"));
        assert_eq!(error.message, Box::from("Test error message"));
        assert!(error.details.is_none());
        assert_eq!(error.retry_after, None);
    }

    #[test]
    fn test_api_error_with_details() {
        let error = ApiError::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", "Test error message")
            .with_details(json!({"field": "value"}));

        assert_eq!(error.details, Some(Box::new(json!({"field": "value"}))));
    }

    #[test]
    fn test_trace_id_generation() {
        let error = ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Test error",
        );

        let trace_id = error.trace_id.unwrap();
        assert!(trace_id.starts_with("corr-"));
        assert_eq!(trace_id.len(), 13); // "corr-" + 8 chars
    }

    #[test]
    fn test_content_type_and_retry_after_headers() {
        let error = ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            "Rate limit exceeded",
        )
        .with_retry_after(60);

        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
        assert_eq!(response.headers().get("retry-after").unwrap(), "60");
    }

    #[test]
    fn test_sync_failure_error_codes_are_distinct() {
        let failures = [
            SyncFailure::MalformedState,
            SyncFailure::TokenExchangeFailed {
                details: "x".into(),
            },
            SyncFailure::CredentialExpiredNoRefresh,
            SyncFailure::RefreshRejected {
                details: "x".into(),
            },
            SyncFailure::ProviderUnauthorized {
                details: "x".into(),
            },
            SyncFailure::NoResourceBound {
                project_id: 1,
                provider: Provider::Gsc,
            },
            SyncFailure::NoCredential {
                project_id: 1,
                provider: Provider::Gsc,
            },
            SyncFailure::ProviderRateLimited {
                attempts: 3,
                retry_after: None,
            },
            SyncFailure::ProviderUnavailable {
                details: "x".into(),
            },
            SyncFailure::ProviderNotConfigured {
                provider: Provider::Ahrefs,
            },
            SyncFailure::SyncInProgress,
            SyncFailure::Cancelled,
            SyncFailure::Storage {
                details: "x".into(),
            },
        ];

        let mut codes: Vec<_> = failures.iter().map(|f| f.error_code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), failures.len());
    }

    #[test]
    fn test_reauthorization_flags() {
        assert!(SyncFailure::CredentialExpiredNoRefresh.requires_reauthorization());
        assert!(
            SyncFailure::RefreshRejected {
                details: "revoked".into()
            }
            .requires_reauthorization()
        );
        assert!(
            !SyncFailure::NoCredential {
                project_id: 1,
                provider: Provider::Ga4
            }
            .requires_reauthorization()
        );
        assert!(
            !SyncFailure::ProviderRateLimited {
                attempts: 3,
                retry_after: Some(30)
            }
            .requires_reauthorization()
        );
    }

    #[test]
    fn test_provider_error_classification() {
        let failure = SyncFailure::from_provider_error(
            ProviderError::RateLimited {
                retry_after: Some(120),
            },
            3,
        );
        assert!(matches!(
            failure,
            SyncFailure::ProviderRateLimited {
                attempts: 3,
                retry_after: Some(120)
            }
        ));
        assert_eq!(failure.retry_after(), Some(120));

        let failure = SyncFailure::from_provider_error(
            ProviderError::Auth {
                details: "revoked".into(),
            },
            1,
        );
        assert!(matches!(failure, SyncFailure::ProviderUnauthorized { .. }));

        let failure = SyncFailure::from_provider_error(
            ProviderError::Http {
                status: 503,
                body: None,
            },
            3,
        );
        assert!(matches!(failure, SyncFailure::ProviderUnavailable { .. }));
    }

    #[test]
    fn test_sync_failure_maps_to_api_error() {
        let api_error: ApiError = SyncFailure::ProviderRateLimited {
            attempts: 3,
            retry_after: Some(45),
        }
        .into();
        assert_eq!(api_error.status, StatusCode::BAD_GATEWAY);
        assert_eq!(api_error.code, Box::from("provider_rate_limited"));
        assert_eq!(api_error.retry_after, Some(45));

        let api_error: ApiError = SyncFailure::NoCredential {
            project_id: 27,
            provider: Provider::Ga4,
        }
        .into();
        assert_eq!(api_error.status, StatusCode::NOT_FOUND);
        assert!(api_error.message.contains("27"));
    }
}
