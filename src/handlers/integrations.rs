//! # Integration Handlers
//!
//! HTTP endpoints for the OAuth integration and sync pipeline: starting
//! an authorization flow, receiving the provider's OAuth callback, and
//! triggering sync runs.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Json, Redirect},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

use crate::auth::OperatorAuth;
use crate::error::{ApiError, SyncFailure};
use crate::orchestrator::{SyncReport, SyncRequest, SyncRunError};
use crate::providers::{AuthorizeParams, DateRange, Provider, ProviderMetadata};
use crate::repositories::NewCredential;
use crate::server::AppState;
use crate::state::{self, FlowState};

/// Request path parameter for provider slug
#[derive(Debug, Deserialize, ToSchema)]
pub struct ProviderPath {
    /// Provider identifier (e.g., "gsc", "ga4")
    pub provider: String,
}

fn parse_provider(slug: &str) -> Result<Provider, ApiError> {
    slug.parse().map_err(|_| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!("provider '{}' not found", slug),
        )
    })
}

/// List registered providers
#[utoipa::path(
    get,
    path = "/integrations/providers",
    responses(
        (status = 200, description = "Provider metadata", body = Vec<ProviderMetadata>)
    ),
    tag = "integrations"
)]
pub async fn list_providers(State(app): State<AppState>) -> Json<Vec<ProviderMetadata>> {
    Json(app.registry.list_metadata())
}

/// Request body for starting an authorization flow
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeRequest {
    /// Project the credential will be stored under
    pub project_id: i64,
}

/// OAuth authorization URL response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeUrlResponse {
    /// Complete authorization URL for user redirection
    pub authorize_url: String,
}

/// Start an OAuth flow for a provider
///
/// Encodes the flow context into an opaque state token and returns the
/// provider consent URL the dashboard should send the user to.
#[utoipa::path(
    post,
    path = "/integrations/{provider}/authorize",
    security(("bearer_auth" = [])),
    params(
        ("provider" = String, Path, description = "Provider identifier (e.g., 'gsc')")
    ),
    request_body = AuthorizeRequest,
    responses(
        (status = 200, description = "Authorization URL generated", body = AuthorizeUrlResponse),
        (status = 401, description = "Missing or invalid operator token", body = ApiError),
        (status = 404, description = "Provider not found or not configured", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "integrations"
)]
pub async fn start_authorize(
    State(app): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(provider_path): Path<ProviderPath>,
    Json(body): Json<AuthorizeRequest>,
) -> Result<Json<AuthorizeUrlResponse>, ApiError> {
    let provider = parse_provider(&provider_path.provider)?;
    let client = app.registry.get(provider).map_err(SyncFailure::from)?;

    let flow_state = FlowState::new(provider, body.project_id);
    let authorize_url = client
        .authorize_url(AuthorizeParams {
            state: state::encode(&flow_state),
        })
        .map_err(|err| {
            tracing::error!(provider = %provider, error = %err, "Failed to build authorize URL");
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "Failed to generate authorization URL",
            )
        })?;

    validate_authorize_url(&authorize_url)?;

    tracing::info!(
        project_id = body.project_id,
        provider = %provider,
        "OAuth flow initiated"
    );

    Ok(Json(AuthorizeUrlResponse {
        authorize_url: authorize_url.to_string(),
    }))
}

/// Validate authorization URL meets OAuth 2.0 and security requirements
fn validate_authorize_url(url: &Url) -> Result<(), ApiError> {
    // Must be HTTPS
    if url.scheme() != "https" {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Provider client bug: generated authorization URL must use HTTPS",
        ));
    }

    // Must not include fragment component per OAuth 2.0 RFC 6749 section 3.1
    if url.fragment().is_some() {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Provider client bug: generated authorization URL must not include fragment component",
        ));
    }

    // Maximum length 2048 characters
    if url.as_str().len() > 2048 {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Provider client bug: generated authorization URL exceeds maximum length",
        ));
    }

    Ok(())
}

/// Query parameters a provider sends to the OAuth callback
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CallbackParams {
    /// Authorization code; absent on the provider-reported failure path
    pub code: Option<String>,
    /// Opaque flow state threaded through the consent redirect
    pub state: Option<String>,
    /// Provider-reported failure code (e.g., "access_denied")
    pub error: Option<String>,
}

/// OAuth callback endpoint
///
/// Receives the provider redirect, exchanges the code for tokens, stores
/// the credential, and always answers with a redirect to the dashboard
/// integrations page carrying a success or error indicator. This endpoint
/// never shows the browser a bare error response.
#[utoipa::path(
    get,
    path = "/integrations/{provider}/callback",
    params(
        ("provider" = String, Path, description = "Provider identifier"),
        ("code" = Option<String>, Query, description = "Authorization code"),
        ("state" = Option<String>, Query, description = "Opaque flow state"),
        ("error" = Option<String>, Query, description = "Provider-reported error")
    ),
    responses(
        (status = 303, description = "Redirect to the dashboard integrations page")
    ),
    tag = "integrations"
)]
pub async fn oauth_callback(
    State(app): State<AppState>,
    Path(provider_path): Path<ProviderPath>,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    let path_provider = provider_path.provider.parse::<Provider>().ok();

    // Provider-reported failure: no token exchange is attempted, the
    // error code is reflected opaquely.
    if let Some(error) = params.error.as_deref() {
        tracing::warn!(provider = ?path_provider, error = %error, "Provider reported OAuth failure");
        return status_redirect(&app, path_provider, Err(&sanitize_error_code(error)));
    }

    // A malformed state falls back to defaults instead of aborting; the
    // user-visible failure then surfaces at a later step.
    let flow = match params.state.as_deref() {
        Some(token) => state::decode(token).unwrap_or_else(|_| {
            tracing::warn!("Malformed redirect state; falling back to defaults");
            FlowState::default()
        }),
        None => {
            tracing::warn!("Callback without state parameter; falling back to defaults");
            FlowState::default()
        }
    };

    let provider = flow.integration;
    if path_provider.is_some_and(|p| p != provider) {
        tracing::warn!(
            path_provider = ?path_provider,
            state_provider = %provider,
            "Callback path and state disagree on provider; trusting state"
        );
    }

    let client = match app.registry.get(provider) {
        Ok(client) => client,
        Err(err) => {
            tracing::error!(provider = %provider, error = %err, "Callback for unconfigured provider");
            return status_redirect(&app, Some(provider), Err("provider_not_configured"));
        }
    };

    let Some(code) = params.code.as_deref() else {
        tracing::warn!(provider = %provider, "Callback missing authorization code");
        return status_redirect(&app, Some(provider), Err("missing_code"));
    };

    let grant = match client.exchange_code(code).await {
        Ok(grant) => grant,
        Err(err) => {
            let failure = SyncFailure::TokenExchangeFailed {
                details: err.to_string(),
            };
            tracing::error!(provider = %provider, error = %failure, "Token exchange failed");
            return status_redirect(&app, Some(provider), Err(failure.error_code()));
        }
    };

    let Some(project_id) = flow.project_id else {
        tracing::error!(provider = %provider, "Flow state carries no project; credential not stored");
        return status_redirect(&app, Some(provider), Err("missing_project"));
    };

    let access_token = grant.access_token.clone();
    let credential = NewCredential::from_grant(project_id, provider, grant, Utc::now());
    if let Err(err) = app.credentials.put(credential).await {
        tracing::error!(
            project_id,
            provider = %provider,
            error = %err,
            "Failed to store credential"
        );
        return status_redirect(&app, Some(provider), Err("storage_failed"));
    }

    // Binding discovery is best-effort; a failure here must not fail an
    // authorization that already produced a stored credential.
    match client.discover(&access_token).await {
        Ok(resources) => {
            match app
                .bindings
                .insert_discovered(project_id, provider, &resources)
                .await
            {
                Ok(count) => {
                    tracing::info!(project_id, provider = %provider, discovered = count, "Recorded discovered resources");
                }
                Err(err) => {
                    tracing::warn!(project_id, provider = %provider, error = %err, "Failed to record discovered resources");
                }
            }
        }
        Err(err) => {
            tracing::warn!(project_id, provider = %provider, error = %err, "Resource discovery failed");
        }
    }

    tracing::info!(project_id, provider = %provider, "Authorization completed");
    status_redirect(&app, Some(provider), Ok(()))
}

/// Provider error codes are reflected into a redirect query parameter;
/// strip anything that is not a plain token and bound the length.
fn sanitize_error_code(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .take(64)
        .collect();
    if cleaned.is_empty() {
        "provider_error".to_string()
    } else {
        cleaned
    }
}

/// Build the terminal redirect to the dashboard integrations page.
fn status_redirect(
    app: &AppState,
    provider: Option<Provider>,
    outcome: Result<(), &str>,
) -> Redirect {
    let mut location = format!(
        "{}/settings/integrations",
        app.config.app_base_url.trim_end_matches('/')
    );

    let mut separator = '?';
    if let Some(provider) = provider {
        location.push(separator);
        location.push_str("provider=");
        location.push_str(provider.as_str());
        separator = '&';
    }
    match outcome {
        Ok(()) => {
            location.push(separator);
            location.push_str("success=true");
        }
        Err(code) => {
            location.push(separator);
            location.push_str("error=");
            location.push_str(code);
        }
    }

    Redirect::to(&location)
}

/// Request body for the sync trigger
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSyncRequest {
    pub project_id: i64,
    /// Explicit resource to sync; resolved from bindings when absent
    #[serde(default)]
    pub resource_id: Option<String>,
    /// Days of history to cover; server default when absent
    #[serde(default)]
    pub days: Option<u32>,
}

/// Structured sync trigger response. `rows_synced` reports partial
/// progress even on failure so callers can tell "zero rows available"
/// apart from "failed after N rows".
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSyncResponse {
    pub success: bool,
    pub rows_synced: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when the failure requires the user to re-authorize
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub requires_reauthorization: bool,
}

impl TriggerSyncResponse {
    fn success(report: SyncReport) -> Self {
        Self {
            success: true,
            rows_synced: report.rows_synced,
            date_range: Some(report.date_range),
            error: None,
            requires_reauthorization: false,
        }
    }

    fn failure(error: &SyncRunError) -> Self {
        Self {
            success: false,
            rows_synced: error.rows_synced,
            date_range: error.date_range,
            error: Some(error.failure.error_code().to_string()),
            requires_reauthorization: error.failure.requires_reauthorization(),
        }
    }
}

/// Trigger a sync run for a (project, provider) pair
///
/// Consumed by the external scheduler and the dashboard's manual "sync
/// now" action. Always answers with structured JSON carrying `success`.
#[utoipa::path(
    post,
    path = "/integrations/{provider}/sync",
    security(("bearer_auth" = [])),
    params(
        ("provider" = String, Path, description = "Provider identifier")
    ),
    request_body = TriggerSyncRequest,
    responses(
        (status = 200, description = "Sync completed", body = TriggerSyncResponse),
        (status = 401, description = "Missing operator token or credential requires re-authorization", body = TriggerSyncResponse),
        (status = 404, description = "No binding or credential for the pair", body = TriggerSyncResponse),
        (status = 409, description = "A sync for the pair is already running", body = TriggerSyncResponse),
        (status = 502, description = "Provider failure after partial progress", body = TriggerSyncResponse)
    ),
    tag = "integrations"
)]
pub async fn trigger_sync(
    State(app): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(provider_path): Path<ProviderPath>,
    Json(body): Json<TriggerSyncRequest>,
) -> Result<(StatusCode, Json<TriggerSyncResponse>), ApiError> {
    let provider = parse_provider(&provider_path.provider)?;

    let request = SyncRequest {
        project_id: body.project_id,
        provider,
        resource_id: body.resource_id,
        days: body.days,
    };

    match app.orchestrator.run_sync_with_timeout(request).await {
        Ok(report) => Ok((StatusCode::OK, Json(TriggerSyncResponse::success(report)))),
        Err(run_error) => {
            tracing::warn!(
                project_id = body.project_id,
                provider = %provider,
                error = %run_error,
                "Sync run failed"
            );
            Ok((
                run_error.failure.status_code(),
                Json(TriggerSyncResponse::failure(&run_error)),
            ))
        }
    }
}

/// Query parameters for the integration status endpoint
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationStatusQuery {
    pub project_id: i64,
}

/// Integration status for one (project, provider) pair
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationStatusResponse {
    pub provider: Provider,
    /// "connected" | "expired" | "missing"
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<serde_json::Value>,
    /// Resource the pair would sync from, when one is bound
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

/// Report whether a project has a live credential and binding for a provider
#[utoipa::path(
    get,
    path = "/integrations/{provider}/status",
    security(("bearer_auth" = [])),
    params(
        ("provider" = String, Path, description = "Provider identifier"),
        ("projectId" = i64, Query, description = "Project to inspect")
    ),
    responses(
        (status = 200, description = "Integration status", body = IntegrationStatusResponse),
        (status = 401, description = "Missing or invalid operator token", body = ApiError),
        (status = 404, description = "Provider not found", body = ApiError)
    ),
    tag = "integrations"
)]
pub async fn integration_status(
    State(app): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(provider_path): Path<ProviderPath>,
    Query(query): Query<IntegrationStatusQuery>,
) -> Result<Json<IntegrationStatusResponse>, ApiError> {
    let provider = parse_provider(&provider_path.provider)?;

    let credential = app
        .credentials
        .get(query.project_id, provider)
        .await
        .map_err(ApiError::from)?;

    let resource_id = app
        .bindings
        .resolve(query.project_id, provider)
        .await
        .map_err(ApiError::from)?;

    let response = match credential {
        Some(credential) => {
            let expired = credential.expires_at.with_timezone(&Utc) <= Utc::now();
            IntegrationStatusResponse {
                provider,
                status: if expired { "expired" } else { "connected" }.to_string(),
                account_email: credential.account_email,
                expires_at: Some(credential.expires_at.to_rfc3339()),
                scopes: credential.scopes,
                resource_id,
            }
        }
        None => IntegrationStatusResponse {
            provider,
            status: "missing".to_string(),
            account_email: None,
            expires_at: None,
            scopes: None,
            resource_id,
        },
    };

    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::DateRange;
    use chrono::NaiveDate;

    #[test]
    fn test_parse_provider() {
        assert_eq!(parse_provider("gsc").unwrap(), Provider::Gsc);
        assert_eq!(parse_provider("ga4").unwrap(), Provider::Ga4);

        let err = parse_provider("bing").unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert!(err.message.contains("bing"));
    }

    #[test]
    fn test_sanitize_error_code() {
        assert_eq!(sanitize_error_code("access_denied"), "access_denied");
        assert_eq!(
            sanitize_error_code("bad code <script>alert(1)</script>"),
            "badcodescriptalert1script"
        );
        assert_eq!(sanitize_error_code("<>&"), "provider_error");
        assert_eq!(sanitize_error_code(&"x".repeat(200)).len(), 64);
    }

    #[test]
    fn test_validate_authorize_url() {
        let valid =
            Url::parse("https://accounts.google.com/o/oauth2/v2/auth?client_id=x&state=y").unwrap();
        assert!(validate_authorize_url(&valid).is_ok());

        let http = Url::parse("http://accounts.google.com/o/oauth2/v2/auth").unwrap();
        assert!(validate_authorize_url(&http).is_err());

        let fragment = Url::parse("https://accounts.google.com/auth#fragment").unwrap();
        assert!(validate_authorize_url(&fragment).is_err());

        let mut long = "https://accounts.google.com/auth?q=".to_string();
        long.push_str(&"a".repeat(2048));
        let long = Url::parse(&long).unwrap();
        assert!(validate_authorize_url(&long).is_err());
    }

    #[test]
    fn test_trigger_sync_response_shapes() {
        let report = SyncReport {
            rows_synced: 120,
            date_range: DateRange {
                start: NaiveDate::from_ymd_opt(2026, 5, 13).unwrap(),
                end: NaiveDate::from_ymd_opt(2026, 6, 10).unwrap(),
            },
        };
        let json = serde_json::to_value(TriggerSyncResponse::success(report)).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["rowsSynced"], 120);
        assert_eq!(json["dateRange"]["start"], "2026-05-13");
        assert_eq!(json["dateRange"]["end"], "2026-06-10");
        assert!(json.get("error").is_none());
        assert!(json.get("requiresReauthorization").is_none());

        let run_error = SyncRunError {
            failure: SyncFailure::RefreshRejected {
                details: "revoked".into(),
            },
            rows_synced: 7,
            date_range: None,
        };
        let json = serde_json::to_value(TriggerSyncResponse::failure(&run_error)).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["rowsSynced"], 7);
        assert_eq!(json["error"], "refresh_rejected");
        assert_eq!(json["requiresReauthorization"], true);
    }
}
