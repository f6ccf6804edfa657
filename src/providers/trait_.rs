//! Provider client trait definition
//!
//! Defines the standard interface that all provider client implementations
//! must follow: OAuth consent URL generation, code exchange, token refresh,
//! resource discovery, and page-at-a-time report fetching.

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

/// Closed set of external data providers the pipeline can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Google Search Console
    Gsc,
    /// Google Analytics 4
    Ga4,
    /// Ahrefs (planned; no sync client yet)
    Ahrefs,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gsc => "gsc",
            Provider::Ga4 => "ga4",
            Provider::Ahrefs => "ahrefs",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown provider '{0}'")]
pub struct ParseProviderError(pub String);

impl std::str::FromStr for Provider {
    type Err = ParseProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gsc" => Ok(Provider::Gsc),
            "ga4" => Ok(Provider::Ga4),
            "ahrefs" => Ok(Provider::Ahrefs),
            other => Err(ParseProviderError(other.to_string())),
        }
    }
}

/// Provider-specific error types for structured error handling
#[derive(Debug, Clone)]
pub enum ProviderError {
    /// HTTP error from the upstream provider
    Http { status: u16, body: Option<String> },
    /// Rate limiting error, with the provider's retry hint when present
    RateLimited { retry_after: Option<u64> },
    /// Network or connectivity error
    Network { details: String, retryable: bool },
    /// Authentication/authorization error (invalid or revoked token)
    Auth { details: String },
    /// Malformed response from the provider
    MalformedResponse { details: String },
    /// Configuration or setup error
    Config { details: String },
}

impl ProviderError {
    /// Whether a bounded retry with backoff is worth attempting.
    /// Authorization failures are never retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. } => true,
            ProviderError::Network { retryable, .. } => *retryable,
            ProviderError::Http { status, .. } => *status >= 500,
            ProviderError::Auth { .. }
            | ProviderError::MalformedResponse { .. }
            | ProviderError::Config { .. } => false,
        }
    }

    /// Retry-After hint in seconds, when the provider sent one.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::Http { status, body } => {
                write!(
                    f,
                    "HTTP error {}: {}",
                    status,
                    body.as_deref().unwrap_or("no body")
                )
            }
            ProviderError::RateLimited { retry_after } => {
                write!(f, "rate limit exceeded")?;
                if let Some(after) = retry_after {
                    write!(f, " (retry after: {}s)", after)?;
                }
                Ok(())
            }
            ProviderError::Network { details, .. } => write!(f, "network error: {}", details),
            ProviderError::Auth { details } => write!(f, "authentication error: {}", details),
            ProviderError::MalformedResponse { details } => {
                write!(f, "malformed response: {}", details)
            }
            ProviderError::Config { details } => write!(f, "configuration error: {}", details),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Inclusive date range a sync run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Range ending today and reaching `days` back, the single place the
    /// "how many days" arithmetic lives.
    pub fn last_days(today: NaiveDate, days: u32) -> Self {
        let start = today
            .checked_sub_days(Days::new(u64::from(days)))
            .unwrap_or(NaiveDate::MIN);
        Self { start, end: today }
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Row offset into a paginated provider report. Both Google report APIs
/// paginate with numeric offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageCursor(pub u64);

/// One Search Console fact, keyed by (date, page, query) within a project.
#[derive(Debug, Clone, PartialEq)]
pub struct GscMetricRow {
    pub date: NaiveDate,
    pub page: String,
    pub query: String,
    pub clicks: i64,
    pub impressions: i64,
    pub position: f64,
}

/// One Analytics fact, keyed by (property, date) within a project.
#[derive(Debug, Clone, PartialEq)]
pub struct Ga4MetricRow {
    pub property_id: String,
    pub date: NaiveDate,
    pub sessions: i64,
    pub total_users: i64,
    pub new_users: i64,
    pub engaged_sessions: i64,
    pub engagement_rate: f64,
}

/// Provider-shaped metric rows, a closed union matching [`Provider`].
#[derive(Debug, Clone, PartialEq)]
pub enum MetricRow {
    Gsc(GscMetricRow),
    Ga4(Ga4MetricRow),
}

/// One page of a provider report, mapped into metric rows as it arrives.
#[derive(Debug, Clone)]
pub struct MetricPage {
    pub rows: Vec<MetricRow>,
    /// Cursor for the next page; `None` when the report is exhausted.
    pub next: Option<PageCursor>,
}

/// Parameters for consent URL generation
#[derive(Debug, Clone)]
pub struct AuthorizeParams {
    /// Encoded flow state to thread through the provider redirect
    pub state: String,
}

/// Token material returned by a provider's token endpoint.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    /// Absent on refresh responses unless the provider rotates the token
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
    pub scopes: Vec<String>,
    pub account_email: Option<String>,
}

/// A remote resource the authorized account can sync from, surfaced by
/// the post-authorization discovery step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredResource {
    pub resource_id: String,
    pub display_name: Option<String>,
}

/// Metadata describing a registered provider, for the listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProviderMetadata {
    pub provider: Provider,
    /// Whether a client is registered and ready to authorize/sync
    pub configured: bool,
    pub scopes: Vec<String>,
}

#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Which provider this client talks to.
    fn provider(&self) -> Provider;

    /// OAuth scopes this client requests at consent time.
    fn scopes(&self) -> Vec<String>;

    /// Build the provider consent URL for the user to visit.
    fn authorize_url(&self, params: AuthorizeParams) -> Result<Url, ProviderError>;

    /// Exchange an authorization code for tokens.
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, ProviderError>;

    /// Redeem a refresh token for a fresh access token.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ProviderError>;

    /// List remote resources the authorized account can sync from.
    async fn discover(&self, access_token: &str) -> Result<Vec<DiscoveredResource>, ProviderError>;

    /// Fetch one page of the date-bounded report, mapped into metric rows.
    /// Restartable: the same (range, cursor) always addresses the same page.
    async fn fetch_page(
        &self,
        access_token: &str,
        resource_id: &str,
        range: &DateRange,
        cursor: PageCursor,
    ) -> Result<MetricPage, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_slug_round_trip() {
        for provider in [Provider::Gsc, Provider::Ga4, Provider::Ahrefs] {
            let parsed: Provider = provider.as_str().parse().unwrap();
            assert_eq!(parsed, provider);
        }

        let err = "bing".parse::<Provider>().unwrap_err();
        assert_eq!(err.0, "bing");
    }

    #[test]
    fn test_date_range_last_days() {
        let today = NaiveDate::from_ymd_opt(2026, 6, 10).unwrap();
        let range = DateRange::last_days(today, 28);
        assert_eq!(range.end, today);
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2026, 5, 13).unwrap());

        // Zero days still yields a valid single-day range
        let range = DateRange::last_days(today, 0);
        assert_eq!(range.start, range.end);
    }

    #[test]
    fn test_retryability_classification() {
        assert!(ProviderError::RateLimited { retry_after: None }.is_retryable());
        assert!(
            ProviderError::Network {
                details: "timeout".into(),
                retryable: true
            }
            .is_retryable()
        );
        assert!(
            ProviderError::Http {
                status: 503,
                body: None
            }
            .is_retryable()
        );
        assert!(
            !ProviderError::Http {
                status: 400,
                body: None
            }
            .is_retryable()
        );
        assert!(
            !ProviderError::Auth {
                details: "revoked".into()
            }
            .is_retryable()
        );
    }
}
