//! # Token Refresher
//!
//! Guarantees that a credential handed to a provider client is valid at
//! call time. A credential is treated as needing refresh once `now`
//! reaches `expires_at - skew`; the margin avoids racing expiry in the
//! middle of a provider call. A successful refresh is persisted before
//! control returns to the caller, so a crash right after refresh never
//! strands the new token in memory while a concurrent run reads the
//! stale row.

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, histogram};
use tracing::{info, instrument, warn};

use crate::error::SyncFailure;
use crate::models::credential;
use crate::providers::{ProviderClient, ProviderError};
use crate::repositories::CredentialRepository;

/// On-demand token refresher
#[derive(Debug, Clone)]
pub struct TokenRefresher {
    credentials: CredentialRepository,
    skew: Duration,
}

impl TokenRefresher {
    pub fn new(credentials: CredentialRepository, skew_seconds: u64) -> Self {
        Self {
            credentials,
            skew: Duration::seconds(skew_seconds.min(i64::MAX as u64) as i64),
        }
    }

    /// Whether a credential expiring at `expires_at` needs a refresh at
    /// `now`, given the configured skew.
    pub fn needs_refresh(expires_at: DateTime<Utc>, now: DateTime<Utc>, skew: Duration) -> bool {
        now >= expires_at - skew
    }

    /// Return a credential that is valid at `now`, refreshing and
    /// persisting it first when it is at or near expiry.
    #[instrument(skip_all, fields(project_id = credential.project_id, provider = %credential.provider))]
    pub async fn ensure_valid(
        &self,
        client: &dyn ProviderClient,
        credential: credential::Model,
        now: DateTime<Utc>,
    ) -> Result<credential::Model, SyncFailure> {
        let expires_at = credential.expires_at.with_timezone(&Utc);
        if !Self::needs_refresh(expires_at, now, self.skew) {
            return Ok(credential);
        }

        let (_, refresh_token) =
            self.credentials
                .decrypt_tokens(&credential)
                .map_err(|e| SyncFailure::Storage {
                    details: e.to_string(),
                })?;

        let Some(refresh_token) = refresh_token else {
            warn!("Credential expired with no stored refresh token; re-authorization required");
            return Err(SyncFailure::CredentialExpiredNoRefresh);
        };

        let refresh_start = std::time::Instant::now();
        let grant = match client.refresh(&refresh_token).await {
            Ok(grant) => grant,
            Err(ProviderError::Auth { details }) => {
                counter!("token_refresh_failure_total").increment(1);
                warn!(error = %details, "Provider refused the refresh token");
                return Err(SyncFailure::RefreshRejected { details });
            }
            Err(other) => {
                counter!("token_refresh_failure_total").increment(1);
                return Err(SyncFailure::from_provider_error(other, 1));
            }
        };

        // Persist before returning so the refreshed value is never lost
        // mid-flight relative to a concurrent reader.
        let updated = self
            .credentials
            .apply_refresh(&credential, &grant, now)
            .await
            .map_err(|e| SyncFailure::Storage {
                details: e.to_string(),
            })?;

        histogram!("token_refresh_latency_ms")
            .record(refresh_start.elapsed().as_secs_f64() * 1_000.0);
        counter!("token_refresh_success_total").increment(1);

        info!(
            rotated_refresh_token = grant.refresh_token.is_some(),
            new_expires_at = %updated.expires_at,
            "Refreshed credential tokens"
        );

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_refresh_policy() {
        let skew = Duration::seconds(300);
        let expires_at = Utc::now();

        // Well before the skew window: no refresh
        assert!(!TokenRefresher::needs_refresh(
            expires_at,
            expires_at - Duration::seconds(301),
            skew
        ));

        // Exactly at the window edge counts as needing refresh
        assert!(TokenRefresher::needs_refresh(
            expires_at,
            expires_at - Duration::seconds(300),
            skew
        ));

        // Inside the window and past expiry both refresh
        assert!(TokenRefresher::needs_refresh(
            expires_at,
            expires_at - Duration::seconds(10),
            skew
        ));
        assert!(TokenRefresher::needs_refresh(
            expires_at,
            expires_at + Duration::seconds(10),
            skew
        ));
    }
}
