//! Sync Orchestrator
//!
//! Drives one sync run for a (project, provider) pair: resolves the
//! resource binding, ensures the credential is valid, streams the
//! provider report page by page, and commits each page through the
//! idempotent upsert layer. Rows committed before a failure stay
//! committed; every failure reports how far the run got.
//!
//! Day-count to date-range arithmetic lives here and nowhere else;
//! callers pass a day count, never raw dates.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use metrics::{counter, histogram};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::AppConfig;
use crate::error::SyncFailure;
use crate::providers::{DateRange, MetricPage, PageCursor, Provider, ProviderRegistry};
use crate::refresher::TokenRefresher;
use crate::repositories::{BindingRepository, CredentialRepository, MetricRepository};
use crate::retry::RetryPolicy;

/// One sync invocation.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub project_id: i64,
    pub provider: Provider,
    /// Explicit resource to sync; resolved from the binding table when absent
    pub resource_id: Option<String>,
    /// Days of history to cover; the configured default when absent
    pub days: Option<u32>,
}

/// Outcome of a completed sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub rows_synced: u64,
    pub date_range: DateRange,
}

/// A failed sync run, carrying the partial progress made before the
/// failure so callers can distinguish "zero rows available" from
/// "failed after N rows".
#[derive(Debug)]
pub struct SyncRunError {
    pub failure: SyncFailure,
    pub rows_synced: u64,
    pub date_range: Option<DateRange>,
}

impl std::fmt::Display for SyncRunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (rows synced before failure: {})", self.failure, self.rows_synced)
    }
}

impl std::error::Error for SyncRunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.failure)
    }
}

impl From<SyncFailure> for SyncRunError {
    fn from(failure: SyncFailure) -> Self {
        Self {
            failure,
            rows_synced: 0,
            date_range: None,
        }
    }
}

type LockKey = (i64, Provider);

/// Advisory per-(project, provider) lock set. Guards provider quota
/// against redundant concurrent fetches; correctness never depends on it
/// because the upsert layer tolerates interleaving.
#[derive(Debug, Default)]
struct SyncLocks(Mutex<HashSet<LockKey>>);

impl SyncLocks {
    fn try_acquire(self: &Arc<Self>, key: LockKey) -> Option<SyncLockGuard> {
        let mut held = self.0.lock().expect("sync lock set poisoned");
        if held.insert(key) {
            Some(SyncLockGuard {
                locks: Arc::clone(self),
                key,
            })
        } else {
            None
        }
    }
}

struct SyncLockGuard {
    locks: Arc<SyncLocks>,
    key: LockKey,
}

impl Drop for SyncLockGuard {
    fn drop(&mut self) {
        let mut held = self.locks.0.lock().expect("sync lock set poisoned");
        held.remove(&self.key);
    }
}

/// Orchestrates sync runs across the provider registry and repositories.
pub struct SyncOrchestrator {
    registry: Arc<ProviderRegistry>,
    credentials: CredentialRepository,
    bindings: BindingRepository,
    metrics: MetricRepository,
    refresher: TokenRefresher,
    retry: RetryPolicy,
    default_days: u32,
    run_timeout: Duration,
    locks: Arc<SyncLocks>,
}

impl SyncOrchestrator {
    pub fn new(
        config: &AppConfig,
        registry: Arc<ProviderRegistry>,
        credentials: CredentialRepository,
        bindings: BindingRepository,
        metrics: MetricRepository,
        refresher: TokenRefresher,
    ) -> Self {
        Self {
            registry,
            credentials,
            bindings,
            metrics,
            refresher,
            retry: RetryPolicy::from_config(&config.retry),
            default_days: config.sync.default_days,
            run_timeout: Duration::from_secs(config.sync.run_timeout_seconds),
            locks: Arc::new(SyncLocks::default()),
        }
    }

    /// Run a sync under the configured wall-clock budget. On timeout the
    /// in-flight provider call is cancelled and the rows already committed
    /// are reported.
    pub async fn run_sync_with_timeout(
        &self,
        request: SyncRequest,
    ) -> Result<SyncReport, SyncRunError> {
        let cancel = CancellationToken::new();
        let run = self.run_sync(request, cancel.clone());
        tokio::pin!(run);

        tokio::select! {
            result = &mut run => result,
            _ = tokio::time::sleep(self.run_timeout) => {
                warn!(timeout_secs = self.run_timeout.as_secs(), "Sync run timed out; cancelling");
                cancel.cancel();
                run.await
            }
        }
    }

    /// Run one sync for a (project, provider) pair.
    #[instrument(skip(self, cancel), fields(project_id = request.project_id, provider = %request.provider))]
    pub async fn run_sync(
        &self,
        request: SyncRequest,
        cancel: CancellationToken,
    ) -> Result<SyncReport, SyncRunError> {
        let run_start = std::time::Instant::now();
        let project_id = request.project_id;
        let provider = request.provider;

        let Some(_guard) = self.locks.try_acquire((project_id, provider)) else {
            return Err(SyncFailure::SyncInProgress.into());
        };

        let client = self.registry.get(provider).map_err(SyncFailure::from)?;

        // Binding resolution happens before any credential or provider
        // work: an unbound project must not cost provider quota.
        let resource_id = match request.resource_id {
            Some(resource_id) => {
                let bound = self
                    .bindings
                    .is_bound(project_id, provider, &resource_id)
                    .await
                    .map_err(storage_failure)?;
                if !bound {
                    return Err(SyncFailure::NoResourceBound {
                        project_id,
                        provider,
                    }
                    .into());
                }
                resource_id
            }
            None => self
                .bindings
                .resolve(project_id, provider)
                .await
                .map_err(storage_failure)?
                .ok_or(SyncFailure::NoResourceBound {
                    project_id,
                    provider,
                })?,
        };

        let credential = self
            .credentials
            .get(project_id, provider)
            .await
            .map_err(storage_failure)?
            .ok_or(SyncFailure::NoCredential {
                project_id,
                provider,
            })?;

        let credential = self
            .refresher
            .ensure_valid(client.as_ref(), credential, Utc::now())
            .await?;

        let (access_token, _) = self
            .credentials
            .decrypt_tokens(&credential)
            .map_err(storage_failure)?;

        let days = request.days.unwrap_or(self.default_days);
        let range = DateRange::last_days(Utc::now().date_naive(), days);

        info!(resource_id = %resource_id, range = %range, "Starting sync run");

        let mut rows_synced: u64 = 0;
        let mut cursor = PageCursor::default();

        loop {
            if cancel.is_cancelled() {
                return Err(self.partial(SyncFailure::Cancelled, rows_synced, range));
            }

            let page = self
                .fetch_page_with_retry(
                    client.as_ref(),
                    &access_token,
                    &resource_id,
                    &range,
                    cursor,
                    &cancel,
                )
                .await
                .map_err(|failure| self.partial(failure, rows_synced, range))?;

            let MetricPage { rows, next } = page;
            let written = self
                .metrics
                .upsert_rows(project_id, &rows)
                .await
                .map_err(|e| self.partial(storage_failure(e), rows_synced, range))?;

            rows_synced += written;
            counter!("sync_rows_upserted_total", "provider" => provider.as_str())
                .increment(written);

            match next {
                Some(next_cursor) => cursor = next_cursor,
                None => break,
            }
        }

        histogram!("sync_run_duration_ms", "provider" => provider.as_str())
            .record(run_start.elapsed().as_secs_f64() * 1_000.0);

        info!(rows_synced, range = %range, "Sync run completed");

        Ok(SyncReport {
            rows_synced,
            date_range: range,
        })
    }

    fn partial(&self, failure: SyncFailure, rows_synced: u64, range: DateRange) -> SyncRunError {
        counter!("sync_run_failures_total", "error" => failure.error_code()).increment(1);
        SyncRunError {
            failure,
            rows_synced,
            date_range: Some(range),
        }
    }

    /// Fetch one page under the declared retry policy: transient failures
    /// and rate limits back off and retry up to the attempt budget;
    /// authorization failures surface immediately.
    async fn fetch_page_with_retry(
        &self,
        client: &dyn crate::providers::ProviderClient,
        access_token: &str,
        resource_id: &str,
        range: &DateRange,
        cursor: PageCursor,
        cancel: &CancellationToken,
    ) -> Result<MetricPage, SyncFailure> {
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SyncFailure::Cancelled),
                result = client.fetch_page(access_token, resource_id, range, cursor) => result,
            };

            let error = match result {
                Ok(page) => return Ok(page),
                Err(error) => error,
            };

            if !error.is_retryable() || !self.retry.attempts_remaining(attempts) {
                return Err(SyncFailure::from_provider_error(error, attempts));
            }

            let delay = self.retry.backoff_delay(attempts - 1, error.retry_after());
            warn!(
                attempt = attempts,
                delay_secs = delay.as_secs_f64(),
                error = %error,
                "Page fetch failed; backing off before retry"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(SyncFailure::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

fn storage_failure(error: anyhow::Error) -> SyncFailure {
    SyncFailure::Storage {
        details: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advisory_lock_excludes_same_pair_only() {
        let locks = Arc::new(SyncLocks::default());

        let guard = locks.try_acquire((27, Provider::Gsc)).unwrap();

        // Same pair is held, other pairs are not
        assert!(locks.try_acquire((27, Provider::Gsc)).is_none());
        assert!(locks.try_acquire((27, Provider::Ga4)).is_some());
        assert!(locks.try_acquire((28, Provider::Gsc)).is_some());

        // Releasing the guard frees the pair
        drop(guard);
        assert!(locks.try_acquire((27, Provider::Gsc)).is_some());
    }

    #[test]
    fn test_sync_run_error_carries_partial_progress() {
        let error = SyncRunError {
            failure: SyncFailure::ProviderRateLimited {
                attempts: 3,
                retry_after: None,
            },
            rows_synced: 42,
            date_range: None,
        };
        assert!(error.to_string().contains("42"));

        let from_failure: SyncRunError = SyncFailure::SyncInProgress.into();
        assert_eq!(from_failure.rows_synced, 0);
        assert!(from_failure.date_range.is_none());
    }
}
