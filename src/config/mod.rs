//! Configuration loading for the SEO Integrations service.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `SEOPS_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf};

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::providers::Provider;

/// Application configuration derived from `SEOPS_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    /// Bearer tokens accepted on operator endpoints (authorize, sync, status)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operator_tokens: Vec<String>,
    /// 32-byte AES-256-GCM key for token-at-rest encryption
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crypto_key: Option<Vec<u8>>,
    /// Dashboard base URL; OAuth callbacks redirect the browser back here
    #[serde(default = "default_app_base_url")]
    pub app_base_url: String,
    /// Public base URL of this service, used to build OAuth redirect URIs
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_client_secret: Option<String>,
    #[serde(default = "default_google_auth_base")]
    pub google_auth_base: String,
    #[serde(default = "default_google_token_base")]
    pub google_token_base: String,
    #[serde(default = "default_google_userinfo_base")]
    pub google_userinfo_base: String,
    #[serde(default = "default_gsc_api_base")]
    pub gsc_api_base: String,
    #[serde(default = "default_ga4_data_api_base")]
    pub ga4_data_api_base: String,
    #[serde(default = "default_ga4_admin_api_base")]
    pub ga4_admin_api_base: String,
    #[serde(default = "default_provider_http_timeout_ms")]
    pub provider_http_timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryPolicyConfig,
    #[serde(default)]
    pub token_refresh: TokenRefreshConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Retry policy configuration for transient provider failures.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RetryPolicyConfig {
    /// Total attempts per page fetch, including the first (default: 3)
    ///
    /// Environment variable: `SEOPS_RETRY_MAX_ATTEMPTS`
    #[serde(default = "default_retry_max_attempts")]
    #[schema(example = 3)]
    pub max_attempts: u32,

    /// Base retry interval in seconds (default: 5)
    ///
    /// Subsequent retries use exponential backoff: base_seconds * 2^attempts.
    ///
    /// Environment variable: `SEOPS_RETRY_BASE_SECONDS`
    #[serde(default = "default_retry_base_seconds")]
    #[schema(example = 5)]
    pub base_seconds: u64,

    /// Maximum retry interval in seconds (default: 900)
    ///
    /// Environment variable: `SEOPS_RETRY_MAX_SECONDS`
    #[serde(default = "default_retry_max_seconds")]
    #[schema(example = 900)]
    pub max_seconds: u64,

    /// Jitter factor applied on top of the computed backoff (default: 0.1)
    ///
    /// Environment variable: `SEOPS_RETRY_JITTER_FACTOR`
    #[serde(default = "default_retry_jitter_factor")]
    #[schema(example = 0.1)]
    pub jitter_factor: f64,
}

/// Token refresh configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct TokenRefreshConfig {
    /// Safety margin before expiry at which a credential is refreshed
    /// (default: 300 seconds)
    ///
    /// Environment variable: `SEOPS_TOKEN_REFRESH_SKEW_SECONDS`
    #[serde(default = "default_token_refresh_skew_seconds")]
    pub skew_seconds: u64,
}

/// Sync run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SyncConfig {
    /// Days of history a sync covers when the caller does not say
    /// (default: 28)
    ///
    /// Environment variable: `SEOPS_SYNC_DEFAULT_DAYS`
    #[serde(default = "default_sync_default_days")]
    pub default_days: u32,

    /// Rows requested per report page (default: 10000)
    ///
    /// Environment variable: `SEOPS_SYNC_PAGE_SIZE`
    #[serde(default = "default_sync_page_size")]
    pub page_size: u64,

    /// Wall-clock budget for one sync run before it is cancelled
    /// (default: 300 seconds)
    ///
    /// Environment variable: `SEOPS_SYNC_RUN_TIMEOUT_SECONDS`
    #[serde(default = "default_sync_run_timeout_seconds")]
    pub run_timeout_seconds: u64,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_max_attempts(),
            base_seconds: default_retry_base_seconds(),
            max_seconds: default_retry_max_seconds(),
            jitter_factor: default_retry_jitter_factor(),
        }
    }
}

impl Default for TokenRefreshConfig {
    fn default() -> Self {
        Self {
            skew_seconds: default_token_refresh_skew_seconds(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_days: default_sync_default_days(),
            page_size: default_sync_page_size(),
            run_timeout_seconds: default_sync_run_timeout_seconds(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            operator_tokens: Vec::new(),
            crypto_key: None,
            app_base_url: default_app_base_url(),
            public_base_url: default_public_base_url(),
            google_client_id: None,
            google_client_secret: None,
            google_auth_base: default_google_auth_base(),
            google_token_base: default_google_token_base(),
            google_userinfo_base: default_google_userinfo_base(),
            gsc_api_base: default_gsc_api_base(),
            ga4_data_api_base: default_ga4_data_api_base(),
            ga4_admin_api_base: default_ga4_admin_api_base(),
            provider_http_timeout_ms: default_provider_http_timeout_ms(),
            retry: RetryPolicyConfig::default(),
            token_refresh: TokenRefreshConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl AppConfig {
    /// Resolve the configured bind address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.api_bind_addr
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                key: "API_BIND_ADDR".to_string(),
                value: self.api_bind_addr.clone(),
            })
    }

    /// Redirect URI registered with the provider for the given integration.
    pub fn oauth_redirect_uri(&self, provider: Provider) -> String {
        format!(
            "{}/integrations/{}/callback",
            self.public_base_url.trim_end_matches('/'),
            provider
        )
    }

    /// Serialize the configuration with secrets removed, for startup logs.
    pub fn redacted_json(&self) -> Result<String, serde_json::Error> {
        let mut redacted = self.clone();
        redacted.operator_tokens = Vec::new();
        redacted.crypto_key = None;
        if redacted.google_client_secret.is_some() {
            redacted.google_client_secret = Some("[REDACTED]".to_string());
        }
        serde_json::to_string(&redacted)
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read env file {path}: {source}")]
    EnvFile {
        path: String,
        source: dotenvy::Error,
    },
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
    #[error("invalid crypto key: {message}")]
    InvalidCryptoKey { message: String },
}

/// Loads an [`AppConfig`] from layered env files and process environment.
///
/// Layering, weakest first: `.env`, `.env.local`, `.env.<profile>`, then
/// the process environment. Every key carries the `SEOPS_` prefix.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads configuration from the layered sources.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut layered = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix("SEOPS_") {
                layered.insert(stripped.to_string(), value);
            }
        }

        Self::build(layered)
    }

    fn collect_layered_env(&self) -> Result<BTreeMap<String, String>, ConfigError> {
        let mut layered = BTreeMap::new();

        // Profile can be pinned by the process env; it decides which
        // `.env.<profile>` file applies.
        let profile_hint = env::var("SEOPS_PROFILE").unwrap_or_else(|_| default_profile());

        for file in [
            ".env".to_string(),
            ".env.local".to_string(),
            format!(".env.{}", profile_hint),
        ] {
            let path = self.base_dir.join(&file);
            if !path.exists() {
                continue;
            }
            let entries =
                dotenvy::from_path_iter(&path).map_err(|source| ConfigError::EnvFile {
                    path: path.display().to_string(),
                    source,
                })?;
            for entry in entries {
                let (key, value) = entry.map_err(|source| ConfigError::EnvFile {
                    path: path.display().to_string(),
                    source,
                })?;
                if let Some(stripped) = key.strip_prefix("SEOPS_") {
                    layered.insert(stripped.to_string(), value);
                }
            }
        }

        Ok(layered)
    }

    fn build(mut layered: BTreeMap<String, String>) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(profile) = take_nonempty(&mut layered, "PROFILE") {
            config.profile = profile;
        }
        if let Some(addr) = take_nonempty(&mut layered, "API_BIND_ADDR") {
            config.api_bind_addr = addr;
        }
        if let Some(level) = take_nonempty(&mut layered, "LOG_LEVEL") {
            config.log_level = level;
        }
        if let Some(format) = take_nonempty(&mut layered, "LOG_FORMAT") {
            config.log_format = format;
        }
        if let Some(url) = take_nonempty(&mut layered, "DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(value) = take_nonempty(&mut layered, "DB_MAX_CONNECTIONS") {
            config.db_max_connections = parse_value(&value, "DB_MAX_CONNECTIONS")?;
        }
        if let Some(value) = take_nonempty(&mut layered, "DB_ACQUIRE_TIMEOUT_MS") {
            config.db_acquire_timeout_ms = parse_value(&value, "DB_ACQUIRE_TIMEOUT_MS")?;
        }
        if let Some(tokens) = take_nonempty(&mut layered, "OPERATOR_TOKENS") {
            config.operator_tokens = tokens
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(key) = take_nonempty(&mut layered, "CRYPTO_KEY") {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(key.trim())
                .map_err(|e| ConfigError::InvalidCryptoKey {
                    message: format!("not valid base64: {}", e),
                })?;
            if bytes.len() != 32 {
                return Err(ConfigError::InvalidCryptoKey {
                    message: format!("expected 32 bytes, got {}", bytes.len()),
                });
            }
            config.crypto_key = Some(bytes);
        }
        if let Some(url) = take_nonempty(&mut layered, "APP_BASE_URL") {
            config.app_base_url = url;
        }
        if let Some(url) = take_nonempty(&mut layered, "PUBLIC_BASE_URL") {
            config.public_base_url = url;
        }
        config.google_client_id = take_nonempty(&mut layered, "GOOGLE_CLIENT_ID");
        config.google_client_secret = take_nonempty(&mut layered, "GOOGLE_CLIENT_SECRET");
        if let Some(url) = take_nonempty(&mut layered, "GOOGLE_AUTH_BASE") {
            config.google_auth_base = url;
        }
        if let Some(url) = take_nonempty(&mut layered, "GOOGLE_TOKEN_BASE") {
            config.google_token_base = url;
        }
        if let Some(url) = take_nonempty(&mut layered, "GOOGLE_USERINFO_BASE") {
            config.google_userinfo_base = url;
        }
        if let Some(url) = take_nonempty(&mut layered, "GSC_API_BASE") {
            config.gsc_api_base = url;
        }
        if let Some(url) = take_nonempty(&mut layered, "GA4_DATA_API_BASE") {
            config.ga4_data_api_base = url;
        }
        if let Some(url) = take_nonempty(&mut layered, "GA4_ADMIN_API_BASE") {
            config.ga4_admin_api_base = url;
        }
        if let Some(value) = take_nonempty(&mut layered, "PROVIDER_HTTP_TIMEOUT_MS") {
            config.provider_http_timeout_ms = parse_value(&value, "PROVIDER_HTTP_TIMEOUT_MS")?;
        }
        if let Some(value) = take_nonempty(&mut layered, "RETRY_MAX_ATTEMPTS") {
            config.retry.max_attempts = parse_value(&value, "RETRY_MAX_ATTEMPTS")?;
        }
        if let Some(value) = take_nonempty(&mut layered, "RETRY_BASE_SECONDS") {
            config.retry.base_seconds = parse_value(&value, "RETRY_BASE_SECONDS")?;
        }
        if let Some(value) = take_nonempty(&mut layered, "RETRY_MAX_SECONDS") {
            config.retry.max_seconds = parse_value(&value, "RETRY_MAX_SECONDS")?;
        }
        if let Some(value) = take_nonempty(&mut layered, "RETRY_JITTER_FACTOR") {
            config.retry.jitter_factor = parse_value(&value, "RETRY_JITTER_FACTOR")?;
        }
        if let Some(value) = take_nonempty(&mut layered, "TOKEN_REFRESH_SKEW_SECONDS") {
            config.token_refresh.skew_seconds = parse_value(&value, "TOKEN_REFRESH_SKEW_SECONDS")?;
        }
        if let Some(value) = take_nonempty(&mut layered, "SYNC_DEFAULT_DAYS") {
            config.sync.default_days = parse_value(&value, "SYNC_DEFAULT_DAYS")?;
        }
        if let Some(value) = take_nonempty(&mut layered, "SYNC_PAGE_SIZE") {
            config.sync.page_size = parse_value(&value, "SYNC_PAGE_SIZE")?;
        }
        if let Some(value) = take_nonempty(&mut layered, "SYNC_RUN_TIMEOUT_SECONDS") {
            config.sync.run_timeout_seconds = parse_value(&value, "SYNC_RUN_TIMEOUT_SECONDS")?;
        }

        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn take_nonempty(layered: &mut BTreeMap<String, String>, key: &str) -> Option<String> {
    layered.remove(key).filter(|v| !v.is_empty())
}

fn parse_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn default_profile() -> String {
    "dev".to_string()
}

fn default_api_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_url() -> String {
    "postgres://localhost/seops".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5_000
}

fn default_app_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_google_auth_base() -> String {
    "https://accounts.google.com/o/oauth2/v2/auth".to_string()
}

fn default_google_token_base() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_google_userinfo_base() -> String {
    "https://www.googleapis.com/oauth2/v2/userinfo".to_string()
}

fn default_gsc_api_base() -> String {
    "https://www.googleapis.com/webmasters/v3".to_string()
}

fn default_ga4_data_api_base() -> String {
    "https://analyticsdata.googleapis.com/v1beta".to_string()
}

fn default_ga4_admin_api_base() -> String {
    "https://analyticsadmin.googleapis.com/v1beta".to_string()
}

fn default_provider_http_timeout_ms() -> u64 {
    30_000
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_base_seconds() -> u64 {
    5
}

fn default_retry_max_seconds() -> u64 {
    900
}

fn default_retry_jitter_factor() -> f64 {
    0.1
}

fn default_token_refresh_skew_seconds() -> u64 {
    300
}

fn default_sync_default_days() -> u32 {
    28
}

fn default_sync_page_size() -> u64 {
    10_000
}

fn default_sync_run_timeout_seconds() -> u64 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.profile, "dev");
        assert_eq!(config.api_bind_addr, "127.0.0.1:8080");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.token_refresh.skew_seconds, 300);
        assert_eq!(config.sync.default_days, 28);
        assert!(config.operator_tokens.is_empty());
    }

    #[test]
    fn test_build_from_layered_values() {
        let mut layered = BTreeMap::new();
        layered.insert("PROFILE".to_string(), "prod".to_string());
        layered.insert(
            "DATABASE_URL".to_string(),
            "postgres://db/integrations".to_string(),
        );
        layered.insert("OPERATOR_TOKENS".to_string(), "alpha, beta,,".to_string());
        layered.insert("RETRY_MAX_ATTEMPTS".to_string(), "5".to_string());
        layered.insert("SYNC_DEFAULT_DAYS".to_string(), "90".to_string());

        let config = ConfigLoader::build(layered).unwrap();
        assert_eq!(config.profile, "prod");
        assert_eq!(config.database_url, "postgres://db/integrations");
        assert_eq!(
            config.operator_tokens,
            vec!["alpha".to_string(), "beta".to_string()]
        );
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.sync.default_days, 90);
    }

    #[test]
    fn test_build_rejects_bad_numbers() {
        let mut layered = BTreeMap::new();
        layered.insert("DB_MAX_CONNECTIONS".to_string(), "lots".to_string());

        let err = ConfigLoader::build(layered).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { key, .. } if key == "DB_MAX_CONNECTIONS")
        );
    }

    #[test]
    fn test_crypto_key_must_be_32_bytes() {
        let mut layered = BTreeMap::new();
        layered.insert(
            "CRYPTO_KEY".to_string(),
            base64::engine::general_purpose::STANDARD.encode([0u8; 16]),
        );
        assert!(matches!(
            ConfigLoader::build(layered).unwrap_err(),
            ConfigError::InvalidCryptoKey { .. }
        ));

        let mut layered = BTreeMap::new();
        layered.insert(
            "CRYPTO_KEY".to_string(),
            base64::engine::general_purpose::STANDARD.encode([7u8; 32]),
        );
        let config = ConfigLoader::build(layered).unwrap();
        assert_eq!(config.crypto_key, Some(vec![7u8; 32]));
    }

    #[test]
    fn test_oauth_redirect_uri() {
        let config = AppConfig {
            public_base_url: "https://integrations.example.com/".to_string(),
            ..AppConfig::default()
        };
        assert_eq!(
            config.oauth_redirect_uri(Provider::Gsc),
            "https://integrations.example.com/integrations/gsc/callback"
        );
    }

    #[test]
    fn test_redacted_json_hides_secrets() {
        let config = AppConfig {
            operator_tokens: vec!["secret-token".to_string()],
            google_client_secret: Some("hunter2".to_string()),
            crypto_key: Some(vec![1u8; 32]),
            ..AppConfig::default()
        };

        let json = config.redacted_json().unwrap();
        assert!(!json.contains("secret-token"));
        assert!(!json.contains("hunter2"));
        assert!(json.contains("[REDACTED]"));
    }

    #[test]
    fn test_layered_env_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".env"),
            "SEOPS_LOG_LEVEL=debug\nSEOPS_SYNC_PAGE_SIZE=500\nIGNORED_KEY=1\n",
        )
        .unwrap();
        std::fs::write(dir.path().join(".env.local"), "SEOPS_LOG_LEVEL=warn\n").unwrap();

        let loader = ConfigLoader::with_base_dir(dir.path().to_path_buf());
        let layered = loader.collect_layered_env().unwrap();
        assert_eq!(layered.get("LOG_LEVEL"), Some(&"warn".to_string()));
        assert_eq!(layered.get("SYNC_PAGE_SIZE"), Some(&"500".to_string()));
        assert!(!layered.contains_key("IGNORED_KEY"));
    }
}
