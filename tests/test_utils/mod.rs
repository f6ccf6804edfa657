//! Shared helpers for integration tests: migrated SQLite databases,
//! mock-server-pointed configuration, and seed data.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use tempfile::TempDir;
use uuid::Uuid;

use integrations::config::AppConfig;
use integrations::models::{ga4_property, gsc_site};
use integrations::providers::Provider;
use integrations::repositories::NewCredential;
use integrations::server::AppState;

/// File-backed SQLite database with all migrations applied. The TempDir
/// must stay alive for the duration of the test.
pub async fn setup_test_db() -> (DatabaseConnection, TempDir) {
    let tmp = tempfile::tempdir().expect("create temp dir");
    let db_path = tmp.path().join("integrations_test.db");
    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let db = Database::connect(db_url)
        .await
        .expect("connect to test database");

    Migrator::up(&db, None).await.expect("apply migrations");

    (db, tmp)
}

/// Configuration pointing every provider endpoint at the mock server,
/// with fast retries and a fixed crypto key.
pub fn test_config(mock_uri: &str) -> AppConfig {
    AppConfig {
        operator_tokens: vec!["test-operator-token".to_string()],
        crypto_key: Some(vec![42u8; 32]),
        app_base_url: "http://dashboard.test".to_string(),
        public_base_url: "http://integrations.test".to_string(),
        google_client_id: Some("test-client-id".to_string()),
        google_client_secret: Some("test-client-secret".to_string()),
        google_token_base: format!("{}/token", mock_uri),
        google_userinfo_base: format!("{}/userinfo", mock_uri),
        gsc_api_base: format!("{}/gsc", mock_uri),
        ga4_data_api_base: format!("{}/ga4", mock_uri),
        ga4_admin_api_base: format!("{}/ga4admin", mock_uri),
        retry: integrations::config::RetryPolicyConfig {
            max_attempts: 2,
            base_seconds: 0,
            max_seconds: 1,
            jitter_factor: 0.0,
        },
        sync: integrations::config::SyncConfig {
            default_days: 28,
            page_size: 2,
            run_timeout_seconds: 30,
        },
        ..AppConfig::default()
    }
}

/// Full application state wired against the test database and mock URIs.
pub async fn build_state(mock_uri: &str) -> (AppState, TempDir) {
    let (db, tmp) = setup_test_db().await;
    let state = AppState::build(test_config(mock_uri), db).expect("build app state");
    (state, tmp)
}

/// Store a credential through the repository (encrypting as production
/// does) with the given expiry.
pub async fn seed_credential(
    state: &AppState,
    project_id: i64,
    provider: Provider,
    access_token: &str,
    refresh_token: Option<&str>,
    expires_at: DateTime<Utc>,
) -> integrations::models::credential::Model {
    state
        .credentials
        .put(NewCredential {
            project_id,
            provider,
            access_token: access_token.to_string(),
            refresh_token: refresh_token.map(|t| t.to_string()),
            expires_at,
            account_email: Some("owner@example.com".to_string()),
            scopes: vec!["test.readonly".to_string()],
        })
        .await
        .expect("seed credential")
}

pub async fn seed_gsc_site(db: &DatabaseConnection, project_id: i64, site_url: &str) {
    gsc_site::ActiveModel {
        id: Set(Uuid::new_v4()),
        project_id: Set(project_id),
        site_url: Set(site_url.to_string()),
        permission_level: Set("siteOwner".to_string()),
        created_at: Set(Utc::now().into()),
    }
    .insert(db)
    .await
    .expect("seed gsc site");
}

pub async fn seed_ga4_property(db: &DatabaseConnection, project_id: i64, property_id: &str) {
    ga4_property::ActiveModel {
        id: Set(Uuid::new_v4()),
        project_id: Set(project_id),
        property_id: Set(property_id.to_string()),
        property_name: Set(Some("Test property".to_string())),
        created_at: Set(Utc::now().into()),
    }
    .insert(db)
    .await
    .expect("seed ga4 property");
}
