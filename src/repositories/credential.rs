//! Credential repository for database operations
//!
//! Encapsulates SeaORM operations for the credentials table. The store
//! guarantees at most one live credential per (project, provider): a new
//! authorization replaces the prior row atomically through an upsert on
//! that unique index, a full replace rather than a merge so a stale
//! refresh token never outlives a fresh authorization.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::crypto::{CryptoKey, decrypt_credential_tokens, encrypt_credential_tokens};
use crate::models::credential::{self, Entity as Credential};
use crate::providers::{Provider, TokenGrant};

/// Fallback access-token lifetime when the provider omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Plaintext material for a credential slot, produced by a token exchange.
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub project_id: i64,
    pub provider: Provider,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub account_email: Option<String>,
    pub scopes: Vec<String>,
}

impl NewCredential {
    /// Build credential material from a token grant issued at `now`.
    pub fn from_grant(
        project_id: i64,
        provider: Provider,
        grant: TokenGrant,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            project_id,
            provider,
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires_at: expires_at_from(now, grant.expires_in),
            account_email: grant.account_email,
            scopes: grant.scopes,
        }
    }
}

/// Absolute expiry for a grant issued at `now`.
pub fn expires_at_from(now: DateTime<Utc>, expires_in: Option<u64>) -> DateTime<Utc> {
    let lifetime = expires_in
        .and_then(|secs| i64::try_from(secs).ok())
        .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
    now + chrono::Duration::seconds(lifetime)
}

/// Repository for credential database operations
#[derive(Debug, Clone)]
pub struct CredentialRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
    /// Crypto key for token encryption
    crypto_key: CryptoKey,
}

impl CredentialRepository {
    /// Creates a new CredentialRepository instance
    pub fn new(db: Arc<DatabaseConnection>, crypto_key: CryptoKey) -> Self {
        Self { db, crypto_key }
    }

    /// Fetch the credential for a (project, provider) pair.
    pub async fn get(
        &self,
        project_id: i64,
        provider: Provider,
    ) -> Result<Option<credential::Model>> {
        Ok(Credential::find()
            .filter(credential::Column::ProjectId.eq(project_id))
            .filter(credential::Column::Provider.eq(provider.as_str()))
            .one(&*self.db)
            .await?)
    }

    /// List every credential stored for a project.
    pub async fn find_by_project(&self, project_id: i64) -> Result<Vec<credential::Model>> {
        Ok(Credential::find()
            .filter(credential::Column::ProjectId.eq(project_id))
            .order_by_asc(credential::Column::Provider)
            .all(&*self.db)
            .await?)
    }

    /// Store a credential, replacing any prior row for the same
    /// (project, provider) pair in one statement.
    pub async fn put(&self, new: NewCredential) -> Result<credential::Model> {
        let (access_ct, refresh_ct) = encrypt_credential_tokens(
            &self.crypto_key,
            new.project_id,
            new.provider,
            &new.access_token,
            new.refresh_token.as_deref(),
        )
        .map_err(|e| anyhow!("Token encryption failed: {}", e))?;

        let now = Utc::now();
        let model = credential::ActiveModel {
            id: Set(Uuid::new_v4()),
            project_id: Set(new.project_id),
            provider: Set(new.provider.as_str().to_string()),
            access_token_ciphertext: Set(access_ct),
            refresh_token_ciphertext: Set(refresh_ct),
            expires_at: Set(new.expires_at.into()),
            account_email: Set(new.account_email),
            scopes: Set(Some(serde_json::json!(new.scopes))),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        Credential::insert(model)
            .on_conflict(
                OnConflict::columns([
                    credential::Column::ProjectId,
                    credential::Column::Provider,
                ])
                .update_columns([
                    credential::Column::AccessTokenCiphertext,
                    credential::Column::RefreshTokenCiphertext,
                    credential::Column::ExpiresAt,
                    credential::Column::AccountEmail,
                    credential::Column::Scopes,
                    credential::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec(&*self.db)
            .await?;

        // Re-query rather than trusting the insert result; on conflict the
        // surviving row keeps its original id.
        self.get(new.project_id, new.provider)
            .await?
            .ok_or_else(|| anyhow!("credential not persisted"))
    }

    /// Persist the outcome of a token refresh: new access token and
    /// expiry, plus the refresh token only when the provider rotated it.
    pub async fn apply_refresh(
        &self,
        credential: &credential::Model,
        grant: &TokenGrant,
        now: DateTime<Utc>,
    ) -> Result<credential::Model> {
        let provider: Provider = credential
            .provider
            .parse()
            .map_err(|e| anyhow!("stored credential has {}", e))?;

        let (access_ct, rotated_refresh_ct) = encrypt_credential_tokens(
            &self.crypto_key,
            credential.project_id,
            provider,
            &grant.access_token,
            grant.refresh_token.as_deref(),
        )
        .map_err(|e| anyhow!("Token encryption failed: {}", e))?;

        let mut active: credential::ActiveModel = credential.clone().into();
        active.access_token_ciphertext = Set(access_ct);
        if rotated_refresh_ct.is_some() {
            active.refresh_token_ciphertext = Set(rotated_refresh_ct);
        }
        active.expires_at = Set(expires_at_from(now, grant.expires_in).into());
        active.updated_at = Set(now.into());

        Ok(active.update(&*self.db).await?)
    }

    /// Decrypts tokens from a credential model
    pub fn decrypt_tokens(
        &self,
        credential: &credential::Model,
    ) -> Result<(String, Option<String>)> {
        decrypt_credential_tokens(&self.crypto_key, credential).map_err(|e| {
            tracing::error!(
                project_id = credential.project_id,
                provider = %credential.provider,
                "Token decryption failed"
            );
            anyhow!("Token decryption failed: {}", e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expires_at_from() {
        let now = Utc::now();
        assert_eq!(
            expires_at_from(now, Some(120)),
            now + chrono::Duration::seconds(120)
        );
        // Missing expires_in falls back to an hour
        assert_eq!(
            expires_at_from(now, None),
            now + chrono::Duration::seconds(3600)
        );
    }
}
