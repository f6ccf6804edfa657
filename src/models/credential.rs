//! Credential entity model
//!
//! This module contains the SeaORM entity model for the credentials table,
//! which stores one OAuth credential per (project, provider) pair.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Credential entity holding the OAuth tokens a project authorized for one provider
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "credentials")]
pub struct Model {
    /// Unique identifier for the credential (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Dashboard project this credential belongs to
    pub project_id: i64,

    /// Provider slug (gsc|ga4|ahrefs)
    pub provider: String,

    /// Encrypted access token ciphertext
    pub access_token_ciphertext: Vec<u8>,

    /// Encrypted refresh token ciphertext; absent when the provider issued none
    pub refresh_token_ciphertext: Option<Vec<u8>>,

    /// Absolute access-token expiry
    pub expires_at: DateTimeWithTimeZone,

    /// Account email reported by the provider (display only)
    pub account_email: Option<String>,

    /// Granted OAuth scopes, stored as a JSON array
    #[sea_orm(column_type = "JsonBinary")]
    pub scopes: Option<JsonValue>,

    /// Timestamp when the credential was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the credential was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
