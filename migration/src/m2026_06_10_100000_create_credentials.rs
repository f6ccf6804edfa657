//! Migration to create the credentials table.
//!
//! This migration creates the credentials table which stores one OAuth
//! credential per (project, provider) pair, with token ciphertexts and
//! expiry tracking for refresh.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Credentials::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Credentials::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Credentials::ProjectId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Credentials::Provider).text().not_null())
                    .col(
                        ColumnDef::new(Credentials::AccessTokenCiphertext)
                            .binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Credentials::RefreshTokenCiphertext)
                            .binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Credentials::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Credentials::AccountEmail).text().null())
                    .col(ColumnDef::new(Credentials::Scopes).json_binary().null())
                    .col(
                        ColumnDef::new(Credentials::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Credentials::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // One live credential per (project, provider); a new authorization
        // replaces the prior row through an upsert on this index.
        manager
            .create_index(
                Index::create()
                    .name("idx_credentials_project_provider")
                    .table(Credentials::Table)
                    .col(Credentials::ProjectId)
                    .col(Credentials::Provider)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_credentials_project_provider")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Credentials::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Credentials {
    Table,
    Id,
    ProjectId,
    Provider,
    AccessTokenCiphertext,
    RefreshTokenCiphertext,
    ExpiresAt,
    AccountEmail,
    Scopes,
    CreatedAt,
    UpdatedAt,
}
