//! Migration to create the gsc_sites table.
//!
//! Resource bindings for Google Search Console: which verified site under
//! the authorized account a project syncs from.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(GscSites::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(GscSites::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(GscSites::ProjectId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(GscSites::SiteUrl).text().not_null())
                    .col(
                        ColumnDef::new(GscSites::PermissionLevel)
                            .text()
                            .not_null()
                            .default("siteUnverifiedUser"),
                    )
                    .col(
                        ColumnDef::new(GscSites::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_gsc_sites_project_site")
                    .table(GscSites::Table)
                    .col(GscSites::ProjectId)
                    .col(GscSites::SiteUrl)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_gsc_sites_project_site").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(GscSites::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum GscSites {
    Table,
    Id,
    ProjectId,
    SiteUrl,
    PermissionLevel,
    CreatedAt,
}
