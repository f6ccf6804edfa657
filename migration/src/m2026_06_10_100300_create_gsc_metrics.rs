//! Migration to create the gsc_metrics table.
//!
//! Search Console fact table. The natural key (project_id, date, page,
//! query) is enforced with a unique index so repeated syncs overwrite
//! measures in place instead of accumulating duplicates.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(GscMetrics::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(GscMetrics::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(GscMetrics::ProjectId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(GscMetrics::Date).date().not_null())
                    .col(ColumnDef::new(GscMetrics::Page).text().not_null())
                    .col(ColumnDef::new(GscMetrics::Query).text().not_null())
                    .col(
                        ColumnDef::new(GscMetrics::Clicks)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(GscMetrics::Impressions)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(GscMetrics::Position)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_gsc_metrics_natural_key")
                    .table(GscMetrics::Table)
                    .col(GscMetrics::ProjectId)
                    .col(GscMetrics::Date)
                    .col(GscMetrics::Page)
                    .col(GscMetrics::Query)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Range scans for dashboard charts hit (project_id, date).
        manager
            .create_index(
                Index::create()
                    .name("idx_gsc_metrics_project_date")
                    .table(GscMetrics::Table)
                    .col(GscMetrics::ProjectId)
                    .col(GscMetrics::Date)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_gsc_metrics_natural_key").to_owned())
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_gsc_metrics_project_date")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(GscMetrics::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum GscMetrics {
    Table,
    Id,
    ProjectId,
    Date,
    Page,
    Query,
    Clicks,
    Impressions,
    Position,
}
