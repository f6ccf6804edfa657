//! Migration to create the ga4_metrics table.
//!
//! Analytics fact table. The natural key (project_id, property_id, date)
//! is enforced with a unique index.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Ga4Metrics::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Ga4Metrics::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Ga4Metrics::ProjectId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Ga4Metrics::PropertyId).text().not_null())
                    .col(ColumnDef::new(Ga4Metrics::Date).date().not_null())
                    .col(
                        ColumnDef::new(Ga4Metrics::Sessions)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Ga4Metrics::TotalUsers)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Ga4Metrics::NewUsers)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Ga4Metrics::EngagedSessions)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Ga4Metrics::EngagementRate)
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
                    .name("idx_ga4_metrics_natural_key")
                    .table(Ga4Metrics::Table)
                    .col(Ga4Metrics::ProjectId)
                    .col(Ga4Metrics::PropertyId)
                    .col(Ga4Metrics::Date)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ga4_metrics_project_date")
                    .table(Ga4Metrics::Table)
                    .col(Ga4Metrics::ProjectId)
                    .col(Ga4Metrics::Date)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_ga4_metrics_natural_key").to_owned())
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_ga4_metrics_project_date")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Ga4Metrics::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Ga4Metrics {
    Table,
    Id,
    ProjectId,
    PropertyId,
    Date,
    Sessions,
    TotalUsers,
    NewUsers,
    EngagedSessions,
    EngagementRate,
}
