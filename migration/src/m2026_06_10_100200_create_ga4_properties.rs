//! Migration to create the ga4_properties table.
//!
//! Resource bindings for Google Analytics 4: which property under the
//! authorized account a project syncs from.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Ga4Properties::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Ga4Properties::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Ga4Properties::ProjectId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Ga4Properties::PropertyId).text().not_null())
                    .col(ColumnDef::new(Ga4Properties::PropertyName).text().null())
                    .col(
                        ColumnDef::new(Ga4Properties::CreatedAt)
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
                    .name("idx_ga4_properties_project_property")
                    .table(Ga4Properties::Table)
                    .col(Ga4Properties::ProjectId)
                    .col(Ga4Properties::PropertyId)
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
                    .name("idx_ga4_properties_project_property")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Ga4Properties::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Ga4Properties {
    Table,
    Id,
    ProjectId,
    PropertyId,
    PropertyName,
    CreatedAt,
}
