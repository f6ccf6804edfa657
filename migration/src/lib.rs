//! Database migrations for the SEO Integrations service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_06_10_100000_create_credentials;
mod m2026_06_10_100100_create_gsc_sites;
mod m2026_06_10_100200_create_ga4_properties;
mod m2026_06_10_100300_create_gsc_metrics;
mod m2026_06_10_100400_create_ga4_metrics;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_06_10_100000_create_credentials::Migration),
            Box::new(m2026_06_10_100100_create_gsc_sites::Migration),
            Box::new(m2026_06_10_100200_create_ga4_properties::Migration),
            Box::new(m2026_06_10_100300_create_gsc_metrics::Migration),
            Box::new(m2026_06_10_100400_create_ga4_metrics::Migration),
        ]
    }
}
