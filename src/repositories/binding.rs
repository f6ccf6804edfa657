//! Resource binding lookups
//!
//! Read access to the provider-specific binding tables (gsc_sites,
//! ga4_properties) that say which remote resource a project syncs from,
//! plus the insert path used by post-authorization discovery. The sync
//! pipeline itself never mutates bindings.

use anyhow::Result;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{ga4_property, gsc_site};
use crate::providers::{DiscoveredResource, Provider};

/// Repository for resource binding lookups
#[derive(Debug, Clone)]
pub struct BindingRepository {
    pub db: Arc<DatabaseConnection>,
}

impl BindingRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Resolve the resource identifier bound for a (project, provider)
    /// pair: the site URL for GSC, the property ID for GA4. When several
    /// bindings exist the oldest wins, keeping resolution deterministic.
    pub async fn resolve(&self, project_id: i64, provider: Provider) -> Result<Option<String>> {
        match provider {
            Provider::Gsc => Ok(gsc_site::Entity::find()
                .filter(gsc_site::Column::ProjectId.eq(project_id))
                .order_by_asc(gsc_site::Column::CreatedAt)
                .order_by_asc(gsc_site::Column::Id)
                .one(&*self.db)
                .await?
                .map(|site| site.site_url)),
            Provider::Ga4 => Ok(ga4_property::Entity::find()
                .filter(ga4_property::Column::ProjectId.eq(project_id))
                .order_by_asc(ga4_property::Column::CreatedAt)
                .order_by_asc(ga4_property::Column::Id)
                .one(&*self.db)
                .await?
                .map(|property| property.property_id)),
            Provider::Ahrefs => Ok(None),
        }
    }

    /// Whether the given resource identifier is bound for the pair.
    pub async fn is_bound(
        &self,
        project_id: i64,
        provider: Provider,
        resource_id: &str,
    ) -> Result<bool> {
        match provider {
            Provider::Gsc => Ok(gsc_site::Entity::find()
                .filter(gsc_site::Column::ProjectId.eq(project_id))
                .filter(gsc_site::Column::SiteUrl.eq(resource_id))
                .one(&*self.db)
                .await?
                .is_some()),
            Provider::Ga4 => Ok(ga4_property::Entity::find()
                .filter(ga4_property::Column::ProjectId.eq(project_id))
                .filter(ga4_property::Column::PropertyId.eq(resource_id))
                .one(&*self.db)
                .await?
                .is_some()),
            Provider::Ahrefs => Ok(false),
        }
    }

    /// Insert bindings surfaced by discovery, skipping ones already
    /// present. Returns how many rows were offered for insertion.
    pub async fn insert_discovered(
        &self,
        project_id: i64,
        provider: Provider,
        resources: &[DiscoveredResource],
    ) -> Result<u64> {
        if resources.is_empty() {
            return Ok(0);
        }

        let now = chrono::Utc::now();

        match provider {
            Provider::Gsc => {
                let models = resources.iter().map(|resource| gsc_site::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    project_id: Set(project_id),
                    site_url: Set(resource.resource_id.clone()),
                    permission_level: Set(resource
                        .display_name
                        .clone()
                        .unwrap_or_else(|| "siteUnverifiedUser".to_string())),
                    created_at: Set(now.into()),
                });
                gsc_site::Entity::insert_many(models)
                    .on_conflict(
                        OnConflict::columns([
                            gsc_site::Column::ProjectId,
                            gsc_site::Column::SiteUrl,
                        ])
                        .do_nothing()
                        .to_owned(),
                    )
                    .do_nothing()
                    .exec(&*self.db)
                    .await?;
            }
            Provider::Ga4 => {
                let models = resources.iter().map(|resource| ga4_property::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    project_id: Set(project_id),
                    property_id: Set(resource.resource_id.clone()),
                    property_name: Set(resource.display_name.clone()),
                    created_at: Set(now.into()),
                });
                ga4_property::Entity::insert_many(models)
                    .on_conflict(
                        OnConflict::columns([
                            ga4_property::Column::ProjectId,
                            ga4_property::Column::PropertyId,
                        ])
                        .do_nothing()
                        .to_owned(),
                    )
                    .do_nothing()
                    .exec(&*self.db)
                    .await?;
            }
            Provider::Ahrefs => return Ok(0),
        }

        Ok(resources.len() as u64)
    }
}
