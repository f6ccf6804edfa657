//! # Data Models
//!
//! This module contains the SeaORM entity models for the tables the sync
//! pipeline owns, plus small shared response types.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod credential;
pub mod ga4_metric;
pub mod ga4_property;
pub mod gsc_metric;
pub mod gsc_site;

pub use credential::Entity as Credential;
pub use ga4_metric::Entity as Ga4Metric;
pub use ga4_property::Entity as Ga4Property;
pub use gsc_metric::Entity as GscMetric;
pub use gsc_site::Entity as GscSite;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "seo-integrations".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
