//! Search Console site binding model
//!
//! Identifies which verified GSC site a project syncs from. Rows are
//! written by the discovery step after authorization (or inserted
//! manually); the sync pipeline only reads them.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "gsc_sites")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub project_id: i64,

    /// Site URL as Search Console reports it, e.g. `sc-domain:example.com`
    /// or `https://www.example.com/`
    pub site_url: String,

    /// Permission level the authorized account holds on the site
    pub permission_level: String,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
