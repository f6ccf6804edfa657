//! Search Console metric row model
//!
//! One fact row per (project, date, page, query). The unique index on the
//! natural key backs the upsert layer; measures (clicks, impressions,
//! position) are overwritten in place on re-sync.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "gsc_metrics")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub project_id: i64,

    pub date: Date,

    pub page: String,

    pub query: String,

    pub clicks: i64,

    pub impressions: i64,

    pub position: f64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
