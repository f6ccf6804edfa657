//! Analytics metric row model
//!
//! One fact row per (project, property, date).

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "ga4_metrics")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub project_id: i64,

    pub property_id: String,

    pub date: Date,

    pub sessions: i64,

    pub total_users: i64,

    pub new_users: i64,

    pub engaged_sessions: i64,

    pub engagement_rate: f64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
