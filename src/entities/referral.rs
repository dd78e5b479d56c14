use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::RewardType;

/// A referrer inviting a referee. A reward may be issued once, and only
/// after the referee completed a purchase.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "referrals")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub referrer_id: Uuid,
    pub referee_id: Option<Uuid>,
    pub referee_email: Option<String>,
    pub completed_purchase: bool,
    pub reward_issued: bool,
    pub reward_type: Option<RewardType>,
    pub reward_value: Option<i64>,
    pub reward_issued_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::profile::Entity",
        from = "Column::ReferrerId",
        to = "super::profile::Column::Id"
    )]
    Referrer,
}

impl Related<super::profile::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Referrer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
