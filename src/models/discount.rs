use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Where a user discount came from.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum DiscountSource {
    /// Created from the admin discount form
    #[sea_orm(string_value = "admin_created")]
    AdminCreated,
    /// Issued by hand while resolving a support case
    #[sea_orm(string_value = "admin_manual")]
    AdminManual,
    /// Reward for a referral whose referee completed a purchase
    #[sea_orm(string_value = "referral")]
    Referral,
    #[sea_orm(string_value = "promotion")]
    Promotion,
}

impl Default for DiscountSource {
    fn default() -> Self {
        DiscountSource::AdminCreated
    }
}
