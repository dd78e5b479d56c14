use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;

use crate::errors::ServiceError;

/// Kind of reward granted to a referrer.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum RewardType {
    #[sea_orm(string_value = "discount")]
    Discount,
    #[sea_orm(string_value = "store_credit")]
    StoreCredit,
    #[sea_orm(string_value = "free_product")]
    FreeProduct,
    #[sea_orm(string_value = "cash")]
    Cash,
}

impl Default for RewardType {
    fn default() -> Self {
        RewardType::Discount
    }
}

impl FromStr for RewardType {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discount" => Ok(RewardType::Discount),
            "store_credit" | "credit" => Ok(RewardType::StoreCredit),
            "free_product" => Ok(RewardType::FreeProduct),
            "cash" => Ok(RewardType::Cash),
            other => Err(ServiceError::ValidationError(format!(
                "Invalid reward type '{}'. Valid types are: discount, store_credit, free_product, cash",
                other
            ))),
        }
    }
}
