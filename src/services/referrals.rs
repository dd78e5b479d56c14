use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use serde::Serialize;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{
        discount::{self, Entity as DiscountEntity, Model as DiscountModel},
        profile::{self, Entity as ProfileEntity},
        referral::{self, Entity as ReferralEntity, Model as ReferralModel},
    },
    errors::ServiceError,
    models::{DiscountSource, RewardType},
    services::discounts::{DiscountService, ReferralDiscount},
    services::validate_bulk_ids,
};

const TOP_REFERRER_COUNT: u64 = 5;

/// Listing filter for the admin console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferralFilter {
    /// Referee has not bought yet
    Pending,
    /// Referee bought, reward not issued
    Completed,
    Rewarded,
}

impl FromStr for ReferralFilter {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(ReferralFilter::Pending),
            "completed" => Ok(ReferralFilter::Completed),
            "rewarded" => Ok(ReferralFilter::Rewarded),
            other => Err(ServiceError::ValidationError(format!(
                "Invalid referral status '{}'. Valid statuses are: pending, completed, rewarded",
                other
            ))),
        }
    }
}

impl ReferralFilter {
    fn condition(self) -> Condition {
        match self {
            ReferralFilter::Pending => {
                Condition::all().add(referral::Column::CompletedPurchase.eq(false))
            }
            ReferralFilter::Completed => Condition::all()
                .add(referral::Column::CompletedPurchase.eq(true))
                .add(referral::Column::RewardIssued.eq(false)),
            ReferralFilter::Rewarded => Condition::all().add(referral::Column::RewardIssued.eq(true)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RewardInput {
    /// Defaults to a discount
    pub reward_type: Option<RewardType>,
    pub reward_value: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct BulkRewardOutcome {
    pub issued: u64,
    pub skipped: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReferralView {
    pub id: Uuid,
    pub referrer_id: Uuid,
    pub referrer_email: Option<String>,
    pub referee_email: Option<String>,
    pub completed_purchase: bool,
    pub reward_issued: bool,
    pub reward_type: Option<RewardType>,
    pub reward_value: Option<i64>,
    pub reward_issued_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ReferralView {
    fn new(referral: ReferralModel, referrer: Option<profile::Model>) -> Self {
        Self {
            id: referral.id,
            referrer_id: referral.referrer_id,
            referrer_email: referrer.map(|p| p.email),
            referee_email: referral.referee_email,
            completed_purchase: referral.completed_purchase,
            reward_issued: referral.reward_issued,
            reward_type: referral.reward_type,
            reward_value: referral.reward_value,
            reward_issued_at: referral.reward_issued_at,
            notes: referral.notes,
            created_at: referral.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReferralTotals {
    pub total_referrals: u64,
    pub completed_referrals: u64,
    pub rewards_issued: u64,
    /// Active discounts that came from referrals
    pub active_discounts: u64,
    /// Whole percent of referrals with a completed purchase
    pub conversion_rate: u32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TopReferrer {
    pub referrer_id: Uuid,
    pub email: Option<String>,
    pub referral_count: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReferralStats {
    pub stats: ReferralTotals,
    pub top_referrers: Vec<TopReferrer>,
}

/// `round(completed / total * 100)`, zero when there are no referrals.
pub fn conversion_rate(completed: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    ((completed as f64 / total as f64) * 100.0).round() as u32
}

fn check_reward_value(value: Option<i64>) -> Result<(), ServiceError> {
    match value {
        Some(v) if v < 0 => Err(ServiceError::ValidationError(
            "reward_value must not be negative".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Rows that may still receive a reward.
fn eligible() -> Condition {
    Condition::all()
        .add(referral::Column::CompletedPurchase.eq(true))
        .add(referral::Column::RewardIssued.eq(false))
}

#[derive(Clone)]
pub struct ReferralService {
    db: Arc<DatabaseConnection>,
    discounts: DiscountService,
}

impl ReferralService {
    pub fn new(db: Arc<DatabaseConnection>, discounts: DiscountService) -> Self {
        Self { db, discounts }
    }

    #[instrument(skip(self))]
    pub async fn list(&self, filter: Option<ReferralFilter>) -> Result<Vec<ReferralView>, ServiceError> {
        let mut query = ReferralEntity::find().find_also_related(ProfileEntity);
        if let Some(filter) = filter {
            query = query.filter(filter.condition());
        }

        let rows = query
            .order_by_desc(referral::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(referral, referrer)| ReferralView::new(referral, referrer))
            .collect())
    }

    pub async fn get(&self, id: Uuid) -> Result<ReferralModel, ServiceError> {
        ReferralEntity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Referral {} not found", id)))
    }

    /// Marks one referral rewarded. The write is conditional on the referral
    /// still being eligible, so concurrent calls issue at most once; a
    /// refused write is explained by re-reading the row.
    #[instrument(skip(self, input), fields(referral_id = %id))]
    pub async fn issue_reward(&self, id: Uuid, input: RewardInput) -> Result<ReferralModel, ServiceError> {
        check_reward_value(input.reward_value)?;
        let reward_type = input.reward_type.unwrap_or_default();

        let mut update = ReferralEntity::update_many()
            .col_expr(referral::Column::RewardIssued, Expr::value(true))
            .col_expr(referral::Column::RewardType, Expr::value(reward_type))
            .col_expr(referral::Column::RewardValue, Expr::value(input.reward_value))
            .col_expr(referral::Column::RewardIssuedAt, Expr::value(Utc::now()));
        if let Some(notes) = input.notes {
            update = update.col_expr(referral::Column::Notes, Expr::value(notes));
        }

        let result = update
            .filter(referral::Column::Id.eq(id))
            .filter(eligible())
            .exec(&*self.db)
            .await?;

        let current = self.get(id).await?;
        if result.rows_affected == 0 {
            return Err(if current.reward_issued {
                ServiceError::RewardAlreadyIssued(id)
            } else if !current.completed_purchase {
                ServiceError::PurchaseNotCompleted(id)
            } else {
                warn!("referral eligible but reward write matched nothing");
                ServiceError::Conflict(format!("Referral {} changed concurrently", id))
            });
        }

        info!(reward_type = ?reward_type, "referral reward issued");
        Ok(current)
    }

    /// Rewards every eligible referral among `ids`; ineligible ones are
    /// counted as skipped. Fails only when none were eligible.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn bulk_issue_rewards(
        &self,
        ids: &[Uuid],
        reward_type: Option<RewardType>,
        reward_value: Option<i64>,
    ) -> Result<BulkRewardOutcome, ServiceError> {
        let ids = validate_bulk_ids(ids)?;
        check_reward_value(reward_value)?;
        let requested = ids.len() as u64;

        let result = ReferralEntity::update_many()
            .col_expr(referral::Column::RewardIssued, Expr::value(true))
            .col_expr(
                referral::Column::RewardType,
                Expr::value(reward_type.unwrap_or_default()),
            )
            .col_expr(referral::Column::RewardValue, Expr::value(reward_value))
            .col_expr(referral::Column::RewardIssuedAt, Expr::value(Utc::now()))
            .filter(referral::Column::Id.is_in(ids))
            .filter(eligible())
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::ValidationError(
                "No eligible referrals to reward".to_string(),
            ));
        }

        let outcome = BulkRewardOutcome {
            issued: result.rows_affected,
            skipped: requested.saturating_sub(result.rows_affected),
        };
        info!(issued = outcome.issued, skipped = outcome.skipped, "bulk referral rewards");
        Ok(outcome)
    }

    /// Gives the referrer a referral-sourced discount.
    #[instrument(skip(self, discount_code, stripe_coupon_id), fields(referral_id = %id))]
    pub async fn issue_discount(
        &self,
        id: Uuid,
        discount_code: Option<String>,
        stripe_coupon_id: Option<String>,
        expires_in_days: Option<i64>,
    ) -> Result<DiscountModel, ServiceError> {
        let referral = self.get(id).await?;
        if !referral.completed_purchase {
            return Err(ServiceError::PurchaseNotCompleted(id));
        }

        self.discounts
            .apply_referral_discount(ReferralDiscount {
                user_id: referral.referrer_id,
                discount_code,
                stripe_coupon_id,
                source: DiscountSource::Referral,
                expires_in_days,
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<ReferralStats, ServiceError> {
        let db = &*self.db;

        let total = ReferralEntity::find().count(db).await?;
        let completed = ReferralEntity::find()
            .filter(referral::Column::CompletedPurchase.eq(true))
            .count(db)
            .await?;
        let rewarded = ReferralEntity::find()
            .filter(referral::Column::RewardIssued.eq(true))
            .count(db)
            .await?;
        let active_discounts = DiscountEntity::find()
            .filter(discount::Column::IsActive.eq(true))
            .filter(discount::Column::Source.eq(DiscountSource::Referral))
            .count(db)
            .await?;

        let counts: Vec<(Uuid, i64)> = ReferralEntity::find()
            .select_only()
            .column(referral::Column::ReferrerId)
            .column_as(Expr::col(referral::Column::Id).count(), "referral_count")
            .group_by(referral::Column::ReferrerId)
            .order_by_desc(Expr::col(referral::Column::Id).count())
            .limit(TOP_REFERRER_COUNT)
            .into_tuple()
            .all(db)
            .await?;

        let emails: HashMap<Uuid, String> = if counts.is_empty() {
            HashMap::new()
        } else {
            ProfileEntity::find()
                .filter(profile::Column::Id.is_in(counts.iter().map(|(id, _)| *id)))
                .all(db)
                .await?
                .into_iter()
                .map(|p| (p.id, p.email))
                .collect()
        };

        let top_referrers = counts
            .into_iter()
            .map(|(referrer_id, count)| TopReferrer {
                referrer_id,
                email: emails.get(&referrer_id).cloned(),
                referral_count: count.max(0) as u64,
            })
            .collect();

        Ok(ReferralStats {
            stats: ReferralTotals {
                total_referrals: total,
                completed_referrals: completed,
                rewards_issued: rewarded,
                active_discounts,
                conversion_rate: conversion_rate(completed, total),
            },
            top_referrers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn conversion_rate_handles_empty_ledger() {
        assert_eq!(conversion_rate(0, 0), 0);
        assert_eq!(conversion_rate(1, 3), 33);
        assert_eq!(conversion_rate(2, 3), 67);
        assert_eq!(conversion_rate(5, 5), 100);
    }

    #[test]
    fn parses_filters() {
        assert_eq!("Rewarded".parse::<ReferralFilter>().unwrap(), ReferralFilter::Rewarded);
        assert!("archived".parse::<ReferralFilter>().is_err());
    }

    proptest! {
        #[test]
        fn conversion_rate_is_a_percentage(total in 0u64..1_000_000, pct in 0u64..=100) {
            let completed = total * pct / 100;
            let rate = conversion_rate(completed, total);
            prop_assert!(rate <= 100);
        }
    }
}
