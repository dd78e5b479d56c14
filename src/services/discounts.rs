use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{
        discount::{self, Entity as DiscountEntity, Model as DiscountModel},
        profile::{self, Entity as ProfileEntity},
    },
    errors::ServiceError,
    models::DiscountSource,
    services::validate_bulk_ids,
};

pub const DEFAULT_REFERRAL_DISCOUNT_DAYS: i64 = 30;

/// Fields a bulk update may touch. Anything else in the payload is dropped.
const BULK_UPDATABLE_FIELDS: &[&str] = &["is_active"];

#[derive(Debug, Clone)]
pub struct NewDiscount {
    pub user_email: String,
    pub discount_code: String,
    pub stripe_coupon_id: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub source: DiscountSource,
}

#[derive(Debug, Clone)]
pub struct ReferralDiscount {
    pub user_id: Uuid,
    /// Generated as `REF-XXXXXXXX` when absent
    pub discount_code: Option<String>,
    /// Falls back to the configured referral coupon
    pub stripe_coupon_id: Option<String>,
    pub source: DiscountSource,
    pub expires_in_days: Option<i64>,
}

/// Discount row with its owner's email, as listed in the admin console.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiscountView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_email: Option<String>,
    pub discount_code: String,
    pub stripe_coupon_id: String,
    pub source: DiscountSource,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DiscountView {
    fn new(discount: DiscountModel, owner: Option<profile::Model>) -> Self {
        Self {
            id: discount.id,
            user_id: discount.user_id,
            user_email: owner.map(|p| p.email),
            discount_code: discount.discount_code,
            stripe_coupon_id: discount.stripe_coupon_id,
            source: discount.source,
            is_active: discount.is_active,
            expires_at: discount.expires_at,
            created_at: discount.created_at,
        }
    }
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

fn referral_code() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("REF-{}", id[..8].to_uppercase())
}

/// Keeps only allow-listed fields and checks their types.
fn allowed_updates(updates: &Map<String, Value>) -> Result<bool, ServiceError> {
    for key in updates.keys() {
        if !BULK_UPDATABLE_FIELDS.contains(&key.as_str()) {
            debug!(field = %key, "ignoring non-updatable discount field");
        }
    }

    match updates.get("is_active") {
        Some(Value::Bool(active)) => Ok(*active),
        Some(_) => Err(ServiceError::ValidationError(
            "is_active must be a boolean".to_string(),
        )),
        None => Err(ServiceError::ValidationError(format!(
            "No updatable fields provided. Allowed fields: {}",
            BULK_UPDATABLE_FIELDS.join(", ")
        ))),
    }
}

#[derive(Clone)]
pub struct DiscountService {
    db: Arc<DatabaseConnection>,
    referral_coupon_id: Option<String>,
}

impl DiscountService {
    pub fn new(db: Arc<DatabaseConnection>, referral_coupon_id: Option<String>) -> Self {
        Self {
            db,
            referral_coupon_id,
        }
    }

    /// Newest first, with each owner's email.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<DiscountView>, ServiceError> {
        let rows = DiscountEntity::find()
            .find_also_related(ProfileEntity)
            .order_by_desc(discount::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(discount, owner)| DiscountView::new(discount, owner))
            .collect())
    }

    pub async fn get(&self, id: Uuid) -> Result<DiscountModel, ServiceError> {
        DiscountEntity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Discount {} not found", id)))
    }

    /// Creates a discount for the account registered under `user_email`.
    #[instrument(skip(self, input), fields(code = %input.discount_code))]
    pub async fn create(&self, input: NewDiscount) -> Result<DiscountModel, ServiceError> {
        let email = input.user_email.trim().to_lowercase();
        let owner = ProfileEntity::find()
            .filter(Expr::expr(Func::lower(Expr::col(profile::Column::Email))).eq(email.clone()))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User with email {} not found", email)))?;

        self.insert(
            owner.id,
            normalize_code(&input.discount_code),
            input.stripe_coupon_id.trim().to_string(),
            input.source,
            input.active,
            input.expires_at,
        )
        .await
    }

    /// Issues a discount that expires `expires_in_days` (default 30) from now.
    #[instrument(skip(self, input), fields(user_id = %input.user_id))]
    pub async fn apply_referral_discount(
        &self,
        input: ReferralDiscount,
    ) -> Result<DiscountModel, ServiceError> {
        let days = input
            .expires_in_days
            .unwrap_or(DEFAULT_REFERRAL_DISCOUNT_DAYS);
        if days <= 0 {
            return Err(ServiceError::ValidationError(
                "expiresInDays must be positive".to_string(),
            ));
        }

        let coupon_id = input
            .stripe_coupon_id
            .or_else(|| self.referral_coupon_id.clone())
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                ServiceError::ValidationError(
                    "A gateway coupon id is required for referral discounts".to_string(),
                )
            })?;

        let code = input
            .discount_code
            .as_deref()
            .map(normalize_code)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(referral_code);

        self.insert(
            input.user_id,
            code,
            coupon_id,
            input.source,
            true,
            Some(Utc::now() + Duration::days(days)),
        )
        .await
    }

    async fn insert(
        &self,
        user_id: Uuid,
        code: String,
        stripe_coupon_id: String,
        source: DiscountSource,
        active: bool,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<DiscountModel, ServiceError> {
        if code.is_empty() {
            return Err(ServiceError::ValidationError(
                "Discount code is required".to_string(),
            ));
        }

        let model = discount::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            discount_code: Set(code.clone()),
            stripe_coupon_id: Set(stripe_coupon_id),
            source: Set(source),
            is_active: Set(active),
            expires_at: Set(expires_at),
            created_at: Set(Utc::now()),
        };

        // uniqueness of (user_id, discount_code) is left to the index
        let created = model.insert(&*self.db).await.map_err(|e| {
            ServiceError::from_write(
                e,
                format!("Discount code {} already exists for this user", code),
            )
        })?;

        info!(discount_id = %created.id, %user_id, code = %created.discount_code, "discount created");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn set_active(&self, id: Uuid, active: bool) -> Result<DiscountModel, ServiceError> {
        let discount = self.get(id).await?;
        let mut active_model: discount::ActiveModel = discount.into();
        active_model.is_active = Set(active);
        Ok(active_model.update(&*self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = DiscountEntity::delete_by_id(id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Discount {} not found", id)));
        }
        info!(discount_id = %id, "discount deleted");
        Ok(())
    }

    /// Applies allow-listed `updates` to up to 100 discounts.
    #[instrument(skip(self, ids, updates), fields(count = ids.len()))]
    pub async fn bulk_update(
        &self,
        ids: &[Uuid],
        updates: &Map<String, Value>,
    ) -> Result<u64, ServiceError> {
        let ids = validate_bulk_ids(ids)?;
        let is_active = allowed_updates(updates)?;

        let result = DiscountEntity::update_many()
            .col_expr(discount::Column::IsActive, Expr::value(is_active))
            .filter(discount::Column::Id.is_in(ids))
            .exec(&*self.db)
            .await?;

        info!(updated = result.rows_affected, is_active, "bulk discount update");
        Ok(result.rows_affected)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn bulk_delete(&self, ids: &[Uuid]) -> Result<u64, ServiceError> {
        let ids = validate_bulk_ids(ids)?;

        let result = DiscountEntity::delete_many()
            .filter(discount::Column::Id.is_in(ids))
            .exec(&*self.db)
            .await?;

        info!(deleted = result.rows_affected, "bulk discount delete");
        Ok(result.rows_affected)
    }

    /// Discount held by `user_id` under `code`, active or not.
    pub async fn find_for_user(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> Result<Option<DiscountModel>, ServiceError> {
        Ok(DiscountEntity::find()
            .filter(discount::Column::UserId.eq(user_id))
            .filter(discount::Column::DiscountCode.eq(normalize_code(code)))
            .one(&*self.db)
            .await?)
    }
}
