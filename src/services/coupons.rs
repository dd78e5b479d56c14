//! Coupon code validation for shoppers.
//!
//! Every call site renders from [`CouponValidationOutcome`]. Signed-in
//! shoppers are checked against their personal discounts first; any other
//! code is looked up as a gateway promotion code.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument};
use utoipa::ToSchema;

use crate::{
    auth::{AuthUser, CouponRateLimiter, RateLimitDecision, RateLimitKey},
    errors::ServiceError,
    gateway::{CheckoutDiscount, CouponTerms, PaymentGateway},
    services::discounts::{normalize_code, DiscountService},
};

/// Public message for every code that cannot be redeemed.
pub const INVALID_COUPON_MESSAGE: &str = "Invalid or expired coupon code";

const MAX_CODE_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidCoupon {
    pub code: String,
    pub discount_percent: Option<f64>,
    /// Minor currency units
    pub discount_amount: Option<i64>,
    pub currency: Option<String>,
    #[serde(skip)]
    pub checkout_discount: Option<CheckoutDiscount>,
}

impl ValidCoupon {
    fn new(code: String, terms: &CouponTerms, checkout_discount: CheckoutDiscount) -> Self {
        Self {
            code,
            discount_percent: terms.percent_off,
            discount_amount: terms.amount_off,
            currency: terms.currency.clone(),
            checkout_discount: Some(checkout_discount),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CouponValidationOutcome {
    Valid(ValidCoupon),
    NotFound,
    Expired,
    Inactive,
    RateLimited,
}

impl CouponValidationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CouponValidationOutcome::Valid(_) => "valid",
            CouponValidationOutcome::NotFound => "not_found",
            CouponValidationOutcome::Expired => "expired",
            CouponValidationOutcome::Inactive => "inactive",
            CouponValidationOutcome::RateLimited => "rate_limited",
        }
    }

    /// Collapses the outcome into the error shoppers see. Not-found,
    /// expired and inactive codes share one message.
    pub fn into_result(self) -> Result<ValidCoupon, ServiceError> {
        match self {
            CouponValidationOutcome::Valid(coupon) => Ok(coupon),
            CouponValidationOutcome::RateLimited => Err(ServiceError::RateLimitExceeded),
            CouponValidationOutcome::NotFound
            | CouponValidationOutcome::Expired
            | CouponValidationOutcome::Inactive => {
                Err(ServiceError::NotFound(INVALID_COUPON_MESSAGE.to_string()))
            }
        }
    }
}

/// Outcome plus the rate-limit state to report in response headers.
#[derive(Debug, Clone)]
pub struct CouponCheck {
    pub outcome: CouponValidationOutcome,
    pub rate: RateLimitDecision,
}

#[derive(Clone)]
pub struct CouponService {
    gateway: Arc<dyn PaymentGateway>,
    discounts: DiscountService,
    limiter: CouponRateLimiter,
}

impl CouponService {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        discounts: DiscountService,
        limiter: CouponRateLimiter,
    ) -> Self {
        Self {
            gateway,
            discounts,
            limiter,
        }
    }

    pub fn limiter(&self) -> &CouponRateLimiter {
        &self.limiter
    }

    #[instrument(skip(self, principal, code, key), fields(caller = ?key))]
    pub async fn validate(
        &self,
        code: &str,
        principal: Option<&AuthUser>,
        key: &RateLimitKey,
    ) -> Result<CouponCheck, ServiceError> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Err(ServiceError::ValidationError(
                "Coupon code is required".to_string(),
            ));
        }
        if code.len() > MAX_CODE_LEN {
            return Err(ServiceError::ValidationError(format!(
                "Coupon code must be at most {} characters",
                MAX_CODE_LEN
            )));
        }

        let rate = self.limiter.check(key).await;
        if !rate.allowed {
            return Ok(CouponCheck {
                outcome: CouponValidationOutcome::RateLimited,
                rate,
            });
        }

        let outcome = match principal {
            Some(user) => match self.personal_discount(&code, user).await? {
                Some(outcome) => outcome,
                None => self.promotion_code(&code).await?,
            },
            None => self.promotion_code(&code).await?,
        };

        info!(outcome = outcome.label(), "coupon validated");
        Ok(CouponCheck { outcome, rate })
    }

    async fn personal_discount(
        &self,
        code: &str,
        user: &AuthUser,
    ) -> Result<Option<CouponValidationOutcome>, ServiceError> {
        let Some(discount) = self.discounts.find_for_user(user.user_id, code).await? else {
            return Ok(None);
        };

        if !discount.is_active {
            return Ok(Some(CouponValidationOutcome::Inactive));
        }
        if discount.is_expired_at(Utc::now()) {
            return Ok(Some(CouponValidationOutcome::Expired));
        }

        let terms = match self.gateway.retrieve_coupon(&discount.stripe_coupon_id).await {
            Ok(terms) => terms,
            Err(ServiceError::NotFound(_)) => return Ok(Some(CouponValidationOutcome::Inactive)),
            Err(e) => return Err(e),
        };
        if !terms.valid {
            return Ok(Some(CouponValidationOutcome::Expired));
        }

        let checkout = CheckoutDiscount::Coupon(terms.id.clone());
        Ok(Some(CouponValidationOutcome::Valid(ValidCoupon::new(
            discount.discount_code,
            &terms,
            checkout,
        ))))
    }

    async fn promotion_code(&self, code: &str) -> Result<CouponValidationOutcome, ServiceError> {
        let Some(promo) = self.gateway.find_promotion_code(code).await? else {
            return Ok(CouponValidationOutcome::NotFound);
        };

        if !promo.active {
            return Ok(CouponValidationOutcome::Inactive);
        }
        let expired = promo.expires_at.map(|at| at <= Utc::now()).unwrap_or(false);
        if expired || !promo.coupon.valid {
            return Ok(CouponValidationOutcome::Expired);
        }

        let checkout = CheckoutDiscount::PromotionCode(promo.id.clone());
        Ok(CouponValidationOutcome::Valid(ValidCoupon::new(
            promo.code.to_uppercase(),
            &promo.coupon,
            checkout,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_outcomes_share_one_public_error() {
        for outcome in [
            CouponValidationOutcome::NotFound,
            CouponValidationOutcome::Expired,
            CouponValidationOutcome::Inactive,
        ] {
            match outcome.into_result() {
                Err(ServiceError::NotFound(msg)) => assert_eq!(msg, INVALID_COUPON_MESSAGE),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert!(matches!(
            CouponValidationOutcome::RateLimited.into_result(),
            Err(ServiceError::RateLimitExceeded)
        ));
    }
}
