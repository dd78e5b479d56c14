use std::sync::Arc;

use tracing::{info, instrument};

use crate::{
    auth::{AuthUser, RateLimitDecision, RateLimitKey},
    errors::ServiceError,
    gateway::{
        CheckoutLineItem, CheckoutMode, CheckoutSession, CheckoutSessionRequest, PaymentGateway,
    },
    services::coupons::CouponService,
};

const MAX_LINE_ITEMS: usize = 50;
const MAX_QUANTITY: u32 = 99;

#[derive(Debug, Clone)]
pub struct CheckoutInput {
    pub mode: CheckoutMode,
    pub line_items: Vec<CheckoutLineItem>,
    pub coupon_code: Option<String>,
    pub customer_email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CheckoutUrls {
    pub success_url: String,
    pub cancel_url: String,
}

/// Session plus the coupon rate state when a coupon was checked.
#[derive(Debug, Clone)]
pub struct CheckoutResult {
    pub session: CheckoutSession,
    pub rate: Option<RateLimitDecision>,
}

fn check_line_items(items: &[CheckoutLineItem]) -> Result<(), ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::ValidationError(
            "At least one line item is required".to_string(),
        ));
    }
    if items.len() > MAX_LINE_ITEMS {
        return Err(ServiceError::ValidationError(format!(
            "Cannot check out more than {} line items",
            MAX_LINE_ITEMS
        )));
    }
    for item in items {
        if item.price_id.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Every line item needs a price id".to_string(),
            ));
        }
        if item.quantity == 0 || item.quantity > MAX_QUANTITY {
            return Err(ServiceError::ValidationError(format!(
                "Quantity for {} must be between 1 and {}",
                item.price_id, MAX_QUANTITY
            )));
        }
    }
    Ok(())
}

#[derive(Clone)]
pub struct CheckoutService {
    gateway: Arc<dyn PaymentGateway>,
    coupons: CouponService,
    urls: CheckoutUrls,
}

impl CheckoutService {
    pub fn new(gateway: Arc<dyn PaymentGateway>, coupons: CouponService, urls: CheckoutUrls) -> Self {
        Self {
            gateway,
            coupons,
            urls,
        }
    }

    /// Creates a hosted checkout session. A coupon code goes through the
    /// same validation as the coupon endpoint before the session exists.
    #[instrument(skip(self, input, principal, key), fields(mode = input.mode.as_str(), items = input.line_items.len()))]
    pub async fn create_session(
        &self,
        input: CheckoutInput,
        principal: Option<&AuthUser>,
        key: &RateLimitKey,
    ) -> Result<CheckoutResult, ServiceError> {
        check_line_items(&input.line_items)?;

        let mut rate = None;
        let mut discount = None;
        if let Some(code) = input.coupon_code.as_deref().filter(|c| !c.trim().is_empty()) {
            let check = self.coupons.validate(code, principal, key).await?;
            rate = Some(check.rate);
            let coupon = check.outcome.into_result()?;
            discount = coupon.checkout_discount;
        }

        let customer_email = input
            .customer_email
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .or_else(|| principal.and_then(AuthUser::verified_email));

        let request = CheckoutSessionRequest {
            mode: input.mode,
            line_items: input.line_items,
            customer_email,
            client_reference_id: principal.map(|p| p.user_id.to_string()),
            discount,
            success_url: self.urls.success_url.clone(),
            cancel_url: self.urls.cancel_url.clone(),
        };

        let session = self.gateway.create_checkout_session(&request).await?;
        info!(session_id = %session.id, "checkout session created");

        Ok(CheckoutResult { session, rate })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(price: &str, quantity: u32) -> CheckoutLineItem {
        CheckoutLineItem {
            price_id: price.to_string(),
            quantity,
        }
    }

    #[test]
    fn line_items_are_checked() {
        assert!(check_line_items(&[]).is_err());
        assert!(check_line_items(&[item("price_1", 0)]).is_err());
        assert!(check_line_items(&[item(" ", 1)]).is_err());
        assert!(check_line_items(&[item("price_1", 100)]).is_err());
        assert!(check_line_items(&[item("price_1", 2), item("price_2", 1)]).is_ok());
    }
}
