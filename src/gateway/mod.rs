//! Payment gateway port.
//!
//! Services talk to the hosted payment provider only through
//! [`PaymentGateway`], so tests can substitute a mock and the provider can be
//! swapped without touching business rules. Amounts are minor currency units.

pub mod stripe;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::ServiceError;

pub use stripe::{StripeConfig, StripeGateway};

/// Discount terms of a gateway coupon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CouponTerms {
    pub id: String,
    /// False once the coupon is deleted, expired or fully redeemed
    pub valid: bool,
    pub percent_off: Option<f64>,
    pub amount_off: Option<i64>,
    pub currency: Option<String>,
}

/// Customer-facing code that applies a coupon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PromotionCode {
    pub id: String,
    pub code: String,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub coupon: CouponTerms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutMode {
    Payment,
    Subscription,
}

impl CheckoutMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutMode::Payment => "payment",
            CheckoutMode::Subscription => "subscription",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutLineItem {
    pub price_id: String,
    pub quantity: u32,
}

/// Discount applied to a checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutDiscount {
    PromotionCode(String),
    Coupon(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionRequest {
    pub mode: CheckoutMode,
    pub line_items: Vec<CheckoutLineItem>,
    pub customer_email: Option<String>,
    pub client_reference_id: Option<String>,
    pub discount: Option<CheckoutDiscount>,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RefundReceipt {
    pub id: String,
    pub amount: i64,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SubscriptionCancellation {
    pub id: String,
    pub status: String,
    pub cancel_at_period_end: bool,
    pub current_period_end: Option<DateTime<Utc>>,
}

/// Operations the storefront needs from the payment provider.
///
/// Provider "no such resource" errors surface as `ServiceError::NotFound`;
/// every other failure as `ServiceError::GatewayError`.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Looks up a promotion code by its customer-facing text.
    async fn find_promotion_code(&self, code: &str) -> Result<Option<PromotionCode>, ServiceError>;

    async fn retrieve_coupon(&self, coupon_id: &str) -> Result<CouponTerms, ServiceError>;

    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ServiceError>;

    /// Refunds the payment behind a checkout session; `None` refunds whatever
    /// has not been refunded yet.
    async fn refund_session(
        &self,
        session_id: &str,
        amount: Option<i64>,
    ) -> Result<RefundReceipt, ServiceError>;

    async fn cancel_subscription_at_period_end(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionCancellation, ServiceError>;

    async fn set_promotion_code_active(
        &self,
        promotion_code_id: &str,
        active: bool,
    ) -> Result<PromotionCode, ServiceError>;
}
