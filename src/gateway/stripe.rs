use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;
use tracing::{info, instrument, warn};

use super::{
    CheckoutDiscount, CheckoutSession, CheckoutSessionRequest, CouponTerms, PaymentGateway,
    PromotionCode, RefundReceipt, SubscriptionCancellation,
};
use crate::config::AppConfig;
use crate::errors::ServiceError;

/// Stripe configuration
#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub api_base: String,
    pub timeout: Duration,
}

impl StripeConfig {
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        Self {
            secret_key: cfg.gateway_secret_key.clone().unwrap_or_default(),
            api_base: cfg.gateway_api_base.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(cfg.gateway_timeout_secs),
        }
    }
}

/// [`PaymentGateway`] backed by the Stripe REST API.
#[derive(Clone)]
pub struct StripeGateway {
    config: StripeConfig,
    client: reqwest::Client,
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.api_base, path)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ServiceError> {
        let response = self
            .client
            .get(self.url(path))
            .basic_auth(&self.config.secret_key, Some(""))
            .query(query)
            .send()
            .await
            .map_err(transport_error)?;
        read_response(response).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<T, ServiceError> {
        let response = self
            .client
            .post(self.url(path))
            .basic_auth(&self.config.secret_key, Some(""))
            .form(form)
            .send()
            .await
            .map_err(transport_error)?;
        read_response(response).await
    }
}

fn transport_error(e: reqwest::Error) -> ServiceError {
    warn!(error = %e, "payment gateway unreachable");
    ServiceError::GatewayError(format!("Payment gateway request failed: {}", e))
}

async fn read_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ServiceError> {
    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;

    if !status.is_success() {
        return Err(translate_error(status, &body));
    }

    serde_json::from_str(&body).map_err(|e| {
        warn!(error = %e, "unexpected payment gateway response");
        ServiceError::GatewayError(format!("Unexpected payment gateway response: {}", e))
    })
}

#[derive(Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// `resource_missing` becomes `NotFound`; everything else is a gateway error.
pub(crate) fn translate_error(status: StatusCode, body: &str) -> ServiceError {
    let detail = serde_json::from_str::<StripeErrorBody>(body).ok().map(|b| b.error);
    let message = detail
        .as_ref()
        .and_then(|d| d.message.clone())
        .unwrap_or_else(|| format!("payment gateway returned {}", status));
    let missing = detail
        .as_ref()
        .and_then(|d| d.code.as_deref())
        .map(|code| code == "resource_missing")
        .unwrap_or(false);

    if missing {
        ServiceError::NotFound(message)
    } else {
        warn!(%status, %message, "payment gateway rejected request");
        ServiceError::GatewayError(message)
    }
}

/// Ids go into URL paths; refuse anything that is not a plain token.
fn path_id(id: &str) -> Result<&str, ServiceError> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(id)
    } else {
        Err(ServiceError::ValidationError(format!(
            "Invalid gateway identifier '{}'",
            id
        )))
    }
}

fn timestamp(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| DateTime::<Utc>::from_timestamp(s, 0))
}

#[derive(Deserialize)]
struct StripeList<T> {
    data: Vec<T>,
}

#[derive(Deserialize)]
struct StripeCoupon {
    id: String,
    #[serde(default)]
    valid: bool,
    percent_off: Option<f64>,
    amount_off: Option<i64>,
    currency: Option<String>,
}

impl From<StripeCoupon> for CouponTerms {
    fn from(c: StripeCoupon) -> Self {
        CouponTerms {
            id: c.id,
            valid: c.valid,
            percent_off: c.percent_off,
            amount_off: c.amount_off,
            currency: c.currency,
        }
    }
}

#[derive(Deserialize)]
struct StripePromotionCode {
    id: String,
    code: String,
    active: bool,
    expires_at: Option<i64>,
    coupon: StripeCoupon,
}

impl From<StripePromotionCode> for PromotionCode {
    fn from(p: StripePromotionCode) -> Self {
        PromotionCode {
            id: p.id,
            code: p.code,
            active: p.active,
            expires_at: timestamp(p.expires_at),
            coupon: p.coupon.into(),
        }
    }
}

#[derive(Deserialize)]
struct StripeCheckoutSession {
    id: String,
    url: Option<String>,
    payment_intent: Option<String>,
}

#[derive(Deserialize)]
struct StripeRefund {
    id: String,
    amount: i64,
    status: Option<String>,
}

#[derive(Deserialize)]
struct StripeSubscription {
    id: String,
    status: String,
    cancel_at_period_end: bool,
    current_period_end: Option<i64>,
}

fn checkout_form(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_string(), request.mode.as_str().to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
    ];

    for (i, item) in request.line_items.iter().enumerate() {
        form.push((format!("line_items[{}][price]", i), item.price_id.clone()));
        form.push((
            format!("line_items[{}][quantity]", i),
            item.quantity.to_string(),
        ));
    }

    if let Some(email) = &request.customer_email {
        form.push(("customer_email".to_string(), email.clone()));
    }
    if let Some(reference) = &request.client_reference_id {
        form.push(("client_reference_id".to_string(), reference.clone()));
    }

    match &request.discount {
        Some(CheckoutDiscount::PromotionCode(id)) => {
            form.push(("discounts[0][promotion_code]".to_string(), id.clone()))
        }
        Some(CheckoutDiscount::Coupon(id)) => {
            form.push(("discounts[0][coupon]".to_string(), id.clone()))
        }
        // let shoppers type a code on the hosted page instead
        None => form.push(("allow_promotion_codes".to_string(), "true".to_string())),
    }

    form
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self))]
    async fn find_promotion_code(&self, code: &str) -> Result<Option<PromotionCode>, ServiceError> {
        let list: StripeList<StripePromotionCode> = self
            .get("promotion_codes", &[("code", code), ("limit", "1")])
            .await?;
        Ok(list.data.into_iter().next().map(PromotionCode::from))
    }

    #[instrument(skip(self))]
    async fn retrieve_coupon(&self, coupon_id: &str) -> Result<CouponTerms, ServiceError> {
        let path = format!("coupons/{}", path_id(coupon_id)?);
        let coupon: StripeCoupon = self.get(&path, &[]).await?;
        Ok(coupon.into())
    }

    #[instrument(skip(self, request), fields(items = request.line_items.len()))]
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ServiceError> {
        let session: StripeCheckoutSession = self
            .post("checkout/sessions", &checkout_form(request))
            .await?;
        info!(session_id = %session.id, "checkout session created");
        Ok(CheckoutSession {
            id: session.id,
            url: session.url,
        })
    }

    #[instrument(skip(self))]
    async fn refund_session(
        &self,
        session_id: &str,
        amount: Option<i64>,
    ) -> Result<RefundReceipt, ServiceError> {
        let path = format!("checkout/sessions/{}", path_id(session_id)?);
        let session: StripeCheckoutSession = self.get(&path, &[]).await?;
        let payment_intent = session.payment_intent.ok_or_else(|| {
            ServiceError::GatewayError(format!(
                "Checkout session {} has no payment to refund",
                session_id
            ))
        })?;

        let mut form = vec![("payment_intent".to_string(), payment_intent)];
        if let Some(amount) = amount {
            form.push(("amount".to_string(), amount.to_string()));
        }

        let refund: StripeRefund = self.post("refunds", &form).await?;
        info!(refund_id = %refund.id, amount = refund.amount, "refund created");
        Ok(RefundReceipt {
            id: refund.id,
            amount: refund.amount,
            status: refund.status.unwrap_or_else(|| "pending".to_string()),
        })
    }

    #[instrument(skip(self))]
    async fn cancel_subscription_at_period_end(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionCancellation, ServiceError> {
        let path = format!("subscriptions/{}", path_id(subscription_id)?);
        let form = [("cancel_at_period_end".to_string(), "true".to_string())];
        let subscription: StripeSubscription = self.post(&path, &form).await?;
        Ok(SubscriptionCancellation {
            id: subscription.id,
            status: subscription.status,
            cancel_at_period_end: subscription.cancel_at_period_end,
            current_period_end: timestamp(subscription.current_period_end),
        })
    }

    #[instrument(skip(self))]
    async fn set_promotion_code_active(
        &self,
        promotion_code_id: &str,
        active: bool,
    ) -> Result<PromotionCode, ServiceError> {
        let path = format!("promotion_codes/{}", path_id(promotion_code_id)?);
        let form = [("active".to_string(), active.to_string())];
        let promotion: StripePromotionCode = self.post(&path, &form).await?;
        Ok(promotion.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{CheckoutLineItem, CheckoutMode};

    #[test]
    fn resource_missing_maps_to_not_found() {
        let body = r#"{"error":{"code":"resource_missing","message":"No such coupon: 'X'","type":"invalid_request_error"}}"#;
        assert!(matches!(
            translate_error(StatusCode::NOT_FOUND, body),
            ServiceError::NotFound(msg) if msg == "No such coupon: 'X'"
        ));
    }

    #[test]
    fn other_errors_map_to_gateway_error() {
        let body = r#"{"error":{"code":"charge_already_refunded","message":"Charge has already been refunded."}}"#;
        assert!(matches!(
            translate_error(StatusCode::BAD_REQUEST, body),
            ServiceError::GatewayError(_)
        ));
        assert!(matches!(
            translate_error(StatusCode::BAD_GATEWAY, "<html>"),
            ServiceError::GatewayError(msg) if msg.contains("502")
        ));
    }

    #[test]
    fn path_ids_must_be_plain_tokens() {
        assert!(path_id("cs_test_a1B2").is_ok());
        assert!(path_id("../refunds").is_err());
        assert!(path_id("").is_err());
    }

    #[test]
    fn checkout_form_encodes_items_and_discount() {
        let form = checkout_form(&CheckoutSessionRequest {
            mode: CheckoutMode::Payment,
            line_items: vec![
                CheckoutLineItem {
                    price_id: "price_a".into(),
                    quantity: 2,
                },
                CheckoutLineItem {
                    price_id: "price_b".into(),
                    quantity: 1,
                },
            ],
            customer_email: Some("shopper@example.com".into()),
            client_reference_id: None,
            discount: Some(CheckoutDiscount::PromotionCode("promo_1".into())),
            success_url: "https://shop.test/ok".into(),
            cancel_url: "https://shop.test/cart".into(),
        });

        let has = |k: &str, v: &str| form.iter().any(|(fk, fv)| fk == k && fv == v);
        assert!(has("line_items[1][price]", "price_b"));
        assert!(has("line_items[0][quantity]", "2"));
        assert!(has("discounts[0][promotion_code]", "promo_1"));
        assert!(!form.iter().any(|(k, _)| k == "allow_promotion_codes"));
    }
}
