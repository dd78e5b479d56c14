use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "0.1.0",
        description = r#"
# Storefront back-office API

Order administration, discount and referral ledgers, coupon validation, hosted checkout and CSV exports.

## Authentication

Send the identity provider's session token as a bearer token:

```
Authorization: Bearer <jwt>
```

Every route under `/api/v1/admin` additionally requires an administrator.

## Rate limiting

Coupon validation is limited per caller. Responses carry:
- `X-RateLimit-Limit`: attempts allowed per window
- `X-RateLimit-Remaining`: attempts left in the current window
- `X-RateLimit-Reset`: seconds until the window resets

## Errors

Failures share one body:

```json
{
  "error": "Bad Request",
  "message": "Validation error: Cannot process more than 100 items at once",
  "request_id": "2f1c9c1e-...",
  "timestamp": "2026-01-01T00:00:00Z"
}
```
"#
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "orders", description = "Order administration"),
        (name = "discounts", description = "Per-user discount codes"),
        (name = "referrals", description = "Referral rewards"),
        (name = "exports", description = "CSV downloads"),
        (name = "billing", description = "Subscriptions and promotion codes"),
        (name = "coupons", description = "Shopper coupon validation"),
        (name = "checkout", description = "Hosted checkout sessions"),
        (name = "health", description = "Health check")
    ),
    paths(
        crate::handlers::health::health_check,

        // Orders
        crate::handlers::orders::list_orders,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::refund_order,
        crate::handlers::orders::bulk_update_orders,

        // Discounts
        crate::handlers::discounts::list_discounts,
        crate::handlers::discounts::create_discount,
        crate::handlers::discounts::update_discount,
        crate::handlers::discounts::delete_discount,
        crate::handlers::discounts::bulk_update_discounts,
        crate::handlers::discounts::bulk_delete_discounts,

        // Referrals
        crate::handlers::referrals::list_referrals,
        crate::handlers::referrals::issue_reward,
        crate::handlers::referrals::bulk_issue_rewards,
        crate::handlers::referrals::referral_stats,
        crate::handlers::referrals::issue_referral_discount,

        // Exports
        crate::handlers::exports::export_orders,
        crate::handlers::exports::export_products,
        crate::handlers::exports::export_ingredients,
        crate::handlers::exports::export_subscribers,

        // Billing
        crate::handlers::billing::cancel_subscription,
        crate::handlers::billing::update_promotion_code,

        // Shopper routes
        crate::handlers::coupons::validate_coupon,
        crate::handlers::checkout::create_checkout,
    ),
    components(
        schemas(
            crate::errors::ErrorResponse,
            crate::models::OrderStatus,
            crate::models::PaymentStatus,
            crate::models::DiscountSource,
            crate::models::RewardType,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

/// Registers the `Bearer` scheme referenced by the path annotations.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "Bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_admin_routes_and_bearer_scheme() {
        let json = serde_json::to_string(&ApiDocV1::openapi()).unwrap();
        assert!(json.contains("Storefront API"));
        assert!(json.contains("/api/v1/admin/orders/bulk"));
        assert!(json.contains("/api/v1/coupons/validate"));
        assert!(json.contains("\"Bearer\""));
    }
}
