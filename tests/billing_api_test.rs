mod common;

use axum::http::{Method, StatusCode};
use common::{json_body, promotion, MockGateway, TestApp};
use mockall::predicate::eq;
use serde_json::json;
use storefront_api::{errors::ServiceError, gateway::SubscriptionCancellation};

#[tokio::test]
async fn cancels_subscription_at_period_end() {
    let mut gateway = MockGateway::new();
    gateway
        .expect_cancel_subscription_at_period_end()
        .with(eq("sub_123"))
        .times(1)
        .returning(|id| {
            Ok(SubscriptionCancellation {
                id: id.to_string(),
                status: "active".into(),
                cancel_at_period_end: true,
                current_period_end: None,
            })
        });
    let app = TestApp::with_gateway(gateway).await;

    let response = app
        .admin_request(Method::POST, "/api/v1/admin/subscriptions/sub_123/cancel", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["cancel_at_period_end"], true);
}

#[tokio::test]
async fn unknown_subscription_is_not_found() {
    let mut gateway = MockGateway::new();
    gateway
        .expect_cancel_subscription_at_period_end()
        .returning(|id| Err(ServiceError::NotFound(format!("No such subscription: '{}'", id))));
    let app = TestApp::with_gateway(gateway).await;

    let response = app
        .admin_request(Method::POST, "/api/v1/admin/subscriptions/sub_missing/cancel", None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deactivates_promotion_code() {
    let mut gateway = MockGateway::new();
    gateway
        .expect_set_promotion_code_active()
        .with(eq("promo_spring"), eq(false))
        .times(1)
        .returning(|_, active| {
            let mut promo = promotion("SPRING", Some(20.0));
            promo.active = active;
            Ok(promo)
        });
    let app = TestApp::with_gateway(gateway).await;

    let response = app
        .admin_request(
            Method::PATCH,
            "/api/v1/admin/promotion-codes/promo_spring",
            Some(json!({ "active": false })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["active"], false);
    assert_eq!(body["data"]["code"], "SPRING");
}
