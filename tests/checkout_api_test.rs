mod common;

use axum::http::{Method, StatusCode};
use common::{json_body, promotion, MockGateway, TestApp};
use serde_json::json;
use storefront_api::gateway::{CheckoutDiscount, CheckoutMode, CheckoutSession};

#[tokio::test]
async fn guest_checkout_applies_promotion_code() {
    let mut gateway = MockGateway::new();
    gateway
        .expect_find_promotion_code()
        .returning(|code| Ok(Some(promotion(code, Some(10.0)))));
    gateway
        .expect_create_checkout_session()
        .withf(|req| {
            req.mode == CheckoutMode::Payment
                && req.line_items.len() == 1
                && req.line_items[0].price_id == "price_tea"
                && req.line_items[0].quantity == 2
                && req.discount == Some(CheckoutDiscount::PromotionCode("promo_tea10".into()))
                && req.customer_email.as_deref() == Some("guest@example.com")
                && req.client_reference_id.is_none()
        })
        .times(1)
        .returning(|_| {
            Ok(CheckoutSession {
                id: "cs_test_guest".into(),
                url: Some("https://checkout.example/cs_test_guest".into()),
            })
        });
    let app = TestApp::with_gateway(gateway).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            Some(json!({
                "lineItems": [{ "priceId": "price_tea", "quantity": 2 }],
                "couponCode": "tea10",
                "customerEmail": "Guest@Example.com"
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-ratelimit-remaining"));
    let body = json_body(response).await;
    assert_eq!(body["data"]["sessionId"], "cs_test_guest");
    assert_eq!(body["data"]["url"], "https://checkout.example/cs_test_guest");
}

#[tokio::test]
async fn signed_in_subscription_uses_verified_email() {
    let mut gateway = MockGateway::new();
    let reference_id = std::sync::Arc::new(std::sync::Mutex::new(None::<String>));
    let seen = reference_id.clone();
    gateway
        .expect_create_checkout_session()
        .withf(|req| {
            req.mode == CheckoutMode::Subscription
                && req.discount.is_none()
                && req.customer_email.as_deref() == Some("member@example.com")
        })
        .times(1)
        .returning(move |req| {
            *seen.lock().unwrap() = req.client_reference_id.clone();
            Ok(CheckoutSession {
                id: "cs_test_sub".into(),
                url: None,
            })
        });
    let app = TestApp::with_gateway(gateway).await;
    let member = app.seed_profile("member@example.com", false).await;
    let token = app.token_for(&member);

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            Some(json!({
                "lineItems": [{ "priceId": "price_box_monthly", "quantity": 1 }],
                "mode": "subscription"
            })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        reference_id.lock().unwrap().as_deref(),
        Some(member.id.to_string().as_str())
    );
}

#[tokio::test]
async fn invalid_coupon_stops_checkout() {
    let mut gateway = MockGateway::new();
    gateway.expect_find_promotion_code().returning(|_| Ok(None));
    gateway.expect_create_checkout_session().never();
    let app = TestApp::with_gateway(gateway).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            Some(json!({
                "lineItems": [{ "priceId": "price_tea", "quantity": 1 }],
                "couponCode": "BOGUS"
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("Invalid or expired coupon code"));
}

#[tokio::test]
async fn rejects_empty_cart_and_bad_quantities() {
    let mut gateway = MockGateway::new();
    gateway.expect_create_checkout_session().never();
    let app = TestApp::with_gateway(gateway).await;

    for body in [
        json!({ "lineItems": [] }),
        json!({ "lineItems": [{ "priceId": "price_tea", "quantity": 0 }] }),
        json!({ "lineItems": [{ "priceId": "price_tea", "quantity": 1 }], "customerEmail": "nope" }),
    ] {
        let response = app
            .request(Method::POST, "/api/v1/checkout", Some(body), None)
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
