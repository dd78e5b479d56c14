mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use common::{coupon, json_body, promotion, MockGateway, TestApp};
use mockall::predicate::eq;
use serde_json::json;
use storefront_api::{errors::ServiceError, models::DiscountSource};

const VALIDATE: &str = "/api/v1/coupons/validate";

#[tokio::test]
async fn guest_redeems_active_promotion_code() {
    let mut gateway = MockGateway::new();
    gateway
        .expect_find_promotion_code()
        .with(eq("SPRING20"))
        .times(1)
        .returning(|code| Ok(Some(promotion(code, Some(20.0)))));
    let app = TestApp::with_gateway(gateway).await;

    let response = app
        .request(Method::POST, VALIDATE, Some(json!({ "code": " spring20 " })), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-ratelimit-limit"], "5");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "4");
    assert!(response.headers().contains_key("x-ratelimit-reset"));

    let body = json_body(response).await;
    assert_eq!(body["data"]["valid"], true);
    assert_eq!(body["data"]["code"], "SPRING20");
    assert_eq!(body["data"]["discountPercent"], 20.0);
}

#[tokio::test]
async fn unknown_inactive_and_expired_codes_look_the_same() {
    let mut gateway = MockGateway::new();
    gateway
        .expect_find_promotion_code()
        .with(eq("NOPE"))
        .returning(|_| Ok(None));
    gateway
        .expect_find_promotion_code()
        .with(eq("PAUSED"))
        .returning(|code| {
            let mut promo = promotion(code, Some(10.0));
            promo.active = false;
            Ok(Some(promo))
        });
    gateway
        .expect_find_promotion_code()
        .with(eq("OLD"))
        .returning(|code| {
            let mut promo = promotion(code, Some(10.0));
            promo.expires_at = Some(Utc::now() - Duration::days(1));
            Ok(Some(promo))
        });
    let app = TestApp::with_gateway(gateway).await;

    let mut messages = Vec::new();
    for code in ["nope", "paused", "old"] {
        let response = app
            .request(Method::POST, VALIDATE, Some(json!({ "code": code })), None)
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "code {}", code);
        let body = json_body(response).await;
        messages.push(body["message"].as_str().unwrap().to_string());
    }

    assert!(messages[0].contains("Invalid or expired coupon code"));
    assert!(messages.iter().all(|m| m == &messages[0]));
}

#[tokio::test]
async fn signed_in_shopper_redeems_personal_discount() {
    let mut gateway = MockGateway::new();
    gateway
        .expect_retrieve_coupon()
        .with(eq("coupon_personal"))
        .times(1)
        .returning(|id| Ok(coupon(id, Some(15.0))));
    gateway.expect_find_promotion_code().never();
    let app = TestApp::with_gateway(gateway).await;
    let shopper = app.seed_profile("loyal@example.com", false).await;
    app.seed_discount(shopper.id, "LOYAL15", true, None, DiscountSource::Referral)
        .await;
    let token = app.token_for(&shopper);

    let response = app
        .request(
            Method::POST,
            VALIDATE,
            Some(json!({ "code": "loyal15" })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-ratelimit-limit"], "10");
    let body = json_body(response).await;
    assert_eq!(body["data"]["code"], "LOYAL15");
    assert_eq!(body["data"]["discountPercent"], 15.0);
}

#[tokio::test]
async fn expired_personal_discount_is_rejected() {
    let mut gateway = MockGateway::new();
    gateway.expect_retrieve_coupon().never();
    let app = TestApp::with_gateway(gateway).await;
    let shopper = app.seed_profile("late@example.com", false).await;
    app.seed_discount(
        shopper.id,
        "LATE",
        true,
        Some(Utc::now() - Duration::hours(1)),
        DiscountSource::AdminManual,
    )
    .await;
    let token = app.token_for(&shopper);

    let response = app
        .request(Method::POST, VALIDATE, Some(json!({ "code": "LATE" })), Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn guests_are_rate_limited_per_address() {
    let mut gateway = MockGateway::new();
    gateway
        .expect_find_promotion_code()
        .times(2)
        .returning(|_| Ok(None));
    let app = TestApp::build(gateway, |cfg| {
        cfg.coupon_rate_limit_guest = 1;
        cfg.trusted_proxies = Some("10.0.0.1".to_string());
    })
    .await;

    let first = app
        .request_from(
            "10.0.0.1:40000",
            Method::POST,
            VALIDATE,
            Some(json!({ "code": "GUESS1" })),
            &[("x-forwarded-for", "203.0.113.7")],
        )
        .await;
    assert_eq!(first.status(), StatusCode::NOT_FOUND);
    assert_eq!(first.headers()["x-ratelimit-remaining"], "0");

    let second = app
        .request_from(
            "10.0.0.1:40001",
            Method::POST,
            VALIDATE,
            Some(json!({ "code": "GUESS2" })),
            &[("x-forwarded-for", "198.51.100.66, 203.0.113.7")],
        )
        .await;
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(second.headers()["x-ratelimit-limit"], "1");
    assert!(second.headers().contains_key("retry-after"));

    // a different client still has its own budget
    let other = app
        .request_from(
            "10.0.0.1:40002",
            Method::POST,
            VALIDATE,
            Some(json!({ "code": "GUESS3" })),
            &[("x-forwarded-for", "198.51.100.4")],
        )
        .await;
    assert_eq!(other.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rotating_forwarded_for_does_not_reset_guest_budget() {
    let mut gateway = MockGateway::new();
    gateway
        .expect_find_promotion_code()
        .times(5)
        .returning(|_| Ok(None));
    let app = TestApp::build(gateway, |cfg| {
        cfg.trusted_proxies = Some("10.0.0.1".to_string());
    })
    .await;

    let mut statuses = Vec::new();
    for attempt in 0..20 {
        let forwarded = format!("203.0.113.{}", attempt);
        let response = app
            .request_from(
                "192.0.2.10:5555",
                Method::POST,
                VALIDATE,
                Some(json!({ "code": format!("GUESS{}", attempt) })),
                &[("x-forwarded-for", forwarded.as_str()), ("x-real-ip", forwarded.as_str())],
            )
            .await;
        statuses.push(response.status());
    }

    assert!(statuses[..5].iter().all(|s| *s == StatusCode::NOT_FOUND));
    assert!(statuses[5..].iter().all(|s| *s == StatusCode::TOO_MANY_REQUESTS));
}

#[tokio::test]
async fn empty_code_is_a_validation_error() {
    let app = TestApp::new().await;
    let response = app
        .request(Method::POST, VALIDATE, Some(json!({ "code": "   " })), None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["message"].as_str().unwrap().contains("Coupon code is required"));
}

#[tokio::test]
async fn overlong_code_reports_the_length_limit() {
    let mut gateway = MockGateway::new();
    gateway.expect_find_promotion_code().never();
    let app = TestApp::with_gateway(gateway).await;
    let response = app
        .request(Method::POST, VALIDATE, Some(json!({ "code": "X".repeat(65) })), None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("Coupon code must be at most 64 characters"));
}

#[tokio::test]
async fn invalid_token_is_rejected_instead_of_treated_as_guest() {
    let app = TestApp::new().await;
    let response = app
        .request(
            Method::POST,
            VALIDATE,
            Some(json!({ "code": "ANY" })),
            Some("not.a.jwt"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn gateway_outage_is_bad_gateway() {
    let mut gateway = MockGateway::new();
    gateway
        .expect_find_promotion_code()
        .returning(|_| Err(ServiceError::GatewayError("timeout".into())));
    let app = TestApp::with_gateway(gateway).await;

    let response = app
        .request(Method::POST, VALIDATE, Some(json!({ "code": "ANY" })), None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
