#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::{DateTime, Utc};
use mockall::mock;
use sea_orm::{ActiveModelTrait, ActiveValue::Set};
use serde_json::Value;
use storefront_api::{
    app_router,
    auth::AuthUser,
    config::AppConfig,
    db::{self, DbConfig},
    entities::{discount, ingredient, order, product, profile, referral, subscriber},
    errors::ServiceError,
    gateway::{
        CheckoutSession, CheckoutSessionRequest, CouponTerms, PaymentGateway, PromotionCode,
        RefundReceipt, SubscriptionCancellation,
    },
    models::{DiscountSource, OrderStatus, PaymentStatus},
    services::notifications::{EmailMessage, Mailer, MailerError},
    AppState,
};
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "integration_test_secret_with_plenty_of_entropy_0123456789";

mock! {
    pub Gateway {}

    #[async_trait]
    impl PaymentGateway for Gateway {
        async fn find_promotion_code(&self, code: &str) -> Result<Option<PromotionCode>, ServiceError>;
        async fn retrieve_coupon(&self, coupon_id: &str) -> Result<CouponTerms, ServiceError>;
        async fn create_checkout_session(
            &self,
            request: &CheckoutSessionRequest,
        ) -> Result<CheckoutSession, ServiceError>;
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
}

/// Mailer that keeps every message in memory.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Polls until `count` messages arrived or a second passed.
    pub async fn wait_for(&self, count: usize) -> Vec<EmailMessage> {
        for _ in 0..100 {
            let sent = self.sent();
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.sent()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailerError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

pub fn promotion(code: &str, percent_off: Option<f64>) -> PromotionCode {
    PromotionCode {
        id: format!("promo_{}", code.to_lowercase()),
        code: code.to_string(),
        active: true,
        expires_at: None,
        coupon: coupon("coupon_promo", percent_off),
    }
}

pub fn coupon(id: &str, percent_off: Option<f64>) -> CouponTerms {
    CouponTerms {
        id: id.to_string(),
        valid: true,
        percent_off,
        amount_off: None,
        currency: None,
    }
}

/// Order row with sensible defaults for seeding.
#[derive(Debug, Clone)]
pub struct OrderSeed {
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub total_amount: i64,
    pub refunded_amount: i64,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub stripe_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Default for OrderSeed {
    fn default() -> Self {
        Self {
            status: OrderStatus::Paid,
            payment_status: PaymentStatus::Paid,
            total_amount: 5_000,
            refunded_amount: 0,
            customer_email: Some("shopper@example.com".to_string()),
            customer_name: Some("Sam Shopper".to_string()),
            stripe_session_id: Some(format!("cs_test_{}", Uuid::new_v4().simple())),
            created_at: Utc::now(),
        }
    }
}

/// Application wired to an in-memory SQLite database, a mocked gateway and a
/// recording mailer. Requests go through the full router.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub mailer: Arc<RecordingMailer>,
    pub admin: profile::Model,
    admin_token: String,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::build(MockGateway::new(), |_| {}).await
    }

    pub async fn with_gateway(gateway: MockGateway) -> Self {
        Self::build(gateway, |_| {}).await
    }

    pub async fn build(gateway: MockGateway, configure: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            TEST_JWT_SECRET.to_string(),
            "test".to_string(),
        );
        cfg.referral_coupon_id = Some("coupon_referral".to_string());
        cfg.email_initial_backoff_ms = 1;
        cfg.email_max_backoff_ms = 5;
        configure(&mut cfg);

        let pool = db::establish_connection_with_config(&DbConfig::in_memory_sqlite())
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState::new(cfg, Arc::new(pool), Arc::new(gateway), mailer.clone());
        let router = app_router(state.clone());

        let mut app = Self {
            router,
            state,
            mailer,
            admin: placeholder_profile(),
            admin_token: String::new(),
        };

        let admin = app.seed_profile("admin@example.com", true).await;
        app.admin_token = app.token_for(&admin);
        app.admin = admin;
        app
    }

    pub fn admin_token(&self) -> &str {
        &self.admin_token
    }

    /// Session token with a verified email for `profile`.
    pub fn token_for(&self, profile: &profile::Model) -> String {
        self.state
            .auth
            .issue_token(
                &AuthUser {
                    user_id: profile.id,
                    email: Some(profile.email.clone()),
                    email_verified: true,
                    roles: vec!["authenticated".to_string()],
                },
                3600,
            )
            .expect("issue test token")
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        self.request_with_headers(method, uri, body, token, &[]).await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
        headers: &[(&str, &str)],
    ) -> Response {
        self.send(method, uri, body, token, headers, None).await
    }

    /// Request arriving over a socket from `peer`, as `ConnectInfo` reports it.
    pub async fn request_from(
        &self,
        peer: &str,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> Response {
        let peer: SocketAddr = peer.parse().expect("peer socket address");
        self.send(method, uri, body, None, headers, Some(peer)).await
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
        headers: &[(&str, &str)],
        peer: Option<SocketAddr>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        if let Some(addr) = peer {
            builder = builder.extension(ConnectInfo(addr));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Request authenticated as the seeded administrator.
    pub async fn admin_request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.request(method, uri, body, Some(self.admin_token())).await
    }

    pub async fn seed_profile(&self, email: &str, is_admin: bool) -> profile::Model {
        profile::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email.to_string()),
            full_name: Set(None),
            is_admin: Set(is_admin),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed profile")
    }

    pub async fn seed_order(&self, seed: OrderSeed) -> order::Model {
        order::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(None),
            customer_email: Set(seed.customer_email),
            customer_name: Set(seed.customer_name),
            stripe_session_id: Set(seed.stripe_session_id),
            total_amount: Set(seed.total_amount),
            refunded_amount: Set(seed.refunded_amount),
            currency: Set("usd".to_string()),
            status: Set(seed.status),
            payment_status: Set(seed.payment_status),
            created_at: Set(seed.created_at),
            updated_at: Set(seed.created_at),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed order")
    }

    pub async fn seed_discount(
        &self,
        user_id: Uuid,
        code: &str,
        active: bool,
        expires_at: Option<DateTime<Utc>>,
        source: DiscountSource,
    ) -> discount::Model {
        discount::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            discount_code: Set(code.to_string()),
            stripe_coupon_id: Set("coupon_personal".to_string()),
            source: Set(source),
            is_active: Set(active),
            expires_at: Set(expires_at),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed discount")
    }

    pub async fn seed_referral(
        &self,
        referrer_id: Uuid,
        completed_purchase: bool,
        reward_issued: bool,
    ) -> referral::Model {
        referral::ActiveModel {
            id: Set(Uuid::new_v4()),
            referrer_id: Set(referrer_id),
            referee_id: Set(None),
            referee_email: Set(Some(format!("friend-{}@example.com", Uuid::new_v4().simple()))),
            completed_purchase: Set(completed_purchase),
            reward_issued: Set(reward_issued),
            reward_type: Set(None),
            reward_value: Set(None),
            reward_issued_at: Set(None),
            notes: Set(None),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed referral")
    }

    pub async fn seed_product(&self, name: &str, price_cents: i64) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            slug: Set(name.to_lowercase().replace(' ', "-")),
            description: Set(Some(format!("{}, freshly made", name))),
            price_cents: Set(price_cents),
            stripe_price_id: Set(Some(format!("price_{}", Uuid::new_v4().simple()))),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product")
    }

    pub async fn seed_ingredient(&self, name: &str, benefits: Option<&str>) -> ingredient::Model {
        ingredient::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            description: Set(None),
            benefits: Set(benefits.map(str::to_string)),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed ingredient")
    }

    pub async fn seed_subscriber(&self, email: &str) -> subscriber::Model {
        subscriber::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email.to_string()),
            source: Set(Some("footer".to_string())),
            subscribed: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed subscriber")
    }
}

fn placeholder_profile() -> profile::Model {
    profile::Model {
        id: Uuid::nil(),
        email: String::new(),
        full_name: None,
        is_admin: false,
        created_at: Utc::now(),
    }
}

pub async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}

pub async fn text_body(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    String::from_utf8(bytes.to_vec()).expect("response body is utf-8")
}
