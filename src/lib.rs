//! Storefront back-office API
//!
//! Admin order handling, discount and referral ledgers, shopper coupon
//! validation, hosted checkout and CSV exports.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod export;
pub mod gateway;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod models;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    http::HeaderValue,
    response::Json,
    routing::{get, patch, post},
    Extension, Router,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
};
use utoipa::{OpenApi, ToSchema};

use crate::auth::{AdminAuthority, AuthConfig, AuthRouterExt, AuthService};
use crate::config::AppConfig;
use crate::db::DbPool;
use crate::gateway::PaymentGateway;
use crate::services::notifications::Mailer;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: Arc<AppConfig>,
    pub services: handlers::AppServices,
    pub auth: Arc<AuthService>,
    pub admin_authority: Arc<dyn AdminAuthority>,
}

impl AppState {
    /// Builds the services around the given gateway and mailer. Spawns the
    /// shipping notification worker, so it must run inside a tokio runtime.
    pub fn new(
        config: AppConfig,
        db: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let auth = Arc::new(AuthService::new(AuthConfig::from(&config)));
        let admin_authority = auth::authority_from_config(&config, db.clone());
        let services = handlers::AppServices::new(&config, db.clone(), gateway, mailer);

        Self {
            db,
            config: Arc::new(config),
            services,
            auth,
            admin_authority,
        }
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Every route behind `/api/v1/admin`. Authentication and the admin gate run
/// before any extractor touches the request body.
pub fn admin_routes() -> Router<AppState> {
    use handlers::{billing, discounts, exports, orders, referrals};

    Router::new()
        // Orders
        .route("/orders", get(orders::list_orders))
        .route("/orders/bulk", patch(orders::bulk_update_orders))
        .route("/orders/export", get(exports::export_orders))
        .route("/orders/:id/status", patch(orders::update_order_status))
        .route("/orders/:id/refund", post(orders::refund_order))
        // Discounts
        .route(
            "/discounts",
            get(discounts::list_discounts).post(discounts::create_discount),
        )
        .route(
            "/discounts/bulk",
            patch(discounts::bulk_update_discounts).delete(discounts::bulk_delete_discounts),
        )
        .route(
            "/discounts/:id",
            patch(discounts::update_discount).delete(discounts::delete_discount),
        )
        // Referrals
        .route("/referrals", get(referrals::list_referrals))
        .route("/referrals/bulk", patch(referrals::bulk_issue_rewards))
        .route("/referrals/stats", get(referrals::referral_stats))
        .route("/referrals/:id", patch(referrals::issue_reward))
        .route(
            "/referrals/:id/discount",
            post(referrals::issue_referral_discount),
        )
        // Exports
        .route("/products/export", get(exports::export_products))
        .route("/ingredients/export", get(exports::export_ingredients))
        .route("/subscribers/export", get(exports::export_subscribers))
        // Billing
        .route(
            "/subscriptions/:id/cancel",
            post(billing::cancel_subscription),
        )
        .route(
            "/promotion-codes/:id",
            patch(billing::update_promotion_code),
        )
        .with_admin()
}

/// Shopper-facing routes. Guests are allowed; a bearer token, when sent,
/// must be valid.
pub fn shopper_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/coupons/validate",
            post(handlers::coupons::validate_coupon),
        )
        .route("/checkout", post(handlers::checkout::create_checkout))
        .with_optional_auth()
}

pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .merge(shopper_routes())
        .nest("/admin", admin_routes())
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(openapi::ApiDocV1::openapi())
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origin_list()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if origins.is_empty() {
        if config.is_production() {
            ::tracing::warn!("no CORS origins configured; cross-origin requests will be refused");
            CorsLayer::new()
        } else {
            CorsLayer::permissive()
        }
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Full application router with the shared layers applied.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_v1_routes())
        .route("/api-docs/openapi.json", get(openapi_json))
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        .layer(CompressionLayer::new())
        .layer(cors_layer(&state.config))
        // Auth middlewares read these from request extensions
        .layer(Extension(state.admin_authority.clone()))
        .layer(Extension(state.auth.clone()))
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[tokio::test]
    async fn error_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-err"), async {
                ApiResponse::<()>::error("oops".into())
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-err"));
        assert!(!response.success);
    }
}
