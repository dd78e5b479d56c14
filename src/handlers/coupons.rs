use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::HeaderMap,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

use crate::{
    handlers::common::JsonBody,
    auth::AuthUser,
    errors::ServiceError,
    ApiResponse, AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct ValidateCouponRequest {
    pub code: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CouponValidationResponse {
    pub code: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_percent: Option<f64>,
    /// Minor currency units
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_amount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/coupons/validate",
    summary = "Validate a coupon code",
    description = "Open to guests. Unknown, expired and inactive codes all return the same 404. \
                   Every response carries x-ratelimit-* headers.",
    request_body = ValidateCouponRequest,
    responses(
        (status = 200, description = "Code is redeemable", body = ApiResponse<CouponValidationResponse>),
        (status = 400, description = "Missing code", body = crate::errors::ErrorResponse),
        (status = 404, description = "Invalid or expired code", body = crate::errors::ErrorResponse),
        (status = 429, description = "Too many attempts", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment gateway unavailable", body = crate::errors::ErrorResponse)
    ),
    security((), ("Bearer" = [])),
    tag = "coupons"
)]
pub async fn validate_coupon(
    State(state): State<AppState>,
    principal: Option<AuthUser>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    JsonBody(request): JsonBody<ValidateCouponRequest>,
) -> Result<Response, ServiceError> {
    let key = state.services.coupons.limiter().key_for(
        principal.as_ref(),
        &headers,
        connect_info.map(|ConnectInfo(addr)| addr),
    );

    let check = state
        .services
        .coupons
        .validate(&request.code, principal.as_ref(), &key)
        .await?;

    let outcome = check.outcome.label();
    let mut response = match check.outcome.into_result() {
        Ok(coupon) => Json(ApiResponse::success(CouponValidationResponse {
            code: coupon.code,
            valid: true,
            discount_percent: coupon.discount_percent,
            discount_amount: coupon.discount_amount,
            currency: coupon.currency,
        }))
        .into_response(),
        Err(err) => {
            debug!(outcome, "coupon rejected");
            err.into_response()
        }
    };

    check.rate.apply_headers(response.headers_mut());
    Ok(response)
}
