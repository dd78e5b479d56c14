use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::HeaderMap,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    handlers::common::JsonBody,
    auth::AuthUser,
    errors::ServiceError,
    gateway::{CheckoutLineItem, CheckoutMode},
    services::checkout::CheckoutInput,
    ApiResponse, AppState,
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LineItemRequest {
    pub price_id: String,
    pub quantity: u32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutRequest {
    #[validate(length(min = 1, max = 50))]
    pub line_items: Vec<LineItemRequest>,
    /// `payment` (default) or `subscription`
    #[serde(default = "default_mode")]
    pub mode: CheckoutMode,
    pub coupon_code: Option<String>,
    #[validate(email)]
    pub customer_email: Option<String>,
}

fn default_mode() -> CheckoutMode {
    CheckoutMode::Payment
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    summary = "Start a hosted checkout",
    description = "Creates a one-time or subscription checkout session. A coupon code is validated first \
                   and rejected the same way as on the coupon endpoint.",
    request_body = CreateCheckoutRequest,
    responses(
        (status = 200, description = "Session created", body = ApiResponse<CheckoutResponse>),
        (status = 400, description = "Invalid line items", body = crate::errors::ErrorResponse),
        (status = 404, description = "Invalid or expired coupon code", body = crate::errors::ErrorResponse),
        (status = 429, description = "Too many coupon attempts", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment gateway error", body = crate::errors::ErrorResponse)
    ),
    security((), ("Bearer" = [])),
    tag = "checkout"
)]
pub async fn create_checkout(
    State(state): State<AppState>,
    principal: Option<AuthUser>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    JsonBody(request): JsonBody<CreateCheckoutRequest>,
) -> Result<Response, ServiceError> {
    request.validate()?;

    let key = state.services.coupons.limiter().key_for(
        principal.as_ref(),
        &headers,
        connect_info.map(|ConnectInfo(addr)| addr),
    );

    let input = CheckoutInput {
        mode: request.mode,
        line_items: request
            .line_items
            .into_iter()
            .map(|item| CheckoutLineItem {
                price_id: item.price_id,
                quantity: item.quantity,
            })
            .collect(),
        coupon_code: request.coupon_code,
        customer_email: request.customer_email,
    };

    let result = state
        .services
        .checkout
        .create_session(input, principal.as_ref(), &key)
        .await?;

    let mut response = Json(ApiResponse::success(CheckoutResponse {
        session_id: result.session.id,
        url: result.session.url,
    }))
    .into_response();
    if let Some(rate) = result.rate {
        rate.apply_headers(response.headers_mut());
    }
    Ok(response)
}
