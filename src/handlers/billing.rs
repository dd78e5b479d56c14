use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    handlers::common::JsonBody,
    gateway::{PromotionCode, SubscriptionCancellation},
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct PromotionCodeUpdate {
    pub active: bool,
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/subscriptions/{id}/cancel",
    summary = "Cancel a subscription at period end",
    params(("id" = String, Path, description = "Gateway subscription id")),
    responses(
        (status = 200, description = "Cancellation scheduled", body = ApiResponse<SubscriptionCancellation>),
        (status = 404, description = "Unknown subscription", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment gateway error", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "billing"
)]
pub async fn cancel_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SubscriptionCancellation> {
    let cancellation = state.services.billing.cancel_subscription(&id).await?;
    Ok(Json(ApiResponse::success(cancellation)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/admin/promotion-codes/{id}",
    summary = "Activate or deactivate a promotion code",
    params(("id" = String, Path, description = "Gateway promotion code id")),
    request_body = PromotionCodeUpdate,
    responses(
        (status = 200, description = "Promotion code updated", body = ApiResponse<PromotionCode>),
        (status = 404, description = "Unknown promotion code", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment gateway error", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "billing"
)]
pub async fn update_promotion_code(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<PromotionCodeUpdate>,
) -> ApiResult<PromotionCode> {
    let code = state
        .services
        .billing
        .set_promotion_code_active(&id, request.active)
        .await?;
    Ok(Json(ApiResponse::success(code)))
}
