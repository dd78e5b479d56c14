use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::discount::Model as DiscountModel,
    errors::ServiceError,
    handlers::common::{BulkIdsRequest, JsonBody},
    models::DiscountSource,
    services::discounts::{DiscountView, NewDiscount},
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateDiscountRequest {
    #[validate(email)]
    pub user_email: String,
    #[validate(length(min = 1, max = 64))]
    pub discount_code: String,
    #[validate(length(min = 1, max = 255))]
    pub stripe_coupon_id: String,
    pub expires_at: Option<DateTime<Utc>>,
    /// Defaults to true
    pub active: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DiscountResponse {
    pub discount: DiscountModel,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateDiscountRequest {
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkDiscountUpdateRequest {
    pub ids: Vec<Uuid>,
    /// Only `is_active` is applied; other keys are ignored
    #[schema(value_type = Object)]
    pub updates: Map<String, Value>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkUpdated {
    pub updated: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkDeleted {
    pub deleted: u64,
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/discounts",
    summary = "List discounts",
    responses(
        (status = 200, description = "Discounts, newest first", body = ApiResponse<Vec<DiscountView>>)
    ),
    security(("Bearer" = [])),
    tag = "discounts"
)]
pub async fn list_discounts(
    State(state): State<AppState>,
) -> ApiResult<Vec<DiscountView>> {
    let discounts = state.services.discounts.list().await?;
    Ok(Json(ApiResponse::success(discounts)))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/discounts",
    summary = "Create a discount",
    description = "Creates a discount for the user registered under userEmail",
    request_body = CreateDiscountRequest,
    responses(
        (status = 201, description = "Discount created", body = ApiResponse<DiscountResponse>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "User not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "User already has this code", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "discounts"
)]
pub async fn create_discount(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<CreateDiscountRequest>,
) -> Result<(StatusCode, Json<ApiResponse<DiscountResponse>>), ServiceError> {
    request.validate()?;

    let discount = state
        .services
        .discounts
        .create(NewDiscount {
            user_email: request.user_email,
            discount_code: request.discount_code,
            stripe_coupon_id: request.stripe_coupon_id,
            expires_at: request.expires_at,
            active: request.active.unwrap_or(true),
            source: DiscountSource::AdminCreated,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(DiscountResponse { discount })),
    ))
}

#[utoipa::path(
    patch,
    path = "/api/v1/admin/discounts/{id}",
    summary = "Activate or deactivate a discount",
    params(("id" = Uuid, Path, description = "Discount id")),
    request_body = UpdateDiscountRequest,
    responses(
        (status = 200, description = "Discount updated", body = ApiResponse<DiscountResponse>),
        (status = 400, description = "Missing active flag", body = crate::errors::ErrorResponse),
        (status = 404, description = "Discount not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "discounts"
)]
pub async fn update_discount(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    JsonBody(request): JsonBody<UpdateDiscountRequest>,
) -> ApiResult<DiscountResponse> {
    let active = request.active.ok_or_else(|| {
        ServiceError::ValidationError("Missing required field: active".to_string())
    })?;
    let discount = state.services.discounts.set_active(id, active).await?;
    Ok(Json(ApiResponse::success(DiscountResponse { discount })))
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/discounts/{id}",
    summary = "Delete a discount",
    params(("id" = Uuid, Path, description = "Discount id")),
    responses(
        (status = 204, description = "Discount deleted"),
        (status = 404, description = "Discount not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "discounts"
)]
pub async fn delete_discount(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.discounts.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    patch,
    path = "/api/v1/admin/discounts/bulk",
    summary = "Bulk update discounts",
    request_body = BulkDiscountUpdateRequest,
    responses(
        (status = 200, description = "Discounts updated", body = ApiResponse<BulkUpdated>),
        (status = 400, description = "No updatable field or more than 100 ids", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "discounts"
)]
pub async fn bulk_update_discounts(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<BulkDiscountUpdateRequest>,
) -> ApiResult<BulkUpdated> {
    let updated = state
        .services
        .discounts
        .bulk_update(&request.ids, &request.updates)
        .await?;
    Ok(Json(ApiResponse::success(BulkUpdated { updated })))
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/discounts/bulk",
    summary = "Bulk delete discounts",
    request_body = BulkIdsRequest,
    responses(
        (status = 200, description = "Discounts deleted", body = ApiResponse<BulkDeleted>),
        (status = 400, description = "More than 100 ids", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "discounts"
)]
pub async fn bulk_delete_discounts(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<BulkIdsRequest>,
) -> ApiResult<BulkDeleted> {
    let deleted = state.services.discounts.bulk_delete(&request.ids).await?;
    Ok(Json(ApiResponse::success(BulkDeleted { deleted })))
}
