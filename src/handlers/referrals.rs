use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    handlers::common::JsonBody,
    entities::{discount::Model as DiscountModel, referral::Model as ReferralModel},
    errors::ServiceError,
    models::RewardType,
    services::referrals::{ReferralFilter, ReferralStats, ReferralView, RewardInput},
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReferralListQuery {
    /// `pending`, `completed` or `rewarded`
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct IssueRewardRequest {
    /// `discount`, `store_credit`, `free_product` or `cash`; defaults to `discount`
    pub reward_type: Option<String>,
    pub reward_value: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReferralResponse {
    pub referral: ReferralModel,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkRewardRequest {
    pub ids: Vec<Uuid>,
    pub reward_type: Option<String>,
    pub reward_value: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkRewardResponse {
    pub updated: u64,
    pub skipped: u64,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReferralDiscountRequest {
    /// Generated when omitted
    pub discount_code: Option<String>,
    /// Defaults to the configured referral coupon
    pub stripe_coupon_id: Option<String>,
    /// Defaults to 30
    pub expires_in_days: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReferralDiscountResponse {
    pub discount: DiscountModel,
}

fn parse_reward_type(value: Option<String>) -> Result<Option<RewardType>, ServiceError> {
    match value.filter(|v| !v.trim().is_empty()) {
        Some(v) => Ok(Some(v.parse()?)),
        None => Ok(None),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/referrals",
    summary = "List referrals",
    params(ReferralListQuery),
    responses(
        (status = 200, description = "Referrals, newest first", body = ApiResponse<Vec<ReferralView>>),
        (status = 400, description = "Unknown status filter", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "referrals"
)]
pub async fn list_referrals(
    State(state): State<AppState>,
    Query(query): Query<ReferralListQuery>,
) -> ApiResult<Vec<ReferralView>> {
    let filter = match query.status.filter(|s| !s.trim().is_empty()) {
        Some(s) => Some(s.parse::<ReferralFilter>()?),
        None => None,
    };
    let referrals = state.services.referrals.list(filter).await?;
    Ok(Json(ApiResponse::success(referrals)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/admin/referrals/{id}",
    summary = "Issue a referral reward",
    description = "Fails with a distinct message when the reward was already issued or the referee has not purchased",
    params(("id" = Uuid, Path, description = "Referral id")),
    request_body = IssueRewardRequest,
    responses(
        (status = 200, description = "Reward issued", body = ApiResponse<ReferralResponse>),
        (status = 400, description = "Already issued or purchase not completed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Referral not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "referrals"
)]
pub async fn issue_reward(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    JsonBody(request): JsonBody<IssueRewardRequest>,
) -> ApiResult<ReferralResponse> {
    let input = RewardInput {
        reward_type: parse_reward_type(request.reward_type)?,
        reward_value: request.reward_value,
        notes: request.notes,
    };
    let referral = state.services.referrals.issue_reward(id, input).await?;
    Ok(Json(ApiResponse::success(ReferralResponse { referral })))
}

#[utoipa::path(
    patch,
    path = "/api/v1/admin/referrals/bulk",
    summary = "Bulk issue referral rewards",
    description = "Rewards the eligible referrals among up to 100 ids and reports how many were skipped",
    request_body = BulkRewardRequest,
    responses(
        (status = 200, description = "Rewards issued", body = ApiResponse<BulkRewardResponse>),
        (status = 400, description = "No eligible referrals or more than 100 ids", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "referrals"
)]
pub async fn bulk_issue_rewards(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<BulkRewardRequest>,
) -> ApiResult<BulkRewardResponse> {
    let reward_type = parse_reward_type(request.reward_type)?;
    let outcome = state
        .services
        .referrals
        .bulk_issue_rewards(&request.ids, reward_type, request.reward_value)
        .await?;

    Ok(Json(ApiResponse::success(BulkRewardResponse {
        updated: outcome.issued,
        skipped: outcome.skipped,
    })))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/referrals/stats",
    summary = "Referral statistics",
    responses(
        (status = 200, description = "Totals and top referrers", body = ApiResponse<ReferralStats>)
    ),
    security(("Bearer" = [])),
    tag = "referrals"
)]
pub async fn referral_stats(
    State(state): State<AppState>,
) -> ApiResult<ReferralStats> {
    let stats = state.services.referrals.stats().await?;
    Ok(Json(ApiResponse::success(stats)))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/referrals/{id}/discount",
    summary = "Issue a referral discount",
    description = "Creates a referral-sourced discount for the referrer",
    params(("id" = Uuid, Path, description = "Referral id")),
    request_body = ReferralDiscountRequest,
    responses(
        (status = 201, description = "Discount created", body = ApiResponse<ReferralDiscountResponse>),
        (status = 400, description = "Purchase not completed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Referral not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Referrer already has this code", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "referrals"
)]
pub async fn issue_referral_discount(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    JsonBody(request): JsonBody<ReferralDiscountRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ReferralDiscountResponse>>), ServiceError> {
    let discount = state
        .services
        .referrals
        .issue_discount(
            id,
            request.discount_code,
            request.stripe_coupon_id,
            request.expires_in_days,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(ReferralDiscountResponse { discount })),
    ))
}
