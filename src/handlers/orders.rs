use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    handlers::common::JsonBody,
    entities::order::Model as OrderModel,
    errors::ServiceError,
    gateway::RefundReceipt,
    models::{OrderStatus, PaymentStatus},
    services::orders::OrderFilters,
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderListQuery {
    /// Order status, e.g. `shipped`
    pub status: Option<String>,
    /// Payment status, e.g. `partial_refund`
    pub payment: Option<String>,
    /// Matches customer email or payment session id
    pub search: Option<String>,
    /// Default 50, at most 10000
    pub limit: Option<u64>,
}

impl OrderListQuery {
    pub fn into_filters(self) -> Result<OrderFilters, ServiceError> {
        let status = match non_empty(self.status) {
            Some(s) => Some(s.parse::<OrderStatus>()?),
            None => None,
        };
        let payment_status = match non_empty(self.payment) {
            Some(s) => Some(s.parse::<PaymentStatus>()?),
            None => None,
        };
        Ok(OrderFilters {
            status,
            payment_status,
            search: non_empty(self.search),
            limit: self.limit,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusUpdated {
    pub status: OrderStatus,
    pub order: OrderModel,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RefundRequest {
    /// Minor units; omit for a full refund
    pub amount: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefundResponse {
    pub message: String,
    pub refund: RefundReceipt,
    pub order: OrderModel,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkStatusRequest {
    pub ids: Vec<Uuid>,
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BulkStatusResponse {
    pub updated: u64,
    pub notifications_queued: usize,
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/orders",
    summary = "List orders",
    description = "Newest orders first, optionally filtered by status, payment status and search text",
    params(OrderListQuery),
    responses(
        (status = 200, description = "Orders", body = ApiResponse<Vec<OrderModel>>),
        (status = 400, description = "Unknown status filter", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> ApiResult<Vec<OrderModel>> {
    let filters = query.into_filters()?;
    let orders = state.services.orders.list_orders(&filters).await?;
    Ok(Json(ApiResponse::success(orders)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/admin/orders/{id}/status",
    summary = "Update order status",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<StatusUpdated>),
        (status = 400, description = "Invalid status", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    JsonBody(request): JsonBody<UpdateStatusRequest>,
) -> ApiResult<StatusUpdated> {
    let order = state
        .services
        .orders
        .update_status(id, &request.status)
        .await?;
    Ok(Json(ApiResponse::success(StatusUpdated {
        status: order.status,
        order,
    })))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/orders/{id}/refund",
    summary = "Refund an order",
    description = "Refunds the given amount in minor units, or the whole remaining amount when omitted",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = RefundRequest,
    responses(
        (status = 200, description = "Refund issued", body = ApiResponse<RefundResponse>),
        (status = 400, description = "Invalid amount or order not refundable", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment gateway rejected the refund", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn refund_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    JsonBody(request): JsonBody<RefundRequest>,
) -> ApiResult<RefundResponse> {
    let outcome = state.services.orders.refund(id, request.amount).await?;

    let message = if outcome.full {
        "Full refund processed".to_string()
    } else {
        format!("Partial refund of {} processed", outcome.amount)
    };

    Ok(Json(ApiResponse::success(RefundResponse {
        message,
        refund: outcome.refund,
        order: outcome.order,
    })))
}

#[utoipa::path(
    patch,
    path = "/api/v1/admin/orders/bulk",
    summary = "Bulk update order status",
    description = "Sets one status on up to 100 orders. Shipping emails are queued for orders newly marked shipped.",
    request_body = BulkStatusRequest,
    responses(
        (status = 200, description = "Orders updated", body = ApiResponse<BulkStatusResponse>),
        (status = 400, description = "Invalid status or more than 100 ids", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn bulk_update_orders(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<BulkStatusRequest>,
) -> ApiResult<BulkStatusResponse> {
    let outcome = state
        .services
        .orders
        .bulk_update_status(&request.ids, &request.status)
        .await?;

    // delivery handles are dropped; the worker reports failures in the log
    Ok(Json(ApiResponse::success(BulkStatusResponse {
        updated: outcome.updated,
        notifications_queued: outcome.notifications.len(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_filters_reject_unknown_status() {
        let query = OrderListQuery {
            status: Some("lost".into()),
            ..Default::default()
        };
        assert!(matches!(
            query.into_filters(),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn blank_filters_are_ignored() {
        let filters = OrderListQuery {
            status: Some(" ".into()),
            payment: Some("succeeded".into()),
            search: Some("".into()),
            limit: None,
        }
        .into_filters()
        .unwrap();

        assert_eq!(filters.status, None);
        assert_eq!(filters.payment_status, Some(PaymentStatus::Paid));
        assert_eq!(filters.search, None);
    }
}
