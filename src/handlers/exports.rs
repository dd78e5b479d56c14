use axum::{
    extract::{Query, State},
    response::Response,
};

use crate::{errors::ServiceError, handlers::orders::OrderListQuery, AppState};

use super::common::csv_response;

#[utoipa::path(
    get,
    path = "/api/v1/admin/orders/export",
    summary = "Export orders as CSV",
    description = "Same filters as the order list; up to 10000 rows",
    params(OrderListQuery),
    responses(
        (status = 200, description = "CSV download", content_type = "text/csv", body = String),
        (status = 400, description = "Unknown status filter", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "exports"
)]
pub async fn export_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> Result<Response, ServiceError> {
    let export = state.services.exports.orders(query.into_filters()?).await?;
    csv_response(export)
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/products/export",
    summary = "Export products as CSV",
    responses((status = 200, description = "CSV download", content_type = "text/csv", body = String)),
    security(("Bearer" = [])),
    tag = "exports"
)]
pub async fn export_products(State(state): State<AppState>) -> Result<Response, ServiceError> {
    csv_response(state.services.exports.products().await?)
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/ingredients/export",
    summary = "Export ingredients as CSV",
    responses((status = 200, description = "CSV download", content_type = "text/csv", body = String)),
    security(("Bearer" = [])),
    tag = "exports"
)]
pub async fn export_ingredients(State(state): State<AppState>) -> Result<Response, ServiceError> {
    csv_response(state.services.exports.ingredients().await?)
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/subscribers/export",
    summary = "Export newsletter subscribers as CSV",
    responses((status = 200, description = "CSV download", content_type = "text/csv", body = String)),
    security(("Bearer" = [])),
    tag = "exports"
)]
pub async fn export_subscribers(State(state): State<AppState>) -> Result<Response, ServiceError> {
    csv_response(state.services.exports.subscribers().await?)
}
