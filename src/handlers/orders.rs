use axum::{
    extract::{Path, Query, State},
    response::Response,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    errors::ApiError,
    services::orders::{OrderListResponse, OrderView, PlaceOrderRequest, UpdateOrderStatusRequest},
    AppState,
};

use super::common::{
    caller_id, created_response, no_content_response, success_response, JsonBody,
    PaginationParams,
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct ReferenceQuery {
    pub reference_id: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/orders",
    summary = "Place order",
    description = "Place an order from the given lines, reserving stock for every line atomically",
    request_body = PlaceOrderRequest,
    responses(
        (status = 201, description = "Order placed", body = OrderView,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Address or product item not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Reference id already used", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn place_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    JsonBody(request): JsonBody<PlaceOrderRequest>,
) -> Result<Response, ApiError> {
    let user_id = caller_id(&auth_user)?;

    let order = state.services.orders.place_order(user_id, request).await?;
    Ok(created_response(order))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List my orders",
    responses(
        (status = 200, description = "Orders of the caller, newest first", body = [OrderView]),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn list_my_orders(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Response, ApiError> {
    let user_id = caller_id(&auth_user)?;
    let orders = state.services.orders.list_orders_for_user(user_id).await?;
    Ok(success_response(orders))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/all",
    summary = "List all orders",
    params(PaginationParams),
    responses(
        (status = 200, description = "All orders, newest first", body = OrderListResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn list_all_orders(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> Result<Response, ApiError> {
    let orders = state
        .services
        .orders
        .list_all_orders(params.page, params.per_page)
        .await?;
    Ok(success_response(orders))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/reference",
    summary = "Get order by reference id",
    params(ReferenceQuery),
    responses(
        (status = 200, description = "Order found", body = OrderView),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn get_order_by_reference(
    State(state): State<AppState>,
    Query(query): Query<ReferenceQuery>,
) -> Result<Response, ApiError> {
    if query.reference_id.trim().is_empty() {
        return Err(ApiError::BadRequest("reference_id is required".to_string()));
    }
    let order = state
        .services
        .orders
        .get_order_by_reference(query.reference_id.trim())
        .await?;
    Ok(success_response(order))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get order",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order found", body = OrderView),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let order = state.services.orders.get_order(id).await?;
    Ok(success_response(order))
}

#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/status",
    summary = "Update order status",
    description = "Move an order forward through Pending, Confirmed, Shipped and Delivered, or cancel it before shipping",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = OrderView),
        (status = 400, description = "Transition not allowed", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    JsonBody(request): JsonBody<UpdateOrderStatusRequest>,
) -> Result<Response, ApiError> {
    let order = state
        .services
        .orders
        .update_order_status(id, request.status)
        .await?;
    Ok(success_response(order))
}

#[utoipa::path(
    delete,
    path = "/api/v1/orders/{id}",
    summary = "Delete order",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 204, description = "Order deleted"),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn delete_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    state.services.orders.delete_order(id).await?;
    Ok(no_content_response())
}

