use axum::{
    extract::{Path, State},
    response::Response,
};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    errors::ApiError,
    services::cart::{AddCartItemRequest, CartLineView, UpdateCartQuantityRequest},
    AppState,
};

use super::common::{
    caller_id, created_response, success_response, JsonBody, MessageResponse,
};

#[utoipa::path(
    get,
    path = "/api/v1/cart",
    summary = "List cart",
    responses(
        (status = 200, description = "Cart lines of the caller", body = [CartLineView]),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn list_cart(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Response, ApiError> {
    let user_id = caller_id(&auth_user)?;
    let lines = state.services.cart.list_cart(user_id).await?;
    Ok(success_response(lines))
}

#[utoipa::path(
    post,
    path = "/api/v1/cart",
    summary = "Add to cart",
    description = "Add units of a product item, merging with an existing line for the same item",
    request_body = AddCartItemRequest,
    responses(
        (status = 201, description = "Cart line created or merged", body = CartLineView),
        (status = 400, description = "Invalid quantity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product item not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Quantity exceeds available stock", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    auth_user: AuthUser,
    JsonBody(request): JsonBody<AddCartItemRequest>,
) -> Result<Response, ApiError> {
    let user_id = caller_id(&auth_user)?;

    let line = state
        .services
        .cart
        .add_item(user_id, request.product_item_id, request.quantity)
        .await?;
    Ok(created_response(line))
}

#[utoipa::path(
    put,
    path = "/api/v1/cart/quantity/{id}",
    summary = "Change cart line quantity",
    params(("id" = Uuid, Path, description = "Cart line id")),
    request_body = UpdateCartQuantityRequest,
    responses(
        (status = 200, description = "Quantity updated", body = CartLineView),
        (status = 400, description = "Invalid quantity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Cart line not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Quantity exceeds available stock", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn update_cart_quantity(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    JsonBody(request): JsonBody<UpdateCartQuantityRequest>,
) -> Result<Response, ApiError> {
    let user_id = caller_id(&auth_user)?;

    let line = state
        .services
        .cart
        .update_quantity(user_id, id, request.quantity)
        .await?;
    Ok(success_response(line))
}

#[utoipa::path(
    delete,
    path = "/api/v1/cart/{id}",
    summary = "Remove cart line",
    params(("id" = Uuid, Path, description = "Cart line id")),
    responses(
        (status = 200, description = "Cart line removed", body = MessageResponse),
        (status = 404, description = "Cart line not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn remove_cart_item(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let user_id = caller_id(&auth_user)?;
    state.services.cart.remove_item(user_id, id).await?;
    Ok(success_response(MessageResponse::new("Cart item deleted")))
}
