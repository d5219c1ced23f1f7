use axum::{
    extract::{Path, State},
    response::Response,
};
use uuid::Uuid;

use crate::{errors::ApiError, services::inventory::ProductItemView, AppState};

use super::common::success_response;

#[utoipa::path(
    get,
    path = "/api/v1/product-items/{id}",
    summary = "Get product item",
    description = "A product item with its catalog details and current stock",
    params(("id" = Uuid, Path, description = "Product item id")),
    responses(
        (status = 200, description = "Product item found", body = ProductItemView),
        (status = 404, description = "Product item not found", body = crate::errors::ErrorResponse),
    ),
    tag = "Catalog"
)]
pub async fn get_product_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let item = state.services.inventory.get_product_item(id).await?;
    Ok(success_response(item))
}
