use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Shop API",
        version = "0.1.0",
        description = r#"
# Shop API

Cart, checkout, order and payment endpoints for the storefront.

## Authentication

Endpoints other than the payment webhook and health checks require a bearer
token:

```
Authorization: Bearer <jwt>
```

Admin-only endpoints are marked in their descriptions.

## Errors

Failures use one JSON shape:

```json
{
  "error": "Unprocessable Entity",
  "message": "Insufficient stock: Product out of stock",
  "status": 422,
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Catalog", description = "Product item lookup"),
        (name = "Cart", description = "Shopping cart"),
        (name = "Orders", description = "Order placement and lifecycle"),
        (name = "Payments", description = "Checkout sessions and provider webhooks")
    ),
    paths(
        // Catalog
        crate::handlers::product_items::get_product_item,

        // Cart
        crate::handlers::carts::list_cart,
        crate::handlers::carts::add_to_cart,
        crate::handlers::carts::update_cart_quantity,
        crate::handlers::carts::remove_cart_item,

        // Orders
        crate::handlers::orders::place_order,
        crate::handlers::orders::list_my_orders,
        crate::handlers::orders::list_all_orders,
        crate::handlers::orders::get_order_by_reference,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::delete_order,

        // Payments
        crate::handlers::payments::create_payment,
        crate::handlers::payments::repay,
        crate::handlers::payments::list_payments,
        crate::handlers::payments::list_my_payments,

        // Webhooks
        crate::handlers::payment_webhooks::payment_webhook,
    ),
    components(
        schemas(
            crate::services::inventory::ProductItemView,
            crate::services::cart::AddCartItemRequest,
            crate::services::cart::UpdateCartQuantityRequest,
            crate::services::cart::CartLineView,
            crate::services::orders::PlaceOrderRequest,
            crate::services::orders::OrderLineRequest,
            crate::services::orders::UpdateOrderStatusRequest,
            crate::services::orders::OrderView,
            crate::services::orders::OrderLineView,
            crate::services::orders::OrderListResponse,
            crate::services::payments::CreatePaymentRequest,
            crate::services::payments::PaymentLineItem,
            crate::services::payments::RepayRequest,
            crate::services::payments::CheckoutUrlResponse,
            crate::services::payments::PaymentSessionView,
            crate::services::payments::PaymentSessionListResponse,
            crate::entities::order::OrderStatus,
            crate::entities::order::PaymentMethod,
            crate::entities::order::PaymentStatus,
            crate::handlers::common::MessageResponse,
            crate::handlers::payment_webhooks::WebhookAck,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_shop_routes_and_bearer_scheme() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Shop API"));
        assert!(json.contains("/api/v1/orders/{id}/status"));
        assert!(json.contains("/api/v1/payments/webhook"));
        assert!(json.contains("\"Bearer\""));
    }
}
