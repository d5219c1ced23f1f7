//! Shop API Library
//!
//! Inventory-aware order placement, cart management and hosted-checkout
//! payment reconciliation behind an axum HTTP surface.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod health;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;
pub mod webhooks;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer};

use crate::auth::{AuthRouterExt, AuthService, ROLE_ADMIN, ROLE_USER};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: Arc<events::EventSender>,
    pub services: handlers::AppServices,
    pub redis: Arc<redis::Client>,
}

/// Versioned API routes, relative to `/api/v1`.
pub fn api_v1_routes() -> Router<AppState> {
    // Public: catalog lookup and the provider callback (authenticated by signature)
    let public = Router::new()
        .route(
            "/product-items/:id",
            get(handlers::product_items::get_product_item),
        )
        .route(
            "/payments/webhook",
            post(handlers::payment_webhooks::payment_webhook),
        );

    let orders_user = Router::new()
        .route(
            "/orders",
            post(handlers::orders::place_order).get(handlers::orders::list_my_orders),
        )
        .route(
            "/orders/reference",
            get(handlers::orders::get_order_by_reference),
        )
        .route("/orders/:id", get(handlers::orders::get_order))
        .with_role(ROLE_USER);

    let orders_admin = Router::new()
        .route("/orders/all", get(handlers::orders::list_all_orders))
        .route(
            "/orders/:id/status",
            put(handlers::orders::update_order_status),
        )
        .route("/orders/:id", delete(handlers::orders::delete_order))
        .with_role(ROLE_ADMIN);

    let cart = Router::new()
        .route(
            "/cart",
            get(handlers::carts::list_cart).post(handlers::carts::add_to_cart),
        )
        .route(
            "/cart/quantity/:id",
            put(handlers::carts::update_cart_quantity),
        )
        .route("/cart/:id", delete(handlers::carts::remove_cart_item))
        .with_role(ROLE_USER);

    let payments_user = Router::new()
        .route("/payments", post(handlers::payments::create_payment))
        .route("/payments/repay", post(handlers::payments::repay))
        .route("/payments/user", get(handlers::payments::list_my_payments))
        .with_role(ROLE_USER);

    let payments_admin = Router::new()
        .route("/payments", get(handlers::payments::list_payments))
        .with_role(ROLE_ADMIN);

    Router::new()
        .merge(public)
        .merge(orders_user)
        .merge(orders_admin)
        .merge(cart)
        .merge(payments_user)
        .merge(payments_admin)
}

/// Full application router: health, versioned API, Swagger UI and the shared
/// middleware stack. CORS is left to the caller since it depends on the
/// deployment environment.
pub fn app_router(state: AppState, auth_service: Arc<AuthService>) -> Router {
    let request_timeout = state.config.request_timeout();

    Router::<AppState>::new()
        .route("/", get(|| async { "shop-api up" }))
        .nest("/health", health::health_routes())
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
        .layer(crate::tracing::configure_http_tracing())
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(request_timeout))
        // Inject AuthService into request extensions for auth middleware
        .layer(axum::middleware::from_fn_with_state(
            auth_service,
            |axum::extract::State(auth): axum::extract::State<Arc<AuthService>>,
             mut req: axum::extract::Request,
             next: axum::middleware::Next| async move {
                req.extensions_mut().insert(auth);
                next.run(req).await
            },
        ))
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}
