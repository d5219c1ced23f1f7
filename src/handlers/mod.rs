pub mod carts;
pub mod common;
pub mod orders;
pub mod payment_webhooks;
pub mod payments;
pub mod product_items;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    cart::CartService, inventory::InventoryService, orders::OrderService,
    payment_gateway::PaymentGateway, payments::PaymentService,
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub inventory: Arc<InventoryService>,
    pub cart: Arc<CartService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn PaymentGateway>,
        config: &AppConfig,
    ) -> Self {
        Self {
            inventory: Arc::new(InventoryService::new(db_pool.clone())),
            cart: Arc::new(CartService::new(db_pool.clone(), event_sender.clone())),
            orders: Arc::new(OrderService::new(db_pool.clone(), event_sender.clone())),
            payments: Arc::new(PaymentService::new(
                db_pool,
                event_sender,
                gateway,
                config.client_url.clone(),
                config.payment_currency.clone(),
            )),
        }
    }
}
