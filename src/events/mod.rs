//! In-process domain events.
//!
//! Services publish through [`EventSender`] after their transaction commits;
//! [`process_events`] drains the channel on a background task.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::order::OrderStatus;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is closed.
    ///
    /// Used after a commit: the state change already happened and must not be
    /// reported to the caller as a failure.
    pub async fn send_or_log(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.send(event).await {
            warn!(event = name, error = %e, "dropping domain event");
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Event {
    OrderPlaced {
        order_id: Uuid,
        user_id: Uuid,
        total: Decimal,
        lines: usize,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    OrderDeleted(Uuid),
    CartUpdated {
        user_id: Uuid,
        product_item_id: Uuid,
        quantity: i32,
    },
    PaymentSessionCreated {
        reference_id: String,
        session_id: String,
    },
    PaymentCompleted {
        reference_id: String,
        session_id: String,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::OrderPlaced { .. } => "order_placed",
            Event::OrderStatusChanged { .. } => "order_status_changed",
            Event::OrderDeleted(_) => "order_deleted",
            Event::CartUpdated { .. } => "cart_updated",
            Event::PaymentSessionCreated { .. } => "payment_session_created",
            Event::PaymentCompleted { .. } => "payment_completed",
        }
    }
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        metrics::counter!("shop_events_total", 1, "event" => event.name());

        match &event {
            Event::OrderPlaced {
                order_id,
                user_id,
                total,
                lines,
            } => {
                info!(%order_id, %user_id, %total, lines, "order placed");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "order status changed");
            }
            Event::OrderDeleted(order_id) => {
                info!(%order_id, "order deleted");
            }
            Event::CartUpdated {
                user_id,
                product_item_id,
                quantity,
            } => {
                info!(%user_id, %product_item_id, quantity, "cart updated");
            }
            Event::PaymentSessionCreated {
                reference_id,
                session_id,
            } => {
                info!(%reference_id, %session_id, "payment session created");
            }
            Event::PaymentCompleted {
                reference_id,
                session_id,
            } => {
                info!(%reference_id, %session_id, "payment completed");
            }
        }
    }

    info!("Event channel closed; stopping event processing loop");
}
