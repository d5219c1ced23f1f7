use crate::{
    db::{is_unique_violation, DbPool},
    entities::{
        address,
        order::{self, OrderStatus, PaymentMethod, PaymentStatus},
        order_line, product,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        cart::CartService,
        inventory::{InventoryService, ProductItemView},
    },
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// One requested line of a new order.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct OrderLineRequest {
    pub product_item_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct PlaceOrderRequest {
    pub address_id: Uuid,
    #[validate(custom = "validate_non_negative")]
    pub shipping_fee: Decimal,
    pub method: PaymentMethod,
    /// Required for online payment; links the order to its payment session
    pub reference_id: Option<String>,
    #[validate(length(min = 1, message = "Order must contain at least one line"))]
    pub lines: Vec<OrderLineRequest>,
}

fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        let mut err = ValidationError::new("negative");
        err.message = Some("Shipping fee must not be negative".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderLineView {
    pub id: Uuid,
    pub product_item_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub product_item: ProductItemView,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub address: String,
    pub full_name: String,
    pub phone_number: String,
    pub specify: String,
    pub total: Decimal,
    pub shipping_fee: Decimal,
    pub method: PaymentMethod,
    pub status: OrderStatus,
    pub status_pay: Option<PaymentStatus>,
    pub reference_id: Option<String>,
    pub lines: Vec<OrderLineView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderView>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// A resolved line, ready to insert once the order row exists.
struct PricedLine {
    product_item_id: Uuid,
    quantity: i32,
    unit_price: Decimal,
}

/// Order placement and the order lifecycle.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Places an order for `user_id`.
    ///
    /// Runs as one transaction: every line's stock is decremented through the
    /// conditional update, the user's cart lines for ordered items are removed
    /// and the order with its lines is inserted. The first failing line aborts
    /// the whole placement and nothing it touched is kept.
    #[instrument(skip(self, request), fields(%user_id, lines = request.lines.len(), method = %request.method))]
    pub async fn place_order(
        &self,
        user_id: Uuid,
        request: PlaceOrderRequest,
    ) -> Result<OrderView, ServiceError> {
        request.validate()?;
        for line in &request.lines {
            line.validate()?;
        }
        let reference_id = match (request.method, request.reference_id.as_deref().map(str::trim)) {
            (PaymentMethod::Online, Some(reference)) if !reference.is_empty() => {
                Some(reference.to_string())
            }
            (PaymentMethod::Online, _) => {
                return Err(ServiceError::ValidationError(
                    "Online orders require a reference id".to_string(),
                ))
            }
            (PaymentMethod::Cash, _) => None,
        };

        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order placement");
            ServiceError::DatabaseError(e)
        })?;

        let address = address::Entity::find_by_id(request.address_id)
            .filter(address::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Address not found".to_string()))?;

        let mut priced = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            let item = InventoryService::find_item(&txn, line.product_item_id).await?;
            let product = product::Entity::find_by_id(item.product_id)
                .one(&txn)
                .await?
                .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))?;

            InventoryService::decrement_if_sufficient(&txn, item.id, line.quantity).await?;
            CartService::remove_ordered_item(&txn, user_id, item.id).await?;

            priced.push(PricedLine {
                product_item_id: item.id,
                quantity: line.quantity,
                unit_price: product.price,
            });
        }

        let total = order_total(&priced, request.shipping_fee);
        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let online = request.method == PaymentMethod::Online;

        let order = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(user_id),
            address: Set(address.snapshot_line()),
            full_name: Set(address.full_name.clone()),
            phone_number: Set(address.phone_number.clone()),
            specify: Set(address.specify.clone()),
            total: Set(total),
            shipping_fee: Set(request.shipping_fee),
            method: Set(request.method),
            status: Set(OrderStatus::Pending),
            status_pay: Set(online.then_some(PaymentStatus::Pending)),
            reference_id: Set(reference_id),
            created_at: Set(now),
            updated_at: Set(now),
        };
        order.insert(&txn).await.map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::Conflict("An order with this reference id already exists".to_string())
            } else {
                ServiceError::DatabaseError(e)
            }
        })?;

        for line in &priced {
            order_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_item_id: Set(line.product_item_id),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, %order_id, "Failed to commit order placement");
            ServiceError::DatabaseError(e)
        })?;

        info!(%order_id, %total, "order placed");
        metrics::counter!("shop_orders_placed_total", 1, "method" => request.method.to_string());
        self.event_sender
            .send_or_log(Event::OrderPlaced {
                order_id,
                user_id,
                total,
                lines: priced.len(),
            })
            .await;

        self.get_order(order_id).await
    }

    #[instrument(skip(self), fields(%order_id))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderView, ServiceError> {
        let db = &*self.db_pool;
        let order = order::Entity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;
        Self::to_view(db, order).await
    }

    #[instrument(skip(self))]
    pub async fn get_order_by_reference(&self, reference_id: &str) -> Result<OrderView, ServiceError> {
        let db = &*self.db_pool;
        let order = order::Entity::find()
            .filter(order::Column::ReferenceId.eq(reference_id))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;
        Self::to_view(db, order).await
    }

    /// The user's orders, newest first.
    #[instrument(skip(self), fields(%user_id))]
    pub async fn list_orders_for_user(&self, user_id: Uuid) -> Result<Vec<OrderView>, ServiceError> {
        let db = &*self.db_pool;
        let orders = order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(db)
            .await?;

        let mut views = Vec::with_capacity(orders.len());
        for order in orders {
            views.push(Self::to_view(db, order).await?);
        }
        Ok(views)
    }

    /// All orders, newest first. `page` is 1-based.
    #[instrument(skip(self))]
    pub async fn list_all_orders(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let db = &*self.db_pool;
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);

        let paginator = order::Entity::find()
            .order_by_desc(order::Column::CreatedAt)
            .paginate(db, per_page);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;

        let mut views = Vec::with_capacity(orders.len());
        for order in orders {
            views.push(Self::to_view(db, order).await?);
        }

        Ok(OrderListResponse {
            orders: views,
            total,
            page,
            per_page,
        })
    }

    /// Moves an order forward through its lifecycle. Repeating the current
    /// status is accepted and changes nothing.
    #[instrument(skip(self), fields(%order_id, new_status = %new_status))]
    pub async fn update_order_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<OrderView, ServiceError> {
        let txn = self.db_pool.begin().await?;

        let order = order::Entity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        let old_status = order.status;
        if old_status == new_status {
            txn.commit().await?;
            return self.get_order(order_id).await;
        }
        if !old_status.can_transition_to(new_status) {
            warn!(%old_status, "rejected order status transition");
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot change order status from {} to {}",
                old_status, new_status
            )));
        }

        let mut active: order::ActiveModel = order.into();
        active.status = Set(new_status);
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;
        txn.commit().await?;

        info!(%old_status, "order status updated");
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            })
            .await;

        self.get_order(order_id).await
    }

    #[instrument(skip(self), fields(%order_id))]
    pub async fn delete_order(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db_pool.begin().await?;

        order_line::Entity::delete_many()
            .filter(order_line::Column::OrderId.eq(order_id))
            .exec(&txn)
            .await?;
        let result = order::Entity::delete_by_id(order_id).exec(&txn).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound("Order not found".to_string()));
        }
        txn.commit().await?;

        info!("order deleted");
        self.event_sender
            .send_or_log(Event::OrderDeleted(order_id))
            .await;
        Ok(())
    }

    async fn to_view<C: ConnectionTrait>(
        conn: &C,
        order: order::Model,
    ) -> Result<OrderView, ServiceError> {
        let lines = order_line::Entity::find()
            .filter(order_line::Column::OrderId.eq(order.id))
            .order_by_asc(order_line::Column::CreatedAt)
            .all(conn)
            .await?;

        let mut line_views = Vec::with_capacity(lines.len());
        for line in lines {
            let item = InventoryService::find_item(conn, line.product_item_id).await?;
            line_views.push(OrderLineView {
                id: line.id,
                product_item_id: line.product_item_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                product_item: InventoryService::describe(conn, &item).await?,
            });
        }

        Ok(OrderView {
            id: order.id,
            user_id: order.user_id,
            address: order.address,
            full_name: order.full_name,
            phone_number: order.phone_number,
            specify: order.specify,
            total: order.total,
            shipping_fee: order.shipping_fee,
            method: order.method,
            status: order.status,
            status_pay: order.status_pay,
            reference_id: order.reference_id,
            lines: line_views,
            created_at: order.created_at,
            updated_at: order.updated_at,
        })
    }
}

fn order_total(lines: &[PricedLine], shipping_fee: Decimal) -> Decimal {
    lines
        .iter()
        .map(|l| l.unit_price * Decimal::from(l.quantity))
        .sum::<Decimal>()
        + shipping_fee
}
