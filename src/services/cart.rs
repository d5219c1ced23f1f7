use crate::{
    db::DbPool,
    entities::cart_item,
    errors::ServiceError,
    events::{Event, EventSender},
    services::inventory::{InventoryService, ProductItemView},
};
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

const EXCEEDS_STOCK: &str = "Quantity exceeds available quantity";

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct AddCartItemRequest {
    pub product_item_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateCartQuantityRequest {
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

/// A cart line with the catalog details of its product item.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartLineView {
    pub id: Uuid,
    pub product_item_id: Uuid,
    pub quantity: i32,
    pub product_item: ProductItemView,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct CartService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Adds `quantity` units of an item to the user's cart, merging with an
    /// existing line for the same item.
    ///
    /// The merge is a single `INSERT .. ON CONFLICT DO UPDATE` against the
    /// `(user_id, product_item_id)` unique index, so concurrent adds never
    /// produce two lines. A merged quantity above stock rolls the upsert back.
    #[instrument(skip(self), fields(%user_id, %product_item_id, quantity))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        product_item_id: Uuid,
        quantity: i32,
    ) -> Result<CartLineView, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let txn = self.db_pool.begin().await?;

        let item = InventoryService::find_item(&txn, product_item_id).await?;
        if item.quantity < 1 || quantity > item.quantity {
            return Err(ServiceError::InsufficientStock(EXCEEDS_STOCK.to_string()));
        }

        let now = Utc::now();
        let line = cart_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            product_item_id: Set(product_item_id),
            quantity: Set(quantity),
            created_at: Set(now),
            updated_at: Set(now),
        };

        cart_item::Entity::insert(line)
            .on_conflict(
                OnConflict::columns([cart_item::Column::UserId, cart_item::Column::ProductItemId])
                    .value(
                        cart_item::Column::Quantity,
                        Expr::col((cart_item::Entity, cart_item::Column::Quantity)).add(quantity),
                    )
                    .value(cart_item::Column::UpdatedAt, Expr::value(now))
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;

        let merged = Self::find_line_for_item(&txn, user_id, product_item_id).await?;
        if merged.quantity > item.quantity {
            warn!(
                merged = merged.quantity,
                stock = item.quantity,
                "cart merge exceeds stock; rolling back"
            );
            return Err(ServiceError::InsufficientStock(EXCEEDS_STOCK.to_string()));
        }

        let view = Self::to_view(&txn, merged).await?;
        txn.commit().await?;

        info!(cart_item_id = %view.id, quantity = view.quantity, "cart line upserted");
        self.event_sender
            .send_or_log(Event::CartUpdated {
                user_id,
                product_item_id,
                quantity: view.quantity,
            })
            .await;

        Ok(view)
    }

    /// Replaces the quantity of one of the user's cart lines.
    #[instrument(skip(self), fields(%user_id, %cart_item_id, quantity))]
    pub async fn update_quantity(
        &self,
        user_id: Uuid,
        cart_item_id: Uuid,
        quantity: i32,
    ) -> Result<CartLineView, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let txn = self.db_pool.begin().await?;

        let line = Self::find_owned_line(&txn, user_id, cart_item_id).await?;
        let item = InventoryService::find_item(&txn, line.product_item_id).await?;
        if quantity > item.quantity {
            return Err(ServiceError::InsufficientStock(EXCEEDS_STOCK.to_string()));
        }

        let product_item_id = line.product_item_id;
        let mut active: cart_item::ActiveModel = line.into();
        active.quantity = Set(quantity);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        let view = Self::to_view(&txn, updated).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartUpdated {
                user_id,
                product_item_id,
                quantity,
            })
            .await;

        Ok(view)
    }

    #[instrument(skip(self), fields(%user_id, %cart_item_id))]
    pub async fn remove_item(&self, user_id: Uuid, cart_item_id: Uuid) -> Result<(), ServiceError> {
        let result = cart_item::Entity::delete_many()
            .filter(cart_item::Column::Id.eq(cart_item_id))
            .filter(cart_item::Column::UserId.eq(user_id))
            .exec(&*self.db_pool)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound("Cart item not found".to_string()));
        }
        Ok(())
    }

    /// The user's cart, most recently touched lines first.
    #[instrument(skip(self), fields(%user_id))]
    pub async fn list_cart(&self, user_id: Uuid) -> Result<Vec<CartLineView>, ServiceError> {
        let db = &*self.db_pool;
        let lines = cart_item::Entity::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .order_by_desc(cart_item::Column::UpdatedAt)
            .all(db)
            .await?;

        let mut views = Vec::with_capacity(lines.len());
        for line in lines {
            views.push(Self::to_view(db, line).await?);
        }
        Ok(views)
    }

    /// Drops the user's cart line for an item that was just ordered.
    pub async fn remove_ordered_item<C: ConnectionTrait>(
        conn: &C,
        user_id: Uuid,
        product_item_id: Uuid,
    ) -> Result<(), ServiceError> {
        cart_item::Entity::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductItemId.eq(product_item_id))
            .exec(conn)
            .await?;
        Ok(())
    }

    async fn find_line_for_item<C: ConnectionTrait>(
        conn: &C,
        user_id: Uuid,
        product_item_id: Uuid,
    ) -> Result<cart_item::Model, ServiceError> {
        cart_item::Entity::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductItemId.eq(product_item_id))
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::InternalError("upserted cart line missing".to_string()))
    }

    async fn find_owned_line<C: ConnectionTrait>(
        conn: &C,
        user_id: Uuid,
        cart_item_id: Uuid,
    ) -> Result<cart_item::Model, ServiceError> {
        cart_item::Entity::find_by_id(cart_item_id)
            .filter(cart_item::Column::UserId.eq(user_id))
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart item not found".to_string()))
    }

    async fn to_view<C: ConnectionTrait>(
        conn: &C,
        line: cart_item::Model,
    ) -> Result<CartLineView, ServiceError> {
        let item = InventoryService::find_item(conn, line.product_item_id).await?;
        let product_item = InventoryService::describe(conn, &item).await?;
        Ok(CartLineView {
            id: line.id,
            product_item_id: line.product_item_id,
            quantity: line.quantity,
            product_item,
            updated_at: line.updated_at,
        })
    }
}
