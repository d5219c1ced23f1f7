use crate::{
    db::DbPool,
    entities::{product, product_color, product_item, product_size},
    errors::ServiceError,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

/// Product item joined with the catalog fields clients display.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductItemView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub avatar: Option<String>,
    pub color: Option<String>,
    pub size: Option<String>,
    /// Units currently in stock
    pub quantity: i32,
}

/// Stock reads and the guarded decrement used by order placement.
#[derive(Clone)]
pub struct InventoryService {
    db_pool: Arc<DbPool>,
}

impl InventoryService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Subtracts `quantity` from the item's stock only if at least `quantity`
    /// units remain, as one conditional `UPDATE`.
    ///
    /// Returns `InsufficientStock` when the guard matched no row, in which case
    /// the stock is untouched, or `NotFound` when the item does not exist. Callers that need all-or-nothing behavior across
    /// several items pass a transaction as `conn`.
    pub async fn decrement_if_sufficient<C: ConnectionTrait>(
        conn: &C,
        product_item_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let result = product_item::Entity::update_many()
            .col_expr(
                product_item::Column::Quantity,
                Expr::col(product_item::Column::Quantity).sub(quantity),
            )
            .col_expr(product_item::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product_item::Column::Id.eq(product_item_id))
            .filter(product_item::Column::Quantity.gte(quantity))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            Self::find_item(conn, product_item_id).await?;
            debug!(%product_item_id, quantity, "stock guard rejected decrement");
            metrics::counter!("shop_inventory_rejections_total", 1);
            return Err(ServiceError::InsufficientStock(
                "Product out of stock".to_string(),
            ));
        }

        Ok(())
    }

    /// Loads a product item or fails with `NotFound`.
    pub async fn find_item<C: ConnectionTrait>(
        conn: &C,
        product_item_id: Uuid,
    ) -> Result<product_item::Model, ServiceError> {
        product_item::Entity::find_by_id(product_item_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product item not found".to_string()))
    }

    /// Resolves the catalog fields of an item: product, color and size.
    pub async fn describe<C: ConnectionTrait>(
        conn: &C,
        item: &product_item::Model,
    ) -> Result<ProductItemView, ServiceError> {
        let product = product::Entity::find_by_id(item.product_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))?;

        let color = match product.product_color_id {
            Some(id) => product_color::Entity::find_by_id(id)
                .one(conn)
                .await?
                .map(|c| c.value),
            None => None,
        };
        let size = match item.product_size_id {
            Some(id) => product_size::Entity::find_by_id(id)
                .one(conn)
                .await?
                .map(|s| s.value),
            None => None,
        };

        Ok(ProductItemView {
            id: item.id,
            product_id: product.id,
            name: product.name,
            price: product.price,
            avatar: product.avatar,
            color,
            size,
            quantity: item.quantity,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_product_item(
        &self,
        product_item_id: Uuid,
    ) -> Result<ProductItemView, ServiceError> {
        let db = &*self.db_pool;
        let item = Self::find_item(db, product_item_id).await?;
        Self::describe(db, &item).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{establish_connection_with_config, run_migrations, DbConfig};
    use sea_orm::{ActiveModelTrait, Set};

    async fn setup(stock: i32) -> (DbPool, Uuid) {
        let db = establish_connection_with_config(&DbConfig {
            url: "sqlite::memory:".into(),
            max_connections: 1,
            ..Default::default()
        })
        .await
        .unwrap();
        run_migrations(&db).await.unwrap();

        let now = Utc::now();
        let product = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set("Linen Shirt".into()),
            description: Set(None),
            avatar: Set(None),
            price: Set(Decimal::new(2500, 2)),
            product_color_id: Set(None),
            created_at: Set(now),
        }
        .insert(&db)
        .await
        .unwrap();
        let item = product_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product.id),
            product_size_id: Set(None),
            quantity: Set(stock),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&db)
        .await
        .unwrap();
        (db, item.id)
    }

    #[tokio::test]
    async fn decrements_when_stock_suffices() {
        let (db, item_id) = setup(5).await;

        InventoryService::decrement_if_sufficient(&db, item_id, 3)
            .await
            .unwrap();

        let item = InventoryService::find_item(&db, item_id).await.unwrap();
        assert_eq!(item.quantity, 2);
    }

    #[tokio::test]
    async fn rejects_without_touching_stock() {
        let (db, item_id) = setup(2).await;

        let err = InventoryService::decrement_if_sufficient(&db, item_id, 3)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientStock(_)));

        let item = InventoryService::find_item(&db, item_id).await.unwrap();
        assert_eq!(item.quantity, 2);
    }

    #[tokio::test]
    async fn exact_stock_drains_to_zero() {
        let (db, item_id) = setup(4).await;

        InventoryService::decrement_if_sufficient(&db, item_id, 4)
            .await
            .unwrap();
        let again = InventoryService::decrement_if_sufficient(&db, item_id, 1).await;
        assert!(matches!(again, Err(ServiceError::InsufficientStock(_))));

        let item = InventoryService::find_item(&db, item_id).await.unwrap();
        assert_eq!(item.quantity, 0);
    }

    #[tokio::test]
    async fn unknown_item_is_not_found() {
        let (db, item_id) = setup(1).await;

        let err = InventoryService::decrement_if_sufficient(&db, Uuid::new_v4(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let item = InventoryService::find_item(&db, item_id).await.unwrap();
        assert_eq!(item.quantity, 1);
    }
}
