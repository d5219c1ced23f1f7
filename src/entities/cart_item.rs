use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One cart line. Unique per `(user_id, product_item_id)`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cart_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_item_id: Uuid,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product_item::Entity",
        from = "Column::ProductItemId",
        to = "super::product_item::Column::Id"
    )]
    ProductItem,
}

impl Related<super::product_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProductItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
