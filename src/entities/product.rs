use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog product. Stock lives on its [`super::product_item`] rows.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub avatar: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub price: Decimal,
    pub product_color_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::product_item::Entity")]
    ProductItem,
    #[sea_orm(
        belongs_to = "super::product_color::Entity",
        from = "Column::ProductColorId",
        to = "super::product_color::Column::Id"
    )]
    ProductColor,
}

impl Related<super::product_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProductItem.def()
    }
}

impl Related<super::product_color::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProductColor.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
