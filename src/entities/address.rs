use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Shipping address. Owned by the address book; read-only here.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "addresses")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    /// Code-prefixed, e.g. `"01-Hanoi"`
    pub province: String,
    /// Code-prefixed, e.g. `"001-Ba Dinh"`
    pub district: String,
    pub ward: String,
    pub specify: String,
    pub full_name: String,
    pub phone_number: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Text after the first `-` of a code-prefixed value, or the whole value.
fn display_part(value: &str) -> &str {
    value
        .split_once('-')
        .map(|(_, name)| name)
        .unwrap_or(value)
        .trim()
}

impl Model {
    /// Renders the address the way it is frozen onto an order.
    pub fn snapshot_line(&self) -> String {
        format!(
            "{}, {}, {}",
            display_part(&self.province),
            display_part(&self.district),
            self.ward.trim()
        )
    }
}
