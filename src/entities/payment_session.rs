use super::order::PaymentStatus;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hosted checkout session tied to an order through `reference_id`.
///
/// `session_id` is the provider's opaque id and is replaced on repay;
/// `reference_id` stays stable across attempts.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    #[sea_orm(unique)]
    pub reference_id: String,
    #[sea_orm(unique)]
    pub session_id: String,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total: Decimal,
    pub method: String,
    pub status: PaymentStatus,
    /// Snapshot of the purchased lines, replayed on repay
    #[sea_orm(column_type = "Json")]
    pub line_items: Json,
    #[sea_orm(column_type = "Text", nullable)]
    pub checkout_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
