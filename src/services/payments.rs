use crate::{
    db::{is_unique_violation, DbPool},
    entities::{
        order::{self, PaymentStatus},
        payment_session,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::payment_gateway::{
        to_minor_units, CheckoutLineItem, CheckoutSessionRequest, PaymentGateway,
    },
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveEnum, ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

const PAYMENT_METHOD: &str = "stripe";

/// Snapshot of one purchased line, as shown on the checkout page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct PaymentLineItem {
    #[validate(length(min = 1, message = "Line name is required"))]
    pub name: String,
    #[validate(custom = "validate_amount")]
    pub price: Decimal,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    pub avatar: Option<String>,
    pub color: Option<String>,
    pub size: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreatePaymentRequest {
    #[validate(length(min = 1, message = "Reference id is required"))]
    pub reference_id: String,
    #[validate(length(min = 1, message = "At least one line item is required"))]
    pub line_items: Vec<PaymentLineItem>,
    #[validate(custom = "validate_amount")]
    pub total: Decimal,
}

fn validate_amount(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        let mut err = ValidationError::new("negative");
        err.message = Some("Amount must not be negative".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RepayRequest {
    pub reference_id: String,
}

/// Where to send the shopper to pay.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckoutUrlResponse {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentSessionView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub reference_id: String,
    pub session_id: String,
    pub total: Decimal,
    pub method: String,
    pub status: PaymentStatus,
    pub checkout_url: Option<String>,
    #[schema(value_type = Vec<PaymentLineItem>)]
    pub line_items: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<payment_session::Model> for PaymentSessionView {
    fn from(m: payment_session::Model) -> Self {
        Self {
            id: m.id,
            user_id: m.user_id,
            reference_id: m.reference_id,
            session_id: m.session_id,
            total: m.total,
            method: m.method,
            status: m.status,
            checkout_url: m.checkout_url,
            line_items: m.line_items,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaymentSessionListResponse {
    pub sessions: Vec<PaymentSessionView>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Result of applying a completed-checkout notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The session and its order moved from pending to paid
    Applied,
    /// Both were already paid; nothing changed
    AlreadyPaid,
}

#[derive(Clone)]
pub struct PaymentService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    gateway: Arc<dyn PaymentGateway>,
    client_url: String,
    currency: String,
}

impl PaymentService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn PaymentGateway>,
        client_url: impl Into<String>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            gateway,
            client_url: client_url.into().trim_end_matches('/').to_string(),
            currency: currency.into(),
        }
    }

    fn checkout_request(
        &self,
        reference_id: &str,
        lines: &[PaymentLineItem],
    ) -> Result<CheckoutSessionRequest, ServiceError> {
        let line_items = lines
            .iter()
            .map(|line| {
                let description = match (&line.color, &line.size) {
                    (Some(color), Some(size)) => Some(format!("{} / {}", color, size)),
                    (Some(one), None) | (None, Some(one)) => Some(one.clone()),
                    (None, None) => None,
                };
                Ok(CheckoutLineItem {
                    name: line.name.clone(),
                    unit_amount: to_minor_units(line.price)?,
                    quantity: line.quantity,
                    image: line.avatar.clone(),
                    description,
                })
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;

        Ok(CheckoutSessionRequest {
            reference_id: reference_id.to_string(),
            currency: self.currency.clone(),
            success_url: format!("{}/success?referenceId={}", self.client_url, reference_id),
            cancel_url: format!("{}/cancel?referenceId={}", self.client_url, reference_id),
            line_items,
        })
    }

    /// Opens a hosted checkout session for `reference_id` and records it as
    /// pending. One session exists per reference id; later attempts go
    /// through [`PaymentService::repay`].
    #[instrument(skip(self, request), fields(%user_id, reference_id = %request.reference_id))]
    pub async fn create_session(
        &self,
        user_id: Uuid,
        request: CreatePaymentRequest,
    ) -> Result<CheckoutUrlResponse, ServiceError> {
        request.validate()?;
        for line in &request.line_items {
            line.validate()?;
        }

        let db = &*self.db_pool;
        let existing = payment_session::Entity::find()
            .filter(payment_session::Column::ReferenceId.eq(request.reference_id.as_str()))
            .one(db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(
                "A payment session already exists for this reference id".to_string(),
            ));
        }

        let checkout = self.checkout_request(&request.reference_id, &request.line_items)?;
        let session = self.gateway.create_checkout_session(&checkout).await?;

        let line_items = serde_json::to_value(&request.line_items)
            .map_err(|e| ServiceError::InternalError(format!("line snapshot: {}", e)))?;
        let now = Utc::now();
        payment_session::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            reference_id: Set(request.reference_id.clone()),
            session_id: Set(session.id.clone()),
            total: Set(request.total),
            method: Set(PAYMENT_METHOD.to_string()),
            status: Set(PaymentStatus::Pending),
            line_items: Set(line_items),
            checkout_url: Set(session.url.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::Conflict(
                    "A payment session already exists for this reference id".to_string(),
                )
            } else {
                ServiceError::DatabaseError(e)
            }
        })?;

        info!(session_id = %session.id, "payment session created");
        self.event_sender
            .send_or_log(Event::PaymentSessionCreated {
                reference_id: request.reference_id,
                session_id: session.id,
            })
            .await;

        Ok(CheckoutUrlResponse { url: session.url })
    }

    /// Marks the session identified by the provider's `session_id`, and the
    /// order sharing its reference id, as paid.
    ///
    /// Both updates are conditional on the row still being pending and run in
    /// one transaction, so replayed notifications change nothing.
    #[instrument(skip(self))]
    pub async fn reconcile_completed(
        &self,
        session_id: &str,
    ) -> Result<ReconcileOutcome, ServiceError> {
        let txn = self.db_pool.begin().await?;

        let session = payment_session::Entity::find()
            .filter(payment_session::Column::SessionId.eq(session_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Payment session not found".to_string()))?;

        let order = order::Entity::find()
            .filter(order::Column::ReferenceId.eq(session.reference_id.as_str()))
            .one(&txn)
            .await?
            .ok_or_else(|| {
                warn!(reference_id = %session.reference_id, "no order for paid session");
                ServiceError::NotFound("Order not found".to_string())
            })?;

        let now = Utc::now();
        let session_update = payment_session::Entity::update_many()
            .col_expr(
                payment_session::Column::Status,
                Expr::value(PaymentStatus::Paid.into_value()),
            )
            .col_expr(payment_session::Column::UpdatedAt, Expr::value(now))
            .filter(payment_session::Column::Id.eq(session.id))
            .filter(payment_session::Column::Status.eq(PaymentStatus::Pending.into_value()))
            .exec(&txn)
            .await?;

        order::Entity::update_many()
            .col_expr(
                order::Column::StatusPay,
                Expr::value(PaymentStatus::Paid.into_value()),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(now))
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::StatusPay.eq(PaymentStatus::Pending.into_value()))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        if session_update.rows_affected == 0 {
            info!(reference_id = %session.reference_id, "payment already reconciled");
            return Ok(ReconcileOutcome::AlreadyPaid);
        }

        info!(reference_id = %session.reference_id, order_id = %order.id, "payment completed");
        metrics::counter!("shop_payments_completed_total", 1);
        self.event_sender
            .send_or_log(Event::PaymentCompleted {
                reference_id: session.reference_id,
                session_id: session_id.to_string(),
            })
            .await;

        Ok(ReconcileOutcome::Applied)
    }

    /// Opens a fresh checkout session for an unpaid reference id, replacing
    /// the stored session id and url.
    #[instrument(skip(self), fields(%user_id))]
    pub async fn repay(
        &self,
        user_id: Uuid,
        reference_id: &str,
    ) -> Result<CheckoutUrlResponse, ServiceError> {
        let reference_id = reference_id.trim();
        if reference_id.is_empty() {
            return Err(ServiceError::ValidationError(
                "Reference id is required".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let session = payment_session::Entity::find()
            .filter(payment_session::Column::ReferenceId.eq(reference_id))
            .filter(payment_session::Column::UserId.eq(user_id))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Payment session not found".to_string()))?;

        if session.status == PaymentStatus::Paid {
            return Err(ServiceError::InvalidOperation(
                "Payment has already been completed".to_string(),
            ));
        }

        let lines: Vec<PaymentLineItem> = serde_json::from_value(session.line_items.clone())
            .map_err(|e| ServiceError::InternalError(format!("stored line snapshot: {}", e)))?;
        let checkout = self.checkout_request(reference_id, &lines)?;
        let fresh = self.gateway.create_checkout_session(&checkout).await?;

        let updated = payment_session::Entity::update_many()
            .col_expr(
                payment_session::Column::SessionId,
                Expr::value(fresh.id.clone()),
            )
            .col_expr(
                payment_session::Column::CheckoutUrl,
                Expr::value(fresh.url.clone()),
            )
            .col_expr(
                payment_session::Column::Status,
                Expr::value(PaymentStatus::Pending.into_value()),
            )
            .col_expr(payment_session::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(payment_session::Column::Id.eq(session.id))
            .filter(payment_session::Column::Status.eq(PaymentStatus::Pending.into_value()))
            .exec(db)
            .await?;

        if updated.rows_affected == 0 {
            return Err(ServiceError::InvalidOperation(
                "Payment has already been completed".to_string(),
            ));
        }

        info!(old_session = %session.session_id, new_session = %fresh.id, "payment session replaced");
        self.event_sender
            .send_or_log(Event::PaymentSessionCreated {
                reference_id: reference_id.to_string(),
                session_id: fresh.id,
            })
            .await;

        Ok(CheckoutUrlResponse { url: fresh.url })
    }

    #[instrument(skip(self))]
    pub async fn list_all(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<PaymentSessionListResponse, ServiceError> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);

        let paginator = payment_session::Entity::find()
            .order_by_desc(payment_session::Column::CreatedAt)
            .paginate(&*self.db_pool, per_page);
        let total = paginator.num_items().await?;
        let sessions = paginator.fetch_page(page - 1).await?;

        Ok(PaymentSessionListResponse {
            sessions: sessions.into_iter().map(Into::into).collect(),
            total,
            page,
            per_page,
        })
    }

    #[instrument(skip(self), fields(%user_id))]
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<PaymentSessionView>, ServiceError> {
        let sessions = payment_session::Entity::find()
            .filter(payment_session::Column::UserId.eq(user_id))
            .order_by_desc(payment_session::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?;
        Ok(sessions.into_iter().map(Into::into).collect())
    }
}
