use axum::{extract::State, http::HeaderMap, response::Response};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::{
    errors::{ApiError, ServiceError},
    services::payments::ReconcileOutcome,
    webhooks::verify_signature,
    AppState,
};

use super::common::success_response;

const CHECKOUT_COMPLETED: &str = "checkout.session.completed";
const DEDUPE_TTL_SECS: u64 = 24 * 3600;

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    id: Option<String>,
    #[serde(rename = "type")]
    event_type: String,
    data: Option<WebhookData>,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    object: WebhookObject,
}

#[derive(Debug, Deserialize)]
struct WebhookObject {
    id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
}

fn ack(outcome: Option<&str>) -> Response {
    success_response(WebhookAck {
        received: true,
        outcome: outcome.map(str::to_string),
    })
}

async fn already_processed(state: &AppState, key: &str) -> bool {
    let mut conn = match state.redis.get_async_connection().await {
        Ok(conn) => conn,
        Err(e) => {
            warn!(error = %e, "webhook dedupe unavailable");
            return false;
        }
    };
    redis::cmd("EXISTS")
        .arg(key)
        .query_async::<_, bool>(&mut conn)
        .await
        .unwrap_or(false)
}

async fn mark_processed(state: &AppState, key: &str) {
    match state.redis.get_async_connection().await {
        Ok(mut conn) => {
            let result = redis::cmd("SET")
                .arg(key)
                .arg("1")
                .arg("EX")
                .arg(DEDUPE_TTL_SECS)
                .query_async::<_, ()>(&mut conn)
                .await;
            if let Err(e) = result {
                warn!(error = %e, "failed to record processed webhook");
            }
        }
        Err(e) => warn!(error = %e, "webhook dedupe unavailable"),
    }
}

// POST /api/v1/payments/webhook
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    summary = "Payment provider webhook",
    description = "Signed notification from the payment provider. The signature covers the raw body.",
    request_body = String,
    responses(
        (status = 200, description = "Webhook accepted", body = WebhookAck),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown session or order; the sender should retry", body = crate::errors::ErrorResponse),
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let secret = state
        .config
        .payment_webhook_secret
        .as_deref()
        .ok_or_else(|| {
            ServiceError::ServiceUnavailable("Webhook signing secret is not configured".to_string())
        })?;

    let now = chrono::Utc::now().timestamp();
    if !verify_signature(
        &headers,
        &body,
        secret,
        state.config.payment_webhook_tolerance_secs,
        now,
    ) {
        warn!("Payment webhook signature verification failed");
        metrics::counter!("shop_webhooks_total", 1, "result" => "bad_signature");
        return Err(ServiceError::Unauthorized("invalid webhook signature".to_string()).into());
    }

    let envelope: WebhookEnvelope = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid json: {}", e)))?;

    let dedupe_key = envelope
        .id
        .as_deref()
        .filter(|_| state.config.payment_webhook_redis_dedupe)
        .map(|id| format!("wh:{}", id));
    if let Some(key) = &dedupe_key {
        if already_processed(&state, key).await {
            info!(key = %key, "webhook event already processed");
            return Ok(ack(Some("duplicate")));
        }
    }

    if envelope.event_type != CHECKOUT_COMPLETED {
        info!(event_type = %envelope.event_type, "ignoring payment webhook");
        return Ok(ack(Some("ignored")));
    }

    let session_id = envelope
        .data
        .and_then(|d| d.object.id)
        .ok_or_else(|| ApiError::BadRequest("missing data.object.id".to_string()))?;

    let outcome = state
        .services
        .payments
        .reconcile_completed(&session_id)
        .await?;

    if let Some(key) = &dedupe_key {
        mark_processed(&state, key).await;
    }
    metrics::counter!("shop_webhooks_total", 1, "result" => "processed");

    Ok(ack(Some(match outcome {
        ReconcileOutcome::Applied => "applied",
        ReconcileOutcome::AlreadyPaid => "already_paid",
    })))
}
