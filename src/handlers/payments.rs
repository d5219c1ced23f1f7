use axum::{
    extract::{Query, State},
    response::Response,
};

use crate::{
    auth::AuthUser,
    errors::ApiError,
    services::payments::{
        CheckoutUrlResponse, CreatePaymentRequest, PaymentSessionListResponse,
        PaymentSessionView, RepayRequest,
    },
    AppState,
};

use super::common::{caller_id, success_response, JsonBody, PaginationParams};

#[utoipa::path(
    post,
    path = "/api/v1/payments",
    summary = "Create checkout session",
    description = "Open a hosted checkout session for an order reference id",
    request_body = CreatePaymentRequest,
    responses(
        (status = 200, description = "Checkout session created", body = CheckoutUrlResponse),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 402, description = "Payment provider declined", body = crate::errors::ErrorResponse),
        (status = 409, description = "Session already exists for the reference id", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment provider failed", body = crate::errors::ErrorResponse),
        (status = 503, description = "Payment provider unavailable", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Payments"
)]
pub async fn create_payment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    JsonBody(request): JsonBody<CreatePaymentRequest>,
) -> Result<Response, ApiError> {
    let user_id = caller_id(&auth_user)?;

    let checkout = state
        .services
        .payments
        .create_session(user_id, request)
        .await?;
    Ok(success_response(checkout))
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/repay",
    summary = "Retry payment",
    description = "Replace the checkout session of an unpaid reference id with a new one",
    request_body = RepayRequest,
    responses(
        (status = 200, description = "New checkout session created", body = CheckoutUrlResponse),
        (status = 400, description = "Payment already completed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Payment session not found", body = crate::errors::ErrorResponse),
        (status = 503, description = "Payment provider unavailable", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Payments"
)]
pub async fn repay(
    State(state): State<AppState>,
    auth_user: AuthUser,
    JsonBody(request): JsonBody<RepayRequest>,
) -> Result<Response, ApiError> {
    let user_id = caller_id(&auth_user)?;

    let checkout = state
        .services
        .payments
        .repay(user_id, &request.reference_id)
        .await?;
    Ok(success_response(checkout))
}

#[utoipa::path(
    get,
    path = "/api/v1/payments",
    summary = "List all payment sessions",
    params(PaginationParams),
    responses(
        (status = 200, description = "Payment sessions, newest first", body = PaymentSessionListResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Payments"
)]
pub async fn list_payments(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> Result<Response, ApiError> {
    let sessions = state
        .services
        .payments
        .list_all(params.page, params.per_page)
        .await?;
    Ok(success_response(sessions))
}

#[utoipa::path(
    get,
    path = "/api/v1/payments/user",
    summary = "List my payment sessions",
    responses(
        (status = 200, description = "Payment sessions of the caller", body = [PaymentSessionView]),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Payments"
)]
pub async fn list_my_payments(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Response, ApiError> {
    let user_id = caller_id(&auth_user)?;
    let sessions = state.services.payments.list_for_user(user_id).await?;
    Ok(success_response(sessions))
}
