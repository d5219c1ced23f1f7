mod common;

use axum::http::{Method, StatusCode};
use common::{checkout_completed, expect_status, json_body, TestApp, WEBHOOK_SECRET};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use shop_api::entities::order::PaymentStatus;

fn payment_request(reference_id: &str) -> Value {
    json!({
        "reference_id": reference_id,
        "total": "51.00",
        "line_items": [{
            "name": "Linen Shirt",
            "price": "25.50",
            "quantity": 2,
            "avatar": "https://cdn.example.com/linen.jpg",
            "color": "White",
            "size": "M"
        }]
    })
}

/// Places an online order and opens its checkout session; returns the url.
async fn order_with_session(app: &TestApp, reference_id: &str) -> String {
    let item = app.seed_item("Linen Shirt", dec!(25.50), 10).await;
    let address = app.seed_address(app.user_id).await;

    let order = app
        .as_user(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "address_id": address,
                "shipping_fee": "0",
                "method": "online",
                "reference_id": reference_id,
                "lines": [{ "product_item_id": item, "quantity": 2 }],
            })),
        )
        .await;
    expect_status(order, StatusCode::CREATED).await;

    let response = app
        .as_user(
            Method::POST,
            "/api/v1/payments",
            Some(payment_request(reference_id)),
        )
        .await;
    let body = expect_status(response, StatusCode::OK).await;
    body["url"].as_str().expect("checkout url").to_string()
}

async fn order_payment_status(app: &TestApp, reference_id: &str) -> Value {
    let response = app
        .as_user(
            Method::GET,
            &format!("/api/v1/orders/reference?reference_id={reference_id}"),
            None,
        )
        .await;
    expect_status(response, StatusCode::OK).await["status_pay"].clone()
}

#[tokio::test]
async fn creating_a_session_records_it_as_pending() {
    let app = TestApp::new().await;

    let url = order_with_session(&app, "ref-create").await;
    assert_eq!(url, "https://checkout.example.com/pay/cs_test_1");

    let session = app.session_for("ref-create").await.expect("session stored");
    assert_eq!(session.session_id, "cs_test_1");
    assert_eq!(session.status, PaymentStatus::Pending);
    assert_eq!(session.user_id, app.user_id);

    let mine = json_body(app.as_user(Method::GET, "/api/v1/payments/user", None).await).await;
    assert_eq!(mine.as_array().map(Vec::len), Some(1));
    assert_eq!(mine[0]["line_items"][0]["name"], "Linen Shirt");
}

#[tokio::test]
async fn second_session_for_a_reference_conflicts() {
    let app = TestApp::new().await;
    order_with_session(&app, "ref-twice").await;

    let again = app
        .as_user(
            Method::POST,
            "/api/v1/payments",
            Some(payment_request("ref-twice")),
        )
        .await;
    expect_status(again, StatusCode::CONFLICT).await;
}

#[tokio::test]
async fn completed_webhook_marks_session_and_order_paid_once() {
    let app = TestApp::new().await;
    order_with_session(&app, "ref-paid").await;

    let first = app
        .post_webhook(&checkout_completed("evt_1", "cs_test_1"), WEBHOOK_SECRET)
        .await;
    let ack = expect_status(first, StatusCode::OK).await;
    assert_eq!(ack["received"], true);
    assert_eq!(ack["outcome"], "applied");

    assert_eq!(
        app.session_for("ref-paid").await.unwrap().status,
        PaymentStatus::Paid
    );
    assert_eq!(order_payment_status(&app, "ref-paid").await, "paid");

    let replay = app
        .post_webhook(&checkout_completed("evt_1", "cs_test_1"), WEBHOOK_SECRET)
        .await;
    let ack = expect_status(replay, StatusCode::OK).await;
    assert_eq!(ack["outcome"], "already_paid");
    assert_eq!(order_payment_status(&app, "ref-paid").await, "paid");
}

#[tokio::test]
async fn webhook_with_bad_signature_changes_nothing() {
    let app = TestApp::new().await;
    order_with_session(&app, "ref-forged").await;

    let response = app
        .post_webhook(&checkout_completed("evt_2", "cs_test_1"), "whsec_wrong")
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(
        app.session_for("ref-forged").await.unwrap().status,
        PaymentStatus::Pending
    );
    assert_eq!(order_payment_status(&app, "ref-forged").await, "pending");
}

#[tokio::test]
async fn webhook_for_unknown_session_is_not_found() {
    let app = TestApp::new().await;

    let response = app
        .post_webhook(&checkout_completed("evt_3", "cs_unknown"), WEBHOOK_SECRET)
        .await;
    expect_status(response, StatusCode::NOT_FOUND).await;
}

#[tokio::test]
async fn webhook_without_matching_order_leaves_session_pending() {
    let app = TestApp::new().await;

    let response = app
        .as_user(
            Method::POST,
            "/api/v1/payments",
            Some(payment_request("ref-orphan")),
        )
        .await;
    expect_status(response, StatusCode::OK).await;

    let webhook = app
        .post_webhook(&checkout_completed("evt_4", "cs_test_1"), WEBHOOK_SECRET)
        .await;
    expect_status(webhook, StatusCode::NOT_FOUND).await;

    assert_eq!(
        app.session_for("ref-orphan").await.unwrap().status,
        PaymentStatus::Pending
    );
}

#[tokio::test]
async fn other_event_types_are_acknowledged_and_ignored() {
    let app = TestApp::new().await;
    order_with_session(&app, "ref-ignored").await;

    let event = json!({
        "id": "evt_5",
        "type": "checkout.session.expired",
        "data": { "object": { "id": "cs_test_1" } }
    });
    let response = app.post_webhook(&event, WEBHOOK_SECRET).await;
    let ack = expect_status(response, StatusCode::OK).await;

    assert_eq!(ack["outcome"], "ignored");
    assert_eq!(order_payment_status(&app, "ref-ignored").await, "pending");
}

#[tokio::test]
async fn repay_replaces_the_session_until_paid() {
    let app = TestApp::new().await;
    order_with_session(&app, "ref-repay").await;

    let response = app
        .as_user(
            Method::POST,
            "/api/v1/payments/repay",
            Some(json!({ "reference_id": "ref-repay" })),
        )
        .await;
    let body = expect_status(response, StatusCode::OK).await;
    assert_eq!(body["url"], "https://checkout.example.com/pay/cs_test_2");

    let session = app.session_for("ref-repay").await.unwrap();
    assert_eq!(session.session_id, "cs_test_2");
    assert_eq!(session.status, PaymentStatus::Pending);

    // the replaced session id no longer reconciles
    let stale = app
        .post_webhook(&checkout_completed("evt_6", "cs_test_1"), WEBHOOK_SECRET)
        .await;
    expect_status(stale, StatusCode::NOT_FOUND).await;

    let paid = app
        .post_webhook(&checkout_completed("evt_7", "cs_test_2"), WEBHOOK_SECRET)
        .await;
    expect_status(paid, StatusCode::OK).await;

    let after = app
        .as_user(
            Method::POST,
            "/api/v1/payments/repay",
            Some(json!({ "reference_id": "ref-repay" })),
        )
        .await;
    let body = expect_status(after, StatusCode::BAD_REQUEST).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("Payment has already been completed"));
}

#[tokio::test]
async fn repay_of_unknown_reference_is_not_found() {
    let app = TestApp::new().await;

    let response = app
        .as_user(
            Method::POST,
            "/api/v1/payments/repay",
            Some(json!({ "reference_id": "ref-missing" })),
        )
        .await;
    expect_status(response, StatusCode::NOT_FOUND).await;
}

#[tokio::test]
async fn listing_all_sessions_is_admin_only() {
    let app = TestApp::new().await;
    order_with_session(&app, "ref-admin").await;

    let forbidden = app.as_user(Method::GET, "/api/v1/payments", None).await;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let listed = app
        .as_admin(Method::GET, "/api/v1/payments?page=1&per_page=10", None)
        .await;
    let body = expect_status(listed, StatusCode::OK).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["sessions"][0]["reference_id"], "ref-admin");
}

#[tokio::test]
async fn unrepresentable_or_negative_prices_are_rejected_up_front() {
    let app = TestApp::new().await;

    let mut huge = payment_request("ref-huge");
    huge["line_items"][0]["price"] = json!("79228162514264337593543950335");
    let response = app
        .as_user(Method::POST, "/api/v1/payments", Some(huge))
        .await;
    expect_status(response, StatusCode::BAD_REQUEST).await;

    let mut negative = payment_request("ref-negative");
    negative["line_items"][0]["price"] = json!("-25.50");
    let response = app
        .as_user(Method::POST, "/api/v1/payments", Some(negative))
        .await;
    let body = expect_status(response, StatusCode::BAD_REQUEST).await;
    assert!(body["message"].as_str().unwrap().contains("must not be negative"));

    assert!(app.session_for("ref-huge").await.is_none());
    assert!(app.session_for("ref-negative").await.is_none());
    assert!(app.gateway.received_requests().await.unwrap().is_empty());
}
