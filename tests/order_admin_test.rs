mod common;

use axum::http::{Method, StatusCode};
use common::{expect_status, json_body, TestApp};
use rstest::rstest;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

async fn place_cash_order(app: &TestApp) -> String {
    let item = app.seed_item("Linen Shirt", dec!(25.00), 5).await;
    let address = app.seed_address(app.user_id).await;

    let response = app
        .as_user(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "address_id": address,
                "shipping_fee": "0",
                "method": "cash",
                "lines": [{ "product_item_id": item, "quantity": 1 }],
            })),
        )
        .await;
    let body = expect_status(response, StatusCode::CREATED).await;
    body["id"].as_str().unwrap().to_string()
}

async fn set_status(app: &TestApp, order_id: &str, status: &str) -> (StatusCode, Value) {
    let response = app
        .as_admin(
            Method::PUT,
            &format!("/api/v1/orders/{order_id}/status"),
            Some(json!({ "status": status })),
        )
        .await;
    let status = response.status();
    (status, json_body(response).await)
}

#[tokio::test]
async fn admin_walks_an_order_forward() {
    let app = TestApp::new().await;
    let order_id = place_cash_order(&app).await;

    for next in ["Confirmed", "Shipped", "Delivered"] {
        let (status, body) = set_status(&app, &order_id, next).await;
        assert_eq!(status, StatusCode::OK, "moving to {next}: {body}");
        assert_eq!(body["status"], next);
    }
}

#[rstest]
#[case(&["Confirmed"], "Pending")]
#[case(&["Confirmed", "Shipped"], "Cancelled")]
#[case(&["Cancelled"], "Confirmed")]
#[case(&[], "Delivered")]
#[tokio::test]
async fn disallowed_transitions_are_rejected(#[case] path: &[&str], #[case] next: &str) {
    let app = TestApp::new().await;
    let order_id = place_cash_order(&app).await;
    for step in path {
        let (status, _) = set_status(&app, &order_id, step).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = set_status(&app, &order_id, next).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("Cannot change order status"));
}

#[tokio::test]
async fn repeating_the_current_status_is_a_no_op() {
    let app = TestApp::new().await;
    let order_id = place_cash_order(&app).await;

    let (status, body) = set_status(&app, &order_id, "Pending").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Pending");
}

#[tokio::test]
async fn shoppers_cannot_manage_orders() {
    let app = TestApp::new().await;
    let order_id = place_cash_order(&app).await;

    let update = app
        .as_user(
            Method::PUT,
            &format!("/api/v1/orders/{order_id}/status"),
            Some(json!({ "status": "Confirmed" })),
        )
        .await;
    assert_eq!(update.status(), StatusCode::FORBIDDEN);

    let delete = app
        .as_user(Method::DELETE, &format!("/api/v1/orders/{order_id}"), None)
        .await;
    assert_eq!(delete.status(), StatusCode::FORBIDDEN);

    let all = app.as_user(Method::GET, "/api/v1/orders/all", None).await;
    assert_eq!(all.status(), StatusCode::FORBIDDEN);

    // reading a single order stays open to shoppers
    let get = app
        .as_user(Method::GET, &format!("/api/v1/orders/{order_id}"), None)
        .await;
    assert_eq!(get.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_lists_and_deletes_orders() {
    let app = TestApp::new().await;
    let first = place_cash_order(&app).await;
    place_cash_order(&app).await;

    let page = app
        .as_admin(Method::GET, "/api/v1/orders/all?page=1&per_page=1", None)
        .await;
    let body = expect_status(page, StatusCode::OK).await;
    assert_eq!(body["total"], 2);
    assert_eq!(body["per_page"], 1);
    assert_eq!(body["orders"].as_array().map(Vec::len), Some(1));

    let deleted = app
        .as_admin(Method::DELETE, &format!("/api/v1/orders/{first}"), None)
        .await;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let gone = app
        .as_user(Method::GET, &format!("/api/v1/orders/{first}"), None)
        .await;
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);

    let again = app
        .as_admin(Method::DELETE, &format!("/api/v1/orders/{first}"), None)
        .await;
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_reference_query_is_a_bad_request() {
    let app = TestApp::new().await;

    let response = app
        .as_user(Method::GET, "/api/v1/orders/reference?reference_id=", None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_and_catalog_are_public() {
    let app = TestApp::new().await;
    let item = app.seed_item("Canvas Tote", dec!(14.99), 7).await;

    let live = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(live.status(), StatusCode::OK);

    let ready = app.request(Method::GET, "/health/ready", None, None).await;
    let body = expect_status(ready, StatusCode::OK).await;
    assert_eq!(body["database"], "up");

    let lookup = app
        .request(
            Method::GET,
            &format!("/api/v1/product-items/{item}"),
            None,
            None,
        )
        .await;
    let body = expect_status(lookup, StatusCode::OK).await;
    assert_eq!(body["name"], "Canvas Tote");
    assert_eq!(body["quantity"], 7);
}
