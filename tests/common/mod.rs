use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use serde_json::{json, Value};
use shop_api::{
    auth::{AuthConfig, AuthService, ROLE_ADMIN, ROLE_USER},
    circuit_breaker::CircuitBreaker,
    config::AppConfig,
    db,
    entities::{address, cart_item, order, payment_session, product, product_item},
    events::{self, EventSender},
    handlers::AppServices,
    services::payment_gateway::{PaymentGateway, StripeGateway},
    webhooks::stripe_signature_header,
    AppState,
};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, Respond, ResponseTemplate,
};

pub const WEBHOOK_SECRET: &str = "whsec_integration_secret";

/// Answers every checkout request with a fresh `cs_test_N` session.
#[derive(Default)]
struct SessionResponder {
    issued: AtomicUsize,
}

impl Respond for SessionResponder {
    fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        ResponseTemplate::new(200).set_body_json(json!({
            "id": format!("cs_test_{n}"),
            "url": format!("https://checkout.example.com/pay/cs_test_{n}"),
        }))
    }
}

/// Application wired against a throwaway SQLite file and a mocked checkout provider.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub user_id: Uuid,
    user_token: String,
    admin_token: String,
    auth_service: Arc<AuthService>,
    #[allow(dead_code)]
    pub gateway: MockServer,
    _db_dir: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let db_dir = tempfile::tempdir().expect("temp dir");
        let gateway = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .respond_with(SessionResponder::default())
            .mount(&gateway)
            .await;

        let mut cfg = AppConfig::new(
            format!("sqlite://{}/shop.db?mode=rwc", db_dir.path().display()),
            "redis://127.0.0.1:6379".to_string(),
            "test_secret_key_for_testing_purposes_only_32chars".to_string(),
            3600,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.payment_secret_key = Some("sk_test_integration".to_string());
        cfg.payment_api_base = gateway.uri();
        cfg.payment_webhook_secret = Some(WEBHOOK_SECRET.to_string());

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let gateway_client: Arc<dyn PaymentGateway> = Arc::new(
            StripeGateway::new(
                gateway.uri(),
                cfg.payment_secret_key.clone(),
                Duration::from_secs(5),
                CircuitBreaker::new("payment_gateway", 5, Duration::from_secs(30), 1),
            )
            .expect("gateway client"),
        );

        let services =
            AppServices::new(db_arc.clone(), event_sender.clone(), gateway_client, &cfg);
        let redis_client = Arc::new(
            redis::Client::open(cfg.redis_url.clone()).expect("invalid redis url for tests"),
        );

        let state = AppState {
            db: db_arc,
            config: cfg.clone(),
            event_sender,
            services,
            redis: redis_client,
        };

        let auth_service = Arc::new(AuthService::new(AuthConfig::from(&cfg)));
        let user_id = Uuid::new_v4();
        let user_token = auth_service
            .generate_token(user_id, &[ROLE_USER])
            .expect("user token");
        let admin_token = auth_service
            .generate_token(Uuid::new_v4(), &[ROLE_ADMIN])
            .expect("admin token");

        let router = shop_api::app_router(state.clone(), auth_service.clone());

        Self {
            router,
            state,
            user_id,
            user_token,
            admin_token,
            auth_service,
            gateway,
            _db_dir: db_dir,
            _event_task: event_task,
        }
    }

    #[allow(dead_code)]
    pub fn user_token(&self) -> &str {
        &self.user_token
    }

    #[allow(dead_code)]
    pub fn admin_token(&self) -> &str {
        &self.admin_token
    }

    /// Token for another shopper; returns their id alongside.
    #[allow(dead_code)]
    pub fn other_user(&self) -> (Uuid, String) {
        let id = Uuid::new_v4();
        let token = self
            .auth_service
            .generate_token(id, &[ROLE_USER])
            .expect("token");
        (id, token)
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    #[allow(dead_code)]
    pub async fn as_user(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.request(method, uri, body, Some(&self.user_token)).await
    }

    #[allow(dead_code)]
    pub async fn as_admin(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.request(method, uri, body, Some(&self.admin_token)).await
    }

    /// Posts `event` to the webhook endpoint signed with `secret`.
    #[allow(dead_code)]
    pub async fn post_webhook(&self, event: &Value, secret: &str) -> Response {
        let payload = serde_json::to_vec(event).expect("serialize webhook");
        let header = stripe_signature_header(secret, Utc::now().timestamp(), &payload);

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/payments/webhook")
            .header("content-type", "application/json")
            .header("stripe-signature", header)
            .body(Body::from(payload))
            .expect("failed to build webhook request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during webhook request")
    }

    /// Seeds a product with one stocked item; returns the item id.
    #[allow(dead_code)]
    pub async fn seed_item(&self, name: &str, price: Decimal, stock: i32) -> Uuid {
        let now = Utc::now();
        let product = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            description: Set(None),
            avatar: Set(None),
            price: Set(price),
            product_color_id: Set(None),
            created_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product");

        product_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product.id),
            product_size_id: Set(None),
            quantity: Set(stock),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product item")
        .id
    }

    #[allow(dead_code)]
    pub async fn seed_address(&self, user_id: Uuid) -> Uuid {
        address::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            province: Set("01-Hanoi".into()),
            district: Set("001-Ba Dinh".into()),
            ward: Set("00001-Phuc Xa".into()),
            specify: Set("12 Hang Bai".into()),
            full_name: Set("Test Shopper".into()),
            phone_number: Set("0900000001".into()),
            is_default: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed address")
        .id
    }

    #[allow(dead_code)]
    pub async fn stock_of(&self, item_id: Uuid) -> i32 {
        product_item::Entity::find_by_id(item_id)
            .one(&*self.state.db)
            .await
            .expect("query stock")
            .expect("item exists")
            .quantity
    }

    #[allow(dead_code)]
    pub async fn cart_quantity(&self, user_id: Uuid, item_id: Uuid) -> Option<i32> {
        cart_item::Entity::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductItemId.eq(item_id))
            .one(&*self.state.db)
            .await
            .expect("query cart")
            .map(|line| line.quantity)
    }

    #[allow(dead_code)]
    pub async fn order_count(&self) -> u64 {
        order::Entity::find()
            .count(&*self.state.db)
            .await
            .expect("count orders")
    }

    #[allow(dead_code)]
    pub async fn session_for(&self, reference_id: &str) -> Option<payment_session::Model> {
        payment_session::Entity::find()
            .filter(payment_session::Column::ReferenceId.eq(reference_id))
            .one(&*self.state.db)
            .await
            .expect("query payment session")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

#[allow(dead_code)]
pub async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    }
}

/// Asserts the status, printing the body on mismatch.
#[allow(dead_code)]
pub async fn expect_status(response: Response, expected: StatusCode) -> Value {
    let status = response.status();
    let body = json_body(response).await;
    assert_eq!(status, expected, "unexpected status; body: {body}");
    body
}

#[allow(dead_code)]
pub fn checkout_completed(event_id: &str, session_id: &str) -> Value {
    json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "data": { "object": { "id": session_id } }
    })
}
