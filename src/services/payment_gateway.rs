//! Hosted checkout provider client.
//!
//! [`PaymentGateway`] is the seam the payment service talks to; [`StripeGateway`]
//! implements it against a Stripe-compatible `POST /v1/checkout/sessions`.

use crate::{
    circuit_breaker::{CircuitBreaker, CircuitBreakerError},
    errors::ServiceError,
};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, instrument, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutLineItem {
    pub name: String,
    /// Price of one unit in the currency's minor unit (cents)
    pub unit_amount: i64,
    pub quantity: i32,
    pub image: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSessionRequest {
    pub reference_id: String,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub line_items: Vec<CheckoutLineItem>,
}

impl CheckoutSessionRequest {
    /// Form fields in the provider's bracketed encoding.
    pub fn to_form(&self) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), self.success_url.clone()),
            ("cancel_url".to_string(), self.cancel_url.clone()),
            ("client_reference_id".to_string(), self.reference_id.clone()),
            (
                "metadata[reference_id]".to_string(),
                self.reference_id.clone(),
            ),
        ];

        for (i, item) in self.line_items.iter().enumerate() {
            let prefix = format!("line_items[{}]", i);
            form.push((
                format!("{prefix}[price_data][currency]"),
                self.currency.clone(),
            ));
            form.push((
                format!("{prefix}[price_data][product_data][name]"),
                item.name.clone(),
            ));
            if let Some(image) = &item.image {
                form.push((
                    format!("{prefix}[price_data][product_data][images][0]"),
                    image.clone(),
                ));
            }
            if let Some(description) = &item.description {
                form.push((
                    format!("{prefix}[price_data][product_data][description]"),
                    description.clone(),
                ));
            }
            form.push((
                format!("{prefix}[price_data][unit_amount]"),
                item.unit_amount.to_string(),
            ));
            form.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
        }

        form
    }
}

/// Session returned by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

/// Converts a decimal amount into minor units, rounding half away from zero.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|cents| {
            cents
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                .to_i64()
        })
        .ok_or_else(|| ServiceError::ValidationError(format!("Amount {} is out of range", amount)))
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ServiceError>;
}

pub struct StripeGateway {
    client: Client,
    api_base: String,
    secret_key: Option<String>,
    breaker: CircuitBreaker,
}

impl StripeGateway {
    pub fn new(
        api_base: impl Into<String>,
        secret_key: Option<String>,
        timeout: Duration,
        breaker: CircuitBreaker,
    ) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {}", e)))?;

        Ok(Self::with_client(api_base, secret_key, client, breaker))
    }

    pub fn with_client(
        api_base: impl Into<String>,
        secret_key: Option<String>,
        client: Client,
        breaker: CircuitBreaker,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key,
            breaker,
        }
    }

    async fn post_session(
        &self,
        secret_key: &str,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ServiceError> {
        let url = format!("{}/v1/checkout/sessions", self.api_base);
        let response = self
            .client
            .post(&url)
            .bearer_auth(secret_key)
            .form(&request.to_form())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    warn!("payment gateway timed out");
                    ServiceError::ServiceUnavailable("Payment gateway timed out".to_string())
                } else {
                    warn!(error = %e, "payment gateway unreachable");
                    ServiceError::ServiceUnavailable("Payment gateway unreachable".to_string())
                }
            })?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body = %body, "payment gateway rejected checkout session");
            return Err(ServiceError::PaymentFailed(format!(
                "Payment provider rejected the request ({})",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            error!(%status, "payment gateway failed");
            return Err(ServiceError::ExternalServiceError(format!(
                "Payment provider returned {}",
                status.as_u16()
            )));
        }

        response.json::<CheckoutSession>().await.map_err(|e| {
            error!(error = %e, "malformed checkout session response");
            ServiceError::ExternalServiceError("Malformed payment provider response".to_string())
        })
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, request), fields(reference_id = %request.reference_id, lines = request.line_items.len()))]
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ServiceError> {
        let secret_key = self.secret_key.as_deref().ok_or_else(|| {
            ServiceError::ServiceUnavailable("Payment gateway is not configured".to_string())
        })?;

        let result = self
            .breaker
            .call(
                || self.post_session(secret_key, request),
                ServiceError::is_retryable,
            )
            .await;

        match result {
            Ok(session) => {
                metrics::counter!("shop_payment_gateway_calls_total", 1, "outcome" => "ok");
                Ok(session)
            }
            Err(CircuitBreakerError::CircuitOpen) => Err(ServiceError::ServiceUnavailable(
                "Payment gateway temporarily unavailable".to_string(),
            )),
            Err(CircuitBreakerError::Inner(e)) => {
                metrics::counter!("shop_payment_gateway_calls_total", 1, "outcome" => "error");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> CheckoutSessionRequest {
        CheckoutSessionRequest {
            reference_id: "ref-1".into(),
            currency: "usd".into(),
            success_url: "http://localhost:3000/success?referenceId=ref-1".into(),
            cancel_url: "http://localhost:3000/cancel?referenceId=ref-1".into(),
            line_items: vec![CheckoutLineItem {
                name: "Linen Shirt".into(),
                unit_amount: 2500,
                quantity: 2,
                image: Some("https://cdn.example/shirt.png".into()),
                description: Some("White / M".into()),
            }],
        }
    }

    fn gateway(server: &MockServer, failures: u32) -> StripeGateway {
        StripeGateway::new(
            server.uri(),
            Some("sk_test_123".into()),
            Duration::from_secs(2),
            CircuitBreaker::new("payments", failures, Duration::from_secs(60), 1),
        )
        .unwrap()
    }

    #[test]
    fn minor_units_round_half_away_from_zero() {
        assert_eq!(to_minor_units(dec!(25.00)).unwrap(), 2500);
        assert_eq!(to_minor_units(dec!(0.005)).unwrap(), 1);
        assert_eq!(to_minor_units(dec!(19.994)).unwrap(), 1999);
    }

    #[test]
    fn minor_units_reject_amounts_that_overflow() {
        assert_matches!(
            to_minor_units(Decimal::MAX),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            to_minor_units(dec!(100000000000000000)),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn form_uses_bracketed_line_items() {
        let form = request().to_form();
        assert!(form.contains(&(
            "line_items[0][price_data][unit_amount]".to_string(),
            "2500".to_string()
        )));
        assert!(form.contains(&("line_items[0][quantity]".to_string(), "2".to_string())));
        assert!(form.contains(&("client_reference_id".to_string(), "ref-1".to_string())));
    }

    #[tokio::test]
    async fn creates_session_with_bearer_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .and(header("authorization", "Bearer sk_test_123"))
            .and(body_string_contains("client_reference_id=ref-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "cs_test_1",
                "url": "https://checkout.example/cs_test_1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = gateway(&server, 5)
            .create_checkout_session(&request())
            .await
            .unwrap();
        assert_eq!(session.id, "cs_test_1");
        assert_eq!(session.url.as_deref(), Some("https://checkout.example/cs_test_1"));
    }

    #[tokio::test]
    async fn client_errors_are_declines() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let err = gateway(&server, 1)
            .create_checkout_session(&request())
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::PaymentFailed(_));
    }

    #[tokio::test]
    async fn server_errors_open_the_breaker() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let gw = gateway(&server, 2);
        for _ in 0..2 {
            let err = gw.create_checkout_session(&request()).await.unwrap_err();
            assert_matches!(err, ServiceError::ExternalServiceError(_));
        }

        let err = gw.create_checkout_session(&request()).await.unwrap_err();
        assert_matches!(err, ServiceError::ServiceUnavailable(_));
    }

    #[tokio::test]
    async fn slow_gateway_is_retryable_unavailability() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(500))
                    .set_body_json(serde_json::json!({"id": "cs_late", "url": null})),
            )
            .mount(&server)
            .await;

        let gw = StripeGateway::new(
            server.uri(),
            Some("sk_test_123".into()),
            Duration::from_millis(50),
            CircuitBreaker::new("payments", 5, Duration::from_secs(60), 1),
        )
        .unwrap();

        let err = gw.create_checkout_session(&request()).await.unwrap_err();
        assert!(err.is_retryable());
        assert_matches!(err, ServiceError::ServiceUnavailable(_));
    }

    #[tokio::test]
    async fn missing_secret_key_is_unavailable() {
        let server = MockServer::start().await;
        let gw = StripeGateway::new(
            server.uri(),
            None,
            Duration::from_secs(1),
            CircuitBreaker::new("payments", 5, Duration::from_secs(60), 1),
        )
        .unwrap();

        let err = gw.create_checkout_session(&request()).await.unwrap_err();
        assert_matches!(err, ServiceError::ServiceUnavailable(_));
    }
}
