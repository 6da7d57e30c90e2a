//! # Stripe Checkout Sessions
//!
//! `PaymentGateway` over the Stripe Checkout Sessions and Refunds APIs.
//! Deposits and balances are one-off payments with a single dynamic line item.

use crate::config::StripeConfig;
use crate::webhook::{parse_event, verify_signature};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use slot_core::{
    BookingError, BookingResult, CheckoutRequest, CheckoutSession, PaymentEvent, PaymentGateway,
    Price, RefundReceipt,
};
use tracing::{debug, error, info, instrument, warn};

const PROVIDER: &str = "stripe";

/// Stripe gateway
///
/// Uses Stripe's hosted checkout page, so card data never touches this service.
pub struct StripeGateway {
    config: StripeConfig,
    client: Client,
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> BookingResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BookingError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Create from environment variables
    pub fn from_env() -> BookingResult<Self> {
        Self::new(StripeConfig::from_env()?)
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }

    fn checkout_form(request: &CheckoutRequest) -> Vec<(String, String)> {
        let kind = request.kind.as_str();
        let mut form: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("success_url".into(), request.success_url.clone()),
            ("cancel_url".into(), request.cancel_url.clone()),
            (
                "line_items[0][price_data][currency]".into(),
                request.amount.currency.as_str().to_string(),
            ),
            (
                "line_items[0][price_data][unit_amount]".into(),
                request.amount.amount.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".into(),
                request.description.clone(),
            ),
            ("line_items[0][quantity]".into(), "1".into()),
            ("client_reference_id".into(), request.booking_id.clone()),
            ("metadata[booking_id]".into(), request.booking_id.clone()),
            ("metadata[payment_type]".into(), kind.to_string()),
            (
                "payment_intent_data[metadata][booking_id]".into(),
                request.booking_id.clone(),
            ),
            (
                "payment_intent_data[metadata][payment_type]".into(),
                kind.to_string(),
            ),
        ];

        if let Some(ref email) = request.customer_email {
            form.push(("customer_email".into(), email.clone()));
        }

        form
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(String, String)],
        idempotency_key: Option<&str>,
    ) -> BookingResult<T> {
        let url = format!("{}{}", self.config.api_base_url, path);

        let mut builder = self
            .client
            .post(&url)
            .header("Authorization", self.config.auth_header())
            .header("Stripe-Version", &self.config.api_version)
            .form(form);
        if let Some(key) = idempotency_key {
            builder = builder.header("Idempotency-Key", key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| BookingError::NetworkError(e.to_string()))?;

        read_response(response).await
    }
}

async fn read_response<T: DeserializeOwned>(response: Response) -> BookingResult<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| BookingError::NetworkError(e.to_string()))?;

    if !status.is_success() {
        error!("Stripe API error: status={}, body={}", status, body);

        let message = serde_json::from_str::<StripeErrorResponse>(&body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| format!("HTTP {}: {}", status, body));

        return Err(BookingError::ProviderError {
            provider: PROVIDER.to_string(),
            message,
        });
    }

    serde_json::from_str(&body).map_err(|e| {
        BookingError::Serialization(format!("Failed to parse Stripe response: {}", e))
    })
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, request), fields(booking_id = %request.booking_id, kind = request.kind.as_str()))]
    async fn create_checkout(&self, request: &CheckoutRequest) -> BookingResult<CheckoutSession> {
        if request.amount.amount <= 0 {
            return Err(BookingError::Validation(format!(
                "checkout amount must be positive, got {}",
                request.amount.display()
            )));
        }

        debug!("Creating Stripe checkout session for {}", request.amount.display());

        let form = Self::checkout_form(request);
        let session: StripeCheckoutSessionResponse = self
            .post_form("/v1/checkout/sessions", &form, Some(&request.idempotency_key))
            .await?;

        info!("Created Stripe checkout session: id={}", session.id);

        Ok(CheckoutSession {
            session_id: session.id,
            checkout_url: session.url,
            provider: PROVIDER.to_string(),
            expires_at: session
                .expires_at
                .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
        })
    }

    #[instrument(skip(self, amount))]
    async fn refund(&self, payment_ref: &str, amount: Option<Price>) -> BookingResult<RefundReceipt> {
        let target = if payment_ref.starts_with("pi_") {
            "payment_intent"
        } else {
            "charge"
        };

        let mut form = vec![(target.to_string(), payment_ref.to_string())];
        if let Some(price) = amount {
            form.push(("amount".to_string(), price.amount.to_string()));
        }

        let refund: StripeRefundResponse = self.post_form("/v1/refunds", &form, None).await?;

        if matches!(refund.status.as_str(), "failed" | "canceled") {
            return Err(BookingError::ProviderError {
                provider: PROVIDER.to_string(),
                message: format!("refund {} ended {}", refund.id, refund.status),
            });
        }

        info!("Stripe refund {} status={}", refund.id, refund.status);

        Ok(RefundReceipt {
            refund_id: refund.id,
            amount: refund.amount,
            status: refund.status,
        })
    }

    #[instrument(skip(self, payload, signature))]
    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> BookingResult<PaymentEvent> {
        match self.config.webhook_secret {
            Some(ref secret) => {
                let header = signature.ok_or_else(|| {
                    BookingError::WebhookVerificationFailed(
                        "Missing Stripe-Signature header".to_string(),
                    )
                })?;
                verify_signature(secret, payload, header, Utc::now().timestamp())?;
                parse_event(payload, true)
            }
            None => {
                warn!("STRIPE_WEBHOOK_SECRET not set; accepting webhook WITHOUT signature verification");
                parse_event(payload, false)
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

// =============================================================================
// Stripe API Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct StripeCheckoutSessionResponse {
    id: String,
    url: String,
    #[serde(default)]
    expires_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct StripeRefundResponse {
    id: String,
    #[serde(default)]
    amount: Option<i64>,
    status: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeError,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::sign_payload;
    use serde_json::json;
    use slot_core::{Currency, PaymentEventType, PaymentKind};
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn checkout_request(kind: PaymentKind, cents: i64) -> CheckoutRequest {
        CheckoutRequest {
            booking_id: "BK-ABCDEFGHJK".to_string(),
            kind,
            amount: Price::from_minor(cents, Currency::ZAR),
            description: "Glow Studio deposit".to_string(),
            customer_email: Some("thandi@example.com".to_string()),
            success_url: "https://glow.example/booking/success?booking=BK-ABCDEFGHJK".to_string(),
            cancel_url: "https://glow.example/booking/cancelled?booking=BK-ABCDEFGHJK".to_string(),
            idempotency_key: "BK-ABCDEFGHJK-deposit".to_string(),
        }
    }

    fn gateway(server: &MockServer) -> StripeGateway {
        let config = StripeConfig::new("sk_test_123").with_api_base_url(server.uri());
        StripeGateway::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_create_checkout_sends_booking_metadata() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .and(header("Authorization", "Bearer sk_test_123"))
            .and(header("Idempotency-Key", "BK-ABCDEFGHJK-deposit"))
            .and(body_string_contains("metadata%5Bbooking_id%5D=BK-ABCDEFGHJK"))
            .and(body_string_contains("metadata%5Bpayment_type%5D=deposit"))
            .and(body_string_contains("unit_amount%5D=50000"))
            .and(body_string_contains("mode=payment"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "cs_test_abc",
                "url": "https://checkout.stripe.com/c/pay/cs_test_abc",
                "expires_at": 1_767_312_000
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = gateway(&server)
            .create_checkout(&checkout_request(PaymentKind::Deposit, 50000))
            .await
            .unwrap();

        assert_eq!(session.session_id, "cs_test_abc");
        assert_eq!(session.checkout_url, "https://checkout.stripe.com/c/pay/cs_test_abc");
        assert_eq!(session.provider, "stripe");
        assert!(session.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_create_checkout_rejects_zero_amount() {
        let server = MockServer::start().await;
        let err = gateway(&server)
            .create_checkout(&checkout_request(PaymentKind::Balance, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
    }

    #[tokio::test]
    async fn test_stripe_error_message_surfaces() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "message": "Amount must be at least R5.00", "type": "invalid_request_error" }
            })))
            .mount(&server)
            .await;

        let err = gateway(&server)
            .create_checkout(&checkout_request(PaymentKind::Deposit, 100))
            .await
            .unwrap_err();

        match err {
            BookingError::ProviderError { provider, message } => {
                assert_eq!(provider, "stripe");
                assert_eq!(message, "Amount must be at least R5.00");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_refund_partial_by_payment_intent() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/refunds"))
            .and(body_string_contains("payment_intent=pi_test_1"))
            .and(body_string_contains("amount=25000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "re_1", "amount": 25000, "status": "succeeded"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let receipt = gateway(&server)
            .refund("pi_test_1", Some(Price::from_minor(25000, Currency::ZAR)))
            .await
            .unwrap();

        assert_eq!(receipt.refund_id, "re_1");
        assert_eq!(receipt.amount, Some(25000));
    }

    #[tokio::test]
    async fn test_refund_failed_status_is_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/refunds"))
            .and(body_string_contains("charge=ch_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "re_2", "status": "failed"
            })))
            .mount(&server)
            .await;

        let err = gateway(&server).refund("ch_1", None).await.unwrap_err();
        assert!(matches!(err, BookingError::ProviderError { .. }));
    }

    #[tokio::test]
    async fn test_verify_webhook_with_secret() {
        let server = MockServer::start().await;
        let config = StripeConfig::new("sk_test_123")
            .with_api_base_url(server.uri())
            .with_webhook_secret("whsec_abc");
        let gateway = StripeGateway::new(config).unwrap();

        let payload = serde_json::to_vec(&json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_1",
                "payment_intent": "pi_1",
                "payment_status": "paid",
                "metadata": { "booking_id": "BK-ABCDEFGHJK", "payment_type": "balance" }
            }}
        }))
        .unwrap();
        let header = sign_payload("whsec_abc", Utc::now().timestamp(), &payload).unwrap();

        let event = gateway.verify_webhook(&payload, Some(&header)).await.unwrap();
        assert_eq!(event.event_type, PaymentEventType::PaymentSucceeded);
        assert_eq!(event.kind, Some(PaymentKind::Balance));
        assert!(event.verified);

        let missing = gateway.verify_webhook(&payload, None).await.unwrap_err();
        assert!(matches!(missing, BookingError::WebhookVerificationFailed(_)));

        let forged = gateway
            .verify_webhook(&payload, Some("t=1,v1=deadbeef"))
            .await
            .unwrap_err();
        assert!(matches!(forged, BookingError::WebhookVerificationFailed(_)));
    }

    #[tokio::test]
    async fn test_verify_webhook_without_secret_is_unverified() {
        let server = MockServer::start().await;
        let payload = br#"{"id":"evt_9","type":"checkout.session.completed","data":{"object":{"id":"cs_9","client_reference_id":"BK-ABCDEFGHJK"}}}"#;

        let event = gateway(&server).verify_webhook(payload, None).await.unwrap();
        assert!(!event.verified);
        assert_eq!(event.booking_id.as_deref(), Some("BK-ABCDEFGHJK"));
        assert_eq!(event.payment_ref.as_deref(), Some("cs_9"));
    }
}
