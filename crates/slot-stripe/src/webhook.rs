//! # Stripe Webhook Handling
//!
//! Signature verification and event classification for Stripe webhooks.
//!
//! The signature covers `"<t>." ++ body` over the exact bytes received; the
//! body is never decoded or re-serialized before hashing.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use slot_core::{BookingError, BookingResult, PaymentEvent, PaymentEventType, PaymentKind};
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Events that mean "money arrived". Everything else is acknowledged and dropped.
pub const PAYMENT_SUCCEEDED_EVENTS: &[&str] = &[
    "checkout.session.completed",
    "checkout.session.async_payment_succeeded",
];

/// Maximum age of a signed timestamp
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Parsed `Stripe-Signature` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<String>,
}

pub fn parse_signature_header(header: &str) -> BookingResult<SignatureHeader> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => signatures.push(value.to_string()),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        BookingError::WebhookVerificationFailed("Missing timestamp in signature".to_string())
    })?;

    if signatures.is_empty() {
        return Err(BookingError::WebhookVerificationFailed(
            "No v1 signature found".to_string(),
        ));
    }

    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

fn signed_mac(secret: &str, timestamp: i64, payload: &[u8]) -> BookingResult<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| BookingError::Configuration(format!("invalid webhook secret: {}", e)))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Check `header` against `payload` at unix time `now`
pub fn verify_signature(secret: &str, payload: &[u8], header: &str, now: i64) -> BookingResult<()> {
    let parsed = parse_signature_header(header)?;

    if (now - parsed.timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(BookingError::WebhookVerificationFailed(
            "Timestamp outside tolerance".to_string(),
        ));
    }

    for candidate in &parsed.signatures {
        let Ok(bytes) = hex::decode(candidate) else {
            continue;
        };
        // verify_slice compares in constant time
        if signed_mac(secret, parsed.timestamp, payload)?
            .verify_slice(&bytes)
            .is_ok()
        {
            return Ok(());
        }
    }

    Err(BookingError::WebhookVerificationFailed(
        "Signature mismatch".to_string(),
    ))
}

/// Produce a `Stripe-Signature` header value (local tooling, tests)
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> BookingResult<String> {
    let mac = signed_mac(secret, timestamp, payload)?;
    Ok(format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    ))
}

#[derive(Debug, Deserialize)]
struct StripeWebhookEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: serde_json::Map<String, serde_json::Value>,
}

/// Classify an event body and pull out the booking correlation fields
pub fn parse_event(payload: &[u8], verified: bool) -> BookingResult<PaymentEvent> {
    let event: StripeWebhookEvent = serde_json::from_slice(payload).map_err(|e| {
        BookingError::WebhookParseError(format!("Failed to parse webhook: {}", e))
    })?;
    let obj = &event.data.object;
    let text = |value: Option<&serde_json::Value>| value.and_then(|v| v.as_str()).map(String::from);

    let metadata = obj.get("metadata").and_then(|m| m.as_object());
    let meta = |key: &str| text(metadata.and_then(|m| m.get(key)));

    let payment_status = obj.get("payment_status").and_then(|v| v.as_str());
    let event_type = if !PAYMENT_SUCCEEDED_EVENTS.contains(&event.event_type.as_str()) {
        PaymentEventType::Other(event.event_type.clone())
    } else if payment_status == Some("unpaid") {
        // Delayed methods complete the session before the money arrives
        PaymentEventType::Other(format!("{} (unpaid)", event.event_type))
    } else {
        PaymentEventType::PaymentSucceeded
    };

    debug!("Stripe event {} classified as {:?}", event.event_type, event_type);

    Ok(PaymentEvent {
        booking_id: meta("booking_id").or_else(|| text(obj.get("client_reference_id"))),
        kind: meta("payment_type").as_deref().and_then(PaymentKind::parse),
        payment_ref: text(obj.get("payment_intent")).or_else(|| text(obj.get("id"))),
        amount: obj.get("amount_total").and_then(|v| v.as_i64()),
        event_id: event.id,
        event_type,
        verified,
    })
}

/// Dashboard setup steps for the webhook endpoint
pub fn setup_instructions(endpoint_url: &str) -> String {
    let mut lines = vec![
        "Stripe webhook setup:".to_string(),
        "1. Go to https://dashboard.stripe.com/webhooks and add an endpoint".to_string(),
        format!("2. Endpoint URL: {}", endpoint_url),
        "3. Select these events:".to_string(),
    ];
    lines.extend(PAYMENT_SUCCEEDED_EVENTS.iter().map(|e| format!("   - {}", e)));
    lines.push("4. Copy the signing secret (whsec_...) into STRIPE_WEBHOOK_SECRET".to_string());
    lines.push(format!("Local testing: stripe listen --forward-to {}", endpoint_url));
    lines.join("\n")
}
