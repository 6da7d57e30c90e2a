//! # Outbound Ports
//!
//! Traits for the external collaborators the booking engine drives: the
//! payment gateway, the calendar, notification delivery and the distance
//! lookup behind travel quotes.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 BookingLifecycle / BookingIntake             │
//! └──────┬──────────────┬──────────────┬──────────────┬──────────┘
//!        │              │              │              │
//!  PaymentGateway  CalendarClient   Notifier   DistanceProvider
//!   (Stripe)       (Google Cal)    (relay)    (Distance Matrix)
//! ```

use crate::booking::Booking;
use crate::error::BookingResult;
use crate::money::Price;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

// =============================================================================
// Payment gateway
// =============================================================================

/// Which leg of the booking a payment settles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    Deposit,
    Balance,
}

impl PaymentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentKind::Deposit => "deposit",
            PaymentKind::Balance => "balance",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "deposit" => Some(PaymentKind::Deposit),
            "balance" => Some(PaymentKind::Balance),
            _ => None,
        }
    }
}

/// A hosted checkout to open for one payment
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    pub booking_id: String,
    pub kind: PaymentKind,
    pub amount: Price,
    /// Line item label shown on the hosted page
    pub description: String,
    pub customer_email: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    /// Sent as the gateway idempotency key
    pub idempotency_key: String,
}

/// A checkout session created by the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Provider's session ID
    pub session_id: String,

    /// URL to redirect the customer to
    pub checkout_url: String,

    /// Provider name (e.g., "stripe")
    pub provider: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Result of a refund call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundReceipt {
    pub refund_id: String,
    pub amount: Option<i64>,
    pub status: String,
}

/// Gateway event classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEventType {
    /// One of the allow-listed "money arrived" events
    PaymentSucceeded,
    /// Anything else, by provider name
    Other(String),
}

/// A verified, parsed gateway event
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentEvent {
    pub event_id: String,
    pub event_type: PaymentEventType,
    /// Correlation id from event metadata
    pub booking_id: Option<String>,
    pub kind: Option<PaymentKind>,
    /// Provider payment reference (payment intent, charge...)
    pub payment_ref: Option<String>,
    pub amount: Option<i64>,
    /// False when accepted without a signing secret
    pub verified: bool,
}

/// Core trait for payment gateway implementations.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a hosted checkout for a deposit or balance payment.
    async fn create_checkout(&self, request: &CheckoutRequest) -> BookingResult<CheckoutSession>;

    /// Refund a captured payment. `amount` of `None` refunds in full.
    async fn refund(&self, payment_ref: &str, amount: Option<Price>) -> BookingResult<RefundReceipt>;

    /// Verify the signature over the exact body bytes and parse the event.
    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> BookingResult<PaymentEvent>;

    /// Get the provider name (for logging).
    fn provider_name(&self) -> &'static str;
}

/// Redirect targets handed to the gateway
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutUrls {
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutUrls {
    /// Defaults under the service's own base URL
    pub fn new(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            success_url: format!("{}/booking/success", base),
            cancel_url: format!("{}/booking/cancelled", base),
        }
    }

    /// Prefer configured overrides when present
    pub fn with_overrides(&self, success: Option<&str>, cancel: Option<&str>) -> Self {
        Self {
            success_url: success.unwrap_or(&self.success_url).to_string(),
            cancel_url: cancel.unwrap_or(&self.cancel_url).to_string(),
        }
    }

    /// Append the booking reference to both URLs
    pub fn for_booking(&self, booking_id: &str) -> Self {
        let tag = |url: &str| {
            let sep = if url.contains('?') { '&' } else { '?' };
            format!("{}{}booking={}", url, sep, booking_id)
        };
        Self {
            success_url: tag(&self.success_url),
            cancel_url: tag(&self.cancel_url),
        }
    }
}

// =============================================================================
// Calendar
// =============================================================================

/// An appointment on the business calendar
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarEvent {
    pub summary: String,
    pub description: String,
    pub location: Option<String>,
    /// Civil time in `timezone`
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// IANA name, e.g. "Africa/Johannesburg"
    pub timezone: String,
}

#[async_trait]
pub trait CalendarClient: Send + Sync {
    /// Create an event, returning its id
    async fn create_event(&self, event: &CalendarEvent) -> BookingResult<String>;
    async fn update_event(&self, event_id: &str, event: &CalendarEvent) -> BookingResult<()>;
    async fn delete_event(&self, event_id: &str) -> BookingResult<()>;
}

/// Calendar that only logs (used when no calendar is configured)
pub struct LoggingCalendar;

#[async_trait]
impl CalendarClient for LoggingCalendar {
    async fn create_event(&self, event: &CalendarEvent) -> BookingResult<String> {
        info!("Calendar disabled, not creating: {} at {}", event.summary, event.start);
        Ok(format!("local-{}", event.start.format("%Y%m%d%H%M")))
    }

    async fn update_event(&self, event_id: &str, event: &CalendarEvent) -> BookingResult<()> {
        info!("Calendar disabled, not moving {} to {}", event_id, event.start);
        Ok(())
    }

    async fn delete_event(&self, event_id: &str) -> BookingResult<()> {
        info!("Calendar disabled, not deleting {}", event_id);
        Ok(())
    }
}

// =============================================================================
// Notifications
// =============================================================================

/// What happened; the relay picks the template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    AdminNewBooking,
    CustomerConfirmation,
    BalanceRequest,
    CompletionThankYou,
    Cancellation,
    Rescheduled,
    Refunded,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::AdminNewBooking => "admin_new_booking",
            NotificationKind::CustomerConfirmation => "customer_confirmation",
            NotificationKind::BalanceRequest => "balance_request",
            NotificationKind::CompletionThankYou => "completion_thank_you",
            NotificationKind::Cancellation => "cancellation",
            NotificationKind::Rescheduled => "rescheduled",
            NotificationKind::Refunded => "refunded",
        }
    }
}

/// A notification to deliver. Content rendering happens downstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub recipient: String,
    pub business_name: String,
    pub booking: Booking,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> BookingResult<()>;
}

/// Notifier that only logs (used when no relay is configured)
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send(&self, notification: &Notification) -> BookingResult<()> {
        info!(
            "Notification {:?} for {} -> {}",
            notification.kind, notification.booking.id, notification.recipient
        );
        Ok(())
    }
}

// =============================================================================
// Distance
// =============================================================================

/// Driving distance between two addresses
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteDistance {
    pub one_way_km: f64,
    pub duration_minutes: u32,
}

#[async_trait]
pub trait DistanceProvider: Send + Sync {
    async fn distance(&self, origin: &str, destination: &str) -> BookingResult<RouteDistance>;
}

pub type SharedGateway = Arc<dyn PaymentGateway>;
pub type SharedCalendar = Arc<dyn CalendarClient>;
pub type SharedNotifier = Arc<dyn Notifier>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_urls() {
        let urls = CheckoutUrls::new("https://glow.example/");
        assert_eq!(urls.success_url, "https://glow.example/booking/success");

        let tagged = urls.for_booking("BK-ABCDEFGHJK");
        assert_eq!(tagged.success_url, "https://glow.example/booking/success?booking=BK-ABCDEFGHJK");

        let custom = urls
            .with_overrides(Some("https://glow.example/thanks?src=pay"), None)
            .for_booking("BK-ABCDEFGHJK");
        assert_eq!(custom.success_url, "https://glow.example/thanks?src=pay&booking=BK-ABCDEFGHJK");
        assert_eq!(custom.cancel_url, "https://glow.example/booking/cancelled?booking=BK-ABCDEFGHJK");
    }

    #[test]
    fn test_payment_kind_parse() {
        assert_eq!(PaymentKind::parse("Deposit"), Some(PaymentKind::Deposit));
        assert_eq!(PaymentKind::parse("balance"), Some(PaymentKind::Balance));
        assert_eq!(PaymentKind::parse("tip"), None);
    }
}
