//! # Payment Webhook Processor
//!
//! Verifies a raw gateway callback, classifies it and drives the lifecycle.
//!
//! Outcomes map to HTTP as follows: anything verified and classified
//! (processed, duplicate, ignored) is acknowledged with 200 so the gateway
//! stops retrying. A bad signature is an error (401). A failed state write is
//! an error (500) so the gateway redelivers.

use crate::booking::is_well_formed_booking_id;
use crate::error::{BookingError, BookingResult};
use crate::lifecycle::BookingLifecycle;
use crate::ports::{PaymentEventType, PaymentKind, SharedGateway};
use crate::store::SharedBookingStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// What happened to one webhook delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// State changed
    Processed { booking_id: String, kind: PaymentKind },
    /// Already applied earlier
    Duplicate { booking_id: String },
    /// Acknowledged and discarded
    Ignored { reason: String },
}

impl WebhookOutcome {
    fn ignored(reason: impl Into<String>) -> Self {
        WebhookOutcome::Ignored {
            reason: reason.into(),
        }
    }
}

pub struct PaymentWebhookProcessor {
    gateway: SharedGateway,
    store: SharedBookingStore,
    lifecycle: Arc<BookingLifecycle>,
}

impl PaymentWebhookProcessor {
    pub fn new(gateway: SharedGateway, store: SharedBookingStore, lifecycle: Arc<BookingLifecycle>) -> Self {
        Self {
            gateway,
            store,
            lifecycle,
        }
    }

    #[instrument(skip(self, payload, signature), fields(bytes = payload.len()))]
    pub async fn process(&self, payload: &[u8], signature: Option<&str>) -> BookingResult<WebhookOutcome> {
        let event = match self.gateway.verify_webhook(payload, signature).await {
            Ok(event) => event,
            Err(BookingError::WebhookParseError(e)) => {
                warn!("Unparseable webhook acknowledged: {}", e);
                return Ok(WebhookOutcome::ignored("unparseable payload"));
            }
            Err(e) => return Err(e),
        };

        info!(
            "Webhook event {} ({:?}) from {}",
            event.event_id,
            event.event_type,
            self.gateway.provider_name()
        );

        if let PaymentEventType::Other(name) = &event.event_type {
            return Ok(WebhookOutcome::ignored(format!("event {} not handled", name)));
        }

        let Some(booking_id) = event.booking_id.clone() else {
            warn!("Payment event {} carries no booking reference", event.event_id);
            return Ok(WebhookOutcome::ignored("no booking reference"));
        };

        if !is_well_formed_booking_id(&booking_id) {
            warn!("Payment event {} carries malformed booking reference {}", event.event_id, booking_id);
            return Ok(WebhookOutcome::ignored("malformed booking reference"));
        }

        if self.store.find_by_id(&booking_id).await?.is_none() {
            warn!("Payment event {} for unknown booking {}", event.event_id, booking_id);
            return Ok(WebhookOutcome::ignored(format!("unknown booking {}", booking_id)));
        }

        let kind = event.kind.unwrap_or(PaymentKind::Deposit);
        let payment_ref = event.payment_ref.as_deref();
        let transition = match kind {
            PaymentKind::Deposit => self.lifecycle.confirm_deposit(&booking_id, payment_ref).await?,
            PaymentKind::Balance => self.lifecycle.confirm_balance(&booking_id, payment_ref).await?,
        };

        Ok(if transition.changed {
            WebhookOutcome::Processed { booking_id, kind }
        } else {
            WebhookOutcome::Duplicate { booking_id }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::{BalanceStatus, DepositStatus};
    use crate::ports::NotificationKind;
    use crate::testing::Harness;
    use chrono::NaiveDate;
    use serde_json::json;

    fn ninth() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 9).unwrap()
    }

    fn paid(booking_id: &str, kind: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "evt_1",
            "type": "payment_succeeded",
            "booking_id": booking_id,
            "payment_type": kind,
            "payment_ref": "pi_hook"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_deposit_webhook() {
        let h = Harness::new();
        let booking = h.pending_booking(ninth(), "09:00-10:00").await;
        let processor = h.webhooks();
        let body = paid(&booking.id, "deposit");

        let first = processor.process(&body, Some("sig")).await.unwrap();
        let second = processor.process(&body, Some("sig")).await.unwrap();
        h.effects.flush().await;

        assert_eq!(
            first,
            WebhookOutcome::Processed {
                booking_id: booking.id.clone(),
                kind: PaymentKind::Deposit
            }
        );
        assert_eq!(second, WebhookOutcome::Duplicate { booking_id: booking.id.clone() });
        assert_eq!(h.calendar.created().len(), 1);
        assert_eq!(h.notifier.count(NotificationKind::CustomerConfirmation), 1);
        assert_eq!(h.booking(&booking.id).await.deposit_status, DepositStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_bad_signature_never_mutates() {
        let h = Harness::new();
        let booking = h.pending_booking(ninth(), "09:00-10:00").await;

        let err = h
            .webhooks()
            .process(&paid(&booking.id, "deposit"), Some("bad"))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::WebhookVerificationFailed(_)));
        assert_eq!(err.status_code(), 401);
        assert_eq!(h.booking(&booking.id).await.deposit_status, DepositStatus::PendingPayment);
    }

    #[tokio::test]
    async fn test_unhandled_and_unknown_events_ignored() {
        let h = Harness::new();
        let processor = h.webhooks();

        let other = serde_json::to_vec(&json!({"id": "evt_2", "type": "charge.refunded"})).unwrap();
        assert!(matches!(
            processor.process(&other, None).await.unwrap(),
            WebhookOutcome::Ignored { .. }
        ));

        let unknown = paid("BK-7K3QX9M2PA", "deposit");
        assert_eq!(
            processor.process(&unknown, None).await.unwrap(),
            WebhookOutcome::ignored("unknown booking BK-7K3QX9M2PA")
        );

        // Rejected on shape alone, before any store read
        let malformed = paid("BK-NOPE000000", "deposit");
        assert_eq!(
            processor.process(&malformed, None).await.unwrap(),
            WebhookOutcome::ignored("malformed booking reference")
        );

        let garbage = processor.process(b"not json", None).await.unwrap();
        assert!(matches!(garbage, WebhookOutcome::Ignored { .. }));

        let no_ref = serde_json::to_vec(&json!({"id": "evt_3", "type": "payment_succeeded"})).unwrap();
        assert!(matches!(
            processor.process(&no_ref, None).await.unwrap(),
            WebhookOutcome::Ignored { .. }
        ));
    }

    #[tokio::test]
    async fn test_balance_webhook_marks_paid() {
        let h = Harness::new();
        let booking = h.confirmed_booking(ninth(), "09:00-10:00").await;
        h.lifecycle.complete_service(&booking.id).await.unwrap();

        let outcome = h.webhooks().process(&paid(&booking.id, "balance"), None).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Processed { kind: PaymentKind::Balance, .. }));

        let stored = h.booking(&booking.id).await;
        assert_eq!(stored.balance_status, BalanceStatus::Paid);
        assert_eq!(stored.balance_payment_ref.as_deref(), Some("pi_hook"));
    }

    #[tokio::test]
    async fn test_store_failure_is_an_error() {
        let h = Harness::new();
        let booking = h.pending_booking(ninth(), "09:00-10:00").await;
        h.store.set_bookings_offline(true);

        let err = h
            .webhooks()
            .process(&paid(&booking.id, "deposit"), None)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 502);
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(WebhookOutcome::Duplicate {
            booking_id: "BK-TEST000001".into(),
        })
        .unwrap();
        assert_eq!(json["outcome"], "duplicate");
    }
}
