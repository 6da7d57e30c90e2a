//! Recording doubles and a wired-up harness for tests.
//!
//! Compiled for this crate's own tests and, behind the `testing` feature, for
//! downstream crates' tests.

use crate::availability::TemplateSlot;
use crate::booking::fixtures::new_booking;
use crate::booking::Booking;
use crate::clock::{BusinessClock, FixedClock};
use crate::effects::SideEffects;
use crate::error::{BookingError, BookingResult};
use crate::intake::BookingIntake;
use crate::lifecycle::BookingLifecycle;
use crate::memory::{InMemoryStore, Seed};
use crate::money::{Currency, Price};
use crate::ports::{
    CalendarClient, CalendarEvent, CheckoutRequest, CheckoutSession, CheckoutUrls, Notification,
    NotificationKind, Notifier, PaymentEvent, PaymentEventType, PaymentGateway, PaymentKind,
    RefundReceipt,
};
use crate::reference::{CacheTtls, ReferenceData};
use crate::schedule::AvailabilityService;
use crate::service::Service;
use crate::store::BookingStore;
use crate::webhook::PaymentWebhookProcessor;
use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc, Weekday};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Semaphore;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

/// Gateway that records calls and accepts a simple JSON event format:
/// `{"id", "type", "booking_id", "payment_type", "payment_ref"}` where a
/// `type` of `payment_succeeded` counts as paid. A signature of `bad` fails
/// verification.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    checkouts: Mutex<Vec<CheckoutRequest>>,
    refunds: Mutex<Vec<String>>,
    fail_checkout: AtomicBool,
    fail_refund: AtomicBool,
}

#[derive(Deserialize)]
struct TestEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    booking_id: Option<String>,
    payment_type: Option<String>,
    payment_ref: Option<String>,
}

impl RecordingGateway {
    pub fn checkouts(&self) -> Vec<CheckoutRequest> {
        lock(&self.checkouts).clone()
    }

    pub fn refunds(&self) -> Vec<String> {
        lock(&self.refunds).clone()
    }

    pub fn set_fail_checkout(&self, fail: bool) {
        self.fail_checkout.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_refund(&self, fail: bool) {
        self.fail_refund.store(fail, Ordering::SeqCst);
    }

    fn provider_error(message: &str) -> BookingError {
        BookingError::ProviderError {
            provider: "recording".to_string(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl PaymentGateway for RecordingGateway {
    async fn create_checkout(&self, request: &CheckoutRequest) -> BookingResult<CheckoutSession> {
        if self.fail_checkout.load(Ordering::SeqCst) {
            return Err(Self::provider_error("checkout declined"));
        }
        let mut checkouts = lock(&self.checkouts);
        checkouts.push(request.clone());
        let session_id = format!("cs_test_{}", checkouts.len());
        Ok(CheckoutSession {
            checkout_url: format!("https://pay.test/{}", session_id),
            session_id,
            provider: "recording".to_string(),
            expires_at: None,
        })
    }

    async fn refund(&self, payment_ref: &str, amount: Option<Price>) -> BookingResult<RefundReceipt> {
        if self.fail_refund.load(Ordering::SeqCst) {
            return Err(Self::provider_error("refund declined"));
        }
        let mut refunds = lock(&self.refunds);
        refunds.push(payment_ref.to_string());
        Ok(RefundReceipt {
            refund_id: format!("re_test_{}", refunds.len()),
            amount: amount.map(|p| p.amount),
            status: "succeeded".to_string(),
        })
    }

    async fn verify_webhook(&self, payload: &[u8], signature: Option<&str>) -> BookingResult<PaymentEvent> {
        if signature == Some("bad") {
            return Err(BookingError::WebhookVerificationFailed("signature mismatch".to_string()));
        }
        let event: TestEvent = serde_json::from_slice(payload)
            .map_err(|e| BookingError::WebhookParseError(e.to_string()))?;
        Ok(PaymentEvent {
            event_id: event.id,
            event_type: if event.event_type == "payment_succeeded" {
                PaymentEventType::PaymentSucceeded
            } else {
                PaymentEventType::Other(event.event_type)
            },
            booking_id: event.booking_id,
            kind: event.payment_type.as_deref().and_then(PaymentKind::parse),
            payment_ref: event.payment_ref,
            amount: None,
            verified: signature.is_some(),
        })
    }

    fn provider_name(&self) -> &'static str {
        "recording"
    }
}

/// Calendar that records events and hands out `evt_<n>` ids
#[derive(Debug, Default)]
pub struct RecordingCalendar {
    created: Mutex<Vec<CalendarEvent>>,
    updated: Mutex<Vec<(String, CalendarEvent)>>,
    deleted: Mutex<Vec<String>>,
    fail_create: AtomicBool,
    fail_update: AtomicBool,
    create_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl RecordingCalendar {
    pub fn created(&self) -> Vec<CalendarEvent> {
        lock(&self.created).clone()
    }

    pub fn updated(&self) -> Vec<(String, CalendarEvent)> {
        lock(&self.updated).clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        lock(&self.deleted).clone()
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_update(&self, fail: bool) {
        self.fail_update.store(fail, Ordering::SeqCst);
    }

    /// Park `create_event` calls until `release_creates`
    pub fn hold_creates(&self) {
        *lock(&self.create_gate) = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_creates(&self) {
        if let Some(gate) = lock(&self.create_gate).take() {
            gate.add_permits(1024);
        }
    }
}

#[async_trait]
impl CalendarClient for RecordingCalendar {
    async fn create_event(&self, event: &CalendarEvent) -> BookingResult<String> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(BookingError::NetworkError("calendar unavailable".to_string()));
        }
        let gate = lock(&self.create_gate).clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await;
        }
        let mut created = lock(&self.created);
        created.push(event.clone());
        Ok(format!("evt_{}", created.len()))
    }

    async fn update_event(&self, event_id: &str, event: &CalendarEvent) -> BookingResult<()> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(BookingError::NetworkError("calendar unavailable".to_string()));
        }
        lock(&self.updated).push((event_id.to_string(), event.clone()));
        Ok(())
    }

    async fn delete_event(&self, event_id: &str) -> BookingResult<()> {
        lock(&self.deleted).push(event_id.to_string());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        lock(&self.sent).clone()
    }

    pub fn count(&self, kind: NotificationKind) -> usize {
        lock(&self.sent).iter().filter(|n| n.kind == kind).count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> BookingResult<()> {
        lock(&self.sent).push(notification.clone());
        Ok(())
    }
}

/// Reference data used by the harness: two services priced 450 and 550,
/// three Monday slots and a 50 % deposit.
pub fn sample_seed() -> Seed {
    let settings: HashMap<String, String> = [
        ("deposit_percent", "50"),
        ("min_payable_amount", "10"),
        ("currency", "zar"),
        ("admin_email", "owner@glow.example"),
        ("business_name", "Glow Studio"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    Seed {
        settings,
        services: vec![
            Service::new("gel", "Gel Overlay", Price::new(450.0, Currency::ZAR), 60).with_category("nails"),
            Service::new("lash", "Lash Lift", Price::new(550.0, Currency::ZAR), 45).with_category("lashes"),
        ],
        availability: vec![
            TemplateSlot::new(Weekday::Mon, "09:00-10:00"),
            TemplateSlot::new(Weekday::Mon, "10:30-11:30"),
            TemplateSlot::new(Weekday::Mon, "14:00-15:00"),
        ],
    }
}

/// Every core component wired against in-memory and recording doubles.
///
/// The business clock is pinned to 2026-03-01 08:00 Africa/Johannesburg.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub gateway: Arc<RecordingGateway>,
    pub calendar: Arc<RecordingCalendar>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: FixedClock,
    pub reference: Arc<ReferenceData>,
    pub availability: Arc<AvailabilityService>,
    pub effects: Arc<SideEffects>,
    pub lifecycle: Arc<BookingLifecycle>,
    pub urls: CheckoutUrls,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with_seed(sample_seed())
    }

    pub fn with_seed(seed: Seed) -> Self {
        let store = Arc::new(InMemoryStore::from_seed(seed));
        let gateway = Arc::new(RecordingGateway::default());
        let calendar = Arc::new(RecordingCalendar::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).single().unwrap_or_default());
        let business_clock = BusinessClock::new(Arc::new(clock.clone()), chrono_tz::Africa::Johannesburg);

        let reference = Arc::new(ReferenceData::new(store.clone(), CacheTtls::default()));
        let availability = Arc::new(AvailabilityService::new(
            reference.clone(),
            store.clone(),
            business_clock,
        ));
        let effects = Arc::new(SideEffects::new(Duration::from_secs(5)));
        let urls = CheckoutUrls::new("https://glow.example");
        let lifecycle = Arc::new(
            BookingLifecycle::new(
                store.clone(),
                gateway.clone(),
                reference.clone(),
                availability.clone(),
                effects.clone(),
                urls.clone(),
            )
            .with_calendar(calendar.clone())
            .with_notifier(notifier.clone()),
        );

        Self {
            store,
            gateway,
            calendar,
            notifier,
            clock,
            reference,
            availability,
            effects,
            lifecycle,
            urls,
        }
    }

    pub fn intake(&self) -> BookingIntake {
        BookingIntake::new(
            self.store.clone(),
            self.gateway.clone(),
            self.reference.clone(),
            self.availability.clone(),
            self.urls.clone(),
        )
    }

    pub fn webhooks(&self) -> PaymentWebhookProcessor {
        PaymentWebhookProcessor::new(self.gateway.clone(), self.store.clone(), self.lifecycle.clone())
    }

    /// Write a setting through the cache
    pub async fn set_setting(&self, key: &str, value: &str) {
        if let Err(e) = self.reference.put_setting(key, value).await {
            panic!("setting {} failed: {}", key, e);
        }
    }

    /// Stored booking by id; panics when missing
    pub async fn booking(&self, id: &str) -> Booking {
        match self.store.find_by_id(id).await {
            Ok(Some(booking)) => booking,
            other => panic!("booking {} not found: {:?}", id, other),
        }
    }

    /// A fresh `PendingPayment` booking (services 450 + 550)
    pub async fn pending_booking(&self, date: NaiveDate, time: &str) -> Booking {
        match self.store.create(new_booking(date, time)).await {
            Ok(booking) => booking,
            Err(e) => panic!("create failed: {}", e),
        }
    }

    /// A booking whose deposit was paid with reference `pi_test`
    pub async fn confirmed_booking(&self, date: NaiveDate, time: &str) -> Booking {
        let booking = self.pending_booking(date, time).await;
        match self.lifecycle.confirm_deposit(&booking.id, Some("pi_test")).await {
            Ok(transition) => transition.booking,
            Err(e) => panic!("confirm failed: {}", e),
        }
    }
}
