//! # Booking Lifecycle
//!
//! The state machine shared by payment webhooks and admin actions.
//!
//! ```text
//!  PendingPayment ──► Confirmed ──► ServiceComplete
//!        │                │                │
//!        ├──► Cancelled ◄─┘                │
//!        │        │                        │
//!        └────────┴──────► Refunded ◄──────┘
//!
//!  balance:  Pending ──► Requested ──► Paid
//! ```
//!
//! Every operation holds a per-booking lock, re-reads the record, decides,
//! writes, and only then enqueues side effects. Repeating an operation that
//! already happened is a successful no-op, which is what makes redelivered
//! webhooks harmless.

use crate::availability::TimeRange;
use crate::booking::{BalanceStatus, Booking, BookingPatch, DepositStatus};
use crate::effects::SideEffects;
use crate::error::{BookingError, BookingResult};
use crate::locks::KeyedLocks;
use crate::ports::{
    CalendarEvent, CheckoutRequest, CheckoutSession, CheckoutUrls, LoggingCalendar, LoggingNotifier,
    Notification, NotificationKind, PaymentKind, SharedCalendar, SharedGateway, SharedNotifier,
};
use crate::reference::ReferenceData;
use crate::schedule::AvailabilityService;
use crate::settings::Settings;
use crate::store::SharedBookingStore;
use chrono::{Duration, NaiveDate};
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Outcome of a lifecycle operation
#[derive(Debug, Clone)]
pub struct Transition {
    /// Booking as stored after the operation
    pub booking: Booking,
    /// False when the operation was a no-op
    pub changed: bool,
    /// Why nothing (or only part) happened
    pub note: Option<&'static str>,
}

impl Transition {
    fn changed(booking: Booking) -> Self {
        Self {
            booking,
            changed: true,
            note: None,
        }
    }

    fn unchanged(booking: Booking, note: &'static str) -> Self {
        Self {
            booking,
            changed: false,
            note: Some(note),
        }
    }
}

/// Who a notification goes to
#[derive(Debug, Clone, Copy)]
enum Audience {
    Customer,
    Admin,
}

pub struct BookingLifecycle {
    store: SharedBookingStore,
    gateway: SharedGateway,
    calendar: SharedCalendar,
    notifier: SharedNotifier,
    reference: Arc<ReferenceData>,
    availability: Arc<AvailabilityService>,
    effects: Arc<SideEffects>,
    urls: CheckoutUrls,
    locks: KeyedLocks,
    /// Serializes calendar effects per booking
    calendar_locks: Arc<KeyedLocks>,
}

impl BookingLifecycle {
    pub fn new(
        store: SharedBookingStore,
        gateway: SharedGateway,
        reference: Arc<ReferenceData>,
        availability: Arc<AvailabilityService>,
        effects: Arc<SideEffects>,
        urls: CheckoutUrls,
    ) -> Self {
        Self {
            store,
            gateway,
            calendar: Arc::new(LoggingCalendar),
            notifier: Arc::new(LoggingNotifier),
            reference,
            availability,
            effects,
            urls,
            locks: KeyedLocks::new(),
            calendar_locks: Arc::new(KeyedLocks::new()),
        }
    }

    /// Builder: set calendar client
    pub fn with_calendar(mut self, calendar: SharedCalendar) -> Self {
        self.calendar = calendar;
        self
    }

    /// Builder: set notifier
    pub fn with_notifier(mut self, notifier: SharedNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn effects(&self) -> &SideEffects {
        &self.effects
    }

    async fn load(&self, id: &str) -> BookingResult<Booking> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| BookingError::not_found(id))
    }

    /// Deposit arrived
    #[instrument(skip(self, payment_ref))]
    pub async fn confirm_deposit(&self, id: &str, payment_ref: Option<&str>) -> BookingResult<Transition> {
        let _guard = self.locks.lock(id).await;
        let booking = self.load(id).await?;

        match booking.deposit_status {
            DepositStatus::Confirmed | DepositStatus::ServiceComplete => {
                info!("Deposit for {} already confirmed", id);
                return Ok(Transition::unchanged(booking, "deposit already confirmed"));
            }
            DepositStatus::Cancelled | DepositStatus::Refunded => {
                warn!(
                    status = %booking.deposit_status,
                    "Deposit for {} arrived after the booking was closed; not reopening",
                    id
                );
                return Ok(Transition::unchanged(booking, "booking is closed"));
            }
            DepositStatus::PendingPayment => {}
        }

        let patch = BookingPatch {
            deposit_status: Some(DepositStatus::Confirmed),
            deposit_payment_ref: payment_ref.map(str::to_string),
            ..BookingPatch::default()
        };
        let booking = self.store.update(id, patch).await?;
        self.availability.invalidate().await;
        info!("Booking {} confirmed for {} {}", id, booking.date, booking.time);

        self.create_calendar_entry(&booking);
        self.notify(NotificationKind::AdminNewBooking, Audience::Admin, &booking, None);
        self.notify(NotificationKind::CustomerConfirmation, Audience::Customer, &booking, None);

        Ok(Transition::changed(booking))
    }

    /// Mark the appointment done and ask for the balance when it is worth collecting
    #[instrument(skip(self))]
    pub async fn complete_service(&self, id: &str) -> BookingResult<Transition> {
        let _guard = self.locks.lock(id).await;
        let booking = self.load(id).await?;

        if matches!(booking.balance_status, BalanceStatus::Requested | BalanceStatus::Paid) {
            return Ok(Transition::unchanged(booking, "balance already requested or paid"));
        }
        if !matches!(
            booking.deposit_status,
            DepositStatus::Confirmed | DepositStatus::ServiceComplete
        ) {
            return Err(BookingError::InvalidTransition(format!(
                "cannot complete a {} booking",
                booking.deposit_status
            )));
        }

        let settings = self.reference.settings().await?;
        if !balance_collectable(&booking, &settings) {
            if booking.deposit_status == DepositStatus::ServiceComplete {
                return Ok(Transition::unchanged(booking, "balance below minimum payable"));
            }
            let booking = self
                .store
                .update(id, BookingPatch::deposit_status(DepositStatus::ServiceComplete))
                .await?;
            info!(
                "Booking {} complete; balance {} below minimum, left for manual collection",
                id,
                booking.amounts.balance.display()
            );
            return Ok(Transition {
                booking,
                changed: true,
                note: Some("balance below minimum payable"),
            });
        }

        let session = self.open_balance_checkout(&booking, &settings).await?;
        let booking = self
            .store
            .update(
                id,
                BookingPatch {
                    deposit_status: Some(DepositStatus::ServiceComplete),
                    balance_status: Some(BalanceStatus::Requested),
                    balance_request_url: Some(session.checkout_url.clone()),
                    ..BookingPatch::default()
                },
            )
            .await?;
        info!("Booking {} complete; balance requested", id);

        self.notify(
            NotificationKind::BalanceRequest,
            Audience::Customer,
            &booking,
            Some(session.checkout_url),
        );
        Ok(Transition::changed(booking))
    }

    /// Admin "request balance": issue (or re-issue) the balance payment link
    #[instrument(skip(self))]
    pub async fn request_balance(&self, id: &str) -> BookingResult<Transition> {
        let _guard = self.locks.lock(id).await;
        let booking = self.load(id).await?;

        if booking.balance_status == BalanceStatus::Paid {
            return Ok(Transition::unchanged(booking, "balance already paid"));
        }
        if !matches!(
            booking.deposit_status,
            DepositStatus::Confirmed | DepositStatus::ServiceComplete
        ) {
            return Err(BookingError::InvalidTransition(format!(
                "cannot request a balance for a {} booking",
                booking.deposit_status
            )));
        }

        let settings = self.reference.settings().await?;
        if !balance_collectable(&booking, &settings) {
            return Ok(Transition::unchanged(booking, "balance below minimum payable"));
        }

        let session = self.open_balance_checkout(&booking, &settings).await?;
        let booking = self
            .store
            .update(
                id,
                BookingPatch {
                    deposit_status: Some(DepositStatus::ServiceComplete),
                    balance_status: Some(BalanceStatus::Requested),
                    balance_request_url: Some(session.checkout_url.clone()),
                    ..BookingPatch::default()
                },
            )
            .await?;
        info!("Balance payment link issued for {}", id);

        self.notify(
            NotificationKind::BalanceRequest,
            Audience::Customer,
            &booking,
            Some(session.checkout_url),
        );
        Ok(Transition::changed(booking))
    }

    /// Balance arrived
    #[instrument(skip(self, payment_ref))]
    pub async fn confirm_balance(&self, id: &str, payment_ref: Option<&str>) -> BookingResult<Transition> {
        let _guard = self.locks.lock(id).await;
        let booking = self.load(id).await?;

        if booking.balance_status == BalanceStatus::Paid {
            info!("Balance for {} already paid", id);
            return Ok(Transition::unchanged(booking, "balance already paid"));
        }
        if !booking.holds_slot() {
            // Money arrived anyway; record it so it can be returned
            warn!(status = %booking.deposit_status, "Balance paid on closed booking {}", id);
        }

        let patch = BookingPatch {
            balance_status: Some(BalanceStatus::Paid),
            balance_payment_ref: payment_ref.map(str::to_string),
            ..BookingPatch::default()
        };
        let booking = self.store.update(id, patch).await?;
        info!("Balance for {} paid", id);

        self.notify(NotificationKind::CompletionThankYou, Audience::Customer, &booking, None);
        Ok(Transition::changed(booking))
    }

    #[instrument(skip(self))]
    pub async fn cancel(&self, id: &str) -> BookingResult<Transition> {
        let _guard = self.locks.lock(id).await;
        let booking = self.load(id).await?;

        if !booking.holds_slot() {
            return Ok(Transition::unchanged(booking, "booking already closed"));
        }
        if !booking.deposit_status.can_transition_to(DepositStatus::Cancelled) {
            return Err(BookingError::InvalidTransition(format!(
                "cannot cancel a {} booking",
                booking.deposit_status
            )));
        }

        let event_id = booking.calendar_event_id.clone();
        let booking = self
            .store
            .update(
                id,
                BookingPatch {
                    deposit_status: Some(DepositStatus::Cancelled),
                    calendar_event_id: event_id.as_ref().map(|_| None),
                    ..BookingPatch::default()
                },
            )
            .await?;
        self.availability.invalidate().await;
        info!("Booking {} cancelled", id);

        if let Some(event_id) = event_id {
            self.delete_calendar_entry(&booking.id, event_id);
        }
        self.notify(NotificationKind::Cancellation, Audience::Customer, &booking, None);
        Ok(Transition::changed(booking))
    }

    /// Refund the deposit in full. The gateway call happens first; if it fails
    /// nothing is recorded.
    #[instrument(skip(self))]
    pub async fn refund(&self, id: &str) -> BookingResult<Transition> {
        let _guard = self.locks.lock(id).await;
        let booking = self.load(id).await?;

        if booking.deposit_status == DepositStatus::Refunded {
            return Ok(Transition::unchanged(booking, "already refunded"));
        }
        if !booking.deposit_status.can_transition_to(DepositStatus::Refunded) {
            return Err(BookingError::InvalidTransition(format!(
                "cannot refund a {} booking",
                booking.deposit_status
            )));
        }
        let payment_ref = booking.deposit_payment_ref.clone().ok_or_else(|| {
            BookingError::Validation(format!("booking {} has no captured deposit to refund", id))
        })?;

        let receipt = self
            .gateway
            .refund(&payment_ref, None)
            .await
            .map_err(|e| BookingError::RefundFailed(e.to_string()))?;
        info!("Refund {} issued for {} ({})", receipt.refund_id, id, receipt.status);

        let event_id = booking.calendar_event_id.clone();
        let booking = self
            .store
            .update(
                id,
                BookingPatch {
                    deposit_status: Some(DepositStatus::Refunded),
                    calendar_event_id: event_id.as_ref().map(|_| None),
                    ..BookingPatch::default()
                },
            )
            .await?;
        self.availability.invalidate().await;

        if let Some(event_id) = event_id {
            self.delete_calendar_entry(&booking.id, event_id);
        }
        self.notify(NotificationKind::Refunded, Audience::Customer, &booking, None);
        Ok(Transition::changed(booking))
    }

    /// Move an active booking to another free slot
    #[instrument(skip(self))]
    pub async fn reschedule(&self, id: &str, date: NaiveDate, time: &str) -> BookingResult<Transition> {
        let range = TimeRange::parse(time)
            .ok_or_else(|| BookingError::Validation(format!("invalid time range '{}'", time)))?;
        let time = range.to_string();

        let _guard = self.locks.lock(id).await;
        let booking = self.load(id).await?;

        if !booking.holds_slot() {
            return Err(BookingError::InvalidTransition(format!(
                "cannot reschedule a {} booking",
                booking.deposit_status
            )));
        }
        if date < self.availability.clock().civil_now().date() {
            return Err(BookingError::Validation(format!("{} is in the past", date)));
        }
        if booking.occupies(date, &time) {
            return Ok(Transition::unchanged(booking, "already in that slot"));
        }
        if !self.availability.is_free_excluding(Some(id), date, &time).await? {
            return Err(BookingError::SlotUnavailable {
                date: date.to_string(),
                time,
            });
        }

        let from = format!("{} {}", booking.date, booking.time);
        let booking = self
            .store
            .update(
                id,
                BookingPatch {
                    date: Some(date),
                    time: Some(time),
                    ..BookingPatch::default()
                },
            )
            .await?;
        self.availability.invalidate().await;
        info!("Booking {} moved from {} to {} {}", id, from, booking.date, booking.time);

        self.move_calendar_entry(&booking);
        self.notify(NotificationKind::Rescheduled, Audience::Customer, &booking, None);
        Ok(Transition::changed(booking))
    }

    /// Apply an admin status change by running the matching operation
    pub async fn apply_admin_status(
        &self,
        id: &str,
        target: DepositStatus,
        payment_ref: Option<&str>,
    ) -> BookingResult<Transition> {
        let current = self.load(id).await?.deposit_status;
        if current != target && !current.can_transition_to(target) {
            return Err(BookingError::InvalidTransition(format!(
                "{} -> {} is not allowed",
                current, target
            )));
        }

        match target {
            DepositStatus::Confirmed => self.confirm_deposit(id, payment_ref).await,
            DepositStatus::ServiceComplete => self.complete_service(id).await,
            DepositStatus::Cancelled => self.cancel(id).await,
            DepositStatus::Refunded => self.refund(id).await,
            DepositStatus::PendingPayment => Err(BookingError::InvalidTransition(
                "bookings cannot return to pending payment".to_string(),
            )),
        }
    }

    async fn open_balance_checkout(
        &self,
        booking: &Booking,
        settings: &Settings,
    ) -> BookingResult<CheckoutSession> {
        let urls = self
            .urls
            .with_overrides(settings.success_url.as_deref(), settings.cancel_url.as_deref())
            .for_booking(&booking.id);
        let request = CheckoutRequest {
            booking_id: booking.id.clone(),
            kind: PaymentKind::Balance,
            amount: booking.amounts.balance,
            description: checkout_description(&settings.business_name, PaymentKind::Balance, booking),
            customer_email: Some(booking.customer.email.clone()).filter(|e| !e.is_empty()),
            success_url: urls.success_url,
            cancel_url: urls.cancel_url,
            idempotency_key: format!(
                "{}-balance-{}",
                booking.id,
                self.availability.clock().now_utc().timestamp()
            ),
        };
        self.gateway.create_checkout(&request).await
    }

    /// Calendar effects work from the stored booking, under a per-booking
    /// lock, so a create and a move for the same booking never both create.
    fn create_calendar_entry(&self, booking: &Booking) {
        let calendar = self.calendar.clone();
        let store = self.store.clone();
        let reference = self.reference.clone();
        let locks = self.calendar_locks.clone();
        let tz = self.availability.clock().timezone();
        let id = booking.id.clone();

        self.effects.enqueue("calendar_create", &booking.id, async move {
            let _guard = locks.lock(&id).await;
            let Some(booking) = store.find_by_id(&id).await? else {
                return Ok(());
            };
            if booking.calendar_event_id.is_some() || !booking.holds_slot() {
                debug!("Calendar entry for {} not needed", id);
                return Ok(());
            }

            let settings = reference.settings_or_default().await;
            let event = calendar_event(&booking, &settings.business_name, tz)?;
            let event_id = calendar.create_event(&event).await?;
            let stored = store
                .update(&id, BookingPatch::calendar_event(Some(event_id.clone())))
                .await?;

            // Closed while the entry was being created
            if !stored.holds_slot() {
                calendar.delete_event(&event_id).await?;
                store.update(&id, BookingPatch::calendar_event(None)).await?;
            }
            Ok(())
        });
    }

    fn delete_calendar_entry(&self, booking_id: &str, event_id: String) {
        let calendar = self.calendar.clone();
        self.effects.enqueue("calendar_delete", booking_id, async move {
            calendar.delete_event(&event_id).await
        });
    }

    /// Update in place; fall back to delete and recreate
    fn move_calendar_entry(&self, booking: &Booking) {
        let calendar = self.calendar.clone();
        let store = self.store.clone();
        let reference = self.reference.clone();
        let locks = self.calendar_locks.clone();
        let tz = self.availability.clock().timezone();
        let id = booking.id.clone();

        self.effects.enqueue("calendar_move", &booking.id, async move {
            let _guard = locks.lock(&id).await;
            let Some(booking) = store.find_by_id(&id).await? else {
                return Ok(());
            };
            if !booking.holds_slot() {
                return Ok(());
            }

            let settings = reference.settings_or_default().await;
            let event = calendar_event(&booking, &settings.business_name, tz)?;

            if let Some(ref event_id) = booking.calendar_event_id {
                match calendar.update_event(event_id, &event).await {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        warn!("Calendar update for {} failed, recreating: {}", id, e);
                        if let Err(e) = calendar.delete_event(event_id).await {
                            debug!("Stale calendar entry {} not deleted: {}", event_id, e);
                        }
                    }
                }
            }

            let event_id = calendar.create_event(&event).await?;
            store
                .update(&id, BookingPatch::calendar_event(Some(event_id)))
                .await?;
            Ok(())
        });
    }

    fn notify(
        &self,
        kind: NotificationKind,
        audience: Audience,
        booking: &Booking,
        payment_url: Option<String>,
    ) {
        let notifier = self.notifier.clone();
        let reference = self.reference.clone();
        let booking = booking.clone();

        self.effects.enqueue(kind.as_str(), &booking.id.clone(), async move {
            let settings = reference.settings_or_default().await;
            let recipient = match audience {
                Audience::Customer => Some(booking.customer.email.clone()).filter(|e| !e.is_empty()),
                Audience::Admin => settings.admin_email.clone(),
            };
            let Some(recipient) = recipient else {
                debug!("No recipient for {} on {}", kind.as_str(), booking.id);
                return Ok(());
            };

            notifier
                .send(&Notification {
                    kind,
                    recipient,
                    business_name: settings.business_name.clone(),
                    booking,
                    payment_url,
                })
                .await
        });
    }
}

/// Balance is positive and at least the configured minimum payable
fn balance_collectable(booking: &Booking, settings: &Settings) -> bool {
    let balance = booking.amounts.balance.amount;
    balance > 0 && balance >= settings.min_payable.amount
}

/// Line item label for a checkout
pub fn checkout_description(business_name: &str, kind: PaymentKind, booking: &Booking) -> String {
    let leg = match kind {
        PaymentKind::Deposit => "Deposit",
        PaymentKind::Balance => "Balance",
    };
    if booking.service_names.is_empty() {
        format!("{} {} ({})", business_name, leg, booking.id)
    } else {
        format!(
            "{} {}: {} ({})",
            business_name,
            leg,
            booking.service_names.join(", "),
            booking.id
        )
    }
}

/// Calendar entry for a booking, in the business timezone
pub fn calendar_event(booking: &Booking, business_name: &str, tz: Tz) -> BookingResult<CalendarEvent> {
    let range = TimeRange::parse(&booking.time).ok_or_else(|| {
        BookingError::Validation(format!("booking {} has malformed time '{}'", booking.id, booking.time))
    })?;
    let midnight = booking.date.and_time(chrono::NaiveTime::MIN);

    let mut description = vec![
        format!("Booking: {}", booking.id),
        format!("Phone: {}", booking.customer.phone),
        format!("Email: {}", booking.customer.email),
        format!(
            "Total: {} (deposit {}, balance {})",
            booking.amounts.total.display(),
            booking.amounts.deposit.display(),
            booking.amounts.balance.display()
        ),
    ];
    if let Some(ref notes) = booking.customer.notes {
        description.push(format!("Notes: {}", notes));
    }

    let services = if booking.service_names.is_empty() {
        business_name.to_string()
    } else {
        booking.service_names.join(", ")
    };

    Ok(CalendarEvent {
        summary: format!("{} - {}", booking.customer.name, services),
        description: description.join("\n"),
        location: booking.customer.address.clone(),
        start: midnight + Duration::minutes(i64::from(range.start)),
        end: midnight + Duration::minutes(i64::from(range.end)),
        timezone: tz.name().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::fixtures::new_booking;
    use crate::money::{Currency, Price};
    use crate::store::BookingStore;
    use crate::testing::Harness;

    fn ninth() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 9).unwrap()
    }

    #[tokio::test]
    async fn test_confirm_deposit_runs_effects_once() {
        let h = Harness::new();
        let booking = h.pending_booking(ninth(), "09:00-10:00").await;

        let first = h.lifecycle.confirm_deposit(&booking.id, Some("pi_1")).await.unwrap();
        assert!(first.changed);
        assert_eq!(first.booking.deposit_status, DepositStatus::Confirmed);

        let second = h.lifecycle.confirm_deposit(&booking.id, Some("pi_1")).await.unwrap();
        assert!(!second.changed);
        h.effects.flush().await;

        assert_eq!(h.calendar.created().len(), 1);
        assert_eq!(h.notifier.count(NotificationKind::CustomerConfirmation), 1);
        assert_eq!(h.notifier.count(NotificationKind::AdminNewBooking), 1);

        let stored = h.booking(&booking.id).await;
        assert_eq!(stored.deposit_payment_ref.as_deref(), Some("pi_1"));
        assert_eq!(stored.calendar_event_id.as_deref(), Some("evt_1"));
    }

    #[tokio::test]
    async fn test_confirm_deposit_does_not_reopen_cancelled() {
        let h = Harness::new();
        let booking = h.pending_booking(ninth(), "09:00-10:00").await;
        h.lifecycle.cancel(&booking.id).await.unwrap();

        let result = h.lifecycle.confirm_deposit(&booking.id, Some("pi_late")).await.unwrap();
        assert!(!result.changed);
        assert_eq!(result.booking.deposit_status, DepositStatus::Cancelled);
        h.effects.flush().await;
        assert!(h.calendar.created().is_empty());
    }

    #[tokio::test]
    async fn test_calendar_failure_does_not_roll_back() {
        let h = Harness::new();
        h.calendar.set_fail_create(true);
        let booking = h.pending_booking(ninth(), "09:00-10:00").await;

        let result = h.lifecycle.confirm_deposit(&booking.id, None).await.unwrap();
        h.effects.flush().await;

        assert_eq!(result.booking.deposit_status, DepositStatus::Confirmed);
        assert_eq!(h.booking(&booking.id).await.deposit_status, DepositStatus::Confirmed);
        assert_eq!(h.notifier.count(NotificationKind::CustomerConfirmation), 1);
    }

    #[tokio::test]
    async fn test_complete_service_requests_balance() {
        let h = Harness::new();
        let booking = h.confirmed_booking(ninth(), "09:00-10:00").await;

        let result = h.lifecycle.complete_service(&booking.id).await.unwrap();
        h.effects.flush().await;

        assert_eq!(result.booking.deposit_status, DepositStatus::ServiceComplete);
        assert_eq!(result.booking.balance_status, BalanceStatus::Requested);
        assert!(result.booking.balance_request_url.is_some());

        let checkouts = h.gateway.checkouts();
        assert_eq!(checkouts.len(), 1);
        assert_eq!(checkouts[0].kind, PaymentKind::Balance);
        assert_eq!(checkouts[0].amount, booking.amounts.balance);
        assert_eq!(h.notifier.count(NotificationKind::BalanceRequest), 1);

        // Second call is a no-op
        let again = h.lifecycle.complete_service(&booking.id).await.unwrap();
        assert!(!again.changed);
        assert_eq!(h.gateway.checkouts().len(), 1);
    }

    #[tokio::test]
    async fn test_sub_threshold_balance_stays_pending() {
        let h = Harness::new();
        h.set_setting("min_payable_amount", "600").await;
        let booking = h.confirmed_booking(ninth(), "09:00-10:00").await;
        assert_eq!(booking.amounts.balance, Price::new(500.0, Currency::ZAR));

        let result = h.lifecycle.complete_service(&booking.id).await.unwrap();
        h.effects.flush().await;

        assert_eq!(result.booking.deposit_status, DepositStatus::ServiceComplete);
        assert_eq!(result.booking.balance_status, BalanceStatus::Pending);
        assert_eq!(result.note, Some("balance below minimum payable"));
        assert!(h.gateway.checkouts().is_empty());
        assert_eq!(h.notifier.count(NotificationKind::BalanceRequest), 0);
    }

    #[tokio::test]
    async fn test_complete_service_requires_confirmed() {
        let h = Harness::new();
        let booking = h.pending_booking(ninth(), "09:00-10:00").await;
        let err = h.lifecycle.complete_service(&booking.id).await.unwrap_err();
        assert!(matches!(err, BookingError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_balance_gateway_failure_records_nothing() {
        let h = Harness::new();
        let booking = h.confirmed_booking(ninth(), "09:00-10:00").await;
        h.gateway.set_fail_checkout(true);

        assert!(h.lifecycle.complete_service(&booking.id).await.is_err());
        let stored = h.booking(&booking.id).await;
        assert_eq!(stored.deposit_status, DepositStatus::Confirmed);
        assert_eq!(stored.balance_status, BalanceStatus::Pending);
    }

    #[tokio::test]
    async fn test_request_balance_reissues_link() {
        let h = Harness::new();
        let booking = h.confirmed_booking(ninth(), "09:00-10:00").await;
        h.lifecycle.complete_service(&booking.id).await.unwrap();

        let result = h.lifecycle.request_balance(&booking.id).await.unwrap();
        assert!(result.changed);
        assert_eq!(h.gateway.checkouts().len(), 2);

        h.lifecycle.confirm_balance(&booking.id, Some("pi_bal")).await.unwrap();
        let paid = h.lifecycle.request_balance(&booking.id).await.unwrap();
        assert!(!paid.changed);
        assert_eq!(h.gateway.checkouts().len(), 2);
    }

    #[tokio::test]
    async fn test_confirm_balance_idempotent() {
        let h = Harness::new();
        let booking = h.confirmed_booking(ninth(), "09:00-10:00").await;
        h.lifecycle.complete_service(&booking.id).await.unwrap();

        let first = h.lifecycle.confirm_balance(&booking.id, Some("pi_bal")).await.unwrap();
        let second = h.lifecycle.confirm_balance(&booking.id, Some("pi_bal")).await.unwrap();
        h.effects.flush().await;

        assert!(first.changed);
        assert!(!second.changed);
        assert_eq!(first.booking.balance_status, BalanceStatus::Paid);
        assert_eq!(first.booking.balance_payment_ref.as_deref(), Some("pi_bal"));
        assert_eq!(h.notifier.count(NotificationKind::CompletionThankYou), 1);
    }

    #[tokio::test]
    async fn test_cancel_releases_slot_and_calendar() {
        let h = Harness::new();
        let booking = h.confirmed_booking(ninth(), "09:00-10:00").await;
        h.effects.flush().await;
        assert!(!h.availability.is_open(ninth(), "09:00-10:00").await.unwrap());

        let result = h.lifecycle.cancel(&booking.id).await.unwrap();
        h.effects.flush().await;

        assert_eq!(result.booking.deposit_status, DepositStatus::Cancelled);
        assert!(result.booking.calendar_event_id.is_none());
        assert_eq!(h.calendar.deleted(), vec!["evt_1".to_string()]);
        assert_eq!(h.notifier.count(NotificationKind::Cancellation), 1);
        assert!(h.availability.is_open(ninth(), "09:00-10:00").await.unwrap());

        let again = h.lifecycle.cancel(&booking.id).await.unwrap();
        assert!(!again.changed);
    }

    #[tokio::test]
    async fn test_cancel_after_completion_rejected() {
        let h = Harness::new();
        let booking = h.confirmed_booking(ninth(), "09:00-10:00").await;
        h.lifecycle.complete_service(&booking.id).await.unwrap();
        let err = h.lifecycle.cancel(&booking.id).await.unwrap_err();
        assert!(matches!(err, BookingError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_refund_success() {
        let h = Harness::new();
        let booking = h.confirmed_booking(ninth(), "09:00-10:00").await;
        h.effects.flush().await;

        let result = h.lifecycle.refund(&booking.id).await.unwrap();
        h.effects.flush().await;

        assert_eq!(result.booking.deposit_status, DepositStatus::Refunded);
        assert_eq!(h.gateway.refunds(), vec!["pi_test".to_string()]);
        assert_eq!(h.calendar.deleted().len(), 1);
        assert_eq!(h.notifier.count(NotificationKind::Refunded), 1);
    }

    #[tokio::test]
    async fn test_refund_failure_leaves_status() {
        let h = Harness::new();
        let booking = h.confirmed_booking(ninth(), "09:00-10:00").await;
        h.gateway.set_fail_refund(true);

        let err = h.lifecycle.refund(&booking.id).await.unwrap_err();
        assert!(matches!(err, BookingError::RefundFailed(_)));
        assert_eq!(h.booking(&booking.id).await.deposit_status, DepositStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_refund_of_cancelled_booking() {
        let h = Harness::new();
        let booking = h.confirmed_booking(ninth(), "09:00-10:00").await;
        h.lifecycle.cancel(&booking.id).await.unwrap();

        let result = h.lifecycle.refund(&booking.id).await.unwrap();
        assert_eq!(result.booking.deposit_status, DepositStatus::Refunded);
    }

    #[tokio::test]
    async fn test_refund_without_deposit_is_rejected() {
        let h = Harness::new();
        let booking = h.pending_booking(ninth(), "09:00-10:00").await;
        let err = h.lifecycle.refund(&booking.id).await.unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
        assert!(h.gateway.refunds().is_empty());
    }

    #[tokio::test]
    async fn test_reschedule_moves_booking_and_calendar() {
        let h = Harness::new();
        let booking = h.confirmed_booking(ninth(), "09:00-10:00").await;
        h.effects.flush().await;
        let sixteenth = NaiveDate::from_ymd_opt(2026, 3, 16).unwrap();

        let result = h
            .lifecycle
            .reschedule(&booking.id, sixteenth, "10:30-11:30")
            .await
            .unwrap();
        h.effects.flush().await;

        assert_eq!(result.booking.date, sixteenth);
        assert_eq!(result.booking.time, "10:30-11:30");
        assert_eq!(h.calendar.updated().len(), 1);
        assert!(h.availability.is_open(ninth(), "09:00-10:00").await.unwrap());
        assert_eq!(h.notifier.count(NotificationKind::Rescheduled), 1);
    }

    #[tokio::test]
    async fn test_reschedule_falls_back_to_recreate() {
        let h = Harness::new();
        let booking = h.confirmed_booking(ninth(), "09:00-10:00").await;
        h.effects.flush().await;
        h.calendar.set_fail_update(true);

        h.lifecycle
            .reschedule(&booking.id, ninth(), "14:00-15:00")
            .await
            .unwrap();
        h.effects.flush().await;

        assert_eq!(h.calendar.deleted(), vec!["evt_1".to_string()]);
        assert_eq!(h.calendar.created().len(), 2);
        assert_eq!(h.booking(&booking.id).await.calendar_event_id.as_deref(), Some("evt_2"));
    }

    #[tokio::test]
    async fn test_reschedule_before_calendar_entry_exists() {
        let h = Harness::new();
        h.calendar.hold_creates();
        let booking = h.confirmed_booking(ninth(), "09:00-10:00").await;
        let sixteenth = NaiveDate::from_ymd_opt(2026, 3, 16).unwrap();

        h.lifecycle
            .reschedule(&booking.id, sixteenth, "10:30-11:30")
            .await
            .unwrap();
        h.calendar.release_creates();
        h.effects.flush().await;

        assert_eq!(h.calendar.created().len(), 1);
        assert_eq!(h.booking(&booking.id).await.calendar_event_id.as_deref(), Some("evt_1"));
        let latest = match h.calendar.updated().pop() {
            Some((event_id, event)) => {
                assert_eq!(event_id, "evt_1");
                event
            }
            None => h.calendar.created()[0].clone(),
        };
        assert_eq!(latest.start.date(), sixteenth);
    }

    #[tokio::test]
    async fn test_reschedule_into_taken_slot_rejected() {
        let h = Harness::new();
        let booking = h.confirmed_booking(ninth(), "09:00-10:00").await;
        h.store.create(new_booking(ninth(), "10:30-11:30")).await.unwrap();

        let err = h
            .lifecycle
            .reschedule(&booking.id, ninth(), "10:30-11:30")
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::SlotUnavailable { .. }));

        let err = h
            .lifecycle
            .reschedule(&booking.id, ninth(), "nonsense")
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
    }

    #[tokio::test]
    async fn test_admin_status_mapping() {
        let h = Harness::new();
        let booking = h.pending_booking(ninth(), "09:00-10:00").await;

        let err = h
            .lifecycle
            .apply_admin_status(&booking.id, DepositStatus::ServiceComplete, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InvalidTransition(_)));

        let confirmed = h
            .lifecycle
            .apply_admin_status(&booking.id, DepositStatus::Confirmed, Some("manual-eft"))
            .await
            .unwrap();
        assert_eq!(confirmed.booking.deposit_payment_ref.as_deref(), Some("manual-eft"));

        let err = h
            .lifecycle
            .apply_admin_status(&booking.id, DepositStatus::PendingPayment, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InvalidTransition(_)));

        let cancelled = h
            .lifecycle
            .apply_admin_status(&booking.id, DepositStatus::Cancelled, None)
            .await
            .unwrap();
        assert_eq!(cancelled.booking.deposit_status, DepositStatus::Cancelled);

        let err = h
            .lifecycle
            .apply_admin_status(&booking.id, DepositStatus::Confirmed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InvalidTransition(_)));
    }

    #[test]
    fn test_calendar_event_times() {
        let new = new_booking(ninth(), "09:00-10:30");
        let booking = Booking::from_new("BK-TEST000001", new, chrono::Utc::now());
        let event = calendar_event(&booking, "Glow Studio", chrono_tz::Africa::Johannesburg).unwrap();

        assert_eq!(event.start, ninth().and_hms_opt(9, 0, 0).unwrap());
        assert_eq!(event.end, ninth().and_hms_opt(10, 30, 0).unwrap());
        assert_eq!(event.timezone, "Africa/Johannesburg");
        assert!(event.summary.starts_with("Thandi M - Gel Overlay"));
        assert!(event.description.contains("BK-TEST000001"));
    }
}
