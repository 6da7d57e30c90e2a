//! # slot-core
//!
//! Core types, availability engine and booking lifecycle for slotkeeper.
//!
//! This crate provides:
//! - `BookingStore` and `ReferenceStore` traits for the external record store
//! - `TtlCache` and `ReferenceData` for the cached settings, catalog and weekly template
//! - `compute_availability` and `AvailabilityService` for bookable slots
//! - `BookingIntake` for turning requests into `PendingPayment` bookings
//! - `BookingLifecycle` for deposit, balance, cancel, refund and reschedule transitions
//! - `PaymentWebhookProcessor` for idempotent payment callbacks
//! - `PaymentGateway`, `CalendarClient`, `Notifier` and `DistanceProvider` ports
//! - `BookingError` for typed error handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use slot_core::{BookingIntake, BookingRequest, MonthKey};
//!
//! // Bookable slots for March
//! let month = availability.month(MonthKey::parse("2026-03").unwrap()).await?;
//!
//! // Create a booking and get the deposit checkout link
//! let receipt = intake.submit(&request).await?;
//!
//! // Later, from the payment webhook
//! let outcome = webhooks.process(&body, signature).await?;
//! ```

pub mod availability;
pub mod booking;
pub mod cache;
pub mod clock;
pub mod effects;
pub mod error;
pub mod intake;
pub mod lifecycle;
pub mod locks;
pub mod memory;
pub mod money;
pub mod ports;
pub mod reference;
pub mod schedule;
pub mod service;
pub mod settings;
pub mod store;
pub mod travel;
pub mod webhook;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-exports for convenience
pub use availability::{
    canonical_slot, compute_availability, is_slot_open, parse_weekday, BookedSlot, MonthAvailability,
    MonthKey, TemplateSlot, TimeRange, WeeklyTemplate,
};
pub use booking::{
    generate_booking_id, is_well_formed_booking_id, BalanceStatus, Booking, BookingAmounts,
    BookingPatch, Customer, DepositStatus, NewBooking, PublicBookingStatus,
};
pub use cache::TtlCache;
pub use clock::{BusinessClock, Clock, FixedClock, SystemClock};
pub use effects::SideEffects;
pub use error::{BookingError, BookingResult};
pub use intake::{BookingIntake, BookingRequest, IntakeReceipt};
pub use lifecycle::{BookingLifecycle, Transition};
pub use locks::KeyedLocks;
pub use memory::{InMemoryStore, Seed};
pub use money::{Currency, DepositSplit, Price};
pub use ports::{
    CalendarClient, CalendarEvent, CheckoutRequest, CheckoutSession, CheckoutUrls, DistanceProvider,
    LoggingCalendar, LoggingNotifier, Notification, NotificationKind, Notifier, PaymentEvent,
    PaymentEventType, PaymentGateway, PaymentKind, RefundReceipt, RouteDistance, SharedCalendar,
    SharedGateway, SharedNotifier,
};
pub use reference::{CacheTtls, ReferenceData};
pub use schedule::AvailabilityService;
pub use service::{Service, ServiceCatalog, ServiceSelection};
pub use settings::{Settings, ADMIN_PASSWORD_KEY};
pub use store::{BookingStore, ReferenceStore, SharedBookingStore, SharedReferenceStore};
pub use travel::{TravelQuote, TravelQuoter};
pub use webhook::{PaymentWebhookProcessor, WebhookOutcome};
