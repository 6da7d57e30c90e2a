//! # Store Traits
//!
//! `BookingStore` is the only path to booking records. `ReferenceStore`
//! reads the operator-edited tables (settings, services, weekly template).
//!
//! Writes are visible to the same adapter's next call. Caches wrapping these
//! stores are not updated automatically; whoever mutates bookings busts them.

use crate::availability::{MonthKey, TemplateSlot};
use crate::booking::{Booking, BookingPatch, NewBooking};
use crate::error::BookingResult;
use crate::service::Service;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Insert a new `PendingPayment` booking with a fresh reference.
    ///
    /// Conditional on the slot: fails with `SlotUnavailable` when another
    /// booking that still holds a slot occupies the same date and time.
    async fn create(&self, new: NewBooking) -> BookingResult<Booking>;

    async fn find_by_id(&self, id: &str) -> BookingResult<Option<Booking>>;

    /// Apply `patch` and return the updated record
    async fn update(&self, id: &str, patch: BookingPatch) -> BookingResult<Booking>;

    /// Every booking dated inside `month`, any status
    async fn list_by_month(&self, month: MonthKey) -> BookingResult<Vec<Booking>>;

    /// Every booking. Unpaginated.
    async fn list_all(&self) -> BookingResult<Vec<Booking>>;
}

#[async_trait]
pub trait ReferenceStore: Send + Sync {
    async fn fetch_settings(&self) -> BookingResult<HashMap<String, String>>;

    async fn fetch_services(&self) -> BookingResult<Vec<Service>>;

    async fn fetch_template(&self) -> BookingResult<Vec<TemplateSlot>>;

    /// Upsert one settings row
    async fn put_setting(&self, key: &str, value: &str) -> BookingResult<()>;
}

pub type SharedBookingStore = Arc<dyn BookingStore>;
pub type SharedReferenceStore = Arc<dyn ReferenceStore>;
