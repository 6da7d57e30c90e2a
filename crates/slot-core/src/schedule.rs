//! # Availability Service
//!
//! Feeds the pure engine in `availability` with cached template data, the
//! month's active bookings and the business clock. Month results are cached
//! briefly and dropped by every booking mutation through [`AvailabilityService::invalidate`].
//!
//! Slot checks made before writing (`is_open`, `is_free_excluding`) always
//! scan the store live and never read the month cache.

use crate::availability::{compute_availability, is_slot_open, BookedSlot, MonthAvailability, MonthKey};
use crate::booking::Booking;
use crate::cache::TtlCache;
use crate::clock::BusinessClock;
use crate::error::BookingResult;
use crate::reference::ReferenceData;
use crate::store::SharedBookingStore;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// How long a computed month stays cached
pub const MONTH_CACHE_TTL: Duration = Duration::from_secs(60);

pub struct AvailabilityService {
    reference: Arc<ReferenceData>,
    store: SharedBookingStore,
    clock: BusinessClock,
    months: TtlCache<MonthKey, Arc<MonthAvailability>>,
}

impl AvailabilityService {
    pub fn new(reference: Arc<ReferenceData>, store: SharedBookingStore, clock: BusinessClock) -> Self {
        Self {
            reference,
            store,
            clock,
            months: TtlCache::new("month_availability", MONTH_CACHE_TTL),
        }
    }

    pub fn clock(&self) -> &BusinessClock {
        &self.clock
    }

    /// Bookable slots per date for `month`
    #[instrument(skip_all, fields(month = %month))]
    pub async fn month(&self, month: MonthKey) -> BookingResult<Arc<MonthAvailability>> {
        self.months
            .get_or_fetch(month, || async move {
                let template = self.reference.template().await?;
                let bookings = self.store.list_by_month(month).await?;
                let booked = booked_slots(&bookings, None);
                let computed = compute_availability(month, &template, &booked, self.clock.civil_now());
                debug!(dates = computed.len(), booked = booked.len(), "Computed availability");
                Ok(Arc::new(computed))
            })
            .await
    }

    /// Live check: template slot, not elapsed, not held by an active booking
    pub async fn is_open(&self, date: NaiveDate, time: &str) -> BookingResult<bool> {
        self.is_free_excluding(None, date, time).await
    }

    /// Same as [`is_open`](Self::is_open) but ignores the booking `exclude`,
    /// so a booking can be moved onto a slot it already holds.
    pub async fn is_free_excluding(
        &self,
        exclude: Option<&str>,
        date: NaiveDate,
        time: &str,
    ) -> BookingResult<bool> {
        let template = self.reference.template().await?;
        let bookings = self.store.list_by_month(MonthKey::of(date)).await?;
        let booked = booked_slots(&bookings, exclude);
        Ok(is_slot_open(date, time, &template, &booked, self.clock.civil_now()))
    }

    /// Drop every cached month
    pub async fn invalidate(&self) {
        self.months.invalidate_all().await;
    }
}

fn booked_slots(bookings: &[Booking], exclude: Option<&str>) -> Vec<BookedSlot> {
    bookings
        .iter()
        .filter(|b| b.holds_slot())
        .filter(|b| exclude != Some(b.id.as_str()))
        .map(|b| BookedSlot::new(b.date, b.time.clone()))
        .collect()
}
