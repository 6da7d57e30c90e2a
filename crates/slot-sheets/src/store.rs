//! # Sheets Store
//!
//! `BookingStore` and `ReferenceStore` over the spreadsheet row API.
//!
//! The row API has no conditional write. Creates take a per-slot lease and
//! re-read the bookings table before appending, which closes the race
//! inside one process only. Two instances writing the same sheet can still
//! both win a slot.

use crate::client::{Row, SheetsClient};
use crate::config::SheetsConfig;
use crate::rows::{
    booking_from_row, booking_to_row, service_from_row, setting_row, settings_from_rows,
    template_from_row, AVAILABILITY, BOOKINGS, BOOKING_ID, SERVICES, SETTINGS,
};
use async_trait::async_trait;
use chrono::Utc;
use slot_core::{
    canonical_slot, generate_booking_id, Booking, BookingError, BookingPatch, BookingResult,
    BookingStore, KeyedLocks, MonthKey, NewBooking, ReferenceStore, Service, TemplateSlot,
};
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

pub struct SheetsStore {
    client: SheetsClient,
    slot_locks: KeyedLocks,
    row_locks: KeyedLocks,
}

impl SheetsStore {
    pub fn new(config: SheetsConfig) -> BookingResult<Self> {
        Ok(Self {
            client: SheetsClient::new(config)?,
            slot_locks: KeyedLocks::new(),
            row_locks: KeyedLocks::new(),
        })
    }

    /// Every readable booking row; unreadable rows are skipped with a warning
    async fn bookings(&self) -> BookingResult<Vec<Booking>> {
        let rows = self.client.rows(BOOKINGS).await?;
        Ok(rows
            .iter()
            .filter_map(|row| match booking_from_row(row) {
                Ok(booking) => Some(booking),
                Err(e) => {
                    warn!("Skipping booking row: {}", e);
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl BookingStore for SheetsStore {
    #[instrument(skip(self, new), fields(date = %new.date, time = %new.time))]
    async fn create(&self, new: NewBooking) -> BookingResult<Booking> {
        let slot = canonical_slot(&new.time);
        let _lease = self
            .slot_locks
            .lock(&format!("{}|{}", new.date, slot))
            .await;

        let existing = self.bookings().await?;
        if existing
            .iter()
            .any(|b| b.holds_slot() && b.occupies(new.date, &slot))
        {
            return Err(BookingError::SlotUnavailable {
                date: new.date.to_string(),
                time: slot,
            });
        }

        let mut id = generate_booking_id();
        while existing.iter().any(|b| b.id == id) {
            id = generate_booking_id();
        }

        let booking = Booking::from_new(id, new, Utc::now());
        self.client.append(BOOKINGS, booking_to_row(&booking)).await?;

        info!(booking_id = %booking.id, "Booking row appended");
        Ok(booking)
    }

    async fn find_by_id(&self, id: &str) -> BookingResult<Option<Booking>> {
        let rows = self.client.rows(BOOKINGS).await?;
        rows.iter()
            .find(|row| row.get(BOOKING_ID).and_then(|v| v.as_str()).map(str::trim) == Some(id))
            .map(booking_from_row)
            .transpose()
    }

    #[instrument(skip(self, patch))]
    async fn update(&self, id: &str, patch: BookingPatch) -> BookingResult<Booking> {
        let _guard = self.row_locks.lock(id).await;

        let mut booking = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| BookingError::not_found(id))?;
        if patch.is_empty() {
            return Ok(booking);
        }
        patch.apply(&mut booking);

        let mut changes: Row = booking_to_row(&booking);
        changes.remove(BOOKING_ID);

        let updated = self
            .client
            .update_where(BOOKINGS, BOOKING_ID, id, changes)
            .await?;
        if updated == 0 {
            return Err(BookingError::not_found(id));
        }

        debug!(booking_id = %id, status = %booking.deposit_status, "Booking row updated");
        Ok(booking)
    }

    async fn list_by_month(&self, month: MonthKey) -> BookingResult<Vec<Booking>> {
        Ok(self
            .bookings()
            .await?
            .into_iter()
            .filter(|b| month.contains(b.date))
            .collect())
    }

    async fn list_all(&self) -> BookingResult<Vec<Booking>> {
        self.bookings().await
    }
}

#[async_trait]
impl ReferenceStore for SheetsStore {
    async fn fetch_settings(&self) -> BookingResult<HashMap<String, String>> {
        let rows = self.client.rows(SETTINGS).await?;
        Ok(settings_from_rows(&rows))
    }

    async fn fetch_services(&self) -> BookingResult<Vec<Service>> {
        let rows = self.client.rows(SERVICES).await?;
        Ok(rows.iter().filter_map(service_from_row).collect())
    }

    async fn fetch_template(&self) -> BookingResult<Vec<TemplateSlot>> {
        let rows = self.client.rows(AVAILABILITY).await?;
        Ok(rows.iter().filter_map(template_from_row).collect())
    }

    async fn put_setting(&self, key: &str, value: &str) -> BookingResult<()> {
        let _guard = self.row_locks.lock(&format!("setting:{}", key)).await;

        let mut changes = Row::new();
        changes.insert("value".to_string(), value.into());

        let updated = self.client.update_where(SETTINGS, "key", key, changes).await?;
        if updated == 0 {
            self.client.append(SETTINGS, setting_row(key, value)).await?;
        }
        info!(key, "Setting written");
        Ok(())
    }
}
