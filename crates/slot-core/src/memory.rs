//! # In-Memory Store
//!
//! Process-local implementation of both store traits. Used for local
//! development (seeded from `config/seed.toml`) and by the test suites.
//! Slot-conditional creates are atomic here: check and insert happen under
//! one write lock.

use crate::availability::{MonthKey, TemplateSlot};
use crate::booking::{generate_booking_id, Booking, BookingPatch, NewBooking};
use crate::error::{BookingError, BookingResult};
use crate::service::Service;
use crate::store::{BookingStore, ReferenceStore};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// Reference data a fresh in-memory store starts with
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub settings: HashMap<String, String>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub availability: Vec<TemplateSlot>,
}

impl Seed {
    /// Load seed data from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }
}

/// How many times each reference table was read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchCounts {
    pub settings: usize,
    pub services: usize,
    pub template: usize,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    bookings: RwLock<Vec<Booking>>,
    settings: RwLock<HashMap<String, String>>,
    services: RwLock<Vec<Service>>,
    template: RwLock<Vec<TemplateSlot>>,
    offline: AtomicBool,
    bookings_offline: AtomicBool,
    settings_reads: AtomicUsize,
    services_reads: AtomicUsize,
    template_reads: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: Seed) -> Self {
        Self {
            settings: RwLock::new(seed.settings),
            services: RwLock::new(seed.services),
            template: RwLock::new(seed.availability),
            ..Self::default()
        }
    }

    /// Simulate the upstream being unreachable for reference reads
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Simulate booking reads and writes failing
    pub fn set_bookings_offline(&self, offline: bool) {
        self.bookings_offline.store(offline, Ordering::SeqCst);
    }

    pub fn fetch_counts(&self) -> FetchCounts {
        FetchCounts {
            settings: self.settings_reads.load(Ordering::SeqCst),
            services: self.services_reads.load(Ordering::SeqCst),
            template: self.template_reads.load(Ordering::SeqCst),
        }
    }

    pub async fn replace_services(&self, services: Vec<Service>) {
        *self.services.write().await = services;
    }

    pub async fn replace_template(&self, slots: Vec<TemplateSlot>) {
        *self.template.write().await = slots;
    }

    /// Store a booking as-is (imports, fixtures)
    pub async fn insert(&self, booking: Booking) {
        self.bookings.write().await.push(booking);
    }

    fn check_online(&self) -> BookingResult<()> {
        check(&self.offline)
    }

    fn check_bookings_online(&self) -> BookingResult<()> {
        check(&self.bookings_offline)
    }
}

fn check(flag: &AtomicBool) -> BookingResult<()> {
    if flag.load(Ordering::SeqCst) {
        return Err(BookingError::Store("store unreachable".to_string()));
    }
    Ok(())
}

#[async_trait]
impl BookingStore for InMemoryStore {
    async fn create(&self, new: NewBooking) -> BookingResult<Booking> {
        self.check_bookings_online()?;
        let mut bookings = self.bookings.write().await;
        if bookings
            .iter()
            .any(|b| b.holds_slot() && b.occupies(new.date, &new.time))
        {
            return Err(BookingError::SlotUnavailable {
                date: new.date.to_string(),
                time: new.time,
            });
        }
        let booking = Booking::from_new(generate_booking_id(), new, Utc::now());
        debug!("Stored booking {} for {} {}", booking.id, booking.date, booking.time);
        bookings.push(booking.clone());
        Ok(booking)
    }

    async fn find_by_id(&self, id: &str) -> BookingResult<Option<Booking>> {
        self.check_bookings_online()?;
        Ok(self.bookings.read().await.iter().find(|b| b.id == id).cloned())
    }

    async fn update(&self, id: &str, patch: BookingPatch) -> BookingResult<Booking> {
        self.check_bookings_online()?;
        let mut bookings = self.bookings.write().await;
        let booking = bookings
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| BookingError::not_found(id))?;
        patch.apply(booking);
        Ok(booking.clone())
    }

    async fn list_by_month(&self, month: MonthKey) -> BookingResult<Vec<Booking>> {
        self.check_bookings_online()?;
        Ok(self
            .bookings
            .read()
            .await
            .iter()
            .filter(|b| month.contains(b.date))
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> BookingResult<Vec<Booking>> {
        self.check_bookings_online()?;
        Ok(self.bookings.read().await.clone())
    }
}

#[async_trait]
impl ReferenceStore for InMemoryStore {
    async fn fetch_settings(&self) -> BookingResult<HashMap<String, String>> {
        self.settings_reads.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        Ok(self.settings.read().await.clone())
    }

    async fn fetch_services(&self) -> BookingResult<Vec<Service>> {
        self.services_reads.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        Ok(self.services.read().await.clone())
    }

    async fn fetch_template(&self) -> BookingResult<Vec<TemplateSlot>> {
        self.template_reads.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        Ok(self.template.read().await.clone())
    }

    async fn put_setting(&self, key: &str, value: &str) -> BookingResult<()> {
        self.check_online()?;
        self.settings
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::fixtures::new_booking;
    use crate::booking::DepositStatus;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let store = InMemoryStore::new();
        let booking = store.create(new_booking(date(9), "09:00-10:00")).await.unwrap();

        let found = store.find_by_id(&booking.id).await.unwrap().unwrap();
        assert_eq!(found, booking);
        assert_eq!(found.deposit_status, DepositStatus::PendingPayment);
        assert!(store.find_by_id("BK-NOPE000000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_rejects_taken_slot() {
        let store = InMemoryStore::new();
        store.create(new_booking(date(9), "09:00-10:00")).await.unwrap();

        let err = store
            .create(new_booking(date(9), "9:00-10:00"))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::SlotUnavailable { .. }));

        // Different day is fine
        store.create(new_booking(date(16), "09:00-10:00")).await.unwrap();
    }

    #[tokio::test]
    async fn test_released_slot_can_be_rebooked() {
        let store = InMemoryStore::new();
        let first = store.create(new_booking(date(9), "09:00-10:00")).await.unwrap();
        store
            .update(&first.id, BookingPatch::deposit_status(DepositStatus::Cancelled))
            .await
            .unwrap();

        assert!(store.create(new_booking(date(9), "09:00-10:00")).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_creates_for_one_slot_single_winner() {
        let store = Arc::new(InMemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.create(new_booking(date(9), "09:00-10:00")).await
            }));
        }

        let mut wins = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(BookingError::SlotUnavailable { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_by_month() {
        let store = InMemoryStore::new();
        store.create(new_booking(date(9), "09:00-10:00")).await.unwrap();
        store
            .create(new_booking(NaiveDate::from_ymd_opt(2026, 4, 6).unwrap(), "09:00-10:00"))
            .await
            .unwrap();

        let march = store.list_by_month(MonthKey::parse("2026-03").unwrap()).await.unwrap();
        assert_eq!(march.len(), 1);
        assert_eq!(store.list_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_unknown_is_not_found() {
        let store = InMemoryStore::new();
        let err = store
            .update("BK-NOPE000000", BookingPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::BookingNotFound { .. }));
    }

    #[tokio::test]
    async fn test_offline_reference_reads_fail() {
        let store = InMemoryStore::new();
        store.set_offline(true);
        assert!(store.fetch_settings().await.is_err());
        store.set_offline(false);
        assert!(store.fetch_settings().await.is_ok());
        assert_eq!(store.fetch_counts().settings, 2);
    }

    #[test]
    fn test_seed_from_toml() {
        let seed = Seed::from_toml(
            r#"
            [settings]
            deposit_percent = "50"

            [[services]]
            id = "gel"
            name = "Gel Overlay"
            price = { amount = 45000, currency = "zar" }
            duration_minutes = 60

            [[availability]]
            weekday = "Mon"
            time = "09:00-10:00"
            "#,
        )
        .unwrap();
        assert_eq!(seed.settings["deposit_percent"], "50");
        assert_eq!(seed.services.len(), 1);
        assert!(seed.availability[0].available);
    }
}
