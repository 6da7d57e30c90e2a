//! # Booking Intake
//!
//! Turns a customer booking request into a stored `PendingPayment` booking
//! and, when the deposit is worth collecting, a hosted checkout link.
//!
//! Amounts are recomputed here from the catalog and settings. Client-sent
//! figures are only used when the catalog cannot price the selection.

use crate::availability::TimeRange;
use crate::booking::{Booking, BookingAmounts, BookingPatch, Customer, NewBooking};
use crate::error::{BookingError, BookingResult};
use crate::lifecycle::checkout_description;
use crate::money::Price;
use crate::ports::{CheckoutRequest, CheckoutUrls, PaymentKind, SharedGateway};
use crate::reference::ReferenceData;
use crate::schedule::AvailabilityService;
use crate::settings::Settings;
use crate::store::SharedBookingStore;
use crate::travel::TravelQuoter;
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Shown when the booking exists but no checkout could be opened
pub const MANUAL_PAYMENT_NOTE: &str =
    "We could not open an online payment for this booking; we will contact you to arrange the deposit";

/// Largest subtotal or travel fee (major units) accepted from the client
pub const MAX_SUBMITTED_AMOUNT: f64 = 1_000_000.0;

/// Shown when the deposit is under the gateway minimum
pub const BELOW_MINIMUM_NOTE: &str =
    "The deposit is below the minimum online payment; we will contact you to arrange it";

/// Booking request as submitted by the booking wizard
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub date: String,
    pub time: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub service_ids: Vec<String>,
    /// Client-side travel fee; used only when no quote can be made
    #[serde(default)]
    pub travel_fee: Option<f64>,
    /// Client-side subtotal; used only when the catalog cannot price the selection
    #[serde(default)]
    pub subtotal: Option<f64>,
    #[serde(default)]
    pub duration: Option<u32>,
}

impl BookingRequest {
    /// Check required fields and parse date and time
    pub fn validate(&self) -> BookingResult<(NaiveDate, TimeRange)> {
        let required = [
            ("name", &self.name),
            ("email", &self.email),
            ("phone", &self.phone),
            ("date", &self.date),
            ("time", &self.time),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(BookingError::Validation(format!("{} is required", field)));
            }
        }
        if !self.email.contains('@') {
            return Err(BookingError::Validation("email is invalid".to_string()));
        }
        if self.service_ids.iter().all(|id| id.trim().is_empty()) {
            return Err(BookingError::Validation("select at least one service".to_string()));
        }
        for (field, amount) in [("subtotal", self.subtotal), ("travelFee", self.travel_fee)] {
            if let Some(amount) = amount {
                if !amount.is_finite() || amount > MAX_SUBMITTED_AMOUNT {
                    return Err(BookingError::Validation(format!("{} is out of range", field)));
                }
            }
        }

        let date = NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d")
            .map_err(|_| BookingError::Validation(format!("invalid date '{}'", self.date)))?;
        let range = TimeRange::parse(&self.time)
            .ok_or_else(|| BookingError::Validation(format!("invalid time '{}'", self.time)))?;
        Ok((date, range))
    }

    fn customer(&self) -> Customer {
        let optional = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Customer {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self.phone.trim().to_string(),
            address: optional(&self.address),
            notes: optional(&self.notes),
        }
    }
}

/// Result of a successful intake
#[derive(Debug, Clone)]
pub struct IntakeReceipt {
    pub booking: Booking,
    pub payment_url: Option<String>,
    pub payment_error: Option<String>,
}

impl IntakeReceipt {
    pub fn deposit(&self) -> Price {
        self.booking.amounts.deposit
    }

    pub fn balance(&self) -> Price {
        self.booking.amounts.balance
    }
}

pub struct BookingIntake {
    store: SharedBookingStore,
    gateway: SharedGateway,
    reference: Arc<ReferenceData>,
    availability: Arc<AvailabilityService>,
    travel: Option<Arc<TravelQuoter>>,
    urls: CheckoutUrls,
}

impl BookingIntake {
    pub fn new(
        store: SharedBookingStore,
        gateway: SharedGateway,
        reference: Arc<ReferenceData>,
        availability: Arc<AvailabilityService>,
        urls: CheckoutUrls,
    ) -> Self {
        Self {
            store,
            gateway,
            reference,
            availability,
            travel: None,
            urls,
        }
    }

    /// Builder: quote travel fees server-side
    pub fn with_travel(mut self, travel: Arc<TravelQuoter>) -> Self {
        self.travel = Some(travel);
        self
    }

    #[instrument(skip(self, request), fields(date = %request.date, time = %request.time))]
    pub async fn submit(&self, request: &BookingRequest) -> BookingResult<IntakeReceipt> {
        let (date, range) = request.validate()?;
        let time = range.to_string();
        if date < self.availability.clock().civil_now().date() {
            return Err(BookingError::Validation(format!("{} is in the past", date)));
        }

        let settings = self.reference.settings().await?;
        let new = self.price(request, &settings, date, &time).await?;

        if !self.availability.is_open(date, &time).await? {
            return Err(BookingError::SlotUnavailable {
                date: date.to_string(),
                time,
            });
        }
        let booking = self.store.create(new).await?;
        self.availability.invalidate().await;
        info!(
            "Booking {} created for {} {} (total {}, deposit {})",
            booking.id,
            booking.date,
            booking.time,
            booking.amounts.total.display(),
            booking.amounts.deposit.display()
        );

        let deposit = booking.amounts.deposit;
        if deposit.amount <= 0 || deposit.amount < settings.min_payable.amount {
            info!("Deposit {} for {} below minimum payable", deposit.display(), booking.id);
            return Ok(IntakeReceipt {
                booking,
                payment_url: None,
                payment_error: Some(BELOW_MINIMUM_NOTE.to_string()),
            });
        }

        let urls = self
            .urls
            .with_overrides(settings.success_url.as_deref(), settings.cancel_url.as_deref())
            .for_booking(&booking.id);
        let checkout = CheckoutRequest {
            booking_id: booking.id.clone(),
            kind: PaymentKind::Deposit,
            amount: deposit,
            description: checkout_description(&settings.business_name, PaymentKind::Deposit, &booking),
            customer_email: Some(booking.customer.email.clone()),
            success_url: urls.success_url,
            cancel_url: urls.cancel_url,
            idempotency_key: format!("{}-deposit", booking.id),
        };

        match self.gateway.create_checkout(&checkout).await {
            Ok(session) => {
                let patch = BookingPatch {
                    payment_session_id: Some(session.session_id.clone()),
                    ..BookingPatch::default()
                };
                let booking = match self.store.update(&booking.id, patch).await {
                    Ok(updated) => updated,
                    Err(e) => {
                        warn!("Could not record checkout session for {}: {}", booking.id, e);
                        booking
                    }
                };
                Ok(IntakeReceipt {
                    booking,
                    payment_url: Some(session.checkout_url),
                    payment_error: None,
                })
            }
            Err(e) => {
                warn!("Deposit checkout for {} failed: {}", booking.id, e);
                Ok(IntakeReceipt {
                    booking,
                    payment_url: None,
                    payment_error: Some(MANUAL_PAYMENT_NOTE.to_string()),
                })
            }
        }
    }

    async fn price(
        &self,
        request: &BookingRequest,
        settings: &Settings,
        date: NaiveDate,
        time: &str,
    ) -> BookingResult<NewBooking> {
        let catalog = self.reference.catalog().await?;
        let service_ids: Vec<String> = request
            .service_ids
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        let selection = catalog.price_selection(&service_ids, settings.currency);

        let (subtotal, duration_minutes, service_names) = if selection.is_complete() {
            (selection.subtotal, selection.duration_minutes, selection.names)
        } else {
            match request.subtotal {
                Some(client) if client.is_finite() && client >= 0.0 => {
                    warn!(missing = ?selection.missing, "Catalog incomplete, using submitted subtotal");
                    let mut names = selection.names;
                    names.extend(selection.missing);
                    (
                        Price::new(client, settings.currency),
                        request.duration.unwrap_or(selection.duration_minutes),
                        names,
                    )
                }
                _ => {
                    return Err(BookingError::ServiceNotFound {
                        service_id: selection.missing.join(", "),
                    })
                }
            }
        };

        let travel_fee = self.travel_fee(request, settings).await;
        Ok(NewBooking {
            date,
            time: time.to_string(),
            customer: request.customer(),
            service_ids,
            service_names,
            duration_minutes,
            amounts: BookingAmounts::compute(subtotal, travel_fee, settings.deposit_percent),
        })
    }

    async fn travel_fee(&self, request: &BookingRequest, settings: &Settings) -> Price {
        let submitted = request
            .travel_fee
            .filter(|fee| fee.is_finite() && *fee >= 0.0)
            .map(|fee| Price::new(fee, settings.currency))
            .unwrap_or_else(|| Price::zero(settings.currency));

        let address = request.address.as_deref().map(str::trim).unwrap_or("");
        match (&self.travel, address.is_empty(), settings.origin_address.is_some()) {
            (Some(quoter), false, true) => match quoter.quote(settings, address).await {
                Ok(quote) => quote.fee,
                Err(e) => {
                    warn!("Travel quote failed, using submitted fee: {}", e);
                    submitted
                }
            },
            _ => submitted,
        }
    }
}
