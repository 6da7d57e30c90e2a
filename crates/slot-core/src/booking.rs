//! # Booking Types
//!
//! The booking record, its two status enums and the mutation type the store
//! applies. Bookings are never deleted; terminal states are recorded.

use crate::availability::canonical_slot;
use crate::money::{Currency, DepositSplit, Price};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix carried by every booking reference
pub const BOOKING_ID_PREFIX: &str = "BK-";

/// Characters after the prefix
pub const BOOKING_ID_LEN: usize = 10;

/// Crockford base-32: no I, L, O or U, so references survive being read aloud
const CROCKFORD: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Generate a fresh booking reference, e.g. `BK-7K3QX9M2PA`.
///
/// 50 random bits from a v4 UUID. Collisions are not checked.
pub fn generate_booking_id() -> String {
    let bytes = Uuid::new_v4().into_bytes();
    let mut bits = u64::from_be_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[9], bytes[10],
    ]);
    let mut id = String::with_capacity(BOOKING_ID_PREFIX.len() + BOOKING_ID_LEN);
    id.push_str(BOOKING_ID_PREFIX);
    for _ in 0..BOOKING_ID_LEN {
        id.push(CROCKFORD[(bits & 0x1f) as usize] as char);
        bits >>= 5;
    }
    id
}

/// Cheap shape check before touching the store
pub fn is_well_formed_booking_id(id: &str) -> bool {
    id.strip_prefix(BOOKING_ID_PREFIX)
        .map(|rest| {
            rest.len() == BOOKING_ID_LEN && rest.bytes().all(|b| CROCKFORD.contains(&b))
        })
        .unwrap_or(false)
}

/// Deposit lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositStatus {
    /// Booking created, deposit not yet paid
    PendingPayment,
    /// Deposit received, slot secured
    Confirmed,
    /// Appointment took place
    ServiceComplete,
    /// Called off; slot released
    Cancelled,
    /// Deposit returned; slot released
    Refunded,
}

impl Default for DepositStatus {
    fn default() -> Self {
        DepositStatus::PendingPayment
    }
}

impl DepositStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepositStatus::PendingPayment => "pending_payment",
            DepositStatus::Confirmed => "confirmed",
            DepositStatus::ServiceComplete => "service_complete",
            DepositStatus::Cancelled => "cancelled",
            DepositStatus::Refunded => "refunded",
        }
    }

    /// Parse either the snake_case code or the human label used in the sheet
    pub fn parse(raw: &str) -> Option<Self> {
        let key: String = raw
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect();
        match key.as_str() {
            "pendingpayment" | "pending" => Some(DepositStatus::PendingPayment),
            "confirmed" => Some(DepositStatus::Confirmed),
            "servicecomplete" | "completed" | "complete" => Some(DepositStatus::ServiceComplete),
            "cancelled" | "canceled" => Some(DepositStatus::Cancelled),
            "refunded" => Some(DepositStatus::Refunded),
            _ => None,
        }
    }

    /// Whether the booking still holds its slot
    pub fn holds_slot(&self) -> bool {
        !matches!(self, DepositStatus::Cancelled | DepositStatus::Refunded)
    }

    /// Legal forward moves. No state may move back into `PendingPayment`.
    pub fn can_transition_to(&self, next: DepositStatus) -> bool {
        use DepositStatus::*;
        matches!(
            (self, next),
            (PendingPayment, Confirmed)
                | (PendingPayment, Cancelled)
                | (PendingPayment, Refunded)
                | (Confirmed, ServiceComplete)
                | (Confirmed, Cancelled)
                | (Confirmed, Refunded)
                | (ServiceComplete, Refunded)
                | (Cancelled, Refunded)
        )
    }
}

impl std::fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Balance lifecycle, active once the service is complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceStatus {
    Pending,
    Requested,
    Paid,
}

impl Default for BalanceStatus {
    fn default() -> Self {
        BalanceStatus::Pending
    }
}

impl BalanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceStatus::Pending => "pending",
            BalanceStatus::Requested => "requested",
            BalanceStatus::Paid => "paid",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "pending" | "" => Some(BalanceStatus::Pending),
            "requested" => Some(BalanceStatus::Requested),
            "paid" => Some(BalanceStatus::Paid),
            _ => None,
        }
    }
}

impl std::fmt::Display for BalanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Customer contact details
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Monetary breakdown of one booking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingAmounts {
    pub subtotal: Price,
    pub travel_fee: Price,
    pub total: Price,
    pub deposit: Price,
    pub balance: Price,
}

impl BookingAmounts {
    /// Price a booking: total = subtotal + travel fee, split by `deposit_percent`
    pub fn compute(subtotal: Price, travel_fee: Price, deposit_percent: f64) -> Self {
        let total = subtotal.plus(travel_fee);
        let split = DepositSplit::compute(total, deposit_percent);
        Self {
            subtotal,
            travel_fee,
            total: split.total,
            deposit: split.deposit,
            balance: split.balance,
        }
    }

    pub fn zero(currency: Currency) -> Self {
        let zero = Price::zero(currency);
        Self {
            subtotal: zero,
            travel_fee: zero,
            total: zero,
            deposit: zero,
            balance: zero,
        }
    }

    /// deposit + balance == total, to the smallest unit
    pub fn is_balanced(&self) -> bool {
        self.deposit.amount + self.balance.amount == self.total.amount
    }
}

/// A booking record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    /// Opaque reference (`BK-...`)
    pub id: String,

    /// Appointment date (business timezone)
    pub date: NaiveDate,

    /// Slot, canonical `HH:MM-HH:MM`
    pub time: String,

    pub customer: Customer,

    pub service_ids: Vec<String>,

    /// Denormalized for notifications and the calendar entry
    #[serde(default)]
    pub service_names: Vec<String>,

    pub duration_minutes: u32,

    pub amounts: BookingAmounts,

    #[serde(default)]
    pub deposit_status: DepositStatus,

    #[serde(default)]
    pub balance_status: BalanceStatus,

    /// Gateway checkout session for the deposit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_session_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deposit_payment_ref: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_payment_ref: Option<String>,

    /// Where the customer pays the balance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_request_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub calendar_event_id: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Booking {
    /// Materialize a new record from intake data
    pub fn from_new(id: impl Into<String>, new: NewBooking, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            date: new.date,
            time: canonical_slot(&new.time),
            customer: new.customer,
            service_ids: new.service_ids,
            service_names: new.service_names,
            duration_minutes: new.duration_minutes,
            amounts: new.amounts,
            deposit_status: DepositStatus::PendingPayment,
            balance_status: BalanceStatus::Pending,
            payment_session_id: None,
            deposit_payment_ref: None,
            balance_payment_ref: None,
            balance_request_url: None,
            calendar_event_id: None,
            created_at,
        }
    }

    /// Whether the booking still consumes its slot
    pub fn holds_slot(&self) -> bool {
        self.deposit_status.holds_slot()
    }

    /// Same date and (normalized) slot
    pub fn occupies(&self, date: NaiveDate, time: &str) -> bool {
        self.date == date && canonical_slot(&self.time) == canonical_slot(time)
    }

    /// Projection safe to show to anyone holding the reference
    pub fn public_status(&self) -> PublicBookingStatus {
        PublicBookingStatus {
            booking_id: self.id.clone(),
            status: self.deposit_status,
            balance_status: self.balance_status,
            date: self.date,
            time: self.time.clone(),
            services: self.service_names.clone(),
            total: self.amounts.total.as_decimal(),
            deposit_amount: self.amounts.deposit.as_decimal(),
            balance_due: self.amounts.balance.as_decimal(),
            currency: self.amounts.total.currency,
        }
    }
}

/// Intake data for a booking that does not exist yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewBooking {
    pub date: NaiveDate,
    pub time: String,
    pub customer: Customer,
    pub service_ids: Vec<String>,
    pub service_names: Vec<String>,
    pub duration_minutes: u32,
    pub amounts: BookingAmounts,
}

/// Field-level mutation applied by the store. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingPatch {
    pub deposit_status: Option<DepositStatus>,
    pub balance_status: Option<BalanceStatus>,
    pub date: Option<NaiveDate>,
    pub time: Option<String>,
    pub payment_session_id: Option<String>,
    pub deposit_payment_ref: Option<String>,
    pub balance_payment_ref: Option<String>,
    pub balance_request_url: Option<String>,
    /// `Some(None)` clears the reference
    pub calendar_event_id: Option<Option<String>>,
}

impl BookingPatch {
    pub fn deposit_status(status: DepositStatus) -> Self {
        Self {
            deposit_status: Some(status),
            ..Self::default()
        }
    }

    pub fn balance_status(status: BalanceStatus) -> Self {
        Self {
            balance_status: Some(status),
            ..Self::default()
        }
    }

    pub fn calendar_event(event_id: Option<String>) -> Self {
        Self {
            calendar_event_id: Some(event_id),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply every set field to `booking`
    pub fn apply(&self, booking: &mut Booking) {
        if let Some(status) = self.deposit_status {
            booking.deposit_status = status;
        }
        if let Some(status) = self.balance_status {
            booking.balance_status = status;
        }
        if let Some(date) = self.date {
            booking.date = date;
        }
        if let Some(ref time) = self.time {
            booking.time = canonical_slot(time);
        }
        if let Some(ref id) = self.payment_session_id {
            booking.payment_session_id = Some(id.clone());
        }
        if let Some(ref reference) = self.deposit_payment_ref {
            booking.deposit_payment_ref = Some(reference.clone());
        }
        if let Some(ref reference) = self.balance_payment_ref {
            booking.balance_payment_ref = Some(reference.clone());
        }
        if let Some(ref url) = self.balance_request_url {
            booking.balance_request_url = Some(url.clone());
        }
        if let Some(ref event) = self.calendar_event_id {
            booking.calendar_event_id = event.clone();
        }
    }
}

/// Public projection served by `GET /bookings/{ref}/status`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicBookingStatus {
    pub booking_id: String,
    pub status: DepositStatus,
    pub balance_status: BalanceStatus,
    pub date: NaiveDate,
    pub time: String,
    pub services: Vec<String>,
    pub total: f64,
    pub deposit_amount: f64,
    pub balance_due: f64,
    pub currency: Currency,
}

/// Sample intake data shared by the test suites
#[cfg(any(test, feature = "testing"))]
pub mod fixtures {
    use super::*;

    pub fn new_booking(date: NaiveDate, time: &str) -> NewBooking {
        let subtotal = Price::new(1000.0, Currency::ZAR);
        NewBooking {
            date,
            time: time.to_string(),
            customer: Customer {
                name: "Thandi M".to_string(),
                email: "thandi@example.com".to_string(),
                phone: "+27821234567".to_string(),
                address: Some("4 Kloof St, Cape Town".to_string()),
                notes: None,
            },
            service_ids: vec!["gel".to_string(), "lash".to_string()],
            service_names: vec!["Gel Overlay".to_string(), "Lash Lift".to_string()],
            duration_minutes: 105,
            amounts: BookingAmounts::compute(subtotal, Price::zero(Currency::ZAR), 50.0),
        }
    }
}
