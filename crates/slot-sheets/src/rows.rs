//! # Row Mapping
//!
//! Conversions between spreadsheet rows and core records. Cells are edited by
//! hand, so reads accept strings or numbers and tolerate blanks. Amounts are
//! stored in major units ("450.00").

use crate::client::Row;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use slot_core::{
    parse_weekday, BalanceStatus, Booking, BookingAmounts, BookingError, BookingResult, Currency,
    Customer, DepositStatus, Price, Service, TemplateSlot,
};
use std::collections::HashMap;
use tracing::warn;

pub const BOOKINGS: &str = "bookings";
pub const SERVICES: &str = "services";
pub const AVAILABILITY: &str = "availability";
pub const SETTINGS: &str = "settings";

/// Key column of the bookings table
pub const BOOKING_ID: &str = "booking_id";

fn cell(row: &Row, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn number(row: &Row, column: &str) -> Option<f64> {
    cell(row, column).and_then(|v| v.replace(',', "").parse().ok())
}

fn flag(row: &Row, column: &str, default: bool) -> bool {
    match cell(row, column).map(|v| v.to_lowercase()) {
        Some(v) => matches!(v.as_str(), "true" | "yes" | "y" | "1" | "x"),
        None => default,
    }
}

fn list(row: &Row, column: &str) -> Vec<String> {
    cell(row, column)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn money(row: &Row, column: &str, currency: Currency) -> Price {
    Price::new(number(row, column).unwrap_or(0.0), currency)
}

fn major(price: Price) -> String {
    format!("{:.2}", price.as_decimal())
}

fn put(row: &mut Row, column: &str, value: impl Into<String>) {
    row.insert(column.to_string(), Value::String(value.into()));
}

fn put_opt(row: &mut Row, column: &str, value: Option<&String>) {
    put(row, column, value.cloned().unwrap_or_default());
}

// =============================================================================
// Bookings
// =============================================================================

pub fn booking_from_row(row: &Row) -> BookingResult<Booking> {
    let id = cell(row, BOOKING_ID)
        .ok_or_else(|| BookingError::Store("booking row without booking_id".to_string()))?;
    let date = cell(row, "date")
        .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok())
        .ok_or_else(|| BookingError::Store(format!("booking {} has no readable date", id)))?;
    let time = cell(row, "time")
        .ok_or_else(|| BookingError::Store(format!("booking {} has no time", id)))?;

    let currency = cell(row, "currency")
        .and_then(|c| Currency::parse(&c))
        .unwrap_or_default();

    let deposit_status = match cell(row, "deposit_status") {
        Some(raw) => DepositStatus::parse(&raw).unwrap_or_else(|| {
            warn!(booking_id = %id, value = %raw, "Unknown deposit status, treating as pending");
            DepositStatus::PendingPayment
        }),
        None => DepositStatus::PendingPayment,
    };
    let balance_status = cell(row, "balance_status")
        .and_then(|raw| BalanceStatus::parse(&raw))
        .unwrap_or_default();

    let created_at = match cell(row, "created_at") {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| {
                warn!(booking_id = %id, value = %raw, "Unreadable created_at");
                DateTime::<Utc>::UNIX_EPOCH
            }),
        None => DateTime::<Utc>::UNIX_EPOCH,
    };

    Ok(Booking {
        date,
        time,
        customer: Customer {
            name: cell(row, "customer_name").unwrap_or_default(),
            email: cell(row, "customer_email").unwrap_or_default(),
            phone: cell(row, "customer_phone").unwrap_or_default(),
            address: cell(row, "address"),
            notes: cell(row, "notes"),
        },
        service_ids: list(row, "service_ids"),
        service_names: list(row, "service_names"),
        duration_minutes: number(row, "duration").map(|d| d as u32).unwrap_or(0),
        amounts: BookingAmounts {
            subtotal: money(row, "subtotal", currency),
            travel_fee: money(row, "travel_fee", currency),
            total: money(row, "total", currency),
            deposit: money(row, "deposit_amount", currency),
            balance: money(row, "balance_due", currency),
        },
        deposit_status,
        balance_status,
        payment_session_id: cell(row, "payment_session_id"),
        deposit_payment_ref: cell(row, "deposit_payment_ref"),
        balance_payment_ref: cell(row, "balance_payment_ref"),
        balance_request_url: cell(row, "balance_request_url"),
        calendar_event_id: cell(row, "calendar_event_id"),
        created_at,
        id,
    })
}

pub fn booking_to_row(booking: &Booking) -> Row {
    let mut row = Row::new();
    put(&mut row, BOOKING_ID, booking.id.clone());
    put(&mut row, "date", booking.date.format("%Y-%m-%d").to_string());
    put(&mut row, "time", booking.time.clone());
    put(&mut row, "customer_name", booking.customer.name.clone());
    put(&mut row, "customer_email", booking.customer.email.clone());
    put(&mut row, "customer_phone", booking.customer.phone.clone());
    put_opt(&mut row, "address", booking.customer.address.as_ref());
    put_opt(&mut row, "notes", booking.customer.notes.as_ref());
    put(&mut row, "service_ids", booking.service_ids.join(", "));
    put(&mut row, "service_names", booking.service_names.join(", "));
    put(&mut row, "duration", booking.duration_minutes.to_string());
    put(&mut row, "subtotal", major(booking.amounts.subtotal));
    put(&mut row, "travel_fee", major(booking.amounts.travel_fee));
    put(&mut row, "total", major(booking.amounts.total));
    put(&mut row, "deposit_amount", major(booking.amounts.deposit));
    put(&mut row, "balance_due", major(booking.amounts.balance));
    put(&mut row, "currency", booking.amounts.total.currency.as_str());
    put(&mut row, "deposit_status", booking.deposit_status.as_str());
    put(&mut row, "balance_status", booking.balance_status.as_str());
    put_opt(&mut row, "payment_session_id", booking.payment_session_id.as_ref());
    put_opt(&mut row, "deposit_payment_ref", booking.deposit_payment_ref.as_ref());
    put_opt(&mut row, "balance_payment_ref", booking.balance_payment_ref.as_ref());
    put_opt(&mut row, "balance_request_url", booking.balance_request_url.as_ref());
    put_opt(&mut row, "calendar_event_id", booking.calendar_event_id.as_ref());
    put(&mut row, "created_at", booking.created_at.to_rfc3339());
    row
}

// =============================================================================
// Reference tables
// =============================================================================

pub fn service_from_row(row: &Row) -> Option<Service> {
    let id = cell(row, "id")?;
    let currency = cell(row, "currency")
        .and_then(|c| Currency::parse(&c))
        .unwrap_or_default();

    Some(Service {
        name: cell(row, "name").unwrap_or_else(|| id.clone()),
        description: cell(row, "description").unwrap_or_default(),
        price: money(row, "price", currency),
        duration_minutes: number(row, "duration").map(|d| d as u32).unwrap_or(0),
        category: cell(row, "category").unwrap_or_default(),
        active: flag(row, "active", true),
        id,
    })
}

pub fn template_from_row(row: &Row) -> Option<TemplateSlot> {
    let day = cell(row, "day")?;
    let Some(weekday) = parse_weekday(&day) else {
        warn!(value = %day, "Unknown weekday in availability row");
        return None;
    };
    Some(TemplateSlot {
        weekday,
        time: cell(row, "time")?,
        available: flag(row, "available", true),
    })
}

pub fn settings_from_rows(rows: &[Row]) -> HashMap<String, String> {
    rows.iter()
        .filter_map(|row| Some((cell(row, "key")?, cell(row, "value").unwrap_or_default())))
        .collect()
}

pub fn setting_row(key: &str, value: &str) -> Row {
    let mut row = Row::new();
    put(&mut row, "key", key);
    put(&mut row, "value", value);
    row
}
