//! # Operational Settings
//!
//! Typed view over the free-form `settings` key/value table. Built once per
//! cache refresh; a value that fails to parse falls back to its default.

use crate::money::{Currency, Price};
use std::collections::HashMap;
use tracing::warn;

/// Settings table key for the admin password
pub const ADMIN_PASSWORD_KEY: &str = "admin_password";

/// Operational settings, read-mostly
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Percentage of the total collected as deposit
    pub deposit_percent: f64,
    /// Smallest amount the gateway will be asked to collect
    pub min_payable: Price,
    /// Booking currency
    pub currency: Currency,
    /// Where travel distance is measured from
    pub origin_address: Option<String>,
    /// Travel fee per round-trip km beyond the free radius
    pub travel_rate_per_km: f64,
    /// One-way distance covered without a travel fee
    pub free_travel_km: f64,
    /// Floor for a non-zero travel fee
    pub min_travel_fee: Price,
    /// Gateway redirect after payment
    pub success_url: Option<String>,
    /// Gateway redirect when the customer abandons checkout
    pub cancel_url: Option<String>,
    /// Recipient of admin notifications
    pub admin_email: Option<String>,
    /// Shown in notifications and calendar entries
    pub business_name: String,
    /// Overrides the `ADMIN_PASSWORD` env value when present
    pub admin_password: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            deposit_percent: 50.0,
            min_payable: Price::new(10.0, Currency::ZAR),
            currency: Currency::ZAR,
            origin_address: None,
            travel_rate_per_km: 0.0,
            free_travel_km: 0.0,
            min_travel_fee: Price::zero(Currency::ZAR),
            success_url: None,
            cancel_url: None,
            admin_email: None,
            business_name: "Slotkeeper".to_string(),
            admin_password: None,
        }
    }
}

impl Settings {
    /// Build settings from raw key/value pairs
    pub fn from_pairs(pairs: &HashMap<String, String>) -> Self {
        let defaults = Settings::default();
        let text = |key: &str| {
            pairs
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let currency = match text("currency") {
            Some(code) => Currency::parse(&code).unwrap_or_else(|| {
                warn!(key = "currency", value = %code, "Unknown currency, using default");
                defaults.currency
            }),
            None => defaults.currency,
        };

        let money = |key: &str, default: Price| {
            let amount = number(pairs, key, default.as_decimal());
            Price::new(amount.max(0.0), currency)
        };

        Self {
            deposit_percent: number(pairs, "deposit_percent", defaults.deposit_percent)
                .clamp(0.0, 100.0),
            min_payable: money("min_payable_amount", defaults.min_payable),
            currency,
            origin_address: text("origin_address"),
            travel_rate_per_km: number(pairs, "travel_rate_per_km", defaults.travel_rate_per_km)
                .max(0.0),
            free_travel_km: number(pairs, "free_travel_km", defaults.free_travel_km).max(0.0),
            min_travel_fee: money("min_travel_fee", defaults.min_travel_fee),
            success_url: text("success_url"),
            cancel_url: text("cancel_url"),
            admin_email: text("admin_email"),
            business_name: text("business_name").unwrap_or(defaults.business_name),
            admin_password: text(ADMIN_PASSWORD_KEY),
        }
    }
}

/// Parse a numeric setting, tolerating currency symbols and `%`
fn number(pairs: &HashMap<String, String>, key: &str, default: f64) -> f64 {
    let Some(raw) = pairs.get(key) else {
        return default;
    };
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => {
            if !raw.trim().is_empty() {
                warn!(key, value = %raw, "Unparseable numeric setting, using default");
            }
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> HashMap<String, String> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_when_empty() {
        let settings = Settings::from_pairs(&HashMap::new());
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_parses_values() {
        let settings = Settings::from_pairs(&pairs(&[
            ("deposit_percent", "30%"),
            ("min_payable_amount", "R 25.50"),
            ("currency", "usd"),
            ("origin_address", "12 Long St, Cape Town"),
            ("business_name", "Glow Studio"),
        ]));

        assert_eq!(settings.deposit_percent, 30.0);
        assert_eq!(settings.currency, Currency::USD);
        assert_eq!(settings.min_payable, Price::from_minor(2550, Currency::USD));
        assert_eq!(settings.origin_address.as_deref(), Some("12 Long St, Cape Town"));
        assert_eq!(settings.business_name, "Glow Studio");
    }

    #[test]
    fn test_bad_numbers_fall_back() {
        let settings = Settings::from_pairs(&pairs(&[
            ("deposit_percent", "half"),
            ("travel_rate_per_km", ""),
            ("currency", "???"),
        ]));
        assert_eq!(settings.deposit_percent, 50.0);
        assert_eq!(settings.travel_rate_per_km, 0.0);
        assert_eq!(settings.currency, Currency::ZAR);
    }

    #[test]
    fn test_blank_text_is_none() {
        let settings = Settings::from_pairs(&pairs(&[("admin_password", "   ")]));
        assert!(settings.admin_password.is_none());
    }
}
