//! # Service Catalog
//!
//! Catalog entries as read from the `services` table. A catalog snapshot is
//! immutable for the lifetime of one cache window.

use crate::money::{Currency, Price};
use serde::{Deserialize, Serialize};

/// A bookable service offering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    /// Unique service identifier (e.g., "gel-full-set")
    pub id: String,

    /// Display name
    pub name: String,

    /// Short description
    #[serde(default)]
    pub description: String,

    /// Price
    pub price: Price,

    /// Duration in minutes
    #[serde(default)]
    pub duration_minutes: u32,

    /// Grouping used by the booking wizard
    #[serde(default)]
    pub category: String,

    /// Whether this service is offered right now
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl Service {
    /// Create an active service
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        price: Price,
        duration_minutes: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            price,
            duration_minutes,
            category: String::new(),
            active: true,
        }
    }

    /// Builder: set category
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Builder: set description
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Builder: mark inactive
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// Aggregated price and duration of a set of selected services
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSelection {
    pub subtotal: Price,
    pub duration_minutes: u32,
    pub names: Vec<String>,
    /// Requested ids the catalog could not price
    pub missing: Vec<String>,
}

impl ServiceSelection {
    /// True when every requested id was priced from the catalog
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Service catalog snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceCatalog {
    pub services: Vec<Service>,
}

impl ServiceCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self {
            services: Vec::new(),
        }
    }

    /// Build a catalog from store rows
    pub fn from_services(services: Vec<Service>) -> Self {
        Self { services }
    }

    /// Add a service to the catalog
    pub fn add(&mut self, service: Service) {
        self.services.push(service);
    }

    /// Find an active service by ID
    pub fn get(&self, id: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.id == id && s.active)
    }

    /// Get all active services
    pub fn active_services(&self) -> impl Iterator<Item = &Service> {
        self.services.iter().filter(|s| s.active)
    }

    /// Price a selection of service ids against the catalog.
    ///
    /// Unknown or inactive ids are collected in `missing` rather than failing,
    /// so the caller can decide whether a fallback is acceptable.
    pub fn price_selection(&self, ids: &[String], currency: Currency) -> ServiceSelection {
        let mut subtotal = Price::zero(currency);
        let mut duration_minutes = 0;
        let mut names = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();

        for id in ids {
            match self.get(id) {
                Some(service) => {
                    subtotal = subtotal.plus(service.price);
                    duration_minutes += service.duration_minutes;
                    names.push(service.name.clone());
                }
                None => missing.push(id.clone()),
            }
        }

        ServiceSelection {
            subtotal,
            duration_minutes,
            names,
            missing,
        }
    }

    /// Load catalog from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ServiceCatalog {
        let mut catalog = ServiceCatalog::new();
        catalog.add(
            Service::new("gel", "Gel Overlay", Price::new(450.0, Currency::ZAR), 60)
                .with_category("nails"),
        );
        catalog.add(Service::new("lash", "Lash Lift", Price::new(550.0, Currency::ZAR), 45));
        catalog.add(Service::new("old", "Retired", Price::new(100.0, Currency::ZAR), 30).inactive());
        catalog
    }

    #[test]
    fn test_active_services_only() {
        let catalog = catalog();
        let ids: Vec<_> = catalog.active_services().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["gel", "lash"]);
        assert!(catalog.get("old").is_none());
    }

    #[test]
    fn test_price_selection() {
        let selection = catalog().price_selection(
            &["gel".to_string(), "lash".to_string()],
            Currency::ZAR,
        );
        assert_eq!(selection.subtotal.amount, 100_000);
        assert_eq!(selection.duration_minutes, 105);
        assert!(selection.is_complete());
    }

    #[test]
    fn test_price_selection_reports_missing() {
        let selection = catalog().price_selection(
            &["gel".to_string(), "old".to_string(), "nope".to_string()],
            Currency::ZAR,
        );
        assert_eq!(selection.subtotal.amount, 45_000);
        assert_eq!(selection.missing, vec!["old".to_string(), "nope".to_string()]);
    }

    #[test]
    fn test_from_toml() {
        let catalog = ServiceCatalog::from_toml(
            r#"
            [[services]]
            id = "gel"
            name = "Gel Overlay"
            price = { amount = 45000, currency = "zar" }
            duration_minutes = 60
            "#,
        )
        .unwrap();
        assert_eq!(catalog.services.len(), 1);
        assert!(catalog.services[0].active);
    }
}
