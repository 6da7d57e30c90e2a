//! # Application State
//!
//! Shared state for the Axum application: every cache, limiter and service is
//! built once here and handed to the router. Nothing is global.

use crate::auth::AdminAuth;
use crate::outbound::{GoogleCalendarClient, GoogleDistanceMatrix, OutboundConfig, RelayNotifier, UnconfiguredGateway};
use crate::rate_limit::FixedWindowLimiter;
use anyhow::{anyhow, bail, Context};
use chrono_tz::Tz;
use slot_core::{
    AvailabilityService, BookingIntake, BookingLifecycle, BusinessClock, CacheTtls, CheckoutUrls, Clock,
    DistanceProvider, InMemoryStore, LoggingCalendar, LoggingNotifier, PaymentWebhookProcessor,
    ReferenceData, Seed, SharedBookingStore, SharedCalendar, SharedGateway, SharedNotifier,
    SharedReferenceStore, SideEffects, SystemClock, TravelQuoter,
};
use slot_sheets::{SheetsConfig, SheetsStore};
use slot_stripe::{StripeConfig, StripeGateway};
use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Login attempts allowed per client per window
const LOGIN_RATE_LIMIT: u32 = 5;
const LOGIN_RATE_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Base URL for payment redirects
    pub base_url: String,
    /// Environment (development, staging, production)
    pub environment: String,
    /// Timezone all slot math happens in
    pub timezone: Tz,
    /// Key for admin token HMACs
    pub admin_token_secret: String,
    /// Admin password until one is stored in settings
    pub admin_password: Option<String>,
    pub booking_rate_limit: u32,
    pub booking_rate_window: Duration,
    pub cache_ttls: CacheTtls,
    /// Upper bound on each calendar/notification side effect
    pub effect_timeout: Duration,
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    pub fn from_map(vars: &HashMap<String, String>) -> anyhow::Result<Self> {
        Self::from_vars(|key| vars.get(key).cloned())
    }

    fn from_vars(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());
        let number = |key: &str, default: u64| -> anyhow::Result<u64> {
            match get(key) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{} must be a whole number, got '{}'", key, raw)),
                None => Ok(default),
            }
        };
        let secs = |key: &str, default: u64| number(key, default).map(Duration::from_secs);

        let environment = get("ENVIRONMENT").unwrap_or_else(|| "development".to_string());
        let port = get("PORT").unwrap_or_else(|| "8080".to_string());

        let timezone = match get("BUSINESS_TIMEZONE") {
            Some(name) => name
                .trim()
                .parse::<Tz>()
                .map_err(|e| anyhow!("BUSINESS_TIMEZONE '{}': {}", name, e))?,
            None => chrono_tz::Africa::Johannesburg,
        };

        let admin_token_secret = match get("ADMIN_TOKEN_SECRET") {
            Some(secret) => secret,
            None if environment == "production" => bail!("ADMIN_TOKEN_SECRET must be set in production"),
            None => {
                warn!("ADMIN_TOKEN_SECRET not set; admin tokens will not survive a restart");
                uuid::Uuid::new_v4().simple().to_string()
            }
        };

        let defaults = CacheTtls::default();
        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: port
                .trim()
                .parse()
                .with_context(|| format!("PORT must be a port number, got '{}'", port))?,
            base_url: get("BASE_URL")
                .unwrap_or_else(|| "http://localhost:8080".to_string())
                .trim_end_matches('/')
                .to_string(),
            timezone,
            admin_token_secret,
            admin_password: get("ADMIN_PASSWORD"),
            booking_rate_limit: u32::try_from(number("BOOKING_RATE_LIMIT", 10)?)
                .context("BOOKING_RATE_LIMIT is too large")?,
            booking_rate_window: secs("BOOKING_RATE_WINDOW_SECS", 3600)?,
            cache_ttls: CacheTtls {
                settings: secs("SETTINGS_TTL_SECS", defaults.settings.as_secs())?,
                catalog: secs("CATALOG_TTL_SECS", defaults.catalog.as_secs())?,
                template: secs("TEMPLATE_TTL_SECS", defaults.template.as_secs())?,
            },
            effect_timeout: secs("SIDE_EFFECT_TIMEOUT_SECS", 20)?,
            environment,
        })
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// External collaborators the state is wired against
pub struct Backends {
    pub bookings: SharedBookingStore,
    pub reference: SharedReferenceStore,
    pub gateway: SharedGateway,
    pub calendar: SharedCalendar,
    pub notifier: SharedNotifier,
    pub distance: Option<Arc<dyn DistanceProvider>>,
    pub clock: Arc<dyn Clock>,
}

impl Backends {
    /// Pick implementations from the environment, falling back to the
    /// in-memory store and logging clients for anything not configured
    pub fn from_env(config: &AppConfig) -> anyhow::Result<Self> {
        let (bookings, reference): (SharedBookingStore, SharedReferenceStore) =
            match SheetsConfig::from_env()? {
                Some(sheets) => {
                    info!("Record store: spreadsheet at {}", sheets.api_url);
                    let store = Arc::new(SheetsStore::new(sheets)?);
                    (store.clone() as SharedBookingStore, store as SharedReferenceStore)
                }
                None if config.is_production() => bail!("SHEETS_API_URL must be set in production"),
                None => {
                    let store = Arc::new(InMemoryStore::from_seed(load_seed()?));
                    warn!("Record store: in-memory (bookings are lost on restart)");
                    (store.clone() as SharedBookingStore, store as SharedReferenceStore)
                }
            };

        let gateway: SharedGateway = match StripeConfig::from_env() {
            Ok(stripe) => {
                if stripe.webhook_secret.is_none() {
                    warn!(
                        "STRIPE_WEBHOOK_SECRET not set; webhooks will be accepted unverified.\n{}",
                        slot_stripe::setup_instructions(&format!("{}/webhooks/payment", config.base_url))
                    );
                }
                if stripe.is_test_mode() {
                    info!("Stripe running with test keys");
                }
                Arc::new(StripeGateway::new(stripe)?)
            }
            Err(e) if config.is_production() => bail!("Failed to initialize Stripe: {}", e),
            Err(e) => {
                warn!("Stripe disabled ({}); deposits must be arranged by hand", e);
                Arc::new(UnconfiguredGateway)
            }
        };

        let outbound = OutboundConfig::from_env();
        let http = outbound.http_client()?;

        let calendar: SharedCalendar = match (&outbound.calendar_id, &outbound.calendar_token) {
            (Some(id), Some(token)) => Arc::new(GoogleCalendarClient::new(http.clone(), id, token)),
            _ => {
                info!("Calendar sync disabled");
                Arc::new(LoggingCalendar)
            }
        };
        let notifier: SharedNotifier = match outbound.notify_url {
            Some(ref url) => Arc::new(RelayNotifier::new(http.clone(), url)),
            None => {
                info!("Notification relay disabled");
                Arc::new(LoggingNotifier)
            }
        };
        let distance = outbound
            .maps_api_key
            .as_ref()
            .map(|key| Arc::new(GoogleDistanceMatrix::new(http.clone(), key)) as Arc<dyn DistanceProvider>);

        Ok(Self {
            bookings,
            reference,
            gateway,
            calendar,
            notifier,
            distance,
            clock: Arc::new(SystemClock),
        })
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: SharedBookingStore,
    pub reference: Arc<ReferenceData>,
    pub availability: Arc<AvailabilityService>,
    pub intake: Arc<BookingIntake>,
    pub lifecycle: Arc<BookingLifecycle>,
    pub webhooks: Arc<PaymentWebhookProcessor>,
    pub travel: Option<Arc<TravelQuoter>>,
    pub effects: Arc<SideEffects>,
    pub auth: Arc<AdminAuth>,
    pub booking_limiter: Arc<FixedWindowLimiter>,
    pub login_limiter: Arc<FixedWindowLimiter>,
}

impl AppState {
    /// Build everything from the environment
    pub fn new() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;
        let backends = Backends::from_env(&config)?;
        Ok(Self::assemble(config, backends))
    }

    pub fn assemble(config: AppConfig, backends: Backends) -> Self {
        let urls = CheckoutUrls::new(&config.base_url);
        let clock = BusinessClock::new(backends.clock, config.timezone);

        let reference = Arc::new(ReferenceData::new(backends.reference, config.cache_ttls));
        let availability = Arc::new(AvailabilityService::new(
            reference.clone(),
            backends.bookings.clone(),
            clock,
        ));
        let effects = Arc::new(SideEffects::new(config.effect_timeout));

        let lifecycle = Arc::new(
            BookingLifecycle::new(
                backends.bookings.clone(),
                backends.gateway.clone(),
                reference.clone(),
                availability.clone(),
                effects.clone(),
                urls.clone(),
            )
            .with_calendar(backends.calendar)
            .with_notifier(backends.notifier),
        );

        let travel = backends.distance.map(|d| Arc::new(TravelQuoter::new(d)));
        let mut intake = BookingIntake::new(
            backends.bookings.clone(),
            backends.gateway.clone(),
            reference.clone(),
            availability.clone(),
            urls,
        );
        if let Some(ref travel) = travel {
            intake = intake.with_travel(travel.clone());
        }

        let webhooks = Arc::new(PaymentWebhookProcessor::new(
            backends.gateway,
            backends.bookings.clone(),
            lifecycle.clone(),
        ));

        let auth = Arc::new(AdminAuth::new(
            config.admin_token_secret.as_bytes().to_vec(),
            config.admin_password.clone(),
        ));
        let booking_limiter = Arc::new(FixedWindowLimiter::new(
            config.booking_rate_limit,
            config.booking_rate_window,
        ));
        let login_limiter = Arc::new(FixedWindowLimiter::new(LOGIN_RATE_LIMIT, LOGIN_RATE_WINDOW));

        Self {
            config: Arc::new(config),
            store: backends.bookings,
            reference,
            availability,
            intake: Arc::new(intake),
            lifecycle,
            webhooks,
            travel,
            effects,
            auth,
            booking_limiter,
            login_limiter,
        }
    }
}

/// Load development seed data from config file
fn load_seed() -> anyhow::Result<Seed> {
    let config_paths = [
        "config/seed.toml",
        "../config/seed.toml",
        "../../config/seed.toml",
    ];

    for path in config_paths {
        if let Ok(content) = std::fs::read_to_string(path) {
            let seed = Seed::from_toml(&content).with_context(|| format!("Failed to parse {}", path))?;
            info!(
                "Loaded seed from {}: {} services, {} template slots",
                path,
                seed.services.len(),
                seed.availability.len()
            );
            return Ok(seed);
        }
    }

    warn!("No seed file found, starting with empty tables");
    Ok(Seed::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(items: &[(&str, &str)]) -> HashMap<String, String> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_app_config_defaults() {
        let config = AppConfig::from_map(&HashMap::new()).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.timezone, chrono_tz::Africa::Johannesburg);
        assert_eq!(config.cache_ttls, CacheTtls::default());
        assert_eq!(config.booking_rate_limit, 10);
        assert!(!config.admin_token_secret.is_empty());
    }

    #[test]
    fn test_app_config_overrides() {
        let config = AppConfig::from_map(&vars(&[
            ("BUSINESS_TIMEZONE", "Europe/London"),
            ("BASE_URL", "https://book.example/"),
            ("SETTINGS_TTL_SECS", "30"),
            ("BOOKING_RATE_LIMIT", "3"),
        ]))
        .unwrap();
        assert_eq!(config.timezone, chrono_tz::Europe::London);
        assert_eq!(config.base_url, "https://book.example");
        assert_eq!(config.cache_ttls.settings, Duration::from_secs(30));
        assert_eq!(config.booking_rate_limit, 3);
    }

    #[test]
    fn test_app_config_rejects_bad_values() {
        assert!(AppConfig::from_map(&vars(&[("PORT", "eighty")])).is_err());
        assert!(AppConfig::from_map(&vars(&[("BUSINESS_TIMEZONE", "Mars/Olympus")])).is_err());
        assert!(AppConfig::from_map(&vars(&[("ENVIRONMENT", "production")])).is_err());
        assert!(AppConfig::from_map(&vars(&[("BOOKING_RATE_LIMIT", "4294967296")])).is_err());
    }

    #[test]
    fn test_socket_addr() {
        let mut config = AppConfig::from_map(&HashMap::new()).unwrap();
        config.host = "0.0.0.0".to_string();
        config.port = 3000;
        assert_eq!(config.socket_addr().unwrap().to_string(), "0.0.0.0:3000");
    }
}
