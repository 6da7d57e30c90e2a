//! # Stripe Configuration
//!
//! Configuration management for Stripe integration.
//! All secrets are loaded from environment variables.

use slot_core::BookingError;
use std::collections::HashMap;
use std::env;
use std::time::Duration;

const DEFAULT_API_BASE_URL: &str = "https://api.stripe.com";
const DEFAULT_API_VERSION: &str = "2024-12-18.acacia";

/// Stripe API configuration
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Secret API key (sk_test_..., sk_live_... or a restricted rk_ key)
    pub secret_key: String,

    /// Webhook signing secret (whsec_...). Without it webhooks are accepted
    /// unverified.
    pub webhook_secret: Option<String>,

    /// API base URL (for testing/mocking)
    pub api_base_url: String,

    /// API version
    pub api_version: String,

    /// Per-request timeout
    pub timeout: Duration,
}

impl StripeConfig {
    /// Load configuration from environment variables.
    ///
    /// Required: `STRIPE_SECRET_KEY`. Optional: `STRIPE_WEBHOOK_SECRET`.
    pub fn from_env() -> Result<Self, BookingError> {
        dotenvy::dotenv().ok(); // Load .env file if present
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an explicit map
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, BookingError> {
        Self::from_vars(|key| vars.get(key).cloned())
    }

    fn from_vars(get: impl Fn(&str) -> Option<String>) -> Result<Self, BookingError> {
        let secret_key = get("STRIPE_SECRET_KEY")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| BookingError::Configuration("STRIPE_SECRET_KEY not set".to_string()))?;

        // Validate key formats
        if !["sk_test_", "sk_live_", "rk_test_", "rk_live_"]
            .iter()
            .any(|prefix| secret_key.starts_with(prefix))
        {
            return Err(BookingError::Configuration(
                "STRIPE_SECRET_KEY must start with sk_test_, sk_live_, rk_test_ or rk_live_".to_string(),
            ));
        }

        let webhook_secret = get("STRIPE_WEBHOOK_SECRET").filter(|v| !v.trim().is_empty());
        if let Some(ref secret) = webhook_secret {
            if !secret.starts_with("whsec_") {
                return Err(BookingError::Configuration(
                    "STRIPE_WEBHOOK_SECRET must start with whsec_".to_string(),
                ));
            }
        }

        Ok(Self {
            webhook_secret,
            ..Self::new(secret_key)
        })
    }

    /// Create config with explicit values (for testing)
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            webhook_secret: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Check if using test keys
    pub fn is_test_mode(&self) -> bool {
        self.secret_key.contains("_test_")
    }

    /// Get authorization header value
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.secret_key)
    }

    /// Builder: set webhook signing secret
    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = Some(secret.into());
        self
    }

    /// Builder: set custom API base URL (for testing)
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}
