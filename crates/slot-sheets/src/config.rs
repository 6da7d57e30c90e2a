//! # Sheets Configuration
//!
//! Row API endpoint and credentials, loaded from environment variables.

use slot_core::BookingError;
use std::collections::HashMap;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SheetsConfig {
    /// Base URL of the row API, e.g. `https://sheetdb.io/api/v1/abc123`
    pub api_url: String,

    /// Bearer token, when the API is protected
    pub api_token: Option<String>,

    pub timeout: Duration,
}

impl SheetsConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `Ok(None)` when `SHEETS_API_URL` is unset so callers can fall
    /// back to the in-memory store.
    pub fn from_env() -> Result<Option<Self>, BookingError> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    pub fn from_map(vars: &HashMap<String, String>) -> Result<Option<Self>, BookingError> {
        Self::from_vars(|key| vars.get(key).cloned())
    }

    fn from_vars(get: impl Fn(&str) -> Option<String>) -> Result<Option<Self>, BookingError> {
        let Some(api_url) = get("SHEETS_API_URL").filter(|v| !v.trim().is_empty()) else {
            return Ok(None);
        };

        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            return Err(BookingError::Configuration(
                "SHEETS_API_URL must be an http(s) URL".to_string(),
            ));
        }

        let mut config = Self::new(api_url);
        config.api_token = get("SHEETS_API_TOKEN").filter(|v| !v.trim().is_empty());
        Ok(Some(config))
    }

    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_token: None,
            timeout: Duration::from_secs(15),
        }
    }

    /// Builder: set bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_url_means_disabled() {
        assert!(SheetsConfig::from_map(&HashMap::new()).unwrap().is_none());
    }

    #[test]
    fn test_from_map() {
        let vars = HashMap::from([
            ("SHEETS_API_URL".to_string(), "https://sheetdb.io/api/v1/abc/".to_string()),
            ("SHEETS_API_TOKEN".to_string(), "tok".to_string()),
        ]);
        let config = SheetsConfig::from_map(&vars).unwrap().unwrap();
        assert_eq!(config.api_url, "https://sheetdb.io/api/v1/abc");
        assert_eq!(config.api_token.as_deref(), Some("tok"));

        let bad = HashMap::from([("SHEETS_API_URL".to_string(), "sheetdb.io".to_string())]);
        assert!(SheetsConfig::from_map(&bad).is_err());
    }
}
