//! # Admin Authentication
//!
//! Stateless bearer token: `hex(HMAC-SHA256(secret, current password))`.
//!
//! Nothing is stored server-side. Changing the password changes the token,
//! so every previously issued token stops validating.

use crate::handlers::ApiError;
use crate::state::AppState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use slot_core::{BookingError, BookingResult, Settings};
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the admin token
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

pub struct AdminAuth {
    secret: Vec<u8>,
    /// `ADMIN_PASSWORD`, used until a password is stored in settings
    fallback_password: Option<String>,
}

impl AdminAuth {
    pub fn new(secret: impl Into<Vec<u8>>, fallback_password: Option<String>) -> Self {
        Self {
            secret: secret.into(),
            fallback_password,
        }
    }

    fn mac(&self, password: &str) -> BookingResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| BookingError::Configuration(format!("admin token secret: {}", e)))?;
        mac.update(password.as_bytes());
        Ok(mac)
    }

    /// The password in force: settings first, then the environment
    pub fn current_password<'a>(&'a self, settings: &'a Settings) -> BookingResult<&'a str> {
        settings
            .admin_password
            .as_deref()
            .or(self.fallback_password.as_deref())
            .ok_or_else(|| BookingError::Configuration("no admin password configured".to_string()))
    }

    pub fn token_for(&self, password: &str) -> BookingResult<String> {
        Ok(hex::encode(self.mac(password)?.finalize().into_bytes()))
    }

    /// Constant-time check of a presented password against the current one
    pub fn check_password(&self, presented: &str, current: &str) -> BookingResult<bool> {
        let expected = self.mac(current)?.finalize().into_bytes();
        Ok(self.mac(presented)?.verify_slice(&expected).is_ok())
    }

    /// Log in: issue a token when `presented` matches
    pub fn login(&self, presented: &str, settings: &Settings) -> BookingResult<String> {
        let current = self.current_password(settings)?;
        if !self.check_password(presented, current)? {
            return Err(BookingError::Unauthorized("invalid password".to_string()));
        }
        self.token_for(current)
    }

    /// Whether `token` matches the current password
    pub fn verify(&self, token: &str, settings: &Settings) -> BookingResult<bool> {
        let mut presented = [0u8; 32];
        if token.len() != 64 || hex::decode_to_slice(token, &mut presented).is_err() {
            return Ok(false);
        }
        let current = self.current_password(settings)?;
        Ok(self.mac(current)?.verify_slice(&presented).is_ok())
    }
}

/// Extractor guarding admin routes
pub struct AdminSession;

impl FromRequestParts<AppState> for AdminSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .ok_or_else(|| BookingError::Unauthorized("missing admin token".to_string()))?;

        let settings = state.reference.settings().await?;
        if state.auth.verify(token, &settings)? {
            Ok(AdminSession)
        } else {
            warn!("Rejected admin token");
            Err(BookingError::Unauthorized("invalid admin token".to_string()).into())
        }
    }
}
