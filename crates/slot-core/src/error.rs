//! # Booking Error Types
//!
//! Typed error handling for the slotkeeper booking engine.
//! All booking operations return `Result<T, BookingError>`.

use thiserror::Error;

/// Core error type for all booking operations
#[derive(Debug, Error)]
pub enum BookingError {
    /// Configuration errors (missing keys, invalid config)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed or incomplete input
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Missing or invalid admin token
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Booking reference does not exist
    #[error("Booking not found: {booking_id}")]
    BookingNotFound { booking_id: String },

    /// Service id not present in the active catalog
    #[error("Service not found: {service_id}")]
    ServiceNotFound { service_id: String },

    /// The requested slot is already held by an active booking
    #[error("Slot {date} {time} is no longer available")]
    SlotUnavailable { date: String, time: String },

    /// Status change not allowed from the booking's current state
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// External record store failed or returned garbage
    #[error("Store error: {0}")]
    Store(String),

    /// Payment provider API error
    #[error("Provider error [{provider}]: {message}")]
    ProviderError { provider: String, message: String },

    /// Network/HTTP error communicating with an upstream
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Refund call failed; nothing was recorded
    #[error("Refund failed: {0}")]
    RefundFailed(String),

    /// Webhook signature verification failed
    #[error("Webhook verification failed: {0}")]
    WebhookVerificationFailed(String),

    /// Webhook payload parsing error
    #[error("Webhook parse error: {0}")]
    WebhookParseError(String),

    /// Per-client request ceiling exceeded
    #[error("Rate limited, retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl BookingError {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BookingError::NetworkError(_)
                | BookingError::RateLimited { .. }
                | BookingError::ProviderError { .. }
                | BookingError::Store(_)
        )
    }

    /// Returns the HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            BookingError::Configuration(_) => 500,
            BookingError::Validation(_) => 400,
            BookingError::Unauthorized(_) => 401,
            BookingError::BookingNotFound { .. } => 404,
            BookingError::ServiceNotFound { .. } => 400,
            BookingError::SlotUnavailable { .. } => 409,
            BookingError::InvalidTransition(_) => 409,
            BookingError::Store(_) => 502,
            BookingError::ProviderError { .. } => 502,
            BookingError::NetworkError(_) => 503,
            BookingError::RefundFailed(_) => 502,
            BookingError::WebhookVerificationFailed(_) => 401,
            BookingError::WebhookParseError(_) => 400,
            BookingError::RateLimited { .. } => 429,
            BookingError::Internal(_) => 500,
            BookingError::Serialization(_) => 500,
        }
    }

    /// Shorthand for a booking-not-found error
    pub fn not_found(booking_id: impl Into<String>) -> Self {
        BookingError::BookingNotFound {
            booking_id: booking_id.into(),
        }
    }
}

/// Result type alias for booking operations
pub type BookingResult<T> = Result<T, BookingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(BookingError::NetworkError("timeout".into()).is_retryable());
        assert!(BookingError::Store("sheet quota".into()).is_retryable());
        assert!(BookingError::RateLimited {
            retry_after_secs: 60
        }
        .is_retryable());
        assert!(!BookingError::Validation("bad data".into()).is_retryable());
        assert!(!BookingError::RefundFailed("declined".into()).is_retryable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(BookingError::Validation("test".into()).status_code(), 400);
        assert_eq!(BookingError::not_found("BK-1").status_code(), 404);
        assert_eq!(
            BookingError::SlotUnavailable {
                date: "2026-03-09".into(),
                time: "09:00-10:00".into()
            }
            .status_code(),
            409
        );
        assert_eq!(
            BookingError::WebhookVerificationFailed("sig".into()).status_code(),
            401
        );
        assert_eq!(
            BookingError::RateLimited {
                retry_after_secs: 60
            }
            .status_code(),
            429
        );
    }
}
