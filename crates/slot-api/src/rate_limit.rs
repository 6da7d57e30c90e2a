//! # Rate Limiting
//!
//! Fixed-window request ceilings keyed by (client, route). Counters live in
//! this process only.

use axum::extract::FromRequestParts;
use axum::http::{request::Parts, HeaderMap};
use slot_core::{BookingError, BookingResult};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Start pruning finished windows past this many tracked keys
const PRUNE_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Debug)]
pub struct FixedWindowLimiter {
    limit: u32,
    window: Duration,
    windows: Mutex<HashMap<(String, String), Window>>,
}

impl FixedWindowLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Count one request; `RateLimited` when over the ceiling
    pub fn check(&self, client: &str, route: &str) -> BookingResult<()> {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(|p| p.into_inner());

        if windows.len() > PRUNE_THRESHOLD {
            let window = self.window;
            windows.retain(|_, w| now.duration_since(w.started) < window);
        }

        let entry = windows
            .entry((client.to_string(), route.to_string()))
            .or_insert(Window {
                started: now,
                count: 0,
            });

        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        if entry.count >= self.limit {
            let remaining = self.window.saturating_sub(now.duration_since(entry.started));
            warn!(client, route, "Rate limit exceeded");
            return Err(BookingError::RateLimited {
                retry_after_secs: remaining.as_secs().max(1),
            });
        }

        entry.count += 1;
        Ok(())
    }
}

/// Client identity for rate limiting: first `X-Forwarded-For` entry, then
/// `X-Real-IP`, then `"unknown"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKey(pub String);

pub fn client_key(headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
    };
    header("x-forwarded-for")
        .or_else(|| header("x-real-ip"))
        .unwrap_or_else(|| "unknown".to_string())
}

impl<S> FromRequestParts<S> for ClientKey
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientKey(client_key(&parts.headers)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test(start_paused = true)]
    async fn test_ceiling_and_reset() {
        let limiter = FixedWindowLimiter::new(2, Duration::from_secs(60));

        assert!(limiter.check("1.2.3.4", "bookings").is_ok());
        assert!(limiter.check("1.2.3.4", "bookings").is_ok());

        tokio::time::advance(Duration::from_secs(15)).await;
        match limiter.check("1.2.3.4", "bookings") {
            Err(BookingError::RateLimited { retry_after_secs }) => assert_eq!(retry_after_secs, 45),
            other => panic!("expected rate limit, got {other:?}"),
        }

        // Separate counters per client and per route
        assert!(limiter.check("5.6.7.8", "bookings").is_ok());
        assert!(limiter.check("1.2.3.4", "login").is_ok());

        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(limiter.check("1.2.3.4", "bookings").is_ok());
    }

    #[test]
    fn test_client_key_precedence() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_key(&headers), "unknown");

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_key(&headers), "10.0.0.2");

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(client_key(&headers), "203.0.113.7");
    }
}
