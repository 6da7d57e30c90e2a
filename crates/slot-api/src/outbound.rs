//! # Outbound Clients
//!
//! HTTP implementations of the calendar, notification and distance ports,
//! plus the gateway stand-in used when Stripe is not configured.
//!
//! Each client is optional. Without its environment variables the server
//! falls back to the logging implementations from `slot-core`.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use slot_core::{
    BookingError, BookingResult, CalendarClient, CalendarEvent, CheckoutRequest, CheckoutSession,
    DistanceProvider, Notification, Notifier, PaymentEvent, PaymentGateway, Price, RefundReceipt,
    RouteDistance,
};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

const GOOGLE_CALENDAR_API: &str = "https://www.googleapis.com/calendar/v3";
const GOOGLE_DISTANCE_API: &str = "https://maps.googleapis.com/maps/api/distancematrix/json";

/// Credentials for the optional collaborators
#[derive(Debug, Clone, Default)]
pub struct OutboundConfig {
    pub calendar_id: Option<String>,
    pub calendar_token: Option<String>,
    pub notify_url: Option<String>,
    pub maps_api_key: Option<String>,
    pub timeout: Duration,
}

impl OutboundConfig {
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    pub fn from_map(vars: &HashMap<String, String>) -> Self {
        Self::from_vars(|key| vars.get(key).cloned())
    }

    fn from_vars(get: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());
        Self {
            calendar_id: get("GOOGLE_CALENDAR_ID"),
            calendar_token: get("GOOGLE_CALENDAR_TOKEN"),
            notify_url: get("NOTIFY_WEBHOOK_URL"),
            maps_api_key: get("GOOGLE_MAPS_API_KEY"),
            timeout: Duration::from_secs(15),
        }
    }

    pub fn http_client(&self) -> BookingResult<Client> {
        Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| BookingError::Configuration(format!("HTTP client: {}", e)))
    }
}

async fn send(provider: &str, builder: RequestBuilder) -> BookingResult<reqwest::Response> {
    let response = builder
        .send()
        .await
        .map_err(|e| BookingError::NetworkError(format!("{}: {}", provider, e)))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    error!("{} API error: status={}, body={}", provider, status, body);
    Err(BookingError::ProviderError {
        provider: provider.to_string(),
        message: format!("HTTP {}", status),
    })
}

async fn read_json<T: DeserializeOwned>(provider: &str, response: reqwest::Response) -> BookingResult<T> {
    response.json().await.map_err(|e| BookingError::ProviderError {
        provider: provider.to_string(),
        message: format!("unreadable response: {}", e),
    })
}

// =============================================================================
// Google Calendar
// =============================================================================

pub struct GoogleCalendarClient {
    client: Client,
    calendar_id: String,
    token: String,
    api_base_url: String,
}

#[derive(Debug, Deserialize)]
struct CreatedEvent {
    id: String,
}

impl GoogleCalendarClient {
    pub fn new(client: Client, calendar_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            calendar_id: calendar_id.into(),
            token: token.into(),
            api_base_url: GOOGLE_CALENDAR_API.to_string(),
        }
    }

    /// Builder: set custom API base URL (for testing)
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn events_url(&self, event_id: Option<&str>) -> BookingResult<Url> {
        let mut url = Url::parse(&self.api_base_url)
            .map_err(|e| BookingError::Configuration(format!("calendar URL: {}", e)))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| BookingError::Configuration("calendar URL cannot be a base".into()))?;
            segments.pop_if_empty().extend(["calendars", self.calendar_id.as_str(), "events"]);
            if let Some(id) = event_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    fn body(event: &CalendarEvent) -> serde_json::Value {
        let at = |t: &chrono::NaiveDateTime| {
            json!({
                "dateTime": t.format("%Y-%m-%dT%H:%M:%S").to_string(),
                "timeZone": event.timezone,
            })
        };
        json!({
            "summary": event.summary,
            "description": event.description,
            "location": event.location,
            "start": at(&event.start),
            "end": at(&event.end),
        })
    }
}

#[async_trait]
impl CalendarClient for GoogleCalendarClient {
    #[instrument(skip(self, event), fields(start = %event.start))]
    async fn create_event(&self, event: &CalendarEvent) -> BookingResult<String> {
        let request = self
            .client
            .post(self.events_url(None)?)
            .bearer_auth(&self.token)
            .json(&Self::body(event));
        let created: CreatedEvent = read_json("google-calendar", send("google-calendar", request).await?).await?;
        info!("Calendar event created: {}", created.id);
        Ok(created.id)
    }

    #[instrument(skip(self, event))]
    async fn update_event(&self, event_id: &str, event: &CalendarEvent) -> BookingResult<()> {
        let request = self
            .client
            .patch(self.events_url(Some(event_id))?)
            .bearer_auth(&self.token)
            .json(&Self::body(event));
        send("google-calendar", request).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_event(&self, event_id: &str) -> BookingResult<()> {
        let response = self
            .client
            .delete(self.events_url(Some(event_id))?)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| BookingError::NetworkError(format!("google-calendar: {}", e)))?;

        // Already gone is as good as deleted
        match response.status().as_u16() {
            200..=299 | 404 | 410 => Ok(()),
            status => Err(BookingError::ProviderError {
                provider: "google-calendar".to_string(),
                message: format!("delete returned HTTP {}", status),
            }),
        }
    }
}

// =============================================================================
// Notification relay
// =============================================================================

/// Posts each notification as JSON; the relay renders and delivers it
pub struct RelayNotifier {
    client: Client,
    url: String,
}

impl RelayNotifier {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for RelayNotifier {
    #[instrument(skip(self, notification), fields(kind = notification.kind.as_str(), booking_id = %notification.booking.id))]
    async fn send(&self, notification: &Notification) -> BookingResult<()> {
        send("notify-relay", self.client.post(&self.url).json(notification)).await?;
        debug!("Notification relayed");
        Ok(())
    }
}

// =============================================================================
// Google Distance Matrix
// =============================================================================

pub struct GoogleDistanceMatrix {
    client: Client,
    api_key: String,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct MatrixResponse {
    status: String,
    #[serde(default)]
    rows: Vec<MatrixRow>,
}

#[derive(Debug, Deserialize)]
struct MatrixRow {
    elements: Vec<MatrixElement>,
}

#[derive(Debug, Deserialize)]
struct MatrixElement {
    status: String,
    distance: Option<MatrixValue>,
    duration: Option<MatrixValue>,
}

#[derive(Debug, Deserialize)]
struct MatrixValue {
    value: f64,
}

impl GoogleDistanceMatrix {
    pub fn new(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            api_url: GOOGLE_DISTANCE_API.to_string(),
        }
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }
}

#[async_trait]
impl DistanceProvider for GoogleDistanceMatrix {
    #[instrument(skip(self, origin))]
    async fn distance(&self, origin: &str, destination: &str) -> BookingResult<RouteDistance> {
        let request = self.client.get(&self.api_url).query(&[
            ("origins", origin),
            ("destinations", destination),
            ("units", "metric"),
            ("key", self.api_key.as_str()),
        ]);
        let matrix: MatrixResponse = read_json("distance-matrix", send("distance-matrix", request).await?).await?;

        if matrix.status != "OK" {
            return Err(BookingError::ProviderError {
                provider: "distance-matrix".to_string(),
                message: matrix.status,
            });
        }

        let element = matrix
            .rows
            .into_iter()
            .next()
            .and_then(|row| row.elements.into_iter().next())
            .ok_or_else(|| BookingError::ProviderError {
                provider: "distance-matrix".to_string(),
                message: "empty result".to_string(),
            })?;

        match (element.status.as_str(), element.distance, element.duration) {
            ("OK", Some(distance), duration) => Ok(RouteDistance {
                one_way_km: distance.value / 1000.0,
                duration_minutes: duration.map(|d| (d.value / 60.0).round() as u32).unwrap_or(0),
            }),
            (status, _, _) => Err(BookingError::Validation(format!(
                "address could not be routed ({})",
                status
            ))),
        }
    }
}

// =============================================================================
// No gateway
// =============================================================================

/// Gateway used when no payment provider is configured. Bookings are still
/// taken; deposits are arranged by hand.
pub struct UnconfiguredGateway;

#[async_trait]
impl PaymentGateway for UnconfiguredGateway {
    async fn create_checkout(&self, request: &CheckoutRequest) -> BookingResult<CheckoutSession> {
        info!(booking_id = %request.booking_id, "No payment gateway configured, skipping checkout");
        Err(BookingError::Configuration("payment gateway not configured".to_string()))
    }

    async fn refund(&self, _payment_ref: &str, _amount: Option<Price>) -> BookingResult<RefundReceipt> {
        Err(BookingError::Configuration("payment gateway not configured".to_string()))
    }

    async fn verify_webhook(&self, _payload: &[u8], _signature: Option<&str>) -> BookingResult<PaymentEvent> {
        Err(BookingError::WebhookVerificationFailed(
            "payment gateway not configured".to_string(),
        ))
    }

    fn provider_name(&self) -> &'static str {
        "none"
    }
}
