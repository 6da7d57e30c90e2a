//! # Request Handlers
//!
//! Public booking endpoints and the payment webhook. Admin endpoints live in
//! [`crate::admin`].

use crate::rate_limit::ClientKey;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use slot_core::{
    is_well_formed_booking_id, BookingError, BookingRequest, MonthAvailability, MonthKey, PublicBookingStatus,
};
use tracing::{error, info, instrument, warn};

// =============================================================================
// Errors
// =============================================================================

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            error: error.into(),
            code,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// `BookingError` rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub BookingError);

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.status_code();
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = if status.is_server_error() {
            // Upstream detail stays in the logs
            error!("Request failed: {}", self.0);
            ErrorResponse::new("The booking service is temporarily unavailable", code)
                .with_details(if self.0.is_retryable() { "retryable" } else { "internal" })
        } else {
            ErrorResponse::new(self.0.to_string(), code)
        };

        let mut response = (status, Json(body)).into_response();
        if let BookingError::RateLimited { retry_after_secs } = self.0 {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct MonthQuery {
    pub month: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
    #[serde(default)]
    pub address: String,
}

/// Active service as shown to the booking wizard
#[derive(Debug, Serialize)]
pub struct ServiceView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub duration: u32,
    pub category: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub fee: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub one_way_km: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_trip_km: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingCreated {
    pub success: bool,
    pub booking_id: String,
    pub payment_url: Option<String>,
    pub payment_error: Option<String>,
    pub deposit_amount: f64,
    pub balance_due: f64,
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "slotkeeper",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Bookable slots per date for one month (current month by default)
pub async fn availability(
    State(state): State<AppState>,
    Query(query): Query<MonthQuery>,
) -> ApiResult<Json<MonthAvailability>> {
    let month = match query.month.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        Some(raw) => MonthKey::parse(raw)
            .ok_or_else(|| BookingError::Validation(format!("month must be YYYY-MM, got '{}'", raw)))?,
        None => MonthKey::of(state.availability.clock().civil_now().date()),
    };

    let slots = state.availability.month(month).await?;
    Ok(Json(slots.as_ref().clone()))
}

pub async fn list_services(State(state): State<AppState>) -> ApiResult<Json<Vec<ServiceView>>> {
    let catalog = state.reference.catalog().await?;
    Ok(Json(
        catalog
            .active_services()
            .map(|s| ServiceView {
                id: s.id.clone(),
                name: s.name.clone(),
                description: s.description.clone(),
                price: s.price.as_decimal(),
                duration: s.duration_minutes,
                category: s.category.clone(),
            })
            .collect(),
    ))
}

/// Travel fee for an address. Failures are reported in the body with a zero
/// fee so the wizard can carry on.
pub async fn quote(State(state): State<AppState>, Query(query): Query<QuoteQuery>) -> Json<QuoteResponse> {
    let Some(ref travel) = state.travel else {
        return Json(QuoteResponse {
            error: Some("travel quotes are not available".to_string()),
            ..QuoteResponse::default()
        });
    };

    let settings = state.reference.settings_or_default().await;
    match travel.quote(&settings, &query.address).await {
        Ok(q) => Json(QuoteResponse {
            fee: q.fee.as_decimal(),
            one_way_km: Some(q.one_way_km),
            round_trip_km: Some(q.round_trip_km),
            duration: Some(q.duration_minutes),
            error: None,
        }),
        Err(e) => {
            warn!("Travel quote failed: {}", e);
            Json(QuoteResponse {
                error: Some(e.to_string()),
                ..QuoteResponse::default()
            })
        }
    }
}

#[instrument(skip_all, fields(client = %client.0))]
pub async fn create_booking(
    State(state): State<AppState>,
    client: ClientKey,
    Json(request): Json<BookingRequest>,
) -> ApiResult<Json<BookingCreated>> {
    state.booking_limiter.check(&client.0, "bookings")?;

    let receipt = state.intake.submit(&request).await?;
    info!(booking_id = %receipt.booking.id, "Booking created");

    Ok(Json(BookingCreated {
        success: true,
        deposit_amount: receipt.deposit().as_decimal(),
        balance_due: receipt.balance().as_decimal(),
        booking_id: receipt.booking.id,
        payment_url: receipt.payment_url,
        payment_error: receipt.payment_error,
    }))
}

pub async fn booking_status(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> ApiResult<Json<PublicBookingStatus>> {
    let reference = reference.trim().to_ascii_uppercase();
    if !is_well_formed_booking_id(&reference) {
        return Err(BookingError::not_found(&reference).into());
    }

    let booking = state
        .store
        .find_by_id(&reference)
        .await?
        .ok_or_else(|| BookingError::not_found(&reference))?;
    Ok(Json(booking.public_status()))
}

/// Payment webhook: 200 once handled or discarded, 401 on a bad signature,
/// 500 when the state write failed so the gateway redelivers
#[instrument(skip(state, headers, body))]
pub async fn payment_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let signature = headers.get("stripe-signature").and_then(|v| v.to_str().ok());

    match state.webhooks.process(&body, signature).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e @ BookingError::WebhookVerificationFailed(_)) => {
            warn!("Webhook rejected: {}", e);
            ApiError(e).into_response()
        }
        Err(e) => {
            error!("Webhook processing failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("webhook not applied", 500)),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn test_error_response() {
        let err = ErrorResponse::new("Test error", 400);
        assert_eq!(err.error, "Test error");
        assert_eq!(err.code, 400);
    }

    #[tokio::test]
    async fn test_api_error_status_and_body() {
        let response = ApiError(BookingError::SlotUnavailable {
            date: "2026-03-09".to_string(),
            time: "09:00-10:00".to_string(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], 409);
        assert!(json["error"].as_str().unwrap().contains("09:00-10:00"));
    }

    #[test]
    fn test_server_errors_hide_upstream_detail() {
        let response = ApiError(BookingError::Store("sheet quota exceeded for key abc".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = ApiError(BookingError::RateLimited { retry_after_secs: 42 }).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }
}
