//! # Admin Handlers
//!
//! Every route except login requires a valid `X-Admin-Token`.

use crate::auth::AdminSession;
use crate::handlers::ApiResult;
use crate::rate_limit::ClientKey;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use slot_core::{Booking, BookingError, DepositStatus, Transition, ADMIN_PASSWORD_KEY};
use tracing::{info, instrument};

/// Shortest password accepted by a password change
const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub status: String,
    #[serde(default)]
    pub payment_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    pub date: String,
    pub time: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordChange {
    pub password: String,
}

/// Result of an admin operation
#[derive(Debug, Serialize)]
pub struct TransitionView {
    pub booking: Booking,
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<&'static str>,
}

impl From<Transition> for TransitionView {
    fn from(t: Transition) -> Self {
        Self {
            booking: t.booking,
            changed: t.changed,
            note: t.note,
        }
    }
}

#[instrument(skip_all, fields(client = %client.0))]
pub async fn login(
    State(state): State<AppState>,
    client: ClientKey,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    state.login_limiter.check(&client.0, "admin_login")?;

    let settings = state.reference.settings().await?;
    let token = state.auth.login(&request.password, &settings)?;
    info!("Admin logged in");
    Ok(Json(TokenResponse { token }))
}

/// Every booking, ordered by appointment
pub async fn list_bookings(_admin: AdminSession, State(state): State<AppState>) -> ApiResult<Json<Vec<Booking>>> {
    let mut bookings = state.store.list_all().await?;
    bookings.sort_by(|a, b| (a.date, &a.time).cmp(&(b.date, &b.time)));
    Ok(Json(bookings))
}

#[instrument(skip(_admin, state, change))]
pub async fn set_status(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(change): Json<StatusChange>,
) -> ApiResult<Json<TransitionView>> {
    let target = DepositStatus::parse(&change.status)
        .ok_or_else(|| BookingError::Validation(format!("unknown status '{}'", change.status)))?;

    let transition = state
        .lifecycle
        .apply_admin_status(&id, target, change.payment_ref.as_deref())
        .await?;
    Ok(Json(transition.into()))
}

#[instrument(skip(_admin, state, request))]
pub async fn reschedule(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RescheduleRequest>,
) -> ApiResult<Json<TransitionView>> {
    let date = NaiveDate::parse_from_str(request.date.trim(), "%Y-%m-%d")
        .map_err(|_| BookingError::Validation(format!("invalid date '{}'", request.date)))?;

    let transition = state.lifecycle.reschedule(&id, date, &request.time).await?;
    Ok(Json(transition.into()))
}

pub async fn request_balance(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TransitionView>> {
    Ok(Json(state.lifecycle.request_balance(&id).await?.into()))
}

pub async fn refund(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TransitionView>> {
    Ok(Json(state.lifecycle.refund(&id).await?.into()))
}

/// Store a new password. Tokens issued for the old one stop validating.
pub async fn change_password(
    _admin: AdminSession,
    State(state): State<AppState>,
    Json(request): Json<PasswordChange>,
) -> ApiResult<Json<TokenResponse>> {
    let password = request.password.trim();
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(BookingError::Validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        ))
        .into());
    }

    state.reference.put_setting(ADMIN_PASSWORD_KEY, password).await?;
    info!("Admin password changed");
    Ok(Json(TokenResponse {
        token: state.auth.token_for(password)?,
    }))
}

/// Drop every cache so the next read goes to the store
pub async fn invalidate_caches(_admin: AdminSession, State(state): State<AppState>) -> Json<serde_json::Value> {
    state.reference.invalidate_all().await;
    state.availability.invalidate().await;
    info!("All caches invalidated");
    Json(serde_json::json!({
        "invalidated": ["settings", "catalog", "template", "availability"]
    }))
}
