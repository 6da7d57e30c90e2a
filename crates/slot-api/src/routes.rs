//! # Routes
//!
//! Axum router configuration for the booking API.

use crate::admin;
use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
///
/// Routes:
/// - Public:
///   - GET  /availability?month=YYYY-MM - Open slots per date
///   - GET  /services - Active services
///   - GET  /quote?address=... - Travel fee
///   - POST /bookings - Create booking and deposit checkout
///   - GET  /bookings/{reference}/status - Booking status
///
/// - Webhooks:
///   - POST /webhooks/payment - Payment gateway events (raw body)
///
/// - Admin (X-Admin-Token):
///   - POST /admin/login
///   - GET  /admin/bookings
///   - POST /admin/bookings/{id}/status
///   - POST /admin/bookings/{id}/reschedule
///   - POST /admin/bookings/{id}/balance-request
///   - POST /admin/bookings/{id}/refund
///   - PUT  /admin/password
///   - POST /admin/cache/invalidate
pub fn create_router(state: AppState) -> Router {
    // The booking wizard is served from another origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public_routes = Router::new()
        .route("/availability", get(handlers::availability))
        .route("/services", get(handlers::list_services))
        .route("/quote", get(handlers::quote))
        .route("/bookings", post(handlers::create_booking))
        .route("/bookings/{reference}/status", get(handlers::booking_status));

    let admin_routes = Router::new()
        .route("/login", post(admin::login))
        .route("/bookings", get(admin::list_bookings))
        .route("/bookings/{id}/status", post(admin::set_status))
        .route("/bookings/{id}/reschedule", post(admin::reschedule))
        .route("/bookings/{id}/balance-request", post(admin::request_balance))
        .route("/bookings/{id}/refund", post(admin::refund))
        .route("/password", put(admin::change_password))
        .route("/cache/invalidate", post(admin::invalidate_caches));

    // Signature checks need the exact body bytes
    let webhook_routes = Router::new().route("/payment", post(handlers::payment_webhook));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/", get(handlers::health))
        .merge(public_routes)
        .nest("/admin", admin_routes)
        .nest("/webhooks", webhook_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
