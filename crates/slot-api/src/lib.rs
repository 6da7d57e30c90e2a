//! # slot-api
//!
//! HTTP API layer for slotkeeper.
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - Public endpoints for availability, services, quotes and bookings
//! - The payment webhook and the admin console API
//! - HTTP clients for the calendar, notification relay and distance lookups
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | GET | `/availability?month=YYYY-MM` | Open slots per date |
//! | GET | `/services` | Active services |
//! | GET | `/quote?address=...` | Travel fee |
//! | POST | `/bookings` | Create booking and deposit checkout |
//! | GET | `/bookings/{reference}/status` | Booking status |
//! | POST | `/webhooks/payment` | Payment gateway webhook |
//! | POST | `/admin/login` | Exchange the admin password for a token |
//! | * | `/admin/...` | Booking management (token required) |

pub mod admin;
pub mod auth;
pub mod handlers;
pub mod outbound;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::{AppConfig, AppState, Backends};
