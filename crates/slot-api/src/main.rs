//! # slotkeeper
//!
//! Appointment booking service with online deposits.
//!
//! ## Usage
//!
//! ```bash
//! # Set environment variables
//! export STRIPE_SECRET_KEY=sk_test_...
//! export STRIPE_WEBHOOK_SECRET=whsec_...
//! export SHEETS_API_URL=https://sheets.example/api/v1/abc123
//! export ADMIN_TOKEN_SECRET=...
//!
//! # Run the server
//! slotkeeper
//! ```
//!
//! Set `LOG_FORMAT=json` for one JSON object per log line.

use slot_api::{routes, state::AppState};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    print_banner();

    let state = AppState::new()?;
    let effects = state.effects.clone();

    let addr = state.config.socket_addr()?;
    let is_prod = state.config.is_production();

    info!("Environment: {}", state.config.environment);
    info!("Business timezone: {}", state.config.timezone);
    info!("Public base URL: {}", state.config.base_url);

    let app = routes::create_router(state);

    info!("Slotkeeper starting on http://{}", addr);
    if !is_prod {
        info!("Availability: GET http://{}/availability", addr);
        info!("Bookings: POST http://{}/bookings", addr);
        info!("Webhook: POST http://{}/webhooks/payment", addr);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Waiting for outstanding calendar and notification work");
    effects.flush().await;
    info!("Shutdown complete");

    Ok(())
}

fn init_tracing() {
    let filter = || {
        EnvFilter::builder()
            .with_default_directive(Level::INFO.into())
            .from_env_lossy()
    };

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter())
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn print_banner() {
    println!(
        r#"
  slotkeeper
  ━━━━━━━━━━━━━━━━━━━━━━━
  Bookings & deposits
  Version: {}

"#,
        env!("CARGO_PKG_VERSION")
    );
}
