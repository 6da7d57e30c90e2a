//! # slot-stripe
//!
//! Stripe payment gateway for slotkeeper.
//!
//! - **StripeGateway** implements `slot_core::PaymentGateway`
//!   - Checkout Sessions for deposit and balance links
//!   - Refunds against the captured payment intent
//!   - Webhook signature verification over the raw body
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use slot_stripe::StripeGateway;
//! use slot_core::PaymentGateway;
//!
//! let gateway = StripeGateway::from_env()?;
//! let session = gateway.create_checkout(&request).await?;
//!
//! // Redirect the customer to session.checkout_url
//! ```
//!
//! ## Webhooks
//!
//! Checkout sessions carry `metadata[booking_id]` and `metadata[payment_type]`,
//! so the webhook needs nothing but the event body to find the booking.
//!
//! ```rust,ignore
//! let event = gateway.verify_webhook(&body, signature_header).await?;
//! ```

pub mod checkout;
pub mod config;
pub mod webhook;

// Re-exports
pub use checkout::StripeGateway;
pub use config::StripeConfig;
pub use webhook::{
    parse_event, setup_instructions, sign_payload, verify_signature, PAYMENT_SUCCEEDED_EVENTS,
};
