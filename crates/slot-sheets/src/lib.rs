//! # slot-sheets
//!
//! Spreadsheet-backed storage for slotkeeper.
//!
//! The operator edits four tables by hand (`bookings`, `services`,
//! `availability`, `settings`); this crate reads and writes them through a
//! SheetDB-style row API.
//!
//! ```rust,ignore
//! use slot_sheets::{SheetsConfig, SheetsStore};
//!
//! if let Some(config) = SheetsConfig::from_env()? {
//!     let store = Arc::new(SheetsStore::new(config)?);
//! }
//! ```

pub mod client;
pub mod config;
pub mod rows;
pub mod store;

pub use client::{Row, SheetsClient};
pub use config::SheetsConfig;
pub use store::SheetsStore;
