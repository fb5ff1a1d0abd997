//! TAXII 2.1 client for the ATT&CK catalog server.
//!
//! Fetches one collection's objects, following `more`/`next` continuation
//! cursors until the server reports no further pages.

mod client;
mod config;

pub mod error;

pub use client::{TAXII_MEDIA_TYPE, TaxiiClient};
pub use config::TaxiiConfig;
pub use error::{Error, Result};
