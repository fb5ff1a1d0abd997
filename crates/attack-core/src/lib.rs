//! Core types and trait definitions for the ATT&CK catalog sync pipeline.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! The parser, the TAXII client, the SQLite backend and the orchestrator all
//! depend on it; it depends on nothing proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod catalog;
pub mod domain;
pub mod error;
pub mod object_id;
pub mod relationship;
pub mod source;
pub mod store;
pub mod sync_state;

pub use domain::CatalogDomain;
pub use error::{Error, Result};
