//! STIX 2.1 object parser for the ATT&CK catalog.
//!
//! Converts the flat, loosely-typed object stream fetched from a TAXII
//! collection into [`attack_core`] catalog records. Pure synchronous; no HTTP
//! or database dependencies.
//!
//! # Quick start
//!
//! ```no_run
//! use attack_core::CatalogDomain;
//! use attack_stix::parse_bundle;
//!
//! let objects: Vec<serde_json::Value> = serde_json::from_str("[]").unwrap();
//! let bundle = parse_bundle(&objects, CatalogDomain::Enterprise);
//! println!("{} raw, {} techniques", bundle.raw_objects.len(), bundle.techniques.len());
//! ```

mod object;
mod parse;

pub use object::StixObject;
pub use parse::{classify, parse_bundle};
