//! # Dedup Common Library
//!
//! Shared code for the order reconciliation pipeline:
//! - Common error type and `Result` alias
//! - Lenient reporting-date parsing and serde helpers

pub mod dates;
pub mod error;

pub use error::{Error, Result};
