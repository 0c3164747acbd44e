//! SnapCart Core Library
//!
//! Shared functionality for the SnapCart receipt tracker:
//! - Database access and migrations (receipts, line items, audit log)
//! - Aggregation engine producing spending analytics from receipt snapshots
//! - Receipt text extraction and line-item parsing
//! - Layered TOML configuration

pub mod analytics;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod models;

pub use analytics::{Aggregation, AggregationEngine};
pub use config::AppConfig;
pub use db::{AuditEntry, AuditFilter, Database};
pub use error::{Error, Result, ValidationError};
pub use extract::{parse_receipt_text, PlainTextExtractor, TextExtractor};
