//! Error types for SnapCart

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Receipt {id} failed validation: {source}")]
    Validation {
        id: i64,
        #[source]
        source: ValidationError,
    },
}

/// Structural problems that exclude a receipt from aggregation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("negative total amount {0}")]
    NegativeAmount(f64),

    #[error("total amount {0} exceeds the supported maximum")]
    AmountOutOfRange(f64),

    #[error("total amount is not a finite number")]
    NonFiniteAmount,

    #[error("malformed created date {0:?}")]
    MalformedDate(String),
}

pub type Result<T> = std::result::Result<T, Error>;
