//! Domain error types

use thiserror::Error;

/// Errors that can occur while building domain values
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Report timestamps are seconds since the epoch and must be positive
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(u64),

    /// Unknown severity name
    #[error("Invalid level: {0}")]
    InvalidLevel(String),

    /// Unknown dispatcher mode name
    #[error("Invalid mode: {0}")]
    InvalidMode(String),
}
