//! Beacon Client - asynchronous report dispatcher
//!
//! Provides:
//! - [`Client`]: fire-and-forget handle to the serial report dispatcher
//! - [`HttpTransport`]: reqwest-based transport with a bounded connection pool
//! - [`ResponseAssembler`]: handle-keyed reassembly of streamed responses
//! - [`RateLimiter`]: server-directed suppression with deferred lift
//! - Front-end helpers for messages and panics
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use beacon_client::{Client, HttpTransport};
//! use beacon_core::domain::{Event, Level};
//!
//! # async fn example() -> Result<(), beacon_client::ClientError> {
//! let client = Client::builder("post_server_item-token", "production")
//!     .start(Arc::new(HttpTransport::with_defaults()))?;
//! client.emit(Event::message(Level::Error, "payment gateway timed out"));
//! # Ok(())
//! # }
//! ```

pub mod assembler;
pub mod dispatcher;
pub mod http;
pub mod rate_limit;
pub mod reporter;

use beacon_core::ports::TransportError;
use thiserror::Error;

pub use assembler::{CompletedResponse, ResponseAssembler, ResponseOutcome};
pub use dispatcher::{emit, Client, ClientBuilder, ClientSnapshot};
pub use http::{HttpTransport, HttpTransportConfig};
pub use rate_limit::RateLimiter;
pub use reporter::{install_panic_reporter, report_message};

/// Errors that prevent a client from starting
#[derive(Debug, Error)]
pub enum ClientError {
    /// The transport could not provide a connection pool
    #[error("Failed to acquire connection pool: {0}")]
    Pool(#[from] TransportError),

    /// The dispatcher needs a Tokio runtime to run on
    #[error("Report client must be started from within a Tokio runtime")]
    NoRuntime,
}
