//! Domain model for reports
//!
//! - [`Event`] - a single report produced per `emit` call
//! - [`Draft`] - the per-process template merged into every report
//! - [`Mode`] - whether reports are sent, logged, or dropped

pub mod draft;
pub mod errors;
pub mod event;
pub mod mode;

pub use draft::{Draft, HostInfo};
pub use errors::DomainError;
pub use event::{Event, Level};
pub use mode::Mode;
