//! Port definitions
//!
//! - [`Transport`] - non-blocking HTTP POST with a per-handle event stream

pub mod transport;

pub use transport::{
    PostRequest, RequestHandle, ResponseSink, Transport, TransportError, TransportEvent,
};
