//! Transport port (driven/secondary port)
//!
//! The dispatcher hands each composed report to a [`Transport`] and gets an
//! opaque [`RequestHandle`] back immediately. Everything that happens to the
//! request afterwards arrives later as [`TransportEvent`]s pushed through a
//! [`ResponseSink`], one push per I/O callback.
//!
//! ## Event order
//!
//! For a single handle the transport delivers exactly one `Status`, exactly
//! one `Headers`, zero or more `BodyChunk`s in arrival order, then exactly
//! one terminal `Done` or `Error`. A request that fails before a status line
//! is received delivers only `Error`. Events for different handles may
//! interleave arbitrarily.

use std::{fmt, sync::Arc};

use thiserror::Error;

/// Opaque identifier for one in-flight request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestHandle(u64);

impl RequestHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One step of a request's response stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Status line of the response
    Status { code: u16, description: String },
    /// Response headers, names as sent by the endpoint
    Headers(Vec<(String, String)>),
    /// A piece of the response body
    BodyChunk(Vec<u8>),
    /// The response body is complete
    Done,
    /// The request failed at the transport level
    Error(String),
}

impl TransportEvent {
    /// Whether this event closes the handle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportEvent::Done | TransportEvent::Error(_))
    }
}

/// An outbound POST
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl PostRequest {
    /// Creates a JSON POST (`content-type: application/json`).
    pub fn json(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body,
        }
    }
}

/// Callback through which a transport reports response events.
///
/// Cloning is cheap; each spawned request keeps its own clone.
#[derive(Clone)]
pub struct ResponseSink {
    deliver: Arc<dyn Fn(RequestHandle, TransportEvent) + Send + Sync>,
}

impl ResponseSink {
    pub fn new<F>(deliver: F) -> Self
    where
        F: Fn(RequestHandle, TransportEvent) + Send + Sync + 'static,
    {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    /// Pushes one event for `handle`. Never blocks.
    pub fn send(&self, handle: RequestHandle, event: TransportEvent) {
        (self.deliver)(handle, event)
    }
}

impl fmt::Debug for ResponseSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseSink").finish_non_exhaustive()
    }
}

/// Errors a transport reports synchronously
#[derive(Debug, Error)]
pub enum TransportError {
    /// `post` was called before `start_pool` or after `stop_pool`
    #[error("Connection pool is not running")]
    PoolUnavailable,

    /// The connection pool could not be created
    #[error("Failed to start connection pool: {0}")]
    PoolStart(String),

    /// A local resource needed to issue the request is exhausted
    #[error("Local resources exhausted: {0}")]
    Exhausted(String),
}

/// Non-blocking HTTP transport used by the dispatcher
///
/// Implementations must return from [`post`](Transport::post) without
/// waiting for network I/O. Requests beyond the pool's capacity are queued
/// by the transport itself.
pub trait Transport: Send + Sync {
    /// Acquires a connection pool serving up to `capacity` concurrent requests.
    fn start_pool(&self, capacity: usize) -> Result<(), TransportError>;

    /// Issues a POST and returns its handle immediately.
    fn post(&self, request: PostRequest, sink: ResponseSink)
        -> Result<RequestHandle, TransportError>;

    /// Releases the pool. In-flight requests are abandoned.
    fn stop_pool(&self);
}
