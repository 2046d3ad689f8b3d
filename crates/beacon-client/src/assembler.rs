//! Response assembly
//!
//! Collects the status code and body chunks of each in-flight request,
//! keyed by [`RequestHandle`], until a terminal transport event closes the
//! handle. At most one [`PendingResponse`] exists per handle and each handle
//! is removed exactly once.

use std::collections::HashMap;

use beacon_core::ports::RequestHandle;
use serde_json::Value;

/// Accumulating state for a request between its status line and its
/// terminal event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingResponse {
    status: u16,
    chunks: Vec<Vec<u8>>,
}

impl PendingResponse {
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

/// A response whose body has been fully received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl CompletedResponse {
    /// Whether the status code is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decodes and classifies the body.
    pub fn outcome(&self) -> ResponseOutcome {
        classify(&self.body)
    }
}

/// What the endpoint said about a report
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    /// Well-formed response without an error flag
    Accepted(Value),
    /// The endpoint flagged an application-level error
    ApiError(String),
    /// The body is not valid JSON; carries the raw body
    Malformed(String),
}

/// Classifies a response body.
///
/// A non-zero (or `true`) `err` field marks an application error; its
/// `message` field, if any, is carried along.
pub fn classify(body: &[u8]) -> ResponseOutcome {
    let value: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(_) => return ResponseOutcome::Malformed(String::from_utf8_lossy(body).into_owned()),
    };

    let flagged = match value.get("err") {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    };

    if flagged {
        let message = match value.get("message") {
            Some(Value::String(message)) => message.clone(),
            Some(other) => other.to_string(),
            None => "unknown error".to_string(),
        };
        ResponseOutcome::ApiError(message)
    } else {
        ResponseOutcome::Accepted(value)
    }
}

/// Handle-keyed map of partial responses
#[derive(Debug, Default)]
pub struct ResponseAssembler {
    pending: HashMap<RequestHandle, PendingResponse>,
}

impl ResponseAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the entry for `handle`.
    ///
    /// Returns `true` when a stale entry for the same handle was replaced.
    pub fn on_status(&mut self, handle: RequestHandle, status: u16) -> bool {
        self.pending
            .insert(
                handle,
                PendingResponse {
                    status,
                    chunks: Vec::new(),
                },
            )
            .is_some()
    }

    /// Status code recorded for `handle`, if the handle is open.
    pub fn status(&self, handle: RequestHandle) -> Option<u16> {
        self.pending.get(&handle).map(PendingResponse::status)
    }

    /// Appends a body chunk. Returns `false` if the handle is unknown.
    pub fn on_chunk(&mut self, handle: RequestHandle, chunk: Vec<u8>) -> bool {
        match self.pending.get_mut(&handle) {
            Some(pending) => {
                pending.chunks.push(chunk);
                true
            }
            None => false,
        }
    }

    /// Closes `handle` and returns the assembled response.
    pub fn finish(&mut self, handle: RequestHandle) -> Option<CompletedResponse> {
        self.pending.remove(&handle).map(|pending| CompletedResponse {
            status: pending.status,
            body: pending.chunks.concat(),
        })
    }

    /// Closes `handle` without assembling. Returns `false` if it was not open.
    pub fn discard(&mut self, handle: RequestHandle) -> bool {
        self.pending.remove(&handle).is_some()
    }

    pub fn get(&self, handle: RequestHandle) -> Option<&PendingResponse> {
        self.pending.get(&handle)
    }

    /// Number of open handles.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
