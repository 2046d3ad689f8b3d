//! Report dispatcher
//!
//! The dispatcher is a single tokio task that owns all mutable client state
//! (the pending-response map and the rate-limit flag) and reads one ordered
//! mailbox. Producer `emit` calls, transport events and rate-limit lifts are
//! all messages on that mailbox, so state is only ever touched by one
//! task, in arrival order.
//!
//! ```text
//!  Client::emit ──┐
//!                 │   Message    ┌────────────┐  post   ┌───────────┐
//!  ResponseSink ──┼────────────► │ Dispatcher │ ──────► │ Transport │
//!                 │              └────────────┘         └───────────┘
//!  lift timer ────┘                                          │
//!        ▲                      TransportEvent (per handle)  │
//!        └──────────────── ResponseSink ◄────────────────────┘
//! ```

use std::{collections::HashSet, sync::Arc};

use beacon_core::{
    config::Config,
    domain::{Draft, Event, HostInfo, Mode},
    payload::{JsonPayloadBuilder, PayloadBuilder},
    ports::{PostRequest, RequestHandle, ResponseSink, Transport, TransportEvent},
};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    assembler::{CompletedResponse, ResponseAssembler, ResponseOutcome},
    rate_limit::{self, RateLimiter},
    ClientError,
};

/// Default number of concurrent connections
pub const DEFAULT_POOL_CAPACITY: usize = 20;

// ============================================================================
// Mailbox messages
// ============================================================================

/// Everything the dispatcher reacts to
#[derive(Debug)]
enum Message {
    /// A report from a producer
    Emit(Event),
    /// One step of a request's response stream
    Transport(RequestHandle, TransportEvent),
    /// A rate-limit cool-down elapsed
    LiftRateLimit { generation: u64 },
    /// Read-only state query
    Snapshot(oneshot::Sender<ClientSnapshot>),
}

/// Point-in-time view of the dispatcher state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSnapshot {
    pub mode: Mode,
    pub rate_limited: bool,
    /// Responses with a status line that are not complete yet
    pub pending_responses: usize,
    /// Posted requests that have not reached `Done` or `Error`
    pub in_flight: usize,
}

// ============================================================================
// Client handle
// ============================================================================

/// Cheap, cloneable handle to a running dispatcher
///
/// `emit` never blocks and never fails; if the dispatcher has stopped the
/// report is dropped with a warning.
#[derive(Debug, Clone)]
pub struct Client {
    mailbox: mpsc::UnboundedSender<Message>,
    shutdown: CancellationToken,
}

impl Client {
    /// Starts building a client for the given token and environment.
    pub fn builder(access_token: impl Into<String>, environment: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(access_token, environment)
    }

    /// Queues a report for the dispatcher.
    ///
    /// After [`shutdown`](Self::shutdown) the report is dropped here, even if
    /// the dispatcher task has not observed the cancellation yet.
    pub fn emit(&self, event: Event) {
        let (level, timestamp) = (event.level(), event.timestamp());
        let queued =
            !self.shutdown.is_cancelled() && self.mailbox.send(Message::Emit(event)).is_ok();
        if !queued {
            warn!(
                %level,
                timestamp, "Report client is not running, dropping report"
            );
        }
    }

    /// Returns the dispatcher state once all earlier messages are processed.
    ///
    /// `None` if the dispatcher has stopped.
    pub async fn snapshot(&self) -> Option<ClientSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.mailbox.send(Message::Snapshot(tx)).ok()?;
        rx.await.ok()
    }

    /// Whether the dispatcher is still accepting messages.
    pub fn is_running(&self) -> bool {
        !self.mailbox.is_closed() && !self.shutdown.is_cancelled()
    }

    /// Stops the dispatcher and releases the connection pool.
    ///
    /// Best-effort: in-flight requests are abandoned and their responses
    /// dropped.
    pub fn shutdown(&self) {
        info!("Report client shutting down");
        self.shutdown.cancel();
    }
}

/// Emits through `client` if one is available.
///
/// Without a client the call is a no-op that logs a warning.
pub fn emit(client: Option<&Client>, event: Event) {
    match client {
        Some(client) => client.emit(event),
        None => warn!(
            level = %event.level(),
            "No report client available, dropping report"
        ),
    }
}

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for a [`Client`]
pub struct ClientBuilder {
    access_token: String,
    environment: String,
    custom: Map<String, Value>,
    mode: Mode,
    endpoint: String,
    pool_capacity: usize,
    payload: Arc<dyn PayloadBuilder>,
}

impl ClientBuilder {
    pub fn new(access_token: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            environment: environment.into(),
            custom: Map::new(),
            mode: Mode::Enabled,
            endpoint: beacon_core::config::DEFAULT_API_ENDPOINT.to_string(),
            pool_capacity: DEFAULT_POOL_CAPACITY,
            payload: Arc::new(JsonPayloadBuilder),
        }
    }

    /// Builder pre-filled from a loaded [`Config`].
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.access_token.clone(), config.environment.clone())
            .custom(config.custom.clone())
            .mode(config.mode)
            .endpoint(config.api_endpoint.clone())
            .pool_capacity(config.pool.capacity)
    }

    pub fn custom(mut self, custom: Map<String, Value>) -> Self {
        self.custom = custom;
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }

    /// Replaces the payload builder used to compose reports.
    pub fn payload_builder(mut self, payload: Arc<dyn PayloadBuilder>) -> Self {
        self.payload = payload;
        self
    }

    /// Acquires the connection pool and spawns the dispatcher task.
    ///
    /// # Errors
    /// Fails if called outside a Tokio runtime or if the transport cannot
    /// start its pool. Both are fatal for the client.
    pub fn start(self, transport: Arc<dyn Transport>) -> Result<Client, ClientError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ClientError::NoRuntime)?;

        transport.start_pool(self.pool_capacity)?;

        let draft = Draft::new(
            self.access_token,
            self.environment,
            self.custom,
            &HostInfo::collect(),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let dispatcher = Dispatcher {
            draft,
            endpoint: self.endpoint,
            mode: self.mode,
            payload: self.payload,
            transport,
            responses: ResponseAssembler::new(),
            outstanding: HashSet::new(),
            rate_limiter: RateLimiter::new(),
            mailbox: rx,
            loopback: tx.downgrade(),
            shutdown: shutdown.clone(),
        };
        runtime.spawn(dispatcher.run());

        Ok(Client {
            mailbox: tx,
            shutdown,
        })
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Serial owner of all client state
struct Dispatcher {
    draft: Draft,
    endpoint: String,
    mode: Mode,
    payload: Arc<dyn PayloadBuilder>,
    transport: Arc<dyn Transport>,
    responses: ResponseAssembler,
    outstanding: HashSet<RequestHandle>,
    rate_limiter: RateLimiter,
    mailbox: mpsc::UnboundedReceiver<Message>,
    /// Weak so the dispatcher stops once every `Client` handle is dropped
    loopback: mpsc::WeakUnboundedSender<Message>,
    shutdown: CancellationToken,
}

impl Dispatcher {
    async fn run(mut self) {
        info!(mode = %self.mode, endpoint = %self.endpoint, "Report dispatcher started");

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                message = self.mailbox.recv() => match message {
                    Some(message) => self.handle(message),
                    None => break,
                },
            }
        }

        self.rate_limiter.cancel();
        self.transport.stop_pool();
        info!(
            abandoned = self.outstanding.len(),
            "Report dispatcher stopped"
        );
    }

    fn handle(&mut self, message: Message) {
        match message {
            Message::Emit(event) => self.handle_emit(event),
            Message::Transport(handle, event) => self.handle_transport_event(handle, event),
            Message::LiftRateLimit { generation } => {
                self.rate_limiter.lift(generation);
            }
            Message::Snapshot(reply) => {
                let _ = reply.send(ClientSnapshot {
                    mode: self.mode,
                    rate_limited: self.rate_limiter.is_limited(),
                    pending_responses: self.responses.len(),
                    in_flight: self.outstanding.len(),
                });
            }
        }
    }

    // ------------------------------------------------------------------------
    // Producer side
    // ------------------------------------------------------------------------

    fn handle_emit(&mut self, event: Event) {
        match self.mode {
            Mode::Disabled => {}
            Mode::LogOnly => info!("{}", render_log_line(&event)),
            Mode::Enabled if self.rate_limiter.is_limited() => debug!(
                level = %event.level(),
                timestamp = event.timestamp(),
                "Report suppressed while rate limited"
            ),
            Mode::Enabled => self.dispatch(event),
        }
    }

    fn dispatch(&mut self, event: Event) {
        let body = match self.payload.compose(&self.draft, &event) {
            Ok(body) => body,
            Err(e) => {
                error!(
                    level = %event.level(),
                    timestamp = event.timestamp(),
                    error = %e,
                    "Failed to encode report, dropping it"
                );
                return;
            }
        };

        let request = PostRequest::json(self.endpoint.clone(), body);
        match self.transport.post(request, self.response_sink()) {
            Ok(handle) => {
                self.outstanding.insert(handle);
                debug!(%handle, level = %event.level(), "Report posted");
            }
            Err(e) => error!(error = %e, "Failed to post report, dropping it"),
        }
    }

    fn response_sink(&self) -> ResponseSink {
        let loopback = self.loopback.clone();
        ResponseSink::new(move |handle, event| {
            if let Some(mailbox) = loopback.upgrade() {
                let _ = mailbox.send(Message::Transport(handle, event));
            }
        })
    }

    // ------------------------------------------------------------------------
    // Transport side
    // ------------------------------------------------------------------------

    fn handle_transport_event(&mut self, handle: RequestHandle, event: TransportEvent) {
        match event {
            TransportEvent::Status { code, description } => {
                if self.responses.on_status(handle, code) {
                    warn!(%handle, "Replaced stale response entry");
                }
                debug!(%handle, status = code, %description, "Response status received");
            }
            TransportEvent::Headers(headers) => {
                if self.responses.status(handle) == Some(rate_limit::TOO_MANY_REQUESTS) {
                    if let Some(cool_down) = rate_limit::remaining_seconds(&headers) {
                        self.engage_rate_limit(cool_down);
                    }
                }
            }
            TransportEvent::BodyChunk(chunk) => {
                if !self.responses.on_chunk(handle, chunk) {
                    warn!(%handle, "Dropping body chunk for unknown request");
                }
            }
            TransportEvent::Done => {
                self.outstanding.remove(&handle);
                match self.responses.finish(handle) {
                    Some(response) => log_response(handle, &response),
                    None => warn!(%handle, "Completion for unknown request"),
                }
            }
            TransportEvent::Error(reason) => {
                self.outstanding.remove(&handle);
                self.responses.discard(handle);
                error!(%handle, reason = %reason, "Report request failed");
            }
        }
    }

    fn engage_rate_limit(&mut self, cool_down: std::time::Duration) {
        let loopback = self.loopback.clone();
        self.rate_limiter.engage(cool_down, move |generation| {
            if let Some(mailbox) = loopback.upgrade() {
                let _ = mailbox.send(Message::LiftRateLimit { generation });
            }
        });
    }
}

/// Human-readable line for a report in log-only mode.
pub fn render_log_line(event: &Event) -> String {
    format!(
        "report (level: {}, timestamp: {}): {}",
        event.level(),
        event.timestamp(),
        Value::Object(event.body().clone())
    )
}

fn log_response(handle: RequestHandle, response: &CompletedResponse) {
    if !response.is_success() {
        warn!(%handle, status = response.status, "Endpoint returned non-success status");
    }

    match response.outcome() {
        ResponseOutcome::Accepted(body) => debug!(%handle, response = %body, "Report accepted"),
        ResponseOutcome::ApiError(message) => {
            error!(%handle, message = %message, "Endpoint returned an error")
        }
        ResponseOutcome::Malformed(raw) => {
            error!(%handle, body = %raw, "Endpoint returned malformed JSON")
        }
    }
}
