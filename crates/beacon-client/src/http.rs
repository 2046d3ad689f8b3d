//! reqwest-backed [`Transport`]
//!
//! Each accepted POST runs in its own tokio task and reports back through
//! the caller's [`ResponseSink`]. A semaphore sized to the pool capacity
//! bounds the number of requests actually on the wire; requests above the
//! limit wait for a permit inside their task, so `post` itself never waits.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use beacon_core::{
    config::Config,
    ports::{PostRequest, RequestHandle, ResponseSink, Transport, TransportError, TransportEvent},
};
use reqwest::{header::HeaderName, Client};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default per-request timeout (30 seconds)
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for the HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Timeout for a whole request, body included.
    pub timeout: Duration,
    /// Optional proxy applied to all requests.
    pub proxy: Option<String>,
    /// User agent string for requests.
    pub user_agent: String,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            proxy: None,
            user_agent: format!("beacon/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpTransportConfig {
    /// Transport settings taken from the `pool` section of a [`Config`].
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: Duration::from_secs(config.pool.timeout_secs),
            proxy: config.pool.proxy.clone(),
            ..Self::default()
        }
    }
}

/// A running connection pool
struct Pool {
    client: Client,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl Pool {
    fn close(&self) {
        self.shutdown.cancel();
        self.permits.close();
    }
}

/// HTTP transport with a bounded connection pool
pub struct HttpTransport {
    config: HttpTransportConfig,
    next_handle: AtomicU64,
    pool: Mutex<Option<Pool>>,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish()
    }
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Self {
        Self {
            config,
            next_handle: AtomicU64::new(0),
            pool: Mutex::new(None),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(HttpTransportConfig::default())
    }

    /// Whether a pool is currently running.
    pub fn is_running(&self) -> bool {
        self.lock_pool().is_some()
    }

    fn lock_pool(&self) -> MutexGuard<'_, Option<Pool>> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn build_client(&self, capacity: usize) -> Result<Client, TransportError> {
        let mut builder = Client::builder()
            .timeout(self.config.timeout)
            .user_agent(&self.config.user_agent)
            .pool_max_idle_per_host(capacity);

        if let Some(proxy) = &self.config.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| TransportError::PoolStart(format!("invalid proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }

        builder
            .build()
            .map_err(|e| TransportError::PoolStart(format!("failed to build HTTP client: {e}")))
    }
}

impl Transport for HttpTransport {
    fn start_pool(&self, capacity: usize) -> Result<(), TransportError> {
        if capacity == 0 {
            return Err(TransportError::PoolStart(
                "capacity must be greater than 0".to_string(),
            ));
        }

        let client = self.build_client(capacity)?;
        let mut slot = self.lock_pool();
        if let Some(previous) = slot.take() {
            warn!("Connection pool restarted, abandoning previous requests");
            previous.close();
        }
        *slot = Some(Pool {
            client,
            permits: Arc::new(Semaphore::new(capacity)),
            shutdown: CancellationToken::new(),
        });

        info!(capacity, "Connection pool started");
        Ok(())
    }

    fn post(
        &self,
        request: PostRequest,
        sink: ResponseSink,
    ) -> Result<RequestHandle, TransportError> {
        let (client, permits, shutdown) = {
            let slot = self.lock_pool();
            let pool = slot.as_ref().ok_or(TransportError::PoolUnavailable)?;
            (
                pool.client.clone(),
                Arc::clone(&pool.permits),
                pool.shutdown.clone(),
            )
        };
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::Exhausted(format!("no async runtime: {e}")))?;

        let handle = RequestHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1);

        runtime.spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(%handle, "Request abandoned, connection pool released");
                }
                _ = perform(client, permits, request, handle, &sink) => {}
            }
        });

        Ok(handle)
    }

    fn stop_pool(&self) {
        if let Some(pool) = self.lock_pool().take() {
            pool.close();
            info!("Connection pool released");
        }
    }
}

/// Sends one request and streams its response into `sink`.
async fn perform(
    client: Client,
    permits: Arc<Semaphore>,
    request: PostRequest,
    handle: RequestHandle,
    sink: &ResponseSink,
) {
    let _permit = match permits.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            sink.send(
                handle,
                TransportEvent::Error("connection pool closed".to_string()),
            );
            return;
        }
    };

    let mut builder = client.post(&request.url);
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let mut response = match builder.body(request.body).send().await {
        Ok(response) => response,
        Err(e) => {
            sink.send(handle, TransportEvent::Error(e.to_string()));
            return;
        }
    };

    let status = response.status();
    sink.send(
        handle,
        TransportEvent::Status {
            code: status.as_u16(),
            description: status.canonical_reason().unwrap_or_default().to_string(),
        },
    );

    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                canonical_header_name(name),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    sink.send(handle, TransportEvent::Headers(headers));

    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => sink.send(handle, TransportEvent::BodyChunk(chunk.to_vec())),
            Ok(None) => {
                sink.send(handle, TransportEvent::Done);
                break;
            }
            Err(e) => {
                sink.send(handle, TransportEvent::Error(e.to_string()));
                break;
            }
        }
    }
}

/// Restores `Title-Case` on a header name (the `http` crate lowercases them).
fn canonical_header_name(name: &HeaderName) -> String {
    name.as_str()
        .split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}
