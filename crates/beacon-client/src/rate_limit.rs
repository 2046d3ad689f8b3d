//! Server-directed rate limiting
//!
//! When the endpoint answers a report with HTTP 429 and names a cool-down
//! in the `X-Rate-Limit-Remaining-Seconds` header, the dispatcher stops
//! forwarding reports until a deferred "lift" arrives back on its own
//! mailbox.
//!
//! The header name is compared case-sensitively against the `Title-Case`
//! form. `HttpTransport` rebuilds that form from the lowercase names the
//! `http` crate hands back, so over HTTP any spelling the endpoint sends
//! matches; transports that pass names through untouched get the strict
//! comparison.
//!
//! Only the most recently scheduled lift counts: each new throttle aborts
//! the outstanding timer, and lifts carry a generation number so one that
//! was already queued before a newer throttle cannot clear it.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Header carrying the cool-down in whole seconds (matched case-sensitively)
pub const RATE_LIMIT_HEADER: &str = "X-Rate-Limit-Remaining-Seconds";

/// HTTP status that may carry a rate-limit signal
pub const TOO_MANY_REQUESTS: u16 = 429;

/// Extracts the cool-down from a 429 response's headers.
///
/// Returns `None` when the header is missing or its value is not a
/// non-negative integer, in which case no throttling is applied.
pub fn remaining_seconds(headers: &[(String, String)]) -> Option<Duration> {
    let (_, value) = headers.iter().find(|(name, _)| name == RATE_LIMIT_HEADER)?;

    match value.trim().parse::<u64>() {
        Ok(seconds) => Some(Duration::from_secs(seconds)),
        Err(_) => {
            warn!(value = %value, "Ignoring unparsable rate limit header");
            None
        }
    }
}

/// Rate-limit flag plus the outstanding lift timer
#[derive(Debug, Default)]
pub struct RateLimiter {
    limited: bool,
    generation: u64,
    lift_task: Option<JoinHandle<()>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether reports are currently suppressed.
    pub fn is_limited(&self) -> bool {
        self.limited
    }

    /// Generation of the most recently scheduled lift.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Sets the flag and schedules a lift after `cool_down`.
    ///
    /// `deliver_lift` runs on a timer task once the cool-down elapses and
    /// receives the generation to hand back to [`lift`](Self::lift). Must be
    /// called from within a Tokio runtime.
    pub fn engage<F>(&mut self, cool_down: Duration, deliver_lift: F) -> u64
    where
        F: FnOnce(u64) + Send + 'static,
    {
        if let Some(previous) = self.lift_task.take() {
            previous.abort();
            debug!(
                generation = self.generation,
                "Replacing outstanding rate limit lift"
            );
        }

        self.generation += 1;
        self.limited = true;
        let generation = self.generation;

        self.lift_task = Some(tokio::spawn(async move {
            tokio::time::sleep(cool_down).await;
            deliver_lift(generation);
        }));

        info!(
            cool_down_secs = cool_down.as_secs(),
            generation, "Rate limited by endpoint, suppressing reports"
        );
        generation
    }

    /// Clears the flag if `generation` is the latest scheduled lift.
    ///
    /// Returns `false` for a lift that was superseded.
    pub fn lift(&mut self, generation: u64) -> bool {
        if generation != self.generation {
            debug!(
                generation,
                current = self.generation,
                "Ignoring superseded rate limit lift"
            );
            return false;
        }

        self.limited = false;
        self.lift_task = None;
        info!("Rate limit lifted, resuming reports");
        true
    }

    /// Aborts the outstanding lift timer, if any.
    pub fn cancel(&mut self) {
        if let Some(task) = self.lift_task.take() {
            task.abort();
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.cancel();
    }
}
