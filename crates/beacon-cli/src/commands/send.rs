//! Send command - Report a single message
//!
//! Provides the `beacon send` CLI command which:
//! 1. Loads and validates the configuration file
//! 2. Starts a report client over the HTTP transport
//! 3. Emits one message report and waits for the endpoint to answer

use std::{path::Path, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use beacon_client::{
    install_panic_reporter, report_message, Client, ClientBuilder, HttpTransport,
    HttpTransportConfig,
};
use beacon_core::{config::Config, domain::Level};
use clap::Args;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::output::{DeliveryReport, OutputFormat};

/// Interval between delivery checks
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Args)]
pub struct SendCommand {
    /// Message text
    message: String,

    /// Severity: critical, error, warning, info or debug
    #[arg(short, long, default_value = "error")]
    level: Level,

    /// Extra custom field, repeatable (values are parsed as JSON when possible)
    #[arg(long = "custom", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    custom: Vec<(String, String)>,

    /// Seconds to wait for the endpoint to answer
    #[arg(long, default_value_t = 10)]
    wait: u64,
}

impl SendCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let config = Config::load(config_path).with_context(|| {
            format!("Failed to load configuration from {}", config_path.display())
        })?;

        let errors = config.validate();
        if !errors.is_empty() {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            bail!("Invalid configuration: {}", messages.join("; "));
        }

        info!(
            config_path = %config_path.display(),
            mode = %config.mode,
            "Sending report"
        );

        let transport = Arc::new(HttpTransport::new(HttpTransportConfig::from_config(&config)));
        let client = ClientBuilder::from_config(&config)
            .start(transport)
            .context("Failed to start report client")?;

        if config.enable_crash_reports {
            install_panic_reporter(client.clone());
        }

        report_message(
            Some(&client),
            self.level,
            &self.message,
            custom_fields(&self.custom),
            Map::new(),
        );

        let settled = wait_for_delivery(&client, Duration::from_secs(self.wait)).await;
        let rate_limited = client
            .snapshot()
            .await
            .map(|s| s.rate_limited)
            .unwrap_or(false);
        client.shutdown();

        format.delivery(&DeliveryReport {
            level: self.level,
            mode: config.mode,
            settled,
            rate_limited,
            wait_secs: self.wait,
        });

        Ok(())
    }
}

/// Polls the client until every posted request has finished.
///
/// Returns `false` if `timeout` elapses first.
async fn wait_for_delivery(client: &Client, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match client.snapshot().await {
            Some(snapshot) if snapshot.in_flight == 0 => return true,
            Some(snapshot) => debug!(in_flight = snapshot.in_flight, "Waiting for endpoint"),
            None => return false,
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Parses a `KEY=VALUE` argument.
fn parse_key_value(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{arg}'")),
    }
}

fn custom_fields(pairs: &[(String, String)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(key, raw)| {
            let value =
                serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()));
            (key.clone(), value)
        })
        .collect()
}
