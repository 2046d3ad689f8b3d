//! Report draft
//!
//! The draft is built once at startup from the access token, environment
//! name, host identifiers and static custom fields. Every outgoing report is
//! composed from a copy of it; the draft itself is never mutated.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Identifier sent as `notifier.name` in every report
pub const NOTIFIER_NAME: &str = "beacon";

/// Host identifiers recorded in the draft
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    pub host: String,
    pub os: String,
    pub arch: String,
}

impl HostInfo {
    /// Collect host information from the current system.
    pub fn collect() -> Self {
        Self {
            host: read_hostname(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}

fn read_hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .ok()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Immutable template merged into every outbound report
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    access_token: String,
    data: Map<String, Value>,
}

impl Draft {
    /// Builds a draft for the given token and environment.
    ///
    /// `custom` is stored under `data.custom` when non-empty.
    pub fn new(
        access_token: impl Into<String>,
        environment: impl Into<String>,
        custom: Map<String, Value>,
        host: &HostInfo,
    ) -> Self {
        let mut data = Map::new();
        data.insert("environment".to_string(), Value::String(environment.into()));
        data.insert("language".to_string(), json!("rust"));
        data.insert(
            "platform".to_string(),
            json!(format!("{}-{}", host.os, host.arch)),
        );
        data.insert("server".to_string(), json!({ "host": host.host }));
        data.insert(
            "notifier".to_string(),
            json!({
                "name": NOTIFIER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            }),
        );
        if !custom.is_empty() {
            data.insert("custom".to_string(), Value::Object(custom));
        }

        Self {
            access_token: access_token.into(),
            data,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Template fields placed under the report's `data` key.
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }
}
