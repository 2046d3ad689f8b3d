//! Report events
//!
//! An [`Event`] is produced once per `emit` call and never mutated
//! afterwards. It carries the severity, the time of occurrence and three
//! string-keyed mappings that the payload builder merges into the draft.

use std::{fmt, str::FromStr};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::errors::DomainError;

/// Severity of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Critical,
    Error,
    Warning,
    Info,
    Debug,
}

impl Level {
    /// Lowercase wire name of the level
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Critical => "critical",
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Info => "info",
            Level::Debug => "debug",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Level::Critical),
            "error" => Ok(Level::Error),
            "warning" | "warn" => Ok(Level::Warning),
            "info" => Ok(Level::Info),
            "debug" => Ok(Level::Debug),
            _ => Err(DomainError::InvalidLevel(s.to_string())),
        }
    }
}

/// A single report waiting to be dispatched
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    level: Level,
    timestamp: u64,
    body: Map<String, Value>,
    custom: Map<String, Value>,
    occurrence_data: Map<String, Value>,
}

impl Event {
    /// Creates an event.
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidTimestamp`] when `timestamp` is zero.
    pub fn new(
        level: Level,
        timestamp: u64,
        body: Map<String, Value>,
        custom: Map<String, Value>,
        occurrence_data: Map<String, Value>,
    ) -> Result<Self, DomainError> {
        if timestamp == 0 {
            return Err(DomainError::InvalidTimestamp(timestamp));
        }

        Ok(Self {
            level,
            timestamp,
            body,
            custom,
            occurrence_data,
        })
    }

    /// Creates a plain-text message event stamped with the current time.
    pub fn message(level: Level, text: impl Into<String>) -> Self {
        let mut body = Map::new();
        body.insert("message".to_string(), json!({ "body": text.into() }));

        Self {
            level,
            timestamp: now_seconds(),
            body,
            custom: Map::new(),
            occurrence_data: Map::new(),
        }
    }

    /// Replaces the body of the event.
    pub fn with_body(mut self, body: Map<String, Value>) -> Self {
        self.body = body;
        self
    }

    /// Replaces the custom fields of the event.
    pub fn with_custom(mut self, custom: Map<String, Value>) -> Self {
        self.custom = custom;
        self
    }

    /// Replaces the occurrence data of the event.
    pub fn with_occurrence_data(mut self, occurrence_data: Map<String, Value>) -> Self {
        self.occurrence_data = occurrence_data;
        self
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn custom(&self) -> &Map<String, Value> {
        &self.custom
    }

    pub fn occurrence_data(&self) -> &Map<String, Value> {
        &self.occurrence_data
    }
}

/// Seconds since the Unix epoch, never zero.
pub fn now_seconds() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(1).max(1)
}
