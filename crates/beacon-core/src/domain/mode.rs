//! Dispatcher mode

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// What the dispatcher does with an emitted event.
///
/// Fixed at construction; there is no runtime reconfiguration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Events are dropped without side effects
    Disabled,
    /// Events are rendered to the log and dropped
    LogOnly,
    /// Events are composed and posted to the endpoint
    #[default]
    Enabled,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Disabled => "disabled",
            Mode::LogOnly => "log_only",
            Mode::Enabled => "enabled",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Mode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disabled" => Ok(Mode::Disabled),
            "log_only" => Ok(Mode::LogOnly),
            "enabled" => Ok(Mode::Enabled),
            _ => Err(DomainError::InvalidMode(s.to_string())),
        }
    }
}
