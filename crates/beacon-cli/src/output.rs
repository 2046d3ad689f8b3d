//! Terminal rendering of command results
//!
//! Every command builds one result value and hands it to [`OutputFormat`],
//! which prints it either as status-marked lines or as a single JSON
//! document on stdout.

use std::path::Path;

use anyhow::{Context, Result};
use beacon_core::{
    config::{Config, ValidationError},
    domain::{Level, Mode},
};
use serde_json::{json, Value};

const OK_MARK: &str = "\u{2713}";
const ERROR_MARK: &str = "\u{2717}";
const WARN_MARK: &str = "\u{26a0}";

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Outcome of `beacon send`
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReport {
    pub level: Level,
    pub mode: Mode,
    /// Every posted request reached `Done` or `Error` within the wait
    pub settled: bool,
    pub rate_limited: bool,
    pub wait_secs: u64,
}

impl DeliveryReport {
    pub fn to_json(&self) -> Value {
        json!({
            "success": self.settled,
            "level": self.level,
            "mode": self.mode,
            "rate_limited": self.rate_limited,
        })
    }

    /// Headline for terminal output.
    pub fn summary(&self) -> String {
        if !self.settled {
            return format!(
                "No answer from the endpoint within {}s, report abandoned",
                self.wait_secs
            );
        }
        match self.mode {
            Mode::Enabled => format!("{} report sent", self.level),
            Mode::LogOnly => format!("{} report written to the log (log_only mode)", self.level),
            Mode::Disabled => format!("{} report dropped (reporting disabled)", self.level),
        }
    }
}

/// Outcome of `beacon config validate`
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    /// The file could not be read or parsed
    Unreadable(String),
    /// The file parsed; empty means valid
    Checked(Vec<ValidationError>),
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Checked(errors) if errors.is_empty())
    }

    pub fn to_json(&self, config_path: &Path) -> Value {
        let errors: Vec<String> = match self {
            ValidationOutcome::Unreadable(message) => vec![message.clone()],
            ValidationOutcome::Checked(errors) => errors.iter().map(|e| e.to_string()).collect(),
        };
        json!({
            "valid": self.is_valid(),
            "config_path": config_path.display().to_string(),
            "errors": errors,
        })
    }
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        matches!(self, OutputFormat::Json)
    }

    pub fn delivery(self, report: &DeliveryReport) {
        match self {
            OutputFormat::Json => print_json(&report.to_json()),
            OutputFormat::Human if report.settled => {
                println!("{OK_MARK} {}", report.summary());
                if report.rate_limited {
                    eprintln!(
                        "{WARN_MARK} Warning: endpoint is rate limiting this project, \
                         later reports are suppressed until the cool-down ends"
                    );
                }
            }
            OutputFormat::Human => eprintln!("{WARN_MARK} Warning: {}", report.summary()),
        }
    }

    /// Prints the effective configuration.
    pub fn config(self, config_path: &Path, config: &Config) -> Result<()> {
        match self {
            OutputFormat::Json => {
                let value = serde_json::to_value(config)
                    .context("Failed to serialize configuration to JSON")?;
                print_json(&value);
            }
            OutputFormat::Human => {
                let yaml = serde_yaml::to_string(config)
                    .context("Failed to serialize configuration to YAML")?;
                println!("{OK_MARK} Configuration ({})", config_path.display());
                println!();
                for line in yaml.lines() {
                    println!("  {line}");
                }
            }
        }
        Ok(())
    }

    pub fn config_written(self, config_path: &Path) {
        match self {
            OutputFormat::Json => print_json(&json!({
                "success": true,
                "config_path": config_path.display().to_string(),
            })),
            OutputFormat::Human => {
                println!("{OK_MARK} Wrote {}", config_path.display());
                println!("  Set access_token before sending reports.");
            }
        }
    }

    pub fn validation(self, config_path: &Path, outcome: &ValidationOutcome) {
        if self.is_json() {
            print_json(&outcome.to_json(config_path));
            return;
        }

        match outcome {
            ValidationOutcome::Unreadable(message) => {
                eprintln!("{ERROR_MARK} Error: {message}");
                println!("  File: {}", config_path.display());
            }
            ValidationOutcome::Checked(errors) if errors.is_empty() => {
                println!("{OK_MARK} Configuration is valid");
                println!("  File: {}", config_path.display());
            }
            ValidationOutcome::Checked(errors) => {
                eprintln!(
                    "{ERROR_MARK} Error: Configuration has {} error{}:",
                    errors.len(),
                    if errors.len() == 1 { "" } else { "s" }
                );
                println!("  File: {}", config_path.display());
                for error in errors {
                    println!("    {} - {}", error.field, error.message);
                }
            }
        }
    }
}

fn print_json(value: &Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}
