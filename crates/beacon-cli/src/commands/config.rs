//! Config command - View and manage Beacon configuration
//!
//! Provides the `beacon config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Writes a default configuration file
//! 3. Validates the configuration file and reports errors

use std::path::Path;

use anyhow::{bail, Context, Result};
use beacon_core::config::Config;
use clap::Subcommand;
use tracing::info;

use crate::output::{OutputFormat, ValidationOutcome};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Validate configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(config_path, format),
            ConfigCommand::Init { force } => execute_init(config_path, *force, format),
            ConfigCommand::Validate => execute_validate(config_path, format),
        }
    }
}

fn execute_show(config_path: &Path, format: OutputFormat) -> Result<()> {
    let config = Config::load_or_default(config_path);

    info!(config_path = %config_path.display(), "Showing configuration");
    format.config(config_path, &config)
}

fn execute_init(config_path: &Path, force: bool, format: OutputFormat) -> Result<()> {
    if config_path.exists() && !force {
        bail!(
            "Configuration file already exists at {} (use --force to overwrite)",
            config_path.display()
        );
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create configuration directory")?;
    }

    let yaml =
        serde_yaml::to_string(&Config::default()).context("Failed to serialize configuration")?;
    std::fs::write(config_path, yaml).context("Failed to write configuration file")?;

    info!(config_path = %config_path.display(), "Wrote default configuration");
    format.config_written(config_path);
    Ok(())
}

fn execute_validate(config_path: &Path, format: OutputFormat) -> Result<()> {
    let outcome = check_config(config_path);
    format.validation(config_path, &outcome);
    Ok(())
}

/// Loads and validates the file at `config_path`.
fn check_config(config_path: &Path) -> ValidationOutcome {
    match Config::load(config_path) {
        Ok(config) => {
            info!(config_path = %config_path.display(), "Validating configuration");
            ValidationOutcome::Checked(config.validate())
        }
        Err(_) if !config_path.exists() => {
            ValidationOutcome::Unreadable("Configuration file not found".to_string())
        }
        Err(e) => ValidationOutcome::Unreadable(format!("Failed to parse configuration: {e}")),
    }
}
