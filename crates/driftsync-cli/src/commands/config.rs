//! Config command - View and validate driftsync configuration
//!
//! Provides the `driftsync config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Validates the configuration file and reports errors

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use driftsync_core::config::Config;
use tracing::info;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(config_path, format),
            ConfigCommand::Validate => execute_validate(config_path, format),
        }
    }
}

fn execute_show(config_path: &Path, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let mut config = Config::load_or_default(config_path);
    redact(&mut config);

    info!(config_path = %config_path.display(), "Showing configuration");

    if format.is_json() {
        let json =
            serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
    } else {
        formatter.success(&format!("Configuration ({})", config_path.display()));
        formatter.info("");
        let yaml =
            serde_yaml::to_string(&config).context("Failed to serialize configuration to YAML")?;
        for line in yaml.lines() {
            formatter.info(line);
        }
    }
    Ok(())
}

fn execute_validate(config_path: &Path, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let errors = validation_messages(config_path);

    if format.is_json() {
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": config_path.display().to_string(),
            "errors": errors,
        }));
        return Ok(());
    }

    if errors.is_empty() {
        formatter.success(&format!("Configuration is valid ({})", config_path.display()));
    } else {
        formatter.error(&format!(
            "Configuration has {} error(s) ({})",
            errors.len(),
            config_path.display()
        ));
        for error in &errors {
            formatter.info(&format!("- {error}"));
        }
    }
    Ok(())
}

/// Validation messages for the file at `path`; a parse failure is one message
fn validation_messages(path: &Path) -> Vec<String> {
    match Config::load(path) {
        Ok(config) => config.validate().iter().map(ToString::to_string).collect(),
        Err(e) => vec![format!("cannot load {}: {e}", path.display())],
    }
}

/// Hides credentials before printing
fn redact(config: &mut Config) {
    if config.api.access_token.is_some() {
        config.api.access_token = Some("********".into());
    }
    if config.api.password.is_some() {
        config.api.password = Some("********".into());
    }
}
