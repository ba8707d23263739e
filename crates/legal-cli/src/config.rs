use anyhow::{Context, Result};
use legal_client::LegalConfig;
use legal_client::config::loader;

use crate::cli::Cli;

/// Loads the client configuration and applies command-line overrides.
pub fn resolve(cli: &Cli) -> Result<LegalConfig> {
    let mut config = loader::build(cli.config.as_deref()).context("Failed to load configuration")?;

    if let Some(base_url) = &cli.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(namespace) = &cli.publisher_namespace {
        config.publisher_namespace = namespace.clone();
    }
    if cli.debug {
        config.debug = true;
    }

    config.validate().context(
        "Invalid configuration (set --base-url, LEGAL_BASE_URL or base_url in legal.toml)",
    )?;
    Ok(config)
}
