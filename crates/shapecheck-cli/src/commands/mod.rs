//! Subcommand implementations.

pub mod analyze;
pub mod configure;
pub mod dump;
pub mod list_checks;
pub mod output;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use shapecheck_core::RuleSet;

use crate::checks;
use crate::config::Config;
use crate::config_resolver::{self, ConfigSource};

/// Prefix for every configuration failure.
pub const CONFIG_FAILURE: &str = "Cannot perform analysis due to configuration";

/// Configuration and rules shared by commands that evaluate checks.
pub struct Settings {
    /// Loaded `config.yml`, if one was resolved.
    pub config: Option<Config>,
    /// Validated rules in declaration order.
    pub rules: RuleSet,
}

/// Resolves the configuration directory and loads the checks files.
///
/// `checks_files` given on the command line replace the configured list.
pub fn load_settings(explicit_config: Option<&Path>, checks_files: &[PathBuf]) -> Result<Settings> {
    let working_dir = std::env::current_dir().context("failed to read the working directory")?;
    let source = config_resolver::resolve(&working_dir, explicit_config);

    let config = match source.dir() {
        Some(dir) => {
            if source.is_global() {
                tracing::info!("Using global config: {}", dir.display());
            }
            Some(Config::load(dir).context(CONFIG_FAILURE)?)
        }
        None => None,
    };

    let files = if checks_files.is_empty() {
        config
            .as_ref()
            .map(|c| c.checks_files.clone())
            .unwrap_or_default()
    } else {
        checks_files.to_vec()
    };
    if files.is_empty() {
        let hint = if source == ConfigSource::None {
            "no configuration found; run `shapecheck configure create` or pass --checks-file"
        } else {
            "no checks-file configured"
        };
        bail!("{CONFIG_FAILURE}: {hint}");
    }

    let rules = checks::load_files(&files).context(CONFIG_FAILURE)?;
    tracing::debug!("Loaded {} rule(s) from {} file(s)", rules.len(), files.len());
    Ok(Settings { config, rules })
}
