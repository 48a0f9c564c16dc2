//! Fraud configuration loading for the audit tool.
//!
//! Sources, lowest precedence first: built-in defaults, a TOML/JSON file,
//! `ODO_*` environment variables (`ODO_REJECT_THRESHOLD=80`).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use odo_core::config::FraudConfig;

/// Default config file: `<config_dir>/odoledger/fraud.toml`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("odoledger")
        .join("fraud.toml")
}

/// Load and validate a [`FraudConfig`].
///
/// An explicit `path` must exist; the default location is optional.
pub fn load(path: Option<&Path>) -> Result<FraudConfig> {
    let (file, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (default_config_path(), false),
    };

    let settings = Config::builder()
        .add_source(File::from(file.as_path()).required(required))
        .add_source(Environment::with_prefix("ODO").try_parsing(true))
        .build()
        .with_context(|| format!("failed to read config from {}", file.display()))?;

    let cfg: FraudConfig = settings
        .try_deserialize()
        .context("invalid fraud configuration")?;
    cfg.validate().context("inconsistent fraud configuration")?;
    Ok(cfg)
}
