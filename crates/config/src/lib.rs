//! Layered application settings.
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. `config/default.{toml,yaml,json}` (optional)
//! 3. `config/<RUN_ENV>.{toml,yaml,json}` (optional)
//! 4. environment variables prefixed `OPTIMAPOS__`, nested with `__`
//!    (e.g. `OPTIMAPOS__INVENTORY__ALLOW_NEGATIVE_STOCK=true`)

use std::env;

use config::{Config, ConfigBuilder, Environment, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

pub use optimapos_observability::LogFormat;

const CONFIG_DIR: &str = "config";
const DEFAULT_ENV: &str = "development";
const ENV_PREFIX: &str = "OPTIMAPOS";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InventorySettings {
    /// Negative-stock policy for locations registered without an explicit one.
    pub allow_negative_stock: bool,
    /// Prefix for generated batch numbers.
    pub batch_number_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DocumentSettings {
    /// Zero-padded width of the numeric part of document numbers.
    pub number_padding: usize,
    /// Install the standard document types and workflows at startup.
    pub seed_default_workflows: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub environment: String,
    pub logging: LoggingSettings,
    pub inventory: InventorySettings,
    pub documents: DocumentSettings,
}

impl Settings {
    /// Load settings for the environment named by `RUN_ENV` (default
    /// `development`).
    pub fn load() -> Result<Self, SettingsError> {
        let run_env = env::var("RUN_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());
        info!(environment = %run_env, "loading configuration");

        let builder = defaults(&run_env)?
            .add_source(File::with_name(&format!("{CONFIG_DIR}/default")).required(false))
            .add_source(File::with_name(&format!("{CONFIG_DIR}/{run_env}")).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        Self::build(builder)
    }

    /// Built-in defaults only.
    pub fn defaults() -> Result<Self, SettingsError> {
        Self::build(defaults(DEFAULT_ENV)?)
    }

    /// Defaults overlaid with an inline TOML document.
    pub fn from_toml(toml: &str) -> Result<Self, SettingsError> {
        let builder = defaults(DEFAULT_ENV)?.add_source(File::from_str(toml, FileFormat::Toml));
        Self::build(builder)
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, SettingsError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.logging.filter.trim().is_empty() {
            return Err(SettingsError::Invalid("logging.filter cannot be empty".into()));
        }
        if self.inventory.batch_number_prefix.trim().is_empty() {
            return Err(SettingsError::Invalid(
                "inventory.batch_number_prefix cannot be empty".into(),
            ));
        }
        if !(1..=12).contains(&self.documents.number_padding) {
            return Err(SettingsError::Invalid(format!(
                "documents.number_padding must be between 1 and 12, got {}",
                self.documents.number_padding
            )));
        }
        Ok(())
    }
}

fn defaults(run_env: &str) -> Result<ConfigBuilder<DefaultState>, SettingsError> {
    Ok(Config::builder()
        .set_default("environment", run_env)?
        .set_default("logging.filter", "info")?
        .set_default("logging.format", "json")?
        .set_default("inventory.allow_negative_stock", false)?
        .set_default("inventory.batch_number_prefix", "LOT")?
        .set_default("documents.number_padding", 6)?
        .set_default("documents.seed_default_workflows", true)?)
}
