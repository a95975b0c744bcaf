//! Settings for the admin tool.
//!
//! Sources, lowest precedence first: built-in defaults, the optional
//! `settings.toml` (or the file given with `--config`), `APOTHECA_*`
//! environment variables, then command-line flags.
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

const DEFAULT_CONFIG_PATH: &str = "settings";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_url: String,
    /// `tracing` level for the engine and this binary.
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite:./apotheca.db?mode=rwc".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(
                File::with_name(config_path.unwrap_or(DEFAULT_CONFIG_PATH)).required(false),
            )
            .add_source(Environment::with_prefix("APOTHECA"))
            .build()?
            .try_deserialize()
    }
}
