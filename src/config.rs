//! Manager-wide configuration, distinct from the per-component
//! [`crate::component::ComponentOptions`]. Loaded the way the
//! teacher's `AppConfig::load_from` layers defaults, an optional
//! TOML file, and environment overrides through the `config` crate.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::component::{
    DEFAULT_HEALTH_CHECK_TIMEOUT_MS, DEFAULT_MESSAGE_TIMEOUT_MS, DEFAULT_SHUTDOWN_FORCE_TIMEOUT_MS,
    DEFAULT_SHUTDOWN_GRACEFUL_TIMEOUT_MS, DEFAULT_SHUTDOWN_WARNING_TIMEOUT_MS, DEFAULT_SIGNAL_TIMEOUT_MS,
    DEFAULT_STARTUP_TIMEOUT_MS,
};

#[derive(Debug, Clone, Deserialize)]
pub struct ManagerConfig {
    /// Manager-wide default for a component's startup timeout; a
    /// per-component `ComponentOptions` value always wins when set.
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,
    #[serde(default = "default_shutdown_graceful_timeout_ms")]
    pub shutdown_graceful_timeout_ms: u64,
    #[serde(default = "default_shutdown_force_timeout_ms")]
    pub shutdown_force_timeout_ms: u64,
    #[serde(default = "default_health_check_timeout_ms")]
    pub health_check_timeout_ms: u64,
    #[serde(default = "default_signal_timeout_ms")]
    pub signal_timeout_ms: u64,
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u64,
    /// `< 0` skips the warning phase entirely; `0` is fire-and-forget.
    #[serde(default = "default_shutdown_warning_timeout_ms")]
    pub shutdown_warning_timeout_ms: i64,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_startup_timeout_ms() -> u64 {
    DEFAULT_STARTUP_TIMEOUT_MS
}

fn default_shutdown_graceful_timeout_ms() -> u64 {
    DEFAULT_SHUTDOWN_GRACEFUL_TIMEOUT_MS
}

fn default_shutdown_force_timeout_ms() -> u64 {
    DEFAULT_SHUTDOWN_FORCE_TIMEOUT_MS
}

fn default_health_check_timeout_ms() -> u64 {
    DEFAULT_HEALTH_CHECK_TIMEOUT_MS
}

fn default_signal_timeout_ms() -> u64 {
    DEFAULT_SIGNAL_TIMEOUT_MS
}

fn default_message_timeout_ms() -> u64 {
    DEFAULT_MESSAGE_TIMEOUT_MS
}

fn default_shutdown_warning_timeout_ms() -> i64 {
    DEFAULT_SHUTDOWN_WARNING_TIMEOUT_MS
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            startup_timeout_ms: default_startup_timeout_ms(),
            shutdown_graceful_timeout_ms: default_shutdown_graceful_timeout_ms(),
            shutdown_force_timeout_ms: default_shutdown_force_timeout_ms(),
            health_check_timeout_ms: default_health_check_timeout_ms(),
            signal_timeout_ms: default_signal_timeout_ms(),
            message_timeout_ms: default_message_timeout_ms(),
            shutdown_warning_timeout_ms: default_shutdown_warning_timeout_ms(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ManagerConfig {
    /// Load configuration from `./config` (a directory of `default.toml`
    /// plus an environment-named override) and `LCO_`-prefixed
    /// environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load from either a config directory or a single TOML file, the
    /// way the teacher's loader accepts both for CLI compatibility.
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_path = config_dir.as_ref();

        let mut builder = Config::builder()
            .set_default("startup_timeout_ms", DEFAULT_STARTUP_TIMEOUT_MS)?
            .set_default("shutdown_graceful_timeout_ms", DEFAULT_SHUTDOWN_GRACEFUL_TIMEOUT_MS)?
            .set_default("shutdown_force_timeout_ms", DEFAULT_SHUTDOWN_FORCE_TIMEOUT_MS)?
            .set_default("health_check_timeout_ms", DEFAULT_HEALTH_CHECK_TIMEOUT_MS)?
            .set_default("signal_timeout_ms", DEFAULT_SIGNAL_TIMEOUT_MS)?
            .set_default("message_timeout_ms", DEFAULT_MESSAGE_TIMEOUT_MS)?
            .set_default("shutdown_warning_timeout_ms", DEFAULT_SHUTDOWN_WARNING_TIMEOUT_MS)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?;

        if config_path.is_file() {
            builder = builder.add_source(File::from(config_path).required(true));
        } else {
            builder = builder
                .add_source(File::from(config_path.join("default.toml")).required(false))
                .add_source(
                    File::from(
                        config_path.join(std::env::var("LCO_ENV").unwrap_or_else(|_| "development".to_string())),
                    )
                    .required(false),
                );
        }

        builder = builder.add_source(
            Environment::with_prefix("LCO")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_enforced_minimums() {
        let config = ManagerConfig::default();
        assert_eq!(config.shutdown_graceful_timeout_ms, 5_000);
        assert_eq!(config.shutdown_force_timeout_ms, 2_000);
        assert_eq!(config.shutdown_warning_timeout_ms, 500);
    }
}
