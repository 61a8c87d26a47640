use anyhow::{ensure, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "config/default.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub generator: GeneratorConfig,
    pub log: LogConfig,
    pub engine: EngineConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Tick period in milliseconds
    pub interval_ms: u64,
    /// Share of ticks that produce an out-of-range value (0.0-1.0)
    pub invalid_probability: f64,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
    /// Start ticking as soon as the service is up
    pub autostart: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1200,
            invalid_probability: 0.2,
            seed: None,
            autostart: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Measurement log file
    pub path: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("log.txt"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity of the mutation queue
    pub queue_capacity: usize,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
    /// Add the two demo entities on startup
    pub seed_demo_entities: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            event_capacity: 64,
            seed_demo_entities: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Filter used when `RUST_LOG` is not set
    pub filter: String,
    /// JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            json: true,
        }
    }
}

impl Config {
    /// Defaults, then `config/default.toml`, then `DER__*` environment
    /// variables (`DER__GENERATOR__INTERVAL_MS=500`).
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::file(path.as_ref()))
                .merge(Env::prefixed("DER__").split("__")),
        )
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let cfg: Config = figment.extract()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.generator.interval_ms > 0, "generator.interval_ms must be positive");
        ensure!(
            (0.0..=1.0).contains(&self.generator.invalid_probability),
            "generator.invalid_probability must be within 0.0..=1.0"
        );
        ensure!(self.engine.queue_capacity > 0, "engine.queue_capacity must be positive");
        ensure!(self.engine.event_capacity > 0, "engine.event_capacity must be positive");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_toml(toml: &str) -> Result<Config> {
        Config::from_figment(
            Figment::from(Serialized::defaults(Config::default())).merge(Toml::string(toml)),
        )
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.generator.interval_ms, 1200);
        assert_eq!(cfg.generator.invalid_probability, 0.2);
        assert_eq!(cfg.log.path, PathBuf::from("log.txt"));
        assert!(cfg.engine.seed_demo_entities);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_toml_overrides_only_given_keys() {
        let cfg = with_toml(
            r#"
            [generator]
            interval_ms = 500
            seed = 9

            [log]
            path = "/var/lib/der/measurements.txt"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.generator.interval_ms, 500);
        assert_eq!(cfg.generator.seed, Some(9));
        assert_eq!(cfg.generator.invalid_probability, 0.2);
        assert_eq!(cfg.log.path, PathBuf::from("/var/lib/der/measurements.txt"));
        assert_eq!(cfg.engine.queue_capacity, 256);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(with_toml("[generator]\ninterval_ms = 0").is_err());
        assert!(with_toml("[generator]\ninvalid_probability = 1.5").is_err());
        assert!(with_toml("[engine]\nqueue_capacity = 0").is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let cfg = Config::load_from("does/not/exist.toml").unwrap();
        assert_eq!(cfg.generator.interval_ms, Config::default().generator.interval_ms);
    }
}
