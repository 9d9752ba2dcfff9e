//! Configuration loading with hierarchical merging.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::Config;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid max_attempts: {0}. Must be at least 1")]
    InvalidMaxAttempts(u32),

    #[error("invalid backoff: base {0}ms must not exceed max {1}ms")]
    InvalidBackoff(u64, u64),

    #[error("invalid jitter: {0}. Must be within [0, 1]")]
    InvalidJitter(f64),

    #[error("metric weights must be non-negative with a positive sum")]
    InvalidMetricWeights,

    #[error("invalid capacity tolerance: {0}. Must be non-negative")]
    InvalidCapacityTolerance(f64),

    #[error("invalid cycle budget: must be at least 1 second")]
    InvalidCycleBudget,

    #[error("invalid cron expression '{expression}' for schedule '{name}': {message}")]
    InvalidCron {
        name: String,
        expression: String,
        message: String,
    },

    #[error("invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),
}

/// Loads config by merging defaults, YAML files, and environment.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `foreman.yaml` in the working directory
    /// 3. `foreman.local.yaml` overrides (optional)
    /// 4. Environment variables (`FOREMAN_` prefix)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file("foreman.yaml"))
            .merge(Yaml::file("foreman.local.yaml"))
            .merge(Env::prefixed("FOREMAN_").split("__"))
            .extract()
            .context("failed to extract configuration")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load from a specific file over defaults, then environment.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("FOREMAN_").split("__"))
            .extract()
            .with_context(|| format!("failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(config.retry.max_attempts));
        }
        if config.retry.base_backoff_ms > config.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.retry.base_backoff_ms,
                config.retry.max_backoff_ms,
            ));
        }
        if !(0.0..=1.0).contains(&config.retry.jitter) {
            return Err(ConfigError::InvalidJitter(config.retry.jitter));
        }

        let w = &config.metrics;
        let weights = [w.completion_weight, w.cycle_time_weight, w.balance_weight];
        if weights.iter().any(|&x| x < 0.0) || weights.iter().sum::<f64>() <= 0.0 {
            return Err(ConfigError::InvalidMetricWeights);
        }

        if config.assignment.capacity_tolerance < 0.0 {
            return Err(ConfigError::InvalidCapacityTolerance(
                config.assignment.capacity_tolerance,
            ));
        }
        if config.cycle_budget_secs == 0 {
            return Err(ConfigError::InvalidCycleBudget);
        }

        for schedule in &config.schedules {
            if let Err(err) = cron::Schedule::from_str(&schedule.cron) {
                return Err(ConfigError::InvalidCron {
                    name: schedule.name.clone(),
                    expression: schedule.cron.clone(),
                    message: err.to_string(),
                });
            }
        }

        match config.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => return Err(ConfigError::InvalidLogLevel(other.to_string())),
        }
        match config.logging.format.as_str() {
            "json" | "pretty" => {}
            other => return Err(ConfigError::InvalidLogFormat(other.to_string())),
        }

        Ok(())
    }
}
