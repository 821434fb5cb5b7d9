use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid cache TTL for {0}: must be positive")]
    InvalidCacheTtl(&'static str),

    #[error("Invalid learning curve: {0}")]
    InvalidLearningCurve(String),

    #[error("Invalid default weight for '{0}': {1}. Must be a finite, non-negative number")]
    InvalidDefaultWeight(String, f64),

    #[error("Invalid max_attempts: {0}. Cannot be 0")]
    InvalidMaxAttempts(u32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid confidence_level: {0}. Must be strictly between 0 and 1")]
    InvalidConfidenceLevel(f64),

    #[error("Invalid rollout schedule: {0}")]
    InvalidRolloutSchedule(String),

    #[error("Invalid failure_rate_threshold: {0}. Must be in (0, 1]")]
    InvalidFailureRate(f64),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .adaptive-weights/config.yaml (deployment config)
    /// 3. .adaptive-weights/local.yaml (local overrides, optional)
    /// 4. Environment variables (ADAPTIVE_WEIGHTS_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".adaptive-weights/config.yaml"))
            .merge(Yaml::file(".adaptive-weights/local.yaml"))
            .merge(Env::prefixed("ADAPTIVE_WEIGHTS_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        // Logging
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        // Cache
        for (name, ttl) in [
            ("weights", config.cache.weights_ttl_secs),
            ("performance", config.cache.performance_ttl_secs),
            ("trust", config.cache.trust_ttl_secs),
        ] {
            if ttl == 0 {
                return Err(ConfigError::InvalidCacheTtl(name));
            }
        }

        // Learning curve
        let curve = &config.learning.curve;
        if !(curve.bootstrap_until <= curve.initial_until && curve.initial_until <= curve.transition_until) {
            return Err(ConfigError::InvalidLearningCurve(format!(
                "stage boundaries must be ascending, got {} / {} / {}",
                curve.bootstrap_until, curve.initial_until, curve.transition_until
            )));
        }
        let ratios = [
            curve.initial_ratio,
            curve.transition_ratio,
            curve.transition_end_ratio,
            curve.mature_ratio,
        ];
        if ratios.iter().any(|r| !(0.0..=1.0).contains(r)) {
            return Err(ConfigError::InvalidLearningCurve(
                "blend ratios must be within [0, 1]".to_string(),
            ));
        }
        if ratios.windows(2).any(|pair| pair[1] < pair[0]) {
            return Err(ConfigError::InvalidLearningCurve(
                "blend ratios must not decrease with experience".to_string(),
            ));
        }

        // Default weights
        if config.learning.default_weights.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "learning.default_weights cannot be empty".to_string(),
            ));
        }
        let service_weights = config.learning.service_defaults.values().flatten();
        for (component, weight) in config.learning.default_weights.iter().chain(service_weights) {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(ConfigError::InvalidDefaultWeight(component.clone(), *weight));
            }
        }

        // Retry
        let retry = &config.learning.retry;
        if retry.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(retry.max_attempts));
        }
        if retry.initial_backoff_ms >= retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                retry.initial_backoff_ms,
                retry.max_backoff_ms,
            ));
        }

        // Validation gate
        let validation = &config.validation;
        if !(validation.confidence_level > 0.0 && validation.confidence_level < 1.0) {
            return Err(ConfigError::InvalidConfidenceLevel(validation.confidence_level));
        }
        if validation.bootstrap_iterations == 0 {
            return Err(ConfigError::ValidationFailed(
                "validation.bootstrap_iterations must be at least 1".to_string(),
            ));
        }
        if validation.min_samples < 2 || validation.max_samples < validation.min_samples {
            return Err(ConfigError::ValidationFailed(format!(
                "validation sample window must satisfy 2 <= min_samples ({}) <= max_samples ({})",
                validation.min_samples, validation.max_samples
            )));
        }

        // Rollout
        let rollout = &config.rollout;
        if rollout.flag_name.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "rollout.flag_name cannot be empty".to_string(),
            ));
        }
        if rollout.schedule.is_empty() {
            return Err(ConfigError::InvalidRolloutSchedule(
                "schedule needs at least one step".to_string(),
            ));
        }
        let mut steps = rollout.schedule.clone();
        steps.sort_by_key(|step| step.week);
        if let Some(step) = steps.iter().find(|step| !(0.0..=1.0).contains(&step.percentage)) {
            return Err(ConfigError::InvalidRolloutSchedule(format!(
                "week {} percentage {} is outside [0, 1]",
                step.week, step.percentage
            )));
        }
        if steps.windows(2).any(|pair| pair[1].percentage < pair[0].percentage) {
            return Err(ConfigError::InvalidRolloutSchedule(
                "percentages must not decrease over time".to_string(),
            ));
        }

        // Rollback
        let rollback = &config.rollback;
        if !(rollback.failure_rate_threshold > 0.0 && rollback.failure_rate_threshold <= 1.0) {
            return Err(ConfigError::InvalidFailureRate(rollback.failure_rate_threshold));
        }
        if rollback.user_issue_threshold == 0 {
            return Err(ConfigError::ValidationFailed(
                "rollback.user_issue_threshold must be at least 1".to_string(),
            ));
        }

        // Trust
        let trust = &config.trust;
        if !(trust.learning_rate > 0.0 && trust.learning_rate <= 1.0) {
            return Err(ConfigError::ValidationFailed(format!(
                "trust.learning_rate {} must be in (0, 1]",
                trust.learning_rate
            )));
        }
        if trust.top_two_threshold > trust.ensemble_threshold {
            return Err(ConfigError::ValidationFailed(format!(
                "trust.top_two_threshold ({}) cannot exceed trust.ensemble_threshold ({})",
                trust.top_two_threshold, trust.ensemble_threshold
            )));
        }

        Ok(())
    }
}
