use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::context::ServiceType;
use super::weights::ComponentWeights;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Cache TTLs and capacity
    #[serde(default)]
    pub cache: CacheConfig,

    /// Weight learning configuration
    #[serde(default)]
    pub learning: LearningConfig,

    /// Statistical validation configuration
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Gradual rollout configuration
    #[serde(default)]
    pub rollout: RolloutConfig,

    /// Rollback trigger configuration
    #[serde(default)]
    pub rollback: RollbackConfig,

    /// Trust scoring and routing configuration
    #[serde(default)]
    pub trust: TrustConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rotated log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Number of days to retain logs
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

const fn default_retention_days() -> u32 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            retention_days: default_retention_days(),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CacheConfig {
    /// TTL of blended weights
    #[serde(default = "default_weights_ttl_secs")]
    pub weights_ttl_secs: u64,

    /// TTL of mirrored performance counters
    #[serde(default = "default_performance_ttl_secs")]
    pub performance_ttl_secs: u64,

    /// TTL of trust score snapshots
    #[serde(default = "default_trust_ttl_secs")]
    pub trust_ttl_secs: u64,

    /// Maximum entries held by the in-process cache adapter
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
}

const fn default_weights_ttl_secs() -> u64 {
    300
}

const fn default_performance_ttl_secs() -> u64 {
    3600
}

const fn default_trust_ttl_secs() -> u64 {
    900
}

const fn default_max_capacity() -> u64 {
    10_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            weights_ttl_secs: default_weights_ttl_secs(),
            performance_ttl_secs: default_performance_ttl_secs(),
            trust_ttl_secs: default_trust_ttl_secs(),
            max_capacity: default_max_capacity(),
        }
    }
}

/// Experience thresholds and blend ratios of the learning curve
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LearningCurveConfig {
    /// Examples below this serve pure defaults
    #[serde(default = "default_bootstrap_until")]
    pub bootstrap_until: u64,

    /// End of the initial stage
    #[serde(default = "default_initial_until")]
    pub initial_until: u64,

    /// End of the transition stage; mature afterwards
    #[serde(default = "default_transition_until")]
    pub transition_until: u64,

    /// Blend ratio at the start of the initial stage
    #[serde(default = "default_initial_ratio")]
    pub initial_ratio: f64,

    /// Blend ratio at the start of the transition stage
    #[serde(default = "default_transition_ratio")]
    pub transition_ratio: f64,

    /// Blend ratio reached at the end of the transition stage
    #[serde(default = "default_transition_end_ratio")]
    pub transition_end_ratio: f64,

    /// Blend ratio once mature
    #[serde(default = "default_mature_ratio")]
    pub mature_ratio: f64,
}

const fn default_bootstrap_until() -> u64 {
    100
}

const fn default_initial_until() -> u64 {
    500
}

const fn default_transition_until() -> u64 {
    2000
}

const fn default_initial_ratio() -> f64 {
    0.3
}

const fn default_transition_ratio() -> f64 {
    0.6
}

const fn default_transition_end_ratio() -> f64 {
    0.9
}

const fn default_mature_ratio() -> f64 {
    0.95
}

impl Default for LearningCurveConfig {
    fn default() -> Self {
        Self {
            bootstrap_until: default_bootstrap_until(),
            initial_until: default_initial_until(),
            transition_until: default_transition_until(),
            initial_ratio: default_initial_ratio(),
            transition_ratio: default_transition_ratio(),
            transition_end_ratio: default_transition_end_ratio(),
            mature_ratio: default_mature_ratio(),
        }
    }
}

/// Optimistic-concurrency retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Maximum write attempts per update
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_attempts() -> u32 {
    8
}

const fn default_initial_backoff_ms() -> u64 {
    5
}

const fn default_max_backoff_ms() -> u64 {
    200
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Weight learning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LearningConfig {
    #[serde(default)]
    pub curve: LearningCurveConfig,

    /// Safe weights used when a service has no override
    #[serde(default = "default_component_weights")]
    pub default_weights: ComponentWeights,

    /// Per-service overrides of the safe weights
    #[serde(default)]
    pub service_defaults: BTreeMap<ServiceType, ComponentWeights>,

    #[serde(default)]
    pub retry: RetryConfig,
}

/// `rules=1.0, ml=0.9, llm=0.8, historical=0.9`
pub fn default_component_weights() -> ComponentWeights {
    [("rules", 1.0), ("ml", 0.9), ("llm", 0.8), ("historical", 0.9)]
        .into_iter()
        .map(|(name, weight)| (name.to_string(), weight))
        .collect()
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            curve: LearningCurveConfig::default(),
            default_weights: default_component_weights(),
            service_defaults: BTreeMap::new(),
            retry: RetryConfig::default(),
        }
    }
}

impl LearningConfig {
    /// Safe weights for a service.
    pub fn defaults_for(&self, service_type: ServiceType) -> ComponentWeights {
        self.service_defaults
            .get(&service_type)
            .cloned()
            .unwrap_or_else(|| self.default_weights.clone())
    }
}

/// Statistical validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ValidationConfig {
    /// New examples since the last validation that trigger a re-run
    #[serde(default = "default_example_threshold")]
    pub example_threshold: u64,

    /// Hours since the last validation that trigger a re-run
    #[serde(default = "default_time_threshold_hours")]
    pub time_threshold_hours: i64,

    /// Bootstrap resamples per validation
    #[serde(default = "default_bootstrap_iterations")]
    pub bootstrap_iterations: usize,

    /// Two-sided confidence level of the improvement interval
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,

    /// Lower bound of the improvement interval must exceed this
    #[serde(default = "default_min_improvement")]
    pub min_improvement: f64,

    /// Minimum samples per regime
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    /// Sample window size per regime
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,

    /// Fixed RNG seed for reproducible resampling
    #[serde(default)]
    pub seed: Option<u64>,
}

const fn default_example_threshold() -> u64 {
    1000
}

const fn default_time_threshold_hours() -> i64 {
    24 * 7
}

const fn default_bootstrap_iterations() -> usize {
    1000
}

const fn default_confidence_level() -> f64 {
    0.95
}

const fn default_min_improvement() -> f64 {
    0.01
}

const fn default_min_samples() -> usize {
    5
}

const fn default_max_samples() -> usize {
    500
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            example_threshold: default_example_threshold(),
            time_threshold_hours: default_time_threshold_hours(),
            bootstrap_iterations: default_bootstrap_iterations(),
            confidence_level: default_confidence_level(),
            min_improvement: default_min_improvement(),
            min_samples: default_min_samples(),
            max_samples: default_max_samples(),
            seed: None,
        }
    }
}

/// One step of the rollout ramp
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RolloutStep {
    /// Whole weeks since the program start
    pub week: u32,
    /// Traffic fraction in [0, 1]
    pub percentage: f64,
}

/// Gradual rollout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RolloutConfig {
    /// Kill-switch feature flag
    #[serde(default = "default_flag_name")]
    pub flag_name: String,

    /// Program start; the controller's construction time when unset
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,

    /// Step schedule, ascending by week
    #[serde(default = "default_schedule")]
    pub schedule: Vec<RolloutStep>,
}

fn default_flag_name() -> String {
    "adaptive-learning-rollout".to_string()
}

fn default_schedule() -> Vec<RolloutStep> {
    [(0, 0.10), (1, 0.30), (2, 0.50), (3, 0.80), (4, 1.0)]
        .into_iter()
        .map(|(week, percentage)| RolloutStep { week, percentage })
        .collect()
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            flag_name: default_flag_name(),
            start_date: None,
            schedule: default_schedule(),
        }
    }
}

/// Rollback trigger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RollbackConfig {
    /// User-reported issues that force a rollback
    #[serde(default = "default_user_issue_threshold")]
    pub user_issue_threshold: u32,

    /// Failure fraction that forces a rollback
    #[serde(default = "default_failure_rate_threshold")]
    pub failure_rate_threshold: f64,

    /// Predictions required before the failure rate is trusted
    #[serde(default = "default_min_recent_predictions")]
    pub min_recent_predictions: u32,

    /// Accuracy samples required before testing for degradation
    #[serde(default = "default_min_degradation_samples")]
    pub min_degradation_samples: usize,

    /// Smallest accuracy drop below baseline that counts as degradation
    #[serde(default = "default_min_accuracy_drop")]
    pub min_accuracy_drop: f64,

    /// One-sided z critical value
    #[serde(default = "default_degradation_z")]
    pub degradation_z: f64,

    /// Accuracy window size
    #[serde(default = "default_max_accuracy_window")]
    pub max_accuracy_window: usize,
}

const fn default_user_issue_threshold() -> u32 {
    3
}

const fn default_failure_rate_threshold() -> f64 {
    0.7
}

const fn default_min_recent_predictions() -> u32 {
    10
}

const fn default_min_degradation_samples() -> usize {
    10
}

const fn default_min_accuracy_drop() -> f64 {
    0.05
}

const fn default_degradation_z() -> f64 {
    1.645
}

const fn default_max_accuracy_window() -> usize {
    200
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            user_issue_threshold: default_user_issue_threshold(),
            failure_rate_threshold: default_failure_rate_threshold(),
            min_recent_predictions: default_min_recent_predictions(),
            min_degradation_samples: default_min_degradation_samples(),
            min_accuracy_drop: default_min_accuracy_drop(),
            degradation_z: default_degradation_z(),
            max_accuracy_window: default_max_accuracy_window(),
        }
    }
}

/// Trust scoring and routing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TrustConfig {
    /// Components that receive neutral trust before any evidence
    #[serde(default = "default_trust_components")]
    pub components: Vec<String>,

    /// EMA step toward each new trust sample
    #[serde(default = "default_trust_learning_rate")]
    pub learning_rate: f64,

    /// Samples at which confidence reaches 0.5
    #[serde(default = "default_confidence_half_samples")]
    pub confidence_half_samples: f64,

    /// Uncertainty at or above which all components are ensembled
    #[serde(default = "default_ensemble_threshold")]
    pub ensemble_threshold: f64,

    /// Uncertainty at or above which the top two components are ensembled
    #[serde(default = "default_top_two_threshold")]
    pub top_two_threshold: f64,
}

fn default_trust_components() -> Vec<String> {
    default_component_weights().into_keys().collect()
}

const fn default_trust_learning_rate() -> f64 {
    0.1
}

const fn default_confidence_half_samples() -> f64 {
    10.0
}

const fn default_ensemble_threshold() -> f64 {
    0.7
}

const fn default_top_two_threshold() -> f64 {
    0.4
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            components: default_trust_components(),
            learning_rate: default_trust_learning_rate(),
            confidence_half_samples: default_confidence_half_samples(),
            ensemble_threshold: default_ensemble_threshold(),
            top_two_threshold: default_top_two_threshold(),
        }
    }
}
