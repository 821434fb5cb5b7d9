//! Domain models for the adaptive weight learning loop.

pub mod config;
pub mod context;
pub mod performance;
pub mod rollback;
pub mod trust;
pub mod validation;
pub mod weights;

pub use config::{
    CacheConfig, Config, LearningConfig, LearningCurveConfig, LoggingConfig, RetryConfig,
    RollbackConfig, RolloutConfig, RolloutStep, TrustConfig, ValidationConfig,
};
pub use context::{ContextKey, DealSizeBucket, ServiceType};
pub use performance::{ComponentPerformance, PerformanceRecord};
pub use rollback::{RestoredFrom, RollbackDecision, RollbackMetrics, RollbackOutcome};
pub use trust::{ComponentTrust, RoutingDecision, TrustOutcome, TrustScoreRecord, NEUTRAL_TRUST};
pub use validation::{
    BootstrapSummary, ValidationCheck, ValidationOutcome, ValidationPerformance, ValidationRecord,
    ValidationStatus, WeightRegime,
};
pub use weights::{
    ComponentBandit, ComponentWeights, LearnReport, LearningStage, PendingPrediction, WeightLearningRecord,
    WeightSnapshot, WeightSource, Weights,
};
