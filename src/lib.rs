//! Adaptive Weights - online ensemble-weight learning
//!
//! Learns per-component ensemble weights for downstream scoring services from
//! outcome feedback, promotes them only after bootstrap validation, ramps
//! exposure behind a feature flag, and rolls back automatically when
//! production signals degrade.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, error taxonomy and port traits
//! - **Adapters** (`adapters`): in-memory store, moka cache, flags, telemetry
//! - **Service Layer** (`services`): learner, validator, rollout, rollback,
//!   performance and trust tracking, and the assembled loop
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//!
//! # Example
//!
//! ```no_run
//! use adaptive_weights::{AdaptiveLearningLoop, ConfigLoader, ContextKey, LoopPorts, ServiceType};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::load()?;
//!     let learning = AdaptiveLearningLoop::new(&config, LoopPorts::in_memory(&config));
//!
//!     let context = ContextKey::new().with_industry("technology").with_deal_amount(250_000.0);
//!     learning
//!         .learner()
//!         .learn_from_outcome("tenant-1", &context, ServiceType::Risk, "ml", 0.92)
//!         .await?;
//!
//!     let weights = learning
//!         .weights_for_request("tenant-1", &context, ServiceType::Risk, "deal-42")
//!         .await;
//!     println!("{:?}", weights.values);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    Config, ContextKey, LearningStage, PerformanceRecord, RollbackDecision, RollbackOutcome, RoutingDecision,
    ServiceType, TrustOutcome, TrustScoreRecord, ValidationCheck, ValidationOutcome, WeightRegime, WeightSource,
    Weights,
};
pub use domain::ports::{Clock, DocumentStore, FeatureFlags, Telemetry, WeightCache};
pub use domain::{LearningError, LearningResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    AdaptiveLearningLoop, CheckReport, LoopPorts, PerformanceTracker, RollbackController, RolloutController,
    TrustRouter, Validator, WeightLearner,
};
