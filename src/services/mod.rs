//! Service layer: the learning loop's components and their shared helpers.

pub mod bootstrap;
pub mod diagnostics;
pub mod documents;
pub mod keys;
pub mod learning_curve;
pub mod learning_loop;
pub mod performance_tracker;
pub mod rollback_controller;
pub mod rollout_controller;
pub mod trust_router;
pub mod validator;
pub mod weight_learner;

pub use diagnostics::Diagnostics;
pub use learning_loop::{AdaptiveLearningLoop, CheckReport, LoopPorts};
pub use performance_tracker::PerformanceTracker;
pub use rollback_controller::{DegradationDetector, RollbackController, ZTestDegradation};
pub use rollout_controller::RolloutController;
pub use trust_router::TrustRouter;
pub use validator::Validator;
pub use weight_learner::WeightLearner;
