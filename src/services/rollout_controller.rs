//! Time-based rollout of learned weights behind a kill switch.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::domain::models::{RolloutConfig, RolloutStep, ServiceType};
use crate::domain::ports::{props, Clock, FeatureFlags, SystemClock, Telemetry};
use crate::services::diagnostics::Diagnostics;

/// Resolution of subject bucketing.
const BUCKETS: u64 = 10_000;

pub struct RolloutController {
    flags: Option<Arc<dyn FeatureFlags>>,
    config: RolloutConfig,
    started_at: DateTime<Utc>,
    clock: Arc<dyn Clock>,
    diagnostics: Diagnostics,
}

impl RolloutController {
    /// Without a flag provider the rollout stays at zero.
    pub fn new(flags: Option<Arc<dyn FeatureFlags>>, config: RolloutConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let started_at = config.start_date.unwrap_or_else(|| clock.now());
        Self {
            flags,
            config,
            started_at,
            clock,
            diagnostics: Diagnostics::default(),
        }
    }

    /// Replace the clock. An unset start date is re-anchored to the new clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.started_at = self.config.start_date.unwrap_or_else(|| clock.now());
        self.clock = clock;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.diagnostics = Diagnostics::new(Some(telemetry));
        self
    }

    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Fraction of traffic that should receive learned weights.
    ///
    /// Exactly 0 while the flag is off, missing, or unreadable.
    pub async fn get_rollout_percentage(&self, tenant_id: &str, service_type: ServiceType) -> f64 {
        let Some(flags) = &self.flags else {
            return 0.0;
        };

        match flags.is_enabled(&self.config.flag_name, tenant_id).await {
            Ok(true) => {}
            Ok(false) => return 0.0,
            Err(err) => {
                self.diagnostics.failure(
                    "get_rollout_percentage",
                    &err,
                    props([
                        ("tenant_id", tenant_id.to_string()),
                        ("service_type", service_type.to_string()),
                        ("flag", self.config.flag_name.clone()),
                    ]),
                );
                return 0.0;
            }
        }

        let elapsed = self.clock.now() - self.started_at;
        if elapsed < chrono::Duration::zero() {
            return 0.0;
        }
        let weeks = u32::try_from(elapsed.num_weeks()).unwrap_or(u32::MAX);
        let percentage = percentage_for_week(&self.config.schedule, weeks);
        debug!(tenant_id, service = %service_type, weeks, percentage, "Rollout percentage");
        percentage
    }

    /// Whether `subject_key` falls inside the current rollout.
    ///
    /// A subject's bucket is fixed, so once in, it stays in as the ramp grows.
    pub async fn is_in_rollout(&self, tenant_id: &str, service_type: ServiceType, subject_key: &str) -> bool {
        let percentage = self.get_rollout_percentage(tenant_id, service_type).await;
        if percentage <= 0.0 {
            return false;
        }
        if percentage >= 1.0 {
            return true;
        }
        bucket_of(tenant_id, service_type, subject_key) < percentage
    }
}

/// Percentage of the last step at or before `weeks`; 0 before the first step.
///
/// Steps are taken in week order and the result never decreases with time.
pub fn percentage_for_week(schedule: &[RolloutStep], weeks: u32) -> f64 {
    let mut steps: Vec<&RolloutStep> = schedule.iter().collect();
    steps.sort_by_key(|step| step.week);

    let mut percentage: f64 = 0.0;
    for step in steps {
        if step.week > weeks {
            break;
        }
        if step.percentage.is_finite() {
            percentage = percentage.max(step.percentage);
        }
    }
    percentage.clamp(0.0, 1.0)
}

/// Stable position of a subject in [0, 1).
pub fn bucket_of(tenant_id: &str, service_type: ServiceType, subject_key: &str) -> f64 {
    let key = format!("{tenant_id}:{service_type}:{subject_key}");
    (fnv1a(key.as_bytes()) % BUCKETS) as f64 / BUCKETS as f64
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, byte| (hash ^ u64::from(*byte)).wrapping_mul(PRIME))
}
