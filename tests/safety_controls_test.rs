//! Rollback, rollout and validation gates working together.

mod common;

use adaptive_weights::domain::models::{RestoredFrom, ValidationStatus, WeightRegime};
use adaptive_weights::{LearningStage, ServiceType, WeightSource};
use chrono::Duration;
use common::{context, test_config, Harness, ROLLOUT_FLAG, TENANT};

const LEARNED_SAMPLES: [f64; 5] = [0.88, 0.90, 0.92, 0.89, 0.91];
const DEFAULT_SAMPLES: [f64; 5] = [0.70, 0.75, 0.72, 0.74, 0.73];

/// Learn enough outcomes, record winning samples and run one check pass so
/// the context ends up validated and promoted.
async fn promote(harness: &Harness) {
    let learner = harness.learning.learner();
    for _ in 0..120 {
        learner
            .learn_from_outcome(TENANT, &context(), ServiceType::Risk, "ml", 0.95)
            .await
            .unwrap();
    }
    let validator = harness.learning.validator();
    for (learned, default) in LEARNED_SAMPLES.iter().zip(DEFAULT_SAMPLES.iter()) {
        validator
            .record_sample(TENANT, &context(), ServiceType::Risk, WeightRegime::Learned, *learned)
            .await
            .unwrap();
        validator
            .record_sample(TENANT, &context(), ServiceType::Risk, WeightRegime::Default, *default)
            .await
            .unwrap();
    }

    let report = harness
        .learning
        .run_scheduled_checks(TENANT, &context(), ServiceType::Risk)
        .await
        .unwrap();
    assert!(report.promoted.is_some(), "setup failed to promote: {report:?}");
}

async fn record_results(harness: &Harness, successes: u32, failures: u32, accuracy: Option<f64>) {
    let rollback = harness.learning.rollback();
    for i in 0..(successes + failures) {
        rollback
            .record_prediction_result(TENANT, &context(), ServiceType::Risk, i < successes, accuracy)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_user_issues_trigger_rollback_and_close_the_gate() {
    common::setup_test_logging();
    let harness = Harness::with_defaults();
    promote(&harness).await;
    assert!(
        harness
            .learning
            .validator()
            .should_apply_learned_params(TENANT, &context(), ServiceType::Risk)
            .await
    );

    for _ in 0..3 {
        harness
            .learning
            .rollback()
            .report_user_issue(TENANT, &context(), ServiceType::Risk)
            .await
            .unwrap();
    }

    let report = harness
        .learning
        .run_scheduled_checks(TENANT, &context(), ServiceType::Risk)
        .await
        .unwrap();
    assert!(report.rollback.should_rollback);
    assert!(report.rollback.reason.contains("user issues"));
    let outcome = report.rolled_back.unwrap();
    assert_eq!(outcome.restored_from, RestoredFrom::Defaults);

    assert!(
        !harness
            .learning
            .validator()
            .should_apply_learned_params(TENANT, &context(), ServiceType::Risk)
            .await
    );
    let weights = harness
        .learning
        .learner()
        .get_weights(TENANT, &context(), ServiceType::Risk)
        .await;
    assert_eq!(weights.stage, LearningStage::Bootstrap);
    assert_eq!(weights.get("ml"), Some(0.9));

    assert_eq!(harness.telemetry.events_named("weights.rollback").len(), 1);

    let after = harness
        .learning
        .rollback()
        .should_rollback(TENANT, &context(), ServiceType::Risk)
        .await;
    assert!(!after.should_rollback, "metrics window resets after rollback");
}

#[tokio::test]
async fn test_rolled_back_context_needs_fresh_samples_to_reopen() {
    let harness = Harness::with_defaults();
    promote(&harness).await;

    for _ in 0..3 {
        harness
            .learning
            .rollback()
            .report_user_issue(TENANT, &context(), ServiceType::Risk)
            .await
            .unwrap();
    }
    let report = harness
        .learning
        .run_scheduled_checks(TENANT, &context(), ServiceType::Risk)
        .await
        .unwrap();
    assert!(report.rolled_back.is_some());

    let learner = harness.learning.learner();
    for _ in 0..60 {
        learner
            .learn_from_outcome(TENANT, &context(), ServiceType::Risk, "ml", 0.95)
            .await
            .unwrap();
    }
    harness.clock.advance(Duration::hours(169));

    let report = harness
        .learning
        .run_scheduled_checks(TENANT, &context(), ServiceType::Risk)
        .await
        .unwrap();
    assert!(report.validation_check.as_ref().is_some_and(|c| c.should_validate));
    let validation = report.validation.unwrap();
    assert!(!validation.validated);
    assert_eq!(validation.status, ValidationStatus::Insufficient);
    assert!(report.promoted.is_none());
    assert!(
        !harness
            .learning
            .validator()
            .should_apply_learned_params(TENANT, &context(), ServiceType::Risk)
            .await
    );
}

#[tokio::test]
async fn test_rollback_is_idempotent() {
    let harness = Harness::with_defaults();
    promote(&harness).await;
    let rollback = harness.learning.rollback();

    let first = rollback
        .execute_rollback(TENANT, &context(), ServiceType::Risk, "manual")
        .await
        .unwrap();
    let record_after_first = harness
        .learning
        .learner()
        .get_record(TENANT, &context(), ServiceType::Risk)
        .await
        .unwrap()
        .unwrap();

    let second = rollback
        .execute_rollback(TENANT, &context(), ServiceType::Risk, "manual")
        .await
        .unwrap();
    let record_after_second = harness
        .learning
        .learner()
        .get_record(TENANT, &context(), ServiceType::Risk)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(first.weights, second.weights);
    assert_eq!(record_after_first.components, record_after_second.components);
    assert_eq!(record_after_first.examples, record_after_second.examples);
    assert!(record_after_second.promoted_version.is_none());

    let validation = harness
        .learning
        .validator()
        .get_record(TENANT, &context(), ServiceType::Risk)
        .await
        .unwrap()
        .unwrap();
    assert!(!validation.validated);
}

#[tokio::test]
async fn test_rollback_restores_previous_promotion() {
    let harness = Harness::with_defaults();
    promote(&harness).await;

    let learner = harness.learning.learner();
    for _ in 0..60 {
        learner
            .learn_from_outcome(TENANT, &context(), ServiceType::Risk, "ml", 0.2)
            .await
            .unwrap();
    }
    let report = harness
        .learning
        .run_scheduled_checks(TENANT, &context(), ServiceType::Risk)
        .await
        .unwrap();
    assert_eq!(report.promoted.map(|s| s.examples), Some(180));

    let outcome = harness
        .learning
        .rollback()
        .execute_rollback(TENANT, &context(), ServiceType::Risk, "manual")
        .await
        .unwrap();
    assert_eq!(outcome.restored_from, RestoredFrom::PreviousVersion);

    let record = learner
        .get_record(TENANT, &context(), ServiceType::Risk)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.examples, 120);
}

#[tokio::test]
async fn test_failure_rate_threshold() {
    let harness = Harness::with_defaults();
    record_results(&harness, 18, 2, None).await;
    let decision = harness
        .learning
        .rollback()
        .should_rollback(TENANT, &context(), ServiceType::Risk)
        .await;
    assert!(!decision.should_rollback);

    let other = Harness::with_defaults();
    record_results(&other, 5, 15, None).await;
    let decision = other
        .learning
        .rollback()
        .should_rollback(TENANT, &context(), ServiceType::Risk)
        .await;
    assert!(decision.should_rollback);
    assert!(decision.reason.contains("failure rate"));
}

#[tokio::test]
async fn test_failure_rate_needs_enough_predictions() {
    let harness = Harness::with_defaults();
    record_results(&harness, 0, 9, None).await;
    let decision = harness
        .learning
        .rollback()
        .should_rollback(TENANT, &context(), ServiceType::Risk)
        .await;
    assert!(!decision.should_rollback);
}

#[tokio::test]
async fn test_degradation_takes_priority_over_user_issues() {
    let harness = Harness::with_defaults();
    promote(&harness).await;

    let rollback = harness.learning.rollback();
    for i in 0..20 {
        let accuracy = if i % 2 == 0 { 0.60 } else { 0.64 };
        rollback
            .record_prediction_result(TENANT, &context(), ServiceType::Risk, true, Some(accuracy))
            .await
            .unwrap();
    }
    for _ in 0..3 {
        rollback
            .report_user_issue(TENANT, &context(), ServiceType::Risk)
            .await
            .unwrap();
    }

    let decision = rollback.should_rollback(TENANT, &context(), ServiceType::Risk).await;
    assert!(decision.should_rollback);
    assert!(decision.reason.contains("statistical degradation"), "{}", decision.reason);
}

#[tokio::test]
async fn test_rollout_is_zero_with_flag_off() {
    let harness = Harness::with_defaults();
    let rollout = harness.learning.rollout();

    for _ in 0..8 {
        assert!(rollout.get_rollout_percentage(TENANT, ServiceType::Risk).await.abs() < f64::EPSILON);
        assert!(!rollout.is_in_rollout(TENANT, ServiceType::Risk, "deal-1").await);
        harness.clock.advance(Duration::weeks(1));
    }
}

#[tokio::test]
async fn test_rollout_ramps_with_time() {
    let harness = Harness::with_defaults();
    harness.flags.set(ROLLOUT_FLAG, true).await;
    let rollout = harness.learning.rollout();

    let mut last = 0.0;
    for week in 0..6 {
        let percentage = rollout.get_rollout_percentage(TENANT, ServiceType::Forecast).await;
        assert!(percentage >= last, "week {week}: {percentage} < {last}");
        last = percentage;
        harness.clock.advance(Duration::weeks(1));
    }
    assert!((last - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_tenant_kill_switch_overrides_global_flag() {
    let harness = Harness::with_defaults();
    harness.flags.set(ROLLOUT_FLAG, true).await;
    harness.flags.set_for_tenant(ROLLOUT_FLAG, "tenant-b", false).await;
    harness.clock.advance(Duration::weeks(5));

    let rollout = harness.learning.rollout();
    assert!(rollout.is_in_rollout(TENANT, ServiceType::Risk, "deal-1").await);
    assert!(!rollout.is_in_rollout("tenant-b", ServiceType::Risk, "deal-1").await);
}

#[tokio::test]
async fn test_validation_of_clear_improvement() {
    let harness = Harness::new(&test_config());
    let outcome = harness
        .learning
        .validator()
        .validate_samples(&LEARNED_SAMPLES, &DEFAULT_SAMPLES)
        .unwrap();
    assert!(outcome.validated);
    assert!(outcome.confidence > 0.8);
    assert!(outcome.performance.lower_bound > 0.0);
}

#[tokio::test]
async fn test_validation_without_samples_stays_closed() {
    let harness = Harness::with_defaults();
    let learner = harness.learning.learner();
    for _ in 0..60 {
        learner
            .learn_from_outcome(TENANT, &context(), ServiceType::Risk, "ml", 0.9)
            .await
            .unwrap();
    }

    let report = harness
        .learning
        .run_scheduled_checks(TENANT, &context(), ServiceType::Risk)
        .await
        .unwrap();
    let validation = report.validation.unwrap();
    assert!(!validation.validated);
    assert!(report.promoted.is_none());

    let served = harness
        .learning
        .weights_for_request(TENANT, &context(), ServiceType::Risk, "deal-1")
        .await;
    assert_eq!(served.source, WeightSource::Default);
}
