//! Bootstrap resampling for the validation gate.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::errors::{LearningError, LearningResult};
use crate::domain::models::BootstrapSummary;

/// Seeded RNG when a seed is configured, OS entropy otherwise.
pub fn rng_for(seed: Option<u64>) -> StdRng {
    seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64)
}

pub fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        0.0
    } else {
        samples.iter().sum::<f64>() / samples.len() as f64
    }
}

/// Resample both sets with replacement `iterations` times and summarize the
/// distribution of `mean(learned) - mean(default)`.
///
/// The interval is the percentile interval at `confidence_level`.
pub fn bootstrap_improvement<R: Rng + ?Sized>(
    learned: &[f64],
    default: &[f64],
    iterations: usize,
    confidence_level: f64,
    rng: &mut R,
) -> LearningResult<BootstrapSummary> {
    let smallest = learned.len().min(default.len());
    if smallest == 0 {
        return Err(LearningError::StatisticalInsufficientData {
            required: 1,
            actual: smallest,
        });
    }
    let iterations = iterations.max(1);

    let mut differences: Vec<f64> = (0..iterations)
        .map(|_| resampled_mean(learned, rng) - resampled_mean(default, rng))
        .collect();
    differences.sort_by(f64::total_cmp);

    let improved = differences.iter().filter(|d| **d > 0.0).count();
    let alpha = (1.0 - confidence_level.clamp(0.0, 1.0)) / 2.0;

    Ok(BootstrapSummary {
        mean_difference: mean(learned) - mean(default),
        lower_bound: percentile(&differences, alpha),
        upper_bound: percentile(&differences, 1.0 - alpha),
        probability_improved: improved as f64 / iterations as f64,
        iterations,
    })
}

fn resampled_mean<R: Rng + ?Sized>(samples: &[f64], rng: &mut R) -> f64 {
    let total: f64 = (0..samples.len()).map(|_| samples[rng.gen_range(0..samples.len())]).sum();
    total / samples.len() as f64
}

/// Nearest-rank percentile of an ascending slice.
fn percentile(sorted: &[f64], quantile: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let last = sorted.len() - 1;
    let rank = (quantile.clamp(0.0, 1.0) * last as f64).round() as usize;
    sorted[rank.min(last)]
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEARNED: [f64; 5] = [0.88, 0.90, 0.92, 0.89, 0.91];
    const DEFAULT: [f64; 5] = [0.70, 0.75, 0.72, 0.74, 0.73];

    #[test]
    fn test_clear_improvement_is_detected() {
        let mut rng = rng_for(Some(7));
        let summary = bootstrap_improvement(&LEARNED, &DEFAULT, 1000, 0.95, &mut rng).unwrap();
        assert!((summary.mean_difference - 0.172).abs() < 1e-9);
        assert!(summary.lower_bound > 0.1);
        assert!(summary.upper_bound >= summary.lower_bound);
        assert!((summary.probability_improved - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_no_difference_is_a_coin_flip() {
        let samples = [0.6, 0.7, 0.8, 0.65, 0.75, 0.7];
        let mut rng = rng_for(Some(11));
        let summary = bootstrap_improvement(&samples, &samples, 2000, 0.95, &mut rng).unwrap();
        assert!(summary.lower_bound < 0.0);
        assert!(summary.upper_bound > 0.0);
        assert!(summary.probability_improved > 0.2 && summary.probability_improved < 0.8);
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let a = bootstrap_improvement(&LEARNED, &DEFAULT, 200, 0.9, &mut rng_for(Some(1))).unwrap();
        let b = bootstrap_improvement(&LEARNED, &DEFAULT, 200, 0.9, &mut rng_for(Some(1))).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_sample_set_is_insufficient() {
        let result = bootstrap_improvement(&LEARNED, &[], 100, 0.95, &mut rng_for(Some(1)));
        assert!(matches!(
            result,
            Err(LearningError::StatisticalInsufficientData { actual: 0, .. })
        ));
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((percentile(&sorted, 0.0) - 1.0).abs() < f64::EPSILON);
        assert!((percentile(&sorted, 0.5) - 3.0).abs() < f64::EPSILON);
        assert!((percentile(&sorted, 1.0) - 5.0).abs() < f64::EPSILON);
    }
}
