use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Correct/total counters for one component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentPerformance {
    pub total: u64,
    pub correct: u64,
}

impl ComponentPerformance {
    pub fn accuracy(&self) -> f64 {
        ratio(self.correct, self.total)
    }
}

/// Rolling prediction accuracy for a (tenant, service, context).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub total_predictions: u64,
    pub correct_predictions: u64,
    #[serde(default)]
    pub components: BTreeMap<String, ComponentPerformance>,
}

impl PerformanceRecord {
    pub fn record(&mut self, component: &str, correct: bool) {
        self.total_predictions += 1;
        let entry = self.components.entry(component.to_string()).or_default();
        entry.total += 1;
        if correct {
            self.correct_predictions += 1;
            entry.correct += 1;
        }
    }

    /// `correct / total`, or 0 when nothing has been tracked.
    pub fn accuracy(&self) -> f64 {
        ratio(self.correct_predictions, self.total_predictions)
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_record_accuracy_is_zero() {
        let record = PerformanceRecord::default();
        assert_eq!(record.total_predictions, 0);
        assert!(record.accuracy().abs() < f64::EPSILON);
        assert!(!record.accuracy().is_nan());
    }

    #[test]
    fn test_record_counts_per_component() {
        let mut record = PerformanceRecord::default();
        record.record("ml", true);
        record.record("ml", false);
        record.record("rules", true);

        assert_eq!(record.total_predictions, 3);
        assert!((record.accuracy() - 2.0 / 3.0).abs() < 1e-9);
        assert!((record.components["ml"].accuracy() - 0.5).abs() < 1e-9);
        assert_eq!(record.components["rules"].correct, 1);
    }
}
