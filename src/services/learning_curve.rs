//! Experience-based blending of learned and default weights.
//!
//! The blend ratio is piecewise linear in the example count:
//!
//! | stage        | examples                | ratio                                    |
//! |--------------|-------------------------|------------------------------------------|
//! | `bootstrap`  | `[0, bootstrap_until)`  | 0                                        |
//! | `initial`    | `[.., initial_until)`   | `initial_ratio -> transition_ratio`      |
//! | `transition` | `[.., transition_until)`| `transition_ratio -> transition_end_ratio`|
//! | `mature`     | `[transition_until, ..)`| `mature_ratio`                           |

use crate::domain::models::{ComponentWeights, LearningCurveConfig, LearningStage};

pub fn stage_for(examples: u64, curve: &LearningCurveConfig) -> LearningStage {
    if examples < curve.bootstrap_until {
        LearningStage::Bootstrap
    } else if examples < curve.initial_until {
        LearningStage::Initial
    } else if examples < curve.transition_until {
        LearningStage::Transition
    } else {
        LearningStage::Mature
    }
}

/// Fraction of each weight taken from the learned estimate.
pub fn blend_ratio(examples: u64, curve: &LearningCurveConfig) -> f64 {
    let ratio = match stage_for(examples, curve) {
        LearningStage::Bootstrap => 0.0,
        LearningStage::Initial => interpolate(
            examples,
            curve.bootstrap_until,
            curve.initial_until,
            curve.initial_ratio,
            curve.transition_ratio,
        ),
        LearningStage::Transition => interpolate(
            examples,
            curve.initial_until,
            curve.transition_until,
            curve.transition_ratio,
            curve.transition_end_ratio,
        ),
        LearningStage::Mature => curve.mature_ratio,
    };
    ratio.clamp(0.0, 1.0)
}

fn interpolate(examples: u64, start: u64, end: u64, from: f64, to: f64) -> f64 {
    if end <= start {
        return from;
    }
    let progress = (examples.saturating_sub(start)) as f64 / (end - start) as f64;
    from + (to - from) * progress.clamp(0.0, 1.0)
}

/// `weight = (1 - r) * default + r * learned`, per component.
///
/// Components without a learned estimate keep their default. Learned
/// components with no default blend against zero and are omitted while the
/// ratio is zero.
pub fn blend(defaults: &ComponentWeights, learned: &ComponentWeights, ratio: f64) -> ComponentWeights {
    let mut blended = ComponentWeights::new();

    for (component, &default) in defaults {
        let weight = learned
            .get(component)
            .map_or(default, |&estimate| (1.0 - ratio).mul_add(default, ratio * estimate));
        blended.insert(component.clone(), weight);
    }

    if ratio > 0.0 {
        for (component, &estimate) in learned {
            blended
                .entry(component.clone())
                .or_insert(ratio * estimate);
        }
    }

    blended
}
