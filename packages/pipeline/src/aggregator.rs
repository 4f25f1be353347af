//! Confidence aggregation over per-stage signals.

use pyxten_zoning_models::{ClassifiedUse, Precision};
use serde::Serialize;
use strum_macros::{AsRefStr, Display};

/// Overall confidence a determination should reach to be presented without
/// reservation.
pub const TARGET_CONFIDENCE: f64 = 0.95;

/// Pipeline stages that contribute a confidence signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SignalStage {
    /// Address geocoding precision.
    Geocode,
    /// Whether the zoning code was confirmed against the current catalog.
    Zoning,
    /// Average use classification confidence.
    UseClassification,
    /// Overlay detection completeness.
    Overlays,
}

/// A stage's contribution to the overall score.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageSignal {
    /// The stage ran and produced a score.
    Present {
        /// Contributing stage.
        stage: SignalStage,
        /// Score, expected in `[0, 1]`.
        value: f64,
        /// Factor label (e.g. `"address_exact"`).
        factor: String,
    },
    /// The stage never ran because the pipeline exited early.
    Skipped {
        /// Stage that did not run.
        stage: SignalStage,
    },
}

impl StageSignal {
    /// Builds a present signal.
    #[must_use]
    pub fn present(stage: SignalStage, value: f64, factor: &str) -> Self {
        Self::Present {
            stage,
            value,
            factor: factor.to_string(),
        }
    }
}

/// Aggregated confidence.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceScore {
    /// Mean of the present signals, in `[0, 1]`.
    pub overall: f64,
    /// One label per signal: the factor for present signals,
    /// `"<stage>_skipped"` for skipped ones.
    pub factors: Vec<String>,
}

impl ConfidenceScore {
    /// Returns `true` if the score reaches [`TARGET_CONFIDENCE`].
    #[must_use]
    pub fn meets_target(&self) -> bool {
        self.overall >= TARGET_CONFIDENCE
    }
}

/// Averages the present signals.
///
/// Values are clamped to `[0, 1]` (NaN counts as 0) before averaging.
/// Skipped stages do not affect the mean but are listed in `factors`.
/// With no present signals the overall score is 0.
#[must_use]
pub fn aggregate(signals: &[StageSignal]) -> ConfidenceScore {
    let mut sum = 0.0;
    let mut count = 0_u32;
    let mut factors = Vec::with_capacity(signals.len());

    for signal in signals {
        match signal {
            StageSignal::Present { value, factor, .. } => {
                sum += clamp_unit(*value);
                count += 1;
                factors.push(factor.clone());
            }
            StageSignal::Skipped { stage } => factors.push(format!("{stage}_skipped")),
        }
    }

    let overall = if count == 0 {
        0.0
    } else {
        clamp_unit(sum / f64::from(count))
    };

    ConfidenceScore { overall, factors }
}

/// Clamps to `[0, 1]`, mapping NaN to 0.
#[must_use]
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Geocode signal: rooftop matches are certain, anything coarser is 0.8.
#[must_use]
pub fn geocode_signal(precision: Precision) -> StageSignal {
    if precision.is_exact() {
        StageSignal::present(SignalStage::Geocode, 1.0, "address_exact")
    } else {
        StageSignal::present(SignalStage::Geocode, 0.8, "address_approximate")
    }
}

/// Zoning signal: 1.0 for a code confirmed in the current catalog, 0.6 for
/// an unverified one.
#[must_use]
pub fn zoning_signal(verified: bool) -> StageSignal {
    if verified {
        StageSignal::present(SignalStage::Zoning, 1.0, "zoning_confirmed")
    } else {
        StageSignal::present(SignalStage::Zoning, 0.6, "zoning_uncertain")
    }
}

/// Use signal: mean classifier confidence.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn use_signal(uses: &[ClassifiedUse]) -> StageSignal {
    let mean = if uses.is_empty() {
        0.0
    } else {
        uses.iter().map(|u| u.confidence).sum::<f64>() / uses.len() as f64
    };
    StageSignal::present(SignalStage::UseClassification, mean, "use_classified")
}

/// Overlay signal: 1.0 when every layer answered and none intersects, 0.9
/// when overlays were found, 0.5 when some layers could not be queried.
#[must_use]
pub fn overlay_signal(overlays_found: bool, layers_failed: bool) -> StageSignal {
    match (layers_failed, overlays_found) {
        (true, _) => StageSignal::present(SignalStage::Overlays, 0.5, "overlays_incomplete"),
        (false, true) => StageSignal::present(SignalStage::Overlays, 0.9, "overlays_detected"),
        (false, false) => StageSignal::present(SignalStage::Overlays, 1.0, "no_overlays"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_signals_score_zero() {
        let score = aggregate(&[]);
        assert!(score.overall.abs() < f64::EPSILON);
        assert!(score.factors.is_empty());
    }

    #[test]
    fn mean_of_present_signals() {
        let score = aggregate(&[
            geocode_signal(Precision::Rooftop),
            zoning_signal(false),
            StageSignal::Skipped {
                stage: SignalStage::UseClassification,
            },
        ]);
        assert!((score.overall - 0.8).abs() < 1e-9);
        assert_eq!(
            score.factors,
            vec!["address_exact", "zoning_uncertain", "use_classification_skipped"]
        );
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let score = aggregate(&[
            StageSignal::present(SignalStage::Geocode, 7.5, "a"),
            StageSignal::present(SignalStage::Zoning, -3.0, "b"),
            StageSignal::present(SignalStage::Overlays, f64::NAN, "c"),
            StageSignal::present(SignalStage::UseClassification, f64::INFINITY, "d"),
        ]);
        assert!((0.0..=1.0).contains(&score.overall));
        assert!((score.overall - 0.5).abs() < 1e-9);
    }

    #[test]
    fn only_skipped_signals_score_zero() {
        let score = aggregate(&[StageSignal::Skipped {
            stage: SignalStage::Overlays,
        }]);
        assert!(score.overall.abs() < f64::EPSILON);
        assert_eq!(score.factors, vec!["overlays_skipped"]);
    }

    #[test]
    fn all_certain_meets_target() {
        let uses = vec![ClassifiedUse {
            use_code: "RES-SF".to_string(),
            interpretation_text: String::new(),
            confidence: 0.95,
            notes: None,
        }];
        let score = aggregate(&[
            geocode_signal(Precision::Rooftop),
            zoning_signal(true),
            use_signal(&uses),
            overlay_signal(false, false),
        ]);
        assert!((score.overall - 0.9875).abs() < 1e-9);
        assert!(score.meets_target());
    }

    #[test]
    fn overlay_completeness_levels() {
        let value = |s: StageSignal| match s {
            StageSignal::Present { value, .. } => value,
            StageSignal::Skipped { .. } => unreachable!(),
        };
        assert!((value(overlay_signal(false, false)) - 1.0).abs() < f64::EPSILON);
        assert!((value(overlay_signal(true, false)) - 0.9).abs() < f64::EPSILON);
        assert!((value(overlay_signal(true, true)) - 0.5).abs() < f64::EPSILON);
    }
}
