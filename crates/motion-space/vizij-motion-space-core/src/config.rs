//! Tuning knobs for space building, annotation matching and dense sampling.
//!
//! Every operation takes its config explicitly; there is no global tuning state.

use serde::{Deserialize, Serialize};

/// Configuration for [`SpaceBuilder`](crate::builder::SpaceBuilder).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpaceBuildConfig {
    /// Fit timewarp and alignment curves after creating base clips.
    pub build_blend_curves: bool,
    /// Run the annotation matcher after building.
    pub match_annotations: bool,
    /// Frames of the reference clip between consecutive curve knots.
    pub knot_spacing: f32,
    /// Samples per second used for knot placement; None uses the reference clip frame rate.
    pub sample_rate: Option<f32>,
    /// Minimum increase between consecutive timewarp knots (seconds).
    pub monotonic_epsilon: f32,
    pub annotations: AnnotationMatchConfig,
}

impl Default for SpaceBuildConfig {
    fn default() -> Self {
        Self {
            build_blend_curves: true,
            match_annotations: true,
            knot_spacing: 5.0,
            sample_rate: None,
            monotonic_epsilon: 1e-4,
            annotations: AnnotationMatchConfig::default(),
        }
    }
}

/// Configuration for [`AnnotationMatcher`](crate::annotation_match::AnnotationMatcher).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationMatchConfig {
    /// Slack (normalized clip time) when testing whether intervals touch.
    pub overlap_tolerance: f32,
    /// Overlap quality below which a neighbour does not vote on a split.
    pub min_split_quality: f32,
}

impl Default for AnnotationMatchConfig {
    fn default() -> Self {
        Self {
            overlap_tolerance: 0.02,
            min_split_quality: 0.05,
        }
    }
}

/// Configuration for [`DenseSamplingParamBuilder`](crate::DenseSamplingParamBuilder).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenseSamplingConfig {
    /// Neighbours blended by
    /// [`DenseSamplingParametrization::sample`](crate::DenseSamplingParametrization::sample).
    pub neighbor_count: usize,
    /// Fraction of each bounding-box extent added on both sides.
    pub extrapolation: f32,
    /// Largest excursion of a single blend weight outside [0, 1].
    pub max_extrapolation: f32,
    /// Minimum distance between accepted samples, as a fraction of the box diagonal.
    pub min_distance: f32,
    /// Stop once this many samples (base samples included) exist.
    pub target_samples: usize,
    /// Consecutive rejected candidates that end the search early.
    pub convergence_threshold: usize,
    /// Hard cap on candidate draws.
    pub max_attempts: usize,
    /// Seed for the candidate generator.
    pub seed: u64,
}

impl Default for DenseSamplingConfig {
    fn default() -> Self {
        Self {
            neighbor_count: 4,
            extrapolation: 0.1,
            max_extrapolation: 0.2,
            min_distance: 0.02,
            target_samples: 500,
            convergence_threshold: 200,
            max_attempts: 100_000,
            seed: 0x5EED_1DEA,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: SpaceBuildConfig =
            serde_json::from_str(r#"{ "knot_spacing": 2.0, "annotations": {} }"#).unwrap();
        assert_eq!(cfg.knot_spacing, 2.0);
        assert!(cfg.build_blend_curves);
        assert_eq!(cfg.annotations, AnnotationMatchConfig::default());

        let dense: DenseSamplingConfig =
            serde_json::from_str(r#"{ "target_samples": 10 }"#).unwrap();
        assert_eq!(dense.target_samples, 10);
        assert_eq!(dense.neighbor_count, 4);
    }
}
