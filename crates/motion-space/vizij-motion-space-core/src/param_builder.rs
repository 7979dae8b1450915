//! Parametrization of a built space.
//!
//! [`ParamAnimationBuilder`] measures one parameter vector per base clip from
//! bone transforms, then hands the samples to a [`ParamSpaceBuilder`] strategy
//! that fits the weight model. [`DenseSamplingParamBuilder`] is the only
//! strategy shipped here: it densifies the parameter space with random blends
//! of nearby base clips.

use log::{debug, info, warn};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::clip::AnimationSet;
use crate::config::DenseSamplingConfig;
use crate::error::{MotionSpaceError, Result};
use crate::math::euler_degrees;
use crate::param::{
    squared_distance, AnimationParametrization, DenseSamplingParametrization, ParamModel,
};
use crate::skeleton::PoseModel;
use crate::space::AnimationSpace;

/// Attempts at drawing bounded extrapolated weights before falling back to an even split.
const WEIGHT_DRAWS: usize = 16;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamChannel {
    Translation,
    /// Euler angles in degrees.
    Rotation,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

fn unit_scale() -> f32 {
    1.0
}

/// How to measure one parameter on every base clip.
///
/// The measurement happens at the moment of base clip `source_clip` given by
/// `source_time` (its local seconds); the other clips are read at the
/// corresponding time through the timewarp curve.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub bone: String,
    /// Frame the bone is expressed in; world when absent.
    #[serde(default)]
    pub superior: Option<String>,
    pub channel: ParamChannel,
    pub axis: Axis,
    /// Multiplier applied to translation values.
    #[serde(default = "unit_scale")]
    pub scale: f32,
    #[serde(default)]
    pub source_clip: usize,
    #[serde(default)]
    pub source_time: f32,
}

/// Outcome of a dense sampling run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DenseSamplingReport {
    pub requested: usize,
    /// Samples in the final model, base samples included.
    pub achieved: usize,
    pub attempts: usize,
    /// Stopped by a run of rejected candidates before reaching `requested`.
    pub converged_early: bool,
}

/// Strategy that turns per-clip parameter samples into a weight model.
pub trait ParamSpaceBuilder {
    /// Strategy-specific summary returned alongside the model.
    type Report;

    fn build_parametrization(
        &self,
        names: Vec<String>,
        base_samples: Vec<Vec<f32>>,
    ) -> (AnimationParametrization, Self::Report);
}

/// Measures base samples and installs the parametrization built from them.
#[derive(Clone, Debug, Default)]
pub struct ParamAnimationBuilder<B> {
    strategy: B,
}

impl<B: ParamSpaceBuilder> ParamAnimationBuilder<B> {
    pub fn new(strategy: B) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> &B {
        &self.strategy
    }

    /// One parameter vector per base clip, in base clip order.
    pub fn extract_base_samples<M>(
        &self,
        space: &AnimationSpace,
        set: &AnimationSet,
        model: &M,
        specs: &[ParamSpec],
    ) -> Result<Vec<Vec<f32>>>
    where
        M: PoseModel + ?Sized,
    {
        let clips = space.base_clips();
        if clips.is_empty() {
            return Err(MotionSpaceError::EmptySpace);
        }
        let mut lengths = Vec::with_capacity(clips.len());
        for &id in clips {
            let clip = set.clip(id)?;
            model.validate_clip(clip)?;
            lengths.push(clip.length);
        }

        let mut samples = vec![Vec::with_capacity(specs.len()); clips.len()];
        for spec in specs {
            if spec.source_clip >= clips.len() {
                return Err(MotionSpaceError::InvalidParamSource {
                    name: spec.name.clone(),
                    index: spec.source_clip,
                    count: clips.len(),
                });
            }
            let times = corresponding_times(space, &lengths, spec.source_clip, spec.source_time);
            let axis = spec.axis.index();
            for (j, (&id, time)) in clips.iter().zip(times).enumerate() {
                let clip = set.clip(id)?;
                let superior = spec.superior.as_deref();
                let rel = model.relative_transform(clip, time, &spec.bone, superior)?;
                let value = match spec.channel {
                    ParamChannel::Translation => rel.translation.vector[axis] * spec.scale,
                    ParamChannel::Rotation => euler_degrees(&rel.rotation)[axis],
                };
                samples[j].push(value);
            }
        }
        Ok(samples)
    }

    /// Measure, build and install a parametrization on `space`.
    pub fn parametrize<M>(
        &self,
        space: &mut AnimationSpace,
        set: &AnimationSet,
        model: &M,
        specs: &[ParamSpec],
    ) -> Result<B::Report>
    where
        M: PoseModel + ?Sized,
    {
        let samples = self.extract_base_samples(space, set, model, specs)?;
        let names = specs.iter().map(|s| s.name.clone()).collect();
        let (parametrization, report) = self.strategy.build_parametrization(names, samples);
        space.set_parametrization(parametrization);
        info!(
            "space '{}': parametrized over {} parameter(s)",
            space.name(),
            specs.len()
        );
        Ok(report)
    }
}

/// Local time of every base clip corresponding to `time` on clip `source`.
fn corresponding_times(
    space: &AnimationSpace,
    lengths: &[f32],
    source: usize,
    time: f32,
) -> Vec<f32> {
    if let Some(timewarp) = space.timewarp_curve() {
        let u = timewarp.invert_dimension(source, time);
        if let Some(point) = timewarp.point_at(u) {
            return point
                .iter()
                .zip(lengths)
                .map(|(&t, &len)| t.clamp(0.0, len.max(0.0)))
                .collect();
        }
    }
    let src_len = lengths[source];
    let phase = if src_len > 0.0 { (time / src_len).clamp(0.0, 1.0) } else { 0.0 };
    lengths.iter().map(|&len| phase * len).collect()
}

/// Densifies the parameter space with random blends of nearby base clips.
#[derive(Clone, Debug, Default)]
pub struct DenseSamplingParamBuilder {
    config: DenseSamplingConfig,
}

impl DenseSamplingParamBuilder {
    pub fn new(config: DenseSamplingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DenseSamplingConfig {
        &self.config
    }
}

impl ParamSpaceBuilder for DenseSamplingParamBuilder {
    type Report = DenseSamplingReport;

    fn build_parametrization(
        &self,
        names: Vec<String>,
        base_samples: Vec<Vec<f32>>,
    ) -> (AnimationParametrization, DenseSamplingReport) {
        let cfg = &self.config;
        let n = base_samples.len();
        let p = names.len();
        let mut dense = DenseSamplingParametrization::new(cfg.neighbor_count);
        for (j, params) in base_samples.iter().enumerate() {
            let mut weights = vec![0.0; n];
            weights[j] = 1.0;
            dense.add_sample(params.clone(), weights);
        }
        let mut report = DenseSamplingReport {
            requested: cfg.target_samples,
            ..DenseSamplingReport::default()
        };

        let bounds = bounding_box(&base_samples, p, cfg.extrapolation);
        let diagonal = bounds
            .iter()
            .map(|&(lo, hi)| (hi - lo) * (hi - lo))
            .sum::<f32>()
            .sqrt();
        if n < 2 || p == 0 || diagonal <= 0.0 || !diagonal.is_finite() {
            debug!("dense sampling skipped: {n} base sample(s) over {p} parameter(s)");
            report.achieved = dense.len();
            let model = ParamModel::DenseSampling(dense);
            return (AnimationParametrization::new(names, base_samples, model), report);
        }

        let min_d2 = (cfg.min_distance * diagonal).powi(2);
        let neighbours = (p + 1).min(n);
        let mut rng = Pcg32::seed_from_u64(cfg.seed);
        let mut rejections = 0usize;

        while dense.len() < cfg.target_samples && report.attempts < cfg.max_attempts {
            report.attempts += 1;
            let draw: Vec<f32> = bounds.iter().map(|&(lo, hi)| rng.gen_range(lo..=hi)).collect();
            let mut order: Vec<(usize, f32)> = base_samples
                .iter()
                .enumerate()
                .map(|(i, s)| (i, squared_distance(s, &draw)))
                .collect();
            order.sort_by(|a, b| a.1.total_cmp(&b.1));
            order.truncate(neighbours);

            let local = random_weights(&mut rng, neighbours, cfg.max_extrapolation);
            let mut weights = vec![0.0f32; n];
            let mut params = vec![0.0f32; p];
            for (&(idx, _), &w) in order.iter().zip(&local) {
                weights[idx] = w;
                for (acc, v) in params.iter_mut().zip(&base_samples[idx]) {
                    *acc += w * v;
                }
            }

            let inside = params
                .iter()
                .zip(&bounds)
                .all(|(v, &(lo, hi))| *v >= lo && *v <= hi);
            let spaced = dense
                .nearest(&params, 1)
                .first()
                .map_or(true, |&(_, d2)| d2 >= min_d2);
            if inside && spaced {
                dense.add_sample(params, weights);
                rejections = 0;
            } else {
                rejections += 1;
                if rejections >= cfg.convergence_threshold {
                    report.converged_early = true;
                    break;
                }
            }
        }

        report.achieved = dense.len();
        if report.achieved < report.requested {
            warn!(
                "dense sampling reached {} of {} sample(s) after {} attempt(s)",
                report.achieved, report.requested, report.attempts
            );
        } else {
            debug!(
                "dense sampling reached {} sample(s) after {} attempt(s)",
                report.achieved, report.attempts
            );
        }
        let model = ParamModel::DenseSampling(dense);
        (AnimationParametrization::new(names, base_samples, model), report)
    }
}

/// Per-dimension (lo, hi) of `samples`, widened by `extrapolation` of the extent.
fn bounding_box(samples: &[Vec<f32>], dims: usize, extrapolation: f32) -> Vec<(f32, f32)> {
    (0..dims)
        .map(|d| {
            let (lo, hi) = samples
                .iter()
                .filter_map(|s| s.get(d).copied())
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
            if lo > hi {
                return (0.0, 0.0);
            }
            let pad = (hi - lo) * extrapolation.max(0.0);
            (lo - pad, hi + pad)
        })
        .collect()
}

/// `count` weights summing to one, each within `max_extrapolation` of [0, 1].
fn random_weights(rng: &mut Pcg32, count: usize, max_extrapolation: f32) -> Vec<f32> {
    let e = max_extrapolation.max(0.0);
    let spread = 1.0 + count as f32 * e;
    for _ in 0..WEIGHT_DRAWS {
        let raw: Vec<f32> = (0..count).map(|_| rng.gen::<f32>()).collect();
        let sum: f32 = raw.iter().sum();
        if sum <= f32::EPSILON {
            continue;
        }
        let weights: Vec<f32> = raw.iter().map(|r| r / sum * spread - e).collect();
        if weights.iter().all(|&w| w >= -e && w <= 1.0 + e) {
            return weights;
        }
    }
    vec![1.0 / count as f32; count]
}
