//! Parametrizations: map a continuous control vector to blend weights.
//!
//! [`AnimationParametrization`] owns the parameter names and one base sample per
//! base clip, and dispatches weight computation to a [`ParamModel`].

use serde::{Deserialize, Serialize};

use crate::error::{MotionSpaceError, Result};

/// Exact-hit threshold on squared parameter distance.
const EXACT_HIT_EPS: f32 = 1e-12;

/// A training pair: parameter vector and blend weights over base clips.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DenseSample {
    pub params: Vec<f32>,
    pub weights: Vec<f32>,
}

#[inline]
pub(crate) fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// k-nearest-neighbour interpolation over densely sampled (params, weights) pairs.
///
/// Lookup is a linear scan over every stored sample.
// TODO: a kd-tree over `samples` once spaces grow past a few thousand samples.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DenseSamplingParametrization {
    neighbor_count: usize,
    samples: Vec<DenseSample>,
}

impl DenseSamplingParametrization {
    pub fn new(neighbor_count: usize) -> Self {
        Self {
            neighbor_count: neighbor_count.max(1),
            samples: Vec::new(),
        }
    }

    pub fn neighbor_count(&self) -> usize {
        self.neighbor_count
    }

    pub fn add_sample(&mut self, params: Vec<f32>, weights: Vec<f32>) {
        self.samples.push(DenseSample { params, weights });
    }

    pub fn samples(&self) -> &[DenseSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Indices and squared distances of the `k` closest samples, nearest first.
    pub fn nearest(&self, params: &[f32], k: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .samples
            .iter()
            .enumerate()
            .map(|(i, s)| (i, squared_distance(&s.params, params)))
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(k);
        scored
    }

    /// Blend weights for `params`.
    ///
    /// Neighbour `i` is weighted by `1/sqrt(d_i) - 1/sqrt(d_max)` (normalized),
    /// where `d` is squared distance and `d_max` the farthest of the k neighbours.
    /// Falls back to a uniform average when every weight vanishes.
    pub fn sample(&self, params: &[f32]) -> Vec<f32> {
        let neighbours = self.nearest(params, self.neighbor_count);
        let Some(&(closest, closest_d)) = neighbours.first() else {
            return Vec::new();
        };
        if closest_d <= EXACT_HIT_EPS {
            return self.samples[closest].weights.clone();
        }

        let d_max = neighbours.last().map_or(closest_d, |n| n.1);
        let far = d_max.sqrt().recip();
        let mut influence: Vec<f32> = neighbours
            .iter()
            .map(|&(_, d)| (d.sqrt().recip() - far).max(0.0))
            .collect();
        let total: f32 = influence.iter().sum();
        if total > 0.0 {
            influence.iter_mut().for_each(|w| *w /= total);
        } else {
            let even = 1.0 / neighbours.len() as f32;
            influence.iter_mut().for_each(|w| *w = even);
        }

        let dim = self.samples[closest].weights.len();
        let mut out = vec![0.0f32; dim];
        for (&(idx, _), w) in neighbours.iter().zip(influence) {
            for (o, v) in out.iter_mut().zip(&self.samples[idx].weights) {
                *o += w * v;
            }
        }
        out
    }
}

/// Closed set of weight models.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum ParamModel {
    DenseSampling(DenseSamplingParametrization),
}

/// Named control parameters plus the model that turns them into blend weights.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnimationParametrization {
    names: Vec<String>,
    /// One parameter vector per base clip, in base clip order.
    base_samples: Vec<Vec<f32>>,
    model: ParamModel,
}

impl AnimationParametrization {
    pub fn new(names: Vec<String>, base_samples: Vec<Vec<f32>>, model: ParamModel) -> Self {
        Self {
            names,
            base_samples,
            model,
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn param_count(&self) -> usize {
        self.names.len()
    }

    pub fn base_samples(&self) -> &[Vec<f32>] {
        &self.base_samples
    }

    pub fn base_count(&self) -> usize {
        self.base_samples.len()
    }

    pub fn model(&self) -> &ParamModel {
        &self.model
    }

    /// Index of a named parameter.
    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Blend weights, one per base clip. Weights are not renormalized.
    pub fn sample(&self, params: &[f32]) -> Result<Vec<f32>> {
        if params.len() != self.names.len() {
            return Err(MotionSpaceError::ParamDimension {
                expected: self.names.len(),
                found: params.len(),
            });
        }
        Ok(match &self.model {
            ParamModel::DenseSampling(dense) => dense.sample(params),
        })
    }
}

/// Export a parametrization as serde_json::Value (diagnostics/tooling).
pub fn export_parametrization_json(
    parametrization: &AnimationParametrization,
) -> serde_json::Value {
    serde_json::to_value(parametrization).unwrap_or(serde_json::Value::Null)
}
