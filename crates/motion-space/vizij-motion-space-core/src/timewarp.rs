//! Post-processing of blend-curve samples: heading unwrapping and timewarp repair.

use log::debug;
use nalgebra::DVector;

use crate::curve::BlendCurve;
use crate::math::unwrap_angle;

/// Fritsch–Carlson bound on tangent / secant for a monotone Hermite span.
const MAX_TANGENT_RATIO: f32 = 3.0;

/// Unwrap the heading of every clip across consecutive alignment samples.
///
/// Samples hold (x, z, heading) triples per clip; after unwrapping, each heading
/// delta between consecutive samples lies within (-π, π].
pub fn unwrap_headings(samples: &mut [Vec<f32>], clip_count: usize) {
    for clip in 0..clip_count {
        let dim = clip * 3 + 2;
        for i in 1..samples.len() {
            let prev = samples[i - 1][dim];
            let cur = &mut samples[i][dim];
            *cur = unwrap_angle(prev, *cur);
        }
    }
}

/// Make every dimension of a timewarp curve non-decreasing.
///
/// Knots that fall below `previous + epsilon` share the slack with their
/// neighbour (both move toward their midpoint); a final sweep guarantees strict
/// increase. Tangents are then limited so each Hermite span stays monotone.
/// Returns the number of knot values that were moved.
pub fn enforce_monotonic(curve: &mut BlendCurve, epsilon: f32) -> usize {
    let n = curve.len();
    let dims = curve.dimension();
    if n < 2 || dims == 0 {
        return 0;
    }
    let epsilon = epsilon.max(0.0);
    let mut knots: Vec<DVector<f32>> = curve.control_points().to_vec();
    let mut repaired = 0usize;

    for d in 0..dims {
        let mut values: Vec<f32> = knots.iter().map(|k| k[d]).collect();
        repaired += repair_dimension(&mut values, epsilon);
        for (k, v) in knots.iter_mut().zip(values) {
            k[d] = v;
        }
    }

    if repaired > 0 {
        debug!("timewarp repair moved {repaired} knot value(s)");
        for (i, k) in knots.into_iter().enumerate() {
            curve.set_control_point(i, k);
        }
    }
    limit_tangents(curve);
    repaired
}

fn repair_dimension(values: &mut [f32], epsilon: f32) -> usize {
    let n = values.len();
    let mut moved = 0usize;
    for _ in 0..n {
        let mut clean = true;
        for i in 0..n - 1 {
            if values[i + 1] < values[i] + epsilon {
                let mid = 0.5 * (values[i] + values[i + 1]);
                values[i] = mid - 0.5 * epsilon;
                values[i + 1] = mid + 0.5 * epsilon;
                moved += 1;
                clean = false;
            }
        }
        if clean {
            return moved;
        }
    }
    for i in 0..n - 1 {
        if values[i + 1] < values[i] + epsilon {
            values[i + 1] = values[i] + epsilon;
            moved += 1;
        }
    }
    moved
}

fn limit_tangents(curve: &mut BlendCurve) {
    curve.calc_tangents();
    let n = curve.len();
    let knots = curve.control_points().to_vec();
    for i in 0..n {
        let Some(mut tangent) = curve.tangent(i) else {
            continue;
        };
        for d in 0..tangent.len() {
            let left = (i > 0).then(|| knots[i][d] - knots[i - 1][d]);
            let right = (i + 1 < n).then(|| knots[i + 1][d] - knots[i][d]);
            let secant = match (left, right) {
                (Some(l), Some(r)) => l.min(r),
                (Some(s), None) | (None, Some(s)) => s,
                (None, None) => 0.0,
            };
            tangent[d] = tangent[d].clamp(0.0, MAX_TANGENT_RATIO * secant.max(0.0));
        }
        curve.set_tangent(i, tangent);
    }
}
