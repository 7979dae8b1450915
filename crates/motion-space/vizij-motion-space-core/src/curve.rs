//! Catmull-Rom curve fitting over vector and rotation control points.
//!
//! Model:
//! - Control points are uniformly spaced in curve parameter; segment `i` spans
//!   points `i` and `i + 1` with local `t` in [0, 1].
//! - Vector tangents use the centered difference `(p[i+1] - p[i-1]) / 2`; open
//!   curve ends reuse the end point as the missing neighbour.
//! - A curve whose first and last control points are equal is closed and its end
//!   tangents wrap around.
//! - Rotation tangents are taken in the tangent space of each point (quaternion
//!   log of the neighbour relative to the point's inverse) and stored as squad
//!   intermediate rotations; rotation segments blend with squad instead of the
//!   cubic Hermite basis.

use nalgebra::{DVector, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::math::slerp;

/// A value that can be used as a curve control point.
pub trait CurvePoint: Clone + PartialEq {
    /// Tangent at `cur` given its neighbours.
    fn tangent(prev: &Self, cur: &Self, next: &Self) -> Self;

    /// Evaluate the segment `p0 -> p1` with end tangents `m0`, `m1` at local `t`.
    fn blend(p0: &Self, p1: &Self, m0: &Self, m1: &Self, t: f32) -> Self;
}

#[inline]
fn hermite_basis(t: f32) -> [f32; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    [
        2.0 * t3 - 3.0 * t2 + 1.0,
        t3 - 2.0 * t2 + t,
        -2.0 * t3 + 3.0 * t2,
        t3 - t2,
    ]
}

macro_rules! impl_vector_curve_point {
    ($ty:ty) => {
        impl CurvePoint for $ty {
            #[inline]
            fn tangent(prev: &Self, _cur: &Self, next: &Self) -> Self {
                (next - prev) * 0.5
            }

            #[inline]
            fn blend(p0: &Self, p1: &Self, m0: &Self, m1: &Self, t: f32) -> Self {
                let [h00, h10, h01, h11] = hermite_basis(t);
                p0 * h00 + m0 * h10 + p1 * h01 + m1 * h11
            }
        }
    };
}

impl_vector_curve_point!(DVector<f32>);
impl_vector_curve_point!(Vector3<f32>);

impl CurvePoint for UnitQuaternion<f32> {
    /// Squad intermediate `s = q * exp(-(log(q⁻¹ next) + log(q⁻¹ prev)) / 4)`.
    fn tangent(prev: &Self, cur: &Self, next: &Self) -> Self {
        let inv = cur.inverse();
        // scaled_axis is twice the quaternion log and from_scaled_axis(v) is exp(v / 2).
        let to_next = (inv * next).scaled_axis();
        let to_prev = (inv * prev).scaled_axis();
        cur * UnitQuaternion::from_scaled_axis(-(to_next + to_prev) * 0.25)
    }

    fn blend(p0: &Self, p1: &Self, m0: &Self, m1: &Self, t: f32) -> Self {
        let outer = slerp(p0, p1, t);
        let inner = slerp(m0, m1, t);
        slerp(&outer, &inner, 2.0 * t * (1.0 - t))
    }
}

/// Catmull-Rom spline through a list of control points.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CurveFitter<P> {
    points: Vec<P>,
    #[serde(default)]
    tangents: Vec<P>,
}

/// Vector-valued curve used for timewarp and alignment correspondences.
pub type BlendCurve = CurveFitter<DVector<f32>>;

/// Rotation curve evaluated with squad.
pub type RotationCurve = CurveFitter<UnitQuaternion<f32>>;

impl<P: CurvePoint> CurveFitter<P> {
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
            tangents: Vec::new(),
        }
    }

    pub fn from_points(points: impl IntoIterator<Item = P>) -> Self {
        Self {
            points: points.into_iter().collect(),
            tangents: Vec::new(),
        }
    }

    pub fn add_control_point(&mut self, point: P) {
        self.points.push(point);
    }

    /// Replace a control point. Tangents must be recalculated afterwards.
    pub fn set_control_point(&mut self, index: usize, point: P) {
        if let Some(slot) = self.points.get_mut(index) {
            *slot = point;
            self.tangents.clear();
        }
    }

    /// Override a tangent. Calculates all tangents first if they are stale.
    pub fn set_tangent(&mut self, index: usize, tangent: P) {
        self.calc_tangents();
        if let Some(slot) = self.tangents.get_mut(index) {
            *slot = tangent;
        }
    }

    pub fn control_points(&self) -> &[P] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn segment_count(&self) -> usize {
        self.points.len().saturating_sub(1)
    }

    /// First and last control point coincide.
    pub fn is_closed(&self) -> bool {
        self.points.len() > 2 && self.points.first() == self.points.last()
    }

    /// Estimate all tangents. No-op when the tangent count already matches.
    pub fn calc_tangents(&mut self) {
        if self.tangents.len() == self.points.len() {
            return;
        }
        self.tangents = (0..self.points.len())
            .map(|i| self.estimate_tangent(i))
            .collect();
    }

    fn estimate_tangent(&self, index: usize) -> P {
        let n = self.points.len();
        let last = n - 1;
        let (prev, next) = if self.is_closed() && (index == 0 || index == last) {
            (n - 2, 1)
        } else {
            (index.saturating_sub(1), (index + 1).min(last))
        };
        P::tangent(&self.points[prev], &self.points[index], &self.points[next])
    }

    /// Tangent at a control point; indices past the end clamp to the last point.
    pub fn tangent(&self, index: usize) -> Option<P> {
        if self.points.is_empty() {
            return None;
        }
        let index = index.min(self.points.len() - 1);
        if self.tangents.len() == self.points.len() {
            Some(self.tangents[index].clone())
        } else {
            Some(self.estimate_tangent(index))
        }
    }

    /// Evaluate segment `segment` at local `t` in [0, 1].
    pub fn point(&self, segment: usize, t: f32) -> Option<P> {
        let n = self.points.len();
        match n {
            0 => None,
            1 => Some(self.points[0].clone()),
            _ => {
                if segment >= n - 1 {
                    return self.points.last().cloned();
                }
                if t <= 0.0 {
                    return Some(self.points[segment].clone());
                }
                if t >= 1.0 {
                    return Some(self.points[segment + 1].clone());
                }
                let m0 = self.tangent(segment)?;
                let m1 = self.tangent(segment + 1)?;
                Some(P::blend(
                    &self.points[segment],
                    &self.points[segment + 1],
                    &m0,
                    &m1,
                    t,
                ))
            }
        }
    }

    /// Evaluate at a global parameter `u` in [0, 1] spread uniformly over all segments.
    pub fn point_at(&self, u: f32) -> Option<P> {
        let (segment, t) = self.locate(u);
        self.point(segment, t)
    }

    /// Split a global parameter into (segment, local t).
    pub fn locate(&self, u: f32) -> (usize, f32) {
        let segments = self.segment_count();
        if segments == 0 {
            return (0, 0.0);
        }
        let scaled = u.clamp(0.0, 1.0) * segments as f32;
        let segment = (scaled.floor() as usize).min(segments - 1);
        (segment, scaled - segment as f32)
    }
}

impl CurveFitter<DVector<f32>> {
    /// Dimensionality of the control points (0 for an empty curve).
    pub fn dimension(&self) -> usize {
        self.points.first().map_or(0, |p| p.len())
    }

    /// Global parameter at which dimension `dim` reaches `value`.
    ///
    /// Assumes the dimension is non-decreasing (timewarp curves after repair).
    /// Values outside the curve range clamp to 0 or 1.
    pub fn invert_dimension(&self, dim: usize, value: f32) -> f32 {
        let eval = |u: f32| self.point_at(u).map_or(0.0, |p| p[dim]);
        if self.segment_count() == 0 || dim >= self.dimension() {
            return 0.0;
        }
        if value <= eval(0.0) {
            return 0.0;
        }
        if value >= eval(1.0) {
            return 1.0;
        }
        let mut lo = 0.0f32;
        let mut hi = 1.0f32;
        for _ in 0..40 {
            let mid = 0.5 * (lo + hi);
            if eval(mid) < value {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        0.5 * (lo + hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn line_curve() -> BlendCurve {
        CurveFitter::from_points([
            DVector::from_vec(vec![0.0, 0.0]),
            DVector::from_vec(vec![1.0, 2.0]),
            DVector::from_vec(vec![2.0, 5.0]),
            DVector::from_vec(vec![3.0, 5.5]),
        ])
    }

    #[test]
    fn segment_endpoints_are_exact() {
        let mut curve = line_curve();
        curve.calc_tangents();
        for i in 0..curve.segment_count() {
            assert_eq!(curve.point(i, 0.0).unwrap(), curve.control_points()[i]);
            assert_eq!(curve.point(i, 1.0).unwrap(), curve.control_points()[i + 1]);
        }
    }

    #[test]
    fn indices_past_the_end_clamp() {
        let curve = line_curve();
        assert_eq!(curve.point(17, 0.3).unwrap(), curve.control_points()[3]);
        assert_eq!(curve.tangent(99), curve.tangent(3));
        assert_eq!(curve.point_at(1.0).unwrap(), curve.control_points()[3]);
    }

    #[test]
    fn degenerate_curves() {
        let empty: BlendCurve = CurveFitter::new();
        assert!(empty.point(0, 0.5).is_none());
        let single: CurveFitter<Vector3<f32>> =
            CurveFitter::from_points([Vector3::new(1.0, 2.0, 3.0)]);
        assert_eq!(single.point(0, 0.5), Some(Vector3::new(1.0, 2.0, 3.0)));
    }

    #[test]
    fn calc_tangents_is_idempotent_until_points_change() {
        let mut curve = line_curve();
        curve.calc_tangents();
        curve.set_tangent(1, DVector::from_vec(vec![9.0, 9.0]));
        curve.calc_tangents();
        assert_eq!(curve.tangent(1).unwrap()[0], 9.0);
        curve.set_control_point(1, DVector::from_vec(vec![1.0, 1.0]));
        curve.calc_tangents();
        assert_relative_eq!(curve.tangent(1).unwrap()[0], 1.0);
    }

    #[test]
    fn closed_curve_wraps_tangents() {
        let mut curve: CurveFitter<Vector3<f32>> = CurveFitter::from_points([
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(1.0, 1.0, 0.0),
            Vector3::new(0.0, 0.0, 0.0),
        ]);
        assert!(curve.is_closed());
        curve.calc_tangents();
        let expected = (Vector3::new(1.0, 0.0, 0.0) - Vector3::new(1.0, 1.0, 0.0)) * 0.5;
        assert_eq!(curve.tangent(0).unwrap(), expected);
        assert_eq!(curve.tangent(3).unwrap(), expected);
    }

    #[test]
    fn straight_line_interpolates_linearly() {
        let curve = CurveFitter::from_points((0..5).map(|i| Vector3::new(i as f32, 0.0, 0.0)));
        let p = curve.point(1, 0.25).unwrap();
        assert_relative_eq!(p.x, 1.25, epsilon = 1e-5);
        let (segment, t) = curve.locate(0.625);
        assert_eq!(segment, 2);
        assert_relative_eq!(t, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn rotation_curve_stays_unit_length() {
        let axis = Vector3::y_axis();
        let tilt = Vector3::x_axis();
        let mut curve: RotationCurve = CurveFitter::new();
        for i in 0..6 {
            let yaw = UnitQuaternion::from_axis_angle(&axis, i as f32 * 0.7);
            let pitch = UnitQuaternion::from_axis_angle(&tilt, (i as f32 * 0.9).sin());
            curve.add_control_point(yaw * pitch);
        }
        curve.calc_tangents();
        for k in 0..=50 {
            let q = curve.point_at(k as f32 / 50.0).unwrap();
            assert_relative_eq!(q.coords.norm(), 1.0, epsilon = 1e-4);
        }
        for m in 0..curve.len() {
            assert_relative_eq!(curve.tangent(m).unwrap().coords.norm(), 1.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn rotation_curve_hits_control_points() {
        let curve: RotationCurve = CurveFitter::from_points([
            UnitQuaternion::identity(),
            UnitQuaternion::from_euler_angles(0.3, 0.0, 0.0),
            UnitQuaternion::from_euler_angles(0.3, 0.5, 0.0),
        ]);
        let q = curve.point(0, 1.0).unwrap();
        assert_eq!(q, curve.control_points()[1]);
        let mid = curve.point(1, 0.5).unwrap();
        assert!(mid.angle_to(&curve.control_points()[1]) < 0.5);
    }

    #[test]
    fn invert_dimension_finds_monotone_time() {
        let curve: BlendCurve = CurveFitter::from_points(
            (0..5).map(|i| DVector::from_vec(vec![i as f32 * 0.25, i as f32 * 0.5])),
        );
        let u = curve.invert_dimension(1, 1.0);
        assert_relative_eq!(u, 0.5, epsilon = 1e-4);
        assert_eq!(curve.invert_dimension(0, -1.0), 0.0);
        assert_eq!(curve.invert_dimension(0, 5.0), 1.0);
    }
}
