//! Small math helpers shared across modules:
//! - scalar lerp and heading unwrapping
//! - quaternion slerp with shortest-arc correction and an NLERP fallback
//! - ground-plane alignment (Isometry2) interpolation and flattening
//! - Euler decomposition in degrees

use std::f32::consts::{PI, TAU};

use nalgebra::{Isometry2, Quaternion, UnitComplex, UnitQuaternion, Vector2};

/// Above this dot product two quaternions are close enough to NLERP.
const DOT_THRESHOLD: f32 = 0.9995;

/// Linear interpolation of scalars.
#[inline]
pub fn lerp_f32(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Shift `angle` by whole turns until it lies within (prev - π, prev + π].
#[inline]
pub fn unwrap_angle(prev: f32, mut angle: f32) -> f32 {
    while angle - prev > PI {
        angle -= TAU;
    }
    while angle - prev <= -PI {
        angle += TAU;
    }
    angle
}

/// Unit quaternion slerp along the shortest arc.
/// Falls back to a normalized lerp for nearly identical inputs.
pub fn slerp(a: &UnitQuaternion<f32>, b: &UnitQuaternion<f32>, t: f32) -> UnitQuaternion<f32> {
    let qa = a.coords;
    let mut qb = b.coords;
    let mut dot = qa.dot(&qb);
    if dot < 0.0 {
        qb = -qb;
        dot = -dot;
    }
    if dot > DOT_THRESHOLD {
        let q = qa + (qb - qa) * t;
        return UnitQuaternion::new_normalize(Quaternion::from(q));
    }
    let theta_0 = dot.clamp(-1.0, 1.0).acos();
    let theta = theta_0 * t;
    let sin_theta_0 = theta_0.sin();
    let s0 = (theta_0 - theta).sin() / sin_theta_0;
    let s1 = theta.sin() / sin_theta_0;
    UnitQuaternion::new_normalize(Quaternion::from(qa * s0 + qb * s1))
}

/// Interpolate two ground-plane alignments; heading takes the shortest turn.
pub fn lerp_alignment(a: &Isometry2<f32>, b: &Isometry2<f32>, t: f32) -> Isometry2<f32> {
    let ha = a.rotation.angle();
    let hb = unwrap_angle(ha, b.rotation.angle());
    let translation = a.translation.vector.lerp(&b.translation.vector, t);
    Isometry2::new(translation, lerp_f32(ha, hb, t))
}

/// Alignment as the (x, z, heading) triple stored in alignment curves.
#[inline]
pub fn alignment_components(align: &Isometry2<f32>) -> [f32; 3] {
    let v = align.translation.vector;
    [v.x, v.y, align.rotation.angle()]
}

/// Rebuild an alignment from an (x, z, heading) triple.
#[inline]
pub fn alignment_from_components(x: f32, z: f32, heading: f32) -> Isometry2<f32> {
    Isometry2::from_parts(Vector2::new(x, z).into(), UnitComplex::new(heading))
}

/// Euler angles (roll about X, pitch about Y, yaw about Z) in degrees.
#[inline]
pub fn euler_degrees(rotation: &UnitQuaternion<f32>) -> [f32; 3] {
    let (roll, pitch, yaw) = rotation.euler_angles();
    [roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees()]
}
