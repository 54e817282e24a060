//! Rotation from basis vectors, with zero-vector guards

use crate::core::GEOMETRY_EPSILON;
use nalgebra::{UnitQuaternion, Vector3};

/// True when `v` is too short to normalize safely
pub fn is_degenerate(v: &Vector3<f64>) -> bool {
    !(v.norm() > GEOMETRY_EPSILON) || !v.iter().all(|c| c.is_finite())
}

/// `v` normalized, or `None` for zero/non-finite input
pub fn try_normalize(v: &Vector3<f64>) -> Option<Vector3<f64>> {
    if is_degenerate(v) {
        None
    } else {
        Some(v / v.norm())
    }
}

/// `a × b`, or `None` when the product is zero (parallel or zero inputs)
pub fn guarded_cross(a: &Vector3<f64>, b: &Vector3<f64>) -> Option<Vector3<f64>> {
    let product = a.cross(b);
    if is_degenerate(&product) {
        None
    } else {
        Some(product)
    }
}

/// Rotation whose local +Z points along `forward` and whose local +Y lies
/// in the plane of `forward` and `up`.
///
/// Returns `None` when `forward` is zero or `up` is parallel to it, so a
/// caller can skip the rotation update instead of writing a NaN rotation.
pub fn look_rotation(forward: &Vector3<f64>, up: &Vector3<f64>) -> Option<UnitQuaternion<f64>> {
    try_normalize(forward)?;
    guarded_cross(up, forward)?;
    let rotation = UnitQuaternion::face_towards(forward, up);
    if rotation.coords.iter().all(|c| c.is_finite()) {
        Some(rotation)
    } else {
        None
    }
}
