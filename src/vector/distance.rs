//! Euclidean distance primitives shared by index construction and search.
//!
//! All functions assume equal-length slices; callers validate dimensions
//! at the API boundary so the hot loops stay branch-free.

use crate::vector::types::Distance;

/// Dot product of two equal-length vectors.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Squared Euclidean distance.
#[inline]
pub fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Euclidean distance, clamped into a valid [`Distance`].
///
/// Overflow to infinity saturates at `f32::MAX` so the result always orders.
#[inline]
pub fn euclidean(a: &[f32], b: &[f32]) -> Distance {
    let d = squared_euclidean(a, b).sqrt();
    Distance::new(d.min(f32::MAX)).unwrap_or(Distance::zero())
}

/// L2 norm of a vector.
#[inline]
pub fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}
