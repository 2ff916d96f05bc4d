//! Client-side smoothing between received snapshots.

use schema::Smoothing;

use crate::value::FieldValue;

/// Furthest past the newest snapshot extrapolation may reach, in snapshot
/// intervals.
pub const MAX_EXTRAPOLATION: f32 = 1.0;

/// Blends `from` towards `to` by `alpha` according to `smoothing`.
///
/// `alpha` is 0 at `from`, 1 at `to`. Values above 1 extrapolate and are
/// honored only by [`Smoothing::InterpolateAndExtrapolate`]. Integer, bool,
/// string and entity values step at `alpha >= 1`.
#[must_use]
pub fn blend(smoothing: Smoothing, from: &FieldValue, to: &FieldValue, alpha: f32) -> FieldValue {
    let alpha = if alpha.is_finite() { alpha } else { 0.0 };
    let alpha = match smoothing {
        Smoothing::None => return to.clone(),
        Smoothing::Clamp => return if alpha >= 1.0 { to.clone() } else { from.clone() },
        Smoothing::Interpolate => alpha.clamp(0.0, 1.0),
        Smoothing::InterpolateAndExtrapolate => alpha.clamp(0.0, 1.0 + MAX_EXTRAPOLATION),
    };
    match (from, to) {
        (FieldValue::Float(a), FieldValue::Float(b)) => FieldValue::Float(lerp(*a, *b, alpha)),
        (FieldValue::Float2(a), FieldValue::Float2(b)) => FieldValue::Float2(lerp_array(a, b, alpha)),
        (FieldValue::Float3(a), FieldValue::Float3(b)) => FieldValue::Float3(lerp_array(a, b, alpha)),
        (FieldValue::Float4(a), FieldValue::Float4(b)) => FieldValue::Float4(lerp_array(a, b, alpha)),
        (FieldValue::Quaternion(a), FieldValue::Quaternion(b)) => FieldValue::Quaternion(nlerp(a, b, alpha)),
        _ if alpha >= 1.0 => to.clone(),
        _ => from.clone(),
    }
}

fn lerp(a: f32, b: f32, alpha: f32) -> f32 {
    a + (b - a) * alpha
}

fn lerp_array<const N: usize>(a: &[f32; N], b: &[f32; N], alpha: f32) -> [f32; N] {
    std::array::from_fn(|i| lerp(a[i], b[i], alpha))
}

/// Normalized lerp along the shorter arc.
fn nlerp(a: &[f32; 4], b: &[f32; 4], alpha: f32) -> [f32; 4] {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let b = if dot < 0.0 { b.map(|c| -c) } else { *b };
    let q = lerp_array(a, &b, alpha);
    let norm = q.iter().map(|c| c * c).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        q.map(|c| c / norm)
    } else {
        *a
    }
}
