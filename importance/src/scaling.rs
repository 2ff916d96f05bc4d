//! Per-connection importance scaling.

/// Weights a chunk's score for one connection, e.g. by distance from the
/// connection's point of interest.
pub trait ImportanceScaling: Send + Sync {
    /// Integer multiplier for a chunk at `position` seen from `focus`.
    /// Returning 0 suppresses the chunk this tick.
    fn scale(&self, focus: Option<[f32; 3]>, position: Option<[f32; 3]>) -> u32;
}

/// Every chunk weighs the same.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoScaling;

impl ImportanceScaling for NoScaling {
    fn scale(&self, _focus: Option<[f32; 3]>, _position: Option<[f32; 3]>) -> u32 {
        1
    }
}

/// Tile-based distance falloff.
///
/// Positions are bucketed into cubic tiles of `tile_size`. A chunk in the
/// focus tile gets `near_weight`; one `d` tiles away (Chebyshev distance)
/// gets `near_weight / (1 + d²)`, never less than 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceImportance {
    pub tile_size: f32,
    pub near_weight: u32,
}

impl Default for DistanceImportance {
    fn default() -> Self {
        Self {
            tile_size: 32.0,
            near_weight: 64,
        }
    }
}

impl DistanceImportance {
    fn tile(&self, position: [f32; 3]) -> [i64; 3] {
        let size = if self.tile_size > 0.0 { self.tile_size } else { 1.0 };
        position.map(|c| (c / size).floor() as i64)
    }
}

impl ImportanceScaling for DistanceImportance {
    fn scale(&self, focus: Option<[f32; 3]>, position: Option<[f32; 3]>) -> u32 {
        let (Some(focus), Some(position)) = (focus, position) else {
            return self.near_weight.max(1);
        };
        let a = self.tile(focus);
        let b = self.tile(position);
        let distance = (0..3).map(|i| (a[i] - b[i]).unsigned_abs()).max().unwrap_or(0);
        let falloff = 1u64.saturating_add(distance.saturating_mul(distance));
        (u64::from(self.near_weight) / falloff).max(1) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_falloff() {
        let scaling = DistanceImportance {
            tile_size: 10.0,
            near_weight: 100,
        };
        let focus = Some([5.0, 0.0, 5.0]);
        assert_eq!(scaling.scale(focus, Some([9.0, 0.0, 1.0])), 100);
        assert_eq!(scaling.scale(focus, Some([15.0, 0.0, 5.0])), 50);
        assert_eq!(scaling.scale(focus, Some([-15.0, 0.0, 5.0])), 20);
        assert_eq!(scaling.scale(focus, Some([5000.0, 0.0, 5.0])), 1);
        assert_eq!(scaling.scale(None, Some([5000.0, 0.0, 5.0])), 100);
    }

    #[test]
    fn no_scaling_is_uniform() {
        assert_eq!(NoScaling.scale(Some([0.0; 3]), Some([1e6; 3])), 1);
    }
}
