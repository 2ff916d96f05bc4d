//! Prediction configuration.

use crate::error::{PredictionError, PredictionResult};

/// How locally spawned, not yet confirmed ghosts are corrected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PredictedSpawnPolicy {
    /// Predict forward like any other ghost.
    #[default]
    Continue,
    /// Roll back to the spawn tick every update until the server confirms the
    /// ghost. Costs a replay per update but corrects divergence sooner.
    RollbackToSpawnTick,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionConfig {
    /// Longest replay allowed in one update; older rollback points are clamped.
    pub max_prediction_ticks: u32,
    pub spawn_policy: PredictedSpawnPolicy,
    /// Back up predicted state before a partial tick and restore it on the
    /// next update. When disabled, the next update instead rolls every
    /// predicted ghost back to its latest authoritative snapshot; ghosts
    /// with no authoritative snapshot yet are still backed up.
    pub backup_optimization: bool,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            max_prediction_ticks: 64,
            spawn_policy: PredictedSpawnPolicy::Continue,
            backup_optimization: true,
        }
    }
}

impl PredictionConfig {
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_prediction_ticks: 16,
            spawn_policy: PredictedSpawnPolicy::Continue,
            backup_optimization: true,
        }
    }

    pub const fn validate(&self) -> PredictionResult<()> {
        if self.max_prediction_ticks == 0 {
            return Err(PredictionError::InvalidConfig {
                field: "max_prediction_ticks",
                reason: "must be positive",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_replay_window_rejected() {
        let config = PredictionConfig {
            max_prediction_ticks: 0,
            ..PredictionConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(PredictionConfig::default().validate().is_ok());
    }
}
