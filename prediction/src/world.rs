//! The client's predicted ghost storage, as seen by the controller.

use codec::{GhostId, SnapshotData};
use tick::NetworkTick;

/// Client-side storage and simulation of predicted ghosts.
///
/// The controller never looks inside component data; it only moves
/// [`SnapshotData`] in and out and asks the world to step.
pub trait PredictedWorld {
    /// Ghosts currently predicted on this client.
    fn predicted_ghosts(&self) -> Vec<GhostId>;

    /// Copies a predicted ghost's current state.
    fn capture(&self, ghost: GhostId) -> Option<SnapshotData>;

    /// Overwrites a ghost's state.
    ///
    /// Only components present in `data` are written. A component the ghost
    /// gained after `data` was captured keeps whatever value it had.
    fn restore(&mut self, ghost: GhostId, data: &SnapshotData);

    /// Advances `ghosts` through `tick`. `fraction` is `1.0` for a full tick.
    fn simulate_tick(&mut self, tick: NetworkTick, fraction: f32, ghosts: &[GhostId]);

    /// Ghosts whose component set changed since the last call.
    fn take_structural_changes(&mut self) -> Vec<GhostId> {
        Vec::new()
    }

    /// Locally spawned ghosts the server has not confirmed yet, with their
    /// spawn tick.
    fn predicted_spawns(&self) -> Vec<(GhostId, NetworkTick)> {
        Vec::new()
    }
}
