//! Rollback and replay of predicted ghosts.

use std::collections::{BTreeMap, BTreeSet};

use codec::{ClientReceiver, GhostId, SnapshotData, UpdateKind};
use tick::{ClientTickClock, NetworkTick, PartialTick};
use tracing::{debug, trace, warn};

use crate::config::{PredictedSpawnPolicy, PredictionConfig};
use crate::error::{PredictionError, PredictionResult};
use crate::world::PredictedWorld;

/// Running totals, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PredictionCounters {
    pub updates: u64,
    pub rollbacks: u64,
    /// Ticks simulated while replaying after a rollback.
    pub replayed_ticks: u64,
    /// All full and partial ticks simulated.
    pub simulated_ticks: u64,
    pub backups_taken: u64,
    pub backups_restored: u64,
    pub clamped_replays: u64,
}

/// What one [`PredictionController::update`] did.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionOutcome {
    /// Oldest tick ghosts were rolled back to, if a rollback happened.
    pub rollback_tick: Option<NetworkTick>,
    /// Ghosts restored from authoritative or spawn state.
    pub restored: Vec<GhostId>,
    /// Full ticks simulated.
    pub simulated_ticks: u32,
    /// A partial tick was simulated on top.
    pub partial: bool,
    /// The replay was cut to `max_prediction_ticks`.
    pub clamped: bool,
}

/// Keeps predicted ghosts ahead of the server and reconciles them with
/// authoritative snapshots.
///
/// Each update either simulates only the new ticks, or, when the receiver
/// delivered new data for a predicted ghost, restores the affected ghosts to
/// their latest authoritative state and replays every tick from the oldest
/// restored tick up to the target, exactly once.
#[derive(Debug)]
pub struct PredictionController {
    config: PredictionConfig,
    clock: ClientTickClock,
    last_full_tick: NetworkTick,
    partial_pending: bool,
    backup: BTreeMap<GhostId, SnapshotData>,
    backup_tick: NetworkTick,
    spawns: BTreeMap<GhostId, (NetworkTick, SnapshotData)>,
    counters: PredictionCounters,
}

impl PredictionController {
    pub fn new(config: PredictionConfig) -> PredictionResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            clock: ClientTickClock::new(NetworkTick::INVALID),
            last_full_tick: NetworkTick::INVALID,
            partial_pending: false,
            backup: BTreeMap::new(),
            backup_tick: NetworkTick::INVALID,
            spawns: BTreeMap::new(),
            counters: PredictionCounters::default(),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &PredictionConfig {
        &self.config
    }

    /// The prediction clock. During replay it reads the tick being replayed.
    #[must_use]
    pub const fn clock(&self) -> &ClientTickClock {
        &self.clock
    }

    #[must_use]
    pub const fn counters(&self) -> PredictionCounters {
        self.counters
    }

    /// Newest tick every predicted ghost has fully simulated.
    #[must_use]
    pub const fn last_full_tick(&self) -> NetworkTick {
        self.last_full_tick
    }

    /// Tick of the current partial-tick backup, if one is held.
    #[must_use]
    pub fn backup_tick(&self) -> Option<NetworkTick> {
        (!self.backup.is_empty()).then_some(self.backup_tick)
    }

    /// Forgets all prediction state, e.g. after a disconnect.
    pub fn reset(&mut self) {
        self.clock = ClientTickClock::new(NetworkTick::INVALID);
        self.last_full_tick = NetworkTick::INVALID;
        self.partial_pending = false;
        self.backup.clear();
        self.backup_tick = NetworkTick::INVALID;
        self.spawns.clear();
        self.counters = PredictionCounters::default();
    }

    /// Brings predicted ghosts to `target`.
    pub fn update<W: PredictedWorld + ?Sized>(
        &mut self,
        world: &mut W,
        receiver: &mut ClientReceiver,
        target: PartialTick,
    ) -> PredictionResult<PredictionOutcome> {
        if !target.tick.is_valid() {
            return Err(PredictionError::InvalidTarget { raw: target.tick.raw() });
        }
        self.counters.updates += 1;
        let full_target = target.last_full_tick();
        let base = if self.last_full_tick.is_valid() {
            self.last_full_tick
        } else {
            full_target
        };

        let mut predicted = world.predicted_ghosts();
        predicted.sort_unstable();
        predicted.dedup();
        let predicted_set: BTreeSet<GhostId> = predicted.iter().copied().collect();

        let mut affected = BTreeSet::new();
        for update in receiver.take_updates() {
            if update.kind == UpdateKind::Despawned {
                self.backup.remove(&update.ghost);
                self.spawns.remove(&update.ghost);
                affected.remove(&update.ghost);
            } else if predicted_set.contains(&update.ghost) {
                affected.insert(update.ghost);
            }
        }
        for ghost in world.take_structural_changes() {
            if predicted_set.contains(&ghost) {
                affected.insert(ghost);
            }
        }

        if std::mem::take(&mut self.partial_pending) {
            for (ghost, data) in &self.backup {
                if predicted_set.contains(ghost) {
                    world.restore(*ghost, data);
                }
            }
            if self.config.backup_optimization {
                self.counters.backups_restored += 1;
            } else {
                // Ghosts without a backup are rebuilt from authoritative state.
                let backup = &self.backup;
                affected.extend(predicted.iter().copied().filter(|ghost| !backup.contains_key(ghost)));
            }
            self.backup.clear();
        }

        self.track_spawns(world, &predicted_set);
        let forced = self.config.spawn_policy == PredictedSpawnPolicy::RollbackToSpawnTick && !self.spawns.is_empty();

        let mut start: BTreeMap<GhostId, NetworkTick> = predicted.iter().map(|ghost| (*ghost, base)).collect();
        let mut restored = Vec::new();
        for ghost in &affected {
            match receiver.latest(*ghost) {
                Some((tick, data)) => {
                    world.restore(*ghost, data);
                    start.insert(*ghost, tick);
                    restored.push(*ghost);
                }
                None => trace!(ghost = ghost.raw(), "no authoritative state to restore"),
            }
        }
        if forced {
            for (ghost, (tick, data)) in &self.spawns {
                if predicted_set.contains(ghost) && !restored.contains(ghost) {
                    world.restore(*ghost, data);
                    start.insert(*ghost, *tick);
                    restored.push(*ghost);
                }
            }
        }

        let rollback = !restored.is_empty();
        let mut from = if rollback {
            start.values().copied().fold(base, |oldest, tick| {
                if oldest.is_newer_than(tick) {
                    tick
                } else {
                    oldest
                }
            })
        } else {
            base
        };

        let mut clamped = false;
        let max = self.config.max_prediction_ticks;
        if full_target.ticks_since(from) > max as i32 {
            let clamped_from = full_target.subtract(max);
            debug!(
                from = from.index(),
                to = clamped_from.index(),
                target = full_target.index(),
                "prediction window clamped"
            );
            from = clamped_from;
            clamped = true;
            self.counters.clamped_replays += 1;
        }

        let simulated = if rollback {
            self.counters.rollbacks += 1;
            debug!(
                from = from.index(),
                target = full_target.index(),
                ghosts = restored.len(),
                "prediction rollback"
            );
            let simulated = self.replay(world, &start, from, full_target)?;
            self.counters.replayed_ticks += u64::from(simulated);
            self.last_full_tick = full_target;
            simulated
        } else {
            let simulated = self.advance(world, &start, from, full_target);
            self.last_full_tick = base.newest(full_target);
            simulated
        };
        self.counters.simulated_ticks += u64::from(simulated);

        let partial = !target.is_full() && target.tick.ticks_since(self.last_full_tick) == 1;
        if partial {
            // Without the optimization only ghosts that have no authoritative
            // state to roll back to are backed up.
            let backup_all = self.config.backup_optimization;
            self.backup = predicted
                .iter()
                .filter(|ghost| backup_all || receiver.latest(**ghost).is_none())
                .filter_map(|ghost| world.capture(*ghost).map(|data| (*ghost, data)))
                .collect();
            self.backup_tick = self.last_full_tick;
            if backup_all {
                self.counters.backups_taken += 1;
            }
            world.simulate_tick(target.tick, target.fraction, &predicted);
            self.counters.simulated_ticks += 1;
            self.partial_pending = true;
        }
        self.clock.set(if partial { target } else { PartialTick::full(self.last_full_tick) });

        Ok(PredictionOutcome {
            rollback_tick: rollback.then_some(from),
            restored,
            simulated_ticks: simulated,
            partial,
            clamped,
        })
    }

    fn track_spawns<W: PredictedWorld + ?Sized>(&mut self, world: &W, predicted: &BTreeSet<GhostId>) {
        let pending = world.predicted_spawns();
        self.spawns
            .retain(|ghost, _| pending.iter().any(|(spawned, _)| spawned == ghost));
        for (ghost, tick) in pending {
            if self.spawns.contains_key(&ghost) || !predicted.contains(&ghost) {
                continue;
            }
            match world.capture(ghost) {
                Some(data) => {
                    self.spawns.insert(ghost, (tick, data));
                }
                None => warn!(ghost = ghost.raw(), "predicted spawn has no state to capture"),
            }
        }
    }

    /// Simulates `from + 1 ..= to` without touching history.
    fn advance<W: PredictedWorld + ?Sized>(
        &mut self,
        world: &mut W,
        start: &BTreeMap<GhostId, NetworkTick>,
        from: NetworkTick,
        to: NetworkTick,
    ) -> u32 {
        let mut tick = from;
        let mut simulated = 0;
        while to.is_newer_than(tick) {
            tick = tick.add(1);
            self.clock.set(PartialTick::full(tick));
            world.simulate_tick(tick, 1.0, &due(start, tick));
            simulated += 1;
        }
        simulated
    }

    /// Rewinds the clock to `from` and replays up to `to`.
    fn replay<W: PredictedWorld + ?Sized>(
        &mut self,
        world: &mut W,
        start: &BTreeMap<GhostId, NetworkTick>,
        from: NetworkTick,
        to: NetworkTick,
    ) -> PredictionResult<u32> {
        self.clock.rewind_for_prediction(PartialTick::full(from))?;
        let mut simulated = 0;
        while to.is_newer_than(self.clock.current().tick) {
            let tick = self.clock.step_replay();
            world.simulate_tick(tick, 1.0, &due(start, tick));
            simulated += 1;
        }
        self.clock.restore_after_prediction()?;
        Ok(simulated)
    }
}

/// Ghosts whose state is older than `tick`.
fn due(start: &BTreeMap<GhostId, NetworkTick>, tick: NetworkTick) -> Vec<GhostId> {
    start
        .iter()
        .filter(|(_, since)| tick.is_newer_than(**since))
        .map(|(ghost, _)| *ghost)
        .collect()
}
