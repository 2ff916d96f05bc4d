//! Client-side snapshot reception and per-ghost history.

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;

use schema::{GhostTypeDescriptor, GhostTypeId, Registry};
use tick::{NetworkTick, PartialTick};
use tracing::{debug, trace, warn};

use crate::ack::{encode_ack_packet, AckState, SnapshotAck, ACK_WINDOW};
use crate::baseline::BaselineStore;
use crate::error::{CodecError, CodecResult};
use crate::ghost::{read_record_body, read_record_header, RecordHeader};
use crate::interpolate::blend;
use crate::limits::{CodecLimits, HistoryConfig};
use crate::packet::decode_snapshot_packet;
use crate::scratch::CodecScratch;
use crate::snapshot::SnapshotData;
use crate::value::FieldValue;
use crate::GhostId;

/// Received snapshots of one ghost, keyed by server tick.
pub type SnapshotHistory = BaselineStore<SnapshotData>;

/// A ghost as known to the client.
#[derive(Debug, Clone)]
pub struct ClientGhost {
    type_id: GhostTypeId,
    spawn_tick: NetworkTick,
    history: SnapshotHistory,
}

impl ClientGhost {
    #[must_use]
    pub const fn type_id(&self) -> GhostTypeId {
        self.type_id
    }

    /// Server tick of the first snapshot received for this ghost.
    #[must_use]
    pub const fn spawn_tick(&self) -> NetworkTick {
        self.spawn_tick
    }

    #[must_use]
    pub const fn history(&self) -> &SnapshotHistory {
        &self.history
    }

    #[must_use]
    pub fn latest(&self) -> Option<(NetworkTick, &SnapshotData)> {
        self.history.newest()
    }
}

/// Kind of change reported in a [`GhostUpdate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Spawned,
    Updated,
    Despawned,
}

/// Authoritative change to one ghost, consumed by prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GhostUpdate {
    pub ghost: GhostId,
    pub tick: NetworkTick,
    pub kind: UpdateKind,
}

/// Outcome of [`ClientReceiver::receive`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReceiveReport {
    pub tick: NetworkTick,
    /// Newest client tick the server had seen when it built the packet.
    pub echo_tick: NetworkTick,
    pub applied: Vec<GhostId>,
    pub spawned: Vec<GhostId>,
    pub despawned: Vec<GhostId>,
    /// Records that could not be applied; the rest of the packet was.
    pub dropped: Vec<(GhostId, CodecError)>,
}

impl ReceiveReport {
    /// Whether every record applied.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.dropped.is_empty()
    }
}

/// Client half of a connection: decodes snapshot packets into per-ghost
/// histories and produces acks.
#[derive(Debug)]
pub struct ClientReceiver {
    history: HistoryConfig,
    limits: CodecLimits,
    wire_limits: wire::Limits,
    ghosts: BTreeMap<GhostId, ClientGhost>,
    tombstones: BTreeMap<GhostId, NetworkTick>,
    acks: AckState,
    server_tick: NetworkTick,
    updates: Vec<GhostUpdate>,
    scratch: CodecScratch,
    sequence: u32,
}

impl ClientReceiver {
    pub fn new(history: HistoryConfig, limits: CodecLimits, wire_limits: wire::Limits) -> CodecResult<Self> {
        history.validate()?;
        Ok(Self {
            history,
            limits,
            wire_limits,
            ghosts: BTreeMap::new(),
            tombstones: BTreeMap::new(),
            acks: AckState::new(),
            server_tick: NetworkTick::INVALID,
            updates: Vec::new(),
            scratch: CodecScratch::new(),
            sequence: 0,
        })
    }

    #[must_use]
    pub const fn acks(&self) -> &AckState {
        &self.acks
    }

    /// Newest server tick received.
    #[must_use]
    pub const fn server_tick(&self) -> NetworkTick {
        self.server_tick
    }

    #[must_use]
    pub fn ghost(&self, ghost: GhostId) -> Option<&ClientGhost> {
        self.ghosts.get(&ghost)
    }

    pub fn ghosts(&self) -> impl Iterator<Item = (GhostId, &ClientGhost)> {
        self.ghosts.iter().map(|(id, ghost)| (*id, ghost))
    }

    #[must_use]
    pub fn latest(&self, ghost: GhostId) -> Option<(NetworkTick, &SnapshotData)> {
        self.ghosts.get(&ghost)?.latest()
    }

    #[must_use]
    pub fn snapshot_at(&self, ghost: GhostId, tick: NetworkTick) -> Option<&SnapshotData> {
        self.ghosts.get(&ghost)?.history.get(tick)
    }

    /// Drains changes since the last call.
    pub fn take_updates(&mut self) -> Vec<GhostUpdate> {
        std::mem::take(&mut self.updates)
    }

    /// Decodes one snapshot packet.
    ///
    /// Framing, registry and header errors reject the packet and leave the
    /// receiver as it was. A record that cannot be applied (missing baseline,
    /// unknown ghost, bad dynamic range, too old for the history) is dropped
    /// and reported; the packet's tick is then left unacked so the server
    /// keeps those baselines alive. Late and repeated packets are accepted.
    pub fn receive(&mut self, registry: &Registry, bytes: &[u8]) -> CodecResult<ReceiveReport> {
        let packet = decode_snapshot_packet(bytes, registry.hash(), &self.wire_limits, &self.limits)?;
        let tick = packet.tick;
        let mut report = ReceiveReport {
            tick,
            echo_tick: NetworkTick::from_raw(packet.header.echo_tick),
            ..ReceiveReport::default()
        };

        // Despawns older than the ghost's newest snapshot are stale repeats.
        let despawns: BTreeSet<GhostId> = packet
            .despawns
            .iter()
            .copied()
            .filter(|ghost| {
                let stale = self
                    .ghosts
                    .get(ghost)
                    .and_then(ClientGhost::latest)
                    .is_some_and(|(latest, _)| latest.is_newer_than(tick));
                if stale {
                    trace!(ghost = %ghost, tick = tick.raw(), "stale despawn ignored");
                }
                !stale
            })
            .collect();

        // Everything is decoded before any state changes, so a packet that
        // fails part way leaves the receiver untouched.
        let mut staged = Vec::new();
        let mut reader = packet.records();
        for _ in 0..packet.record_count {
            let header = read_record_header(&mut reader, tick)?;
            let descriptor = registry.ghost_type(header.type_id)?;

            // A record in the same packet as its despawn is a respawn.
            let despawned_later = self
                .tombstones
                .get(&header.ghost)
                .is_some_and(|despawn| despawn.is_newer_than(tick));
            let known = self.ghosts.get(&header.ghost).filter(|_| !despawns.contains(&header.ghost));
            let baselines = if despawned_later {
                Ok(Vec::new())
            } else {
                baselines_for(known, &header)
            };
            let decoded = match baselines {
                Ok(baselines) => read_record_body(
                    &mut reader,
                    packet.dynamic,
                    descriptor,
                    &header,
                    tick,
                    (!despawned_later).then_some(baselines.as_slice()),
                    &mut self.scratch,
                    &self.limits,
                ),
                Err(err) => read_record_body(
                    &mut reader,
                    packet.dynamic,
                    descriptor,
                    &header,
                    tick,
                    None,
                    &mut self.scratch,
                    &self.limits,
                )
                .and(Err(err)),
            };
            if despawned_later {
                decoded?;
                trace!(ghost = %header.ghost, "record for despawned ghost ignored");
                continue;
            }
            match decoded {
                Ok(body) => {
                    if let Some(data) = body.data {
                        staged.push((descriptor, header, data));
                    }
                }
                Err(err) if err.is_per_ghost() => {
                    warn!(ghost = %header.ghost, tick = tick.raw(), %err, "dropping ghost update");
                    report.dropped.push((header.ghost, err));
                }
                Err(err) => return Err(err),
            }
        }

        for ghost in despawns {
            if self.ghosts.remove(&ghost).is_some() {
                report.despawned.push(ghost);
                self.updates.push(GhostUpdate {
                    ghost,
                    tick,
                    kind: UpdateKind::Despawned,
                });
            }
            let newest = self.tombstones.get(&ghost).map_or(tick, |t| t.newest(tick));
            self.tombstones.insert(ghost, newest);
        }
        for (descriptor, header, data) in staged {
            self.apply(descriptor, &header, tick, data, &mut report);
        }

        if report.dropped.is_empty() {
            self.acks.record(tick);
        }
        if !self.server_tick.is_valid() || tick.is_newer_than(self.server_tick) {
            self.server_tick = tick;
        }
        let server_tick = self.server_tick;
        self.tombstones
            .retain(|_, despawn| server_tick.ticks_since(*despawn) < 2 * ACK_WINDOW as i32);
        debug!(
            tick = tick.raw(),
            applied = report.applied.len(),
            spawned = report.spawned.len(),
            despawned = report.despawned.len(),
            dropped = report.dropped.len(),
            "snapshot received"
        );
        Ok(report)
    }

    fn apply(
        &mut self,
        descriptor: &GhostTypeDescriptor,
        header: &RecordHeader,
        tick: NetworkTick,
        data: SnapshotData,
        report: &mut ReceiveReport,
    ) {
        self.tombstones.remove(&header.ghost);
        let capacity = NonZeroUsize::new(self.history.client_history).unwrap_or(NonZeroUsize::MIN);
        let kind = match self.ghosts.get_mut(&header.ghost) {
            Some(ghost) if ghost.type_id != descriptor.id => {
                let newer = ghost.latest().map_or(true, |(latest, _)| tick.is_newer_than(latest));
                if !newer {
                    let err = CodecError::GhostTypeMismatch {
                        ghost: header.ghost.raw(),
                        expected: ghost.type_id.get(),
                        found: descriptor.id.get(),
                    };
                    warn!(ghost = %header.ghost, tick = tick.raw(), %err, "dropping ghost update");
                    report.dropped.push((header.ghost, err));
                    return;
                }
                // The server replaced the ghost with one of another type.
                debug!(ghost = %header.ghost, tick = tick.raw(), "ghost respawned with a new type");
                let mut history = SnapshotHistory::new(capacity);
                if history.insert(tick, data).is_err() {
                    return;
                }
                *ghost = ClientGhost {
                    type_id: descriptor.id,
                    spawn_tick: tick,
                    history,
                };
                report.spawned.push(header.ghost);
                report.applied.push(header.ghost);
                UpdateKind::Spawned
            }
            Some(ghost) => match ghost.history.insert_in_order(tick, data) {
                Ok(true) => {
                    report.applied.push(header.ghost);
                    UpdateKind::Updated
                }
                Ok(false) => {
                    trace!(ghost = %header.ghost, tick = tick.raw(), "duplicate record ignored");
                    return;
                }
                Err(err) => {
                    // Left unacked so the server never deltas against it.
                    let err = CodecError::from(err);
                    warn!(ghost = %header.ghost, tick = tick.raw(), %err, "dropping ghost update");
                    report.dropped.push((header.ghost, err));
                    return;
                }
            },
            None => {
                let mut history = SnapshotHistory::new(capacity);
                if history.insert(tick, data).is_err() {
                    return;
                }
                self.ghosts.insert(
                    header.ghost,
                    ClientGhost {
                        type_id: descriptor.id,
                        spawn_tick: tick,
                        history,
                    },
                );
                report.spawned.push(header.ghost);
                report.applied.push(header.ghost);
                UpdateKind::Spawned
            }
        };
        self.updates.push(GhostUpdate {
            ghost: header.ghost,
            tick,
            kind,
        });
    }

    /// Builds the ack for everything received so far.
    #[must_use]
    pub fn build_ack(&self, client_tick: NetworkTick) -> SnapshotAck {
        SnapshotAck {
            received: self.acks,
            client_tick,
            echo_tick: self.server_tick,
        }
    }

    /// Encodes an ack packet for the server.
    pub fn encode_ack(&mut self, registry_hash: u64, client_tick: NetworkTick) -> CodecResult<Vec<u8>> {
        let ack = self.build_ack(client_tick);
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        encode_ack_packet(registry_hash, sequence, &ack, &self.wire_limits)
    }

    /// Samples a field of `ghost` at render time `at`, smoothing between
    /// received snapshots according to the field's spec.
    pub fn sample(
        &self,
        registry: &Registry,
        ghost: GhostId,
        component: &str,
        field: &str,
        at: PartialTick,
    ) -> CodecResult<Option<FieldValue>> {
        let Some(state) = self.ghosts.get(&ghost) else {
            return Ok(None);
        };
        let descriptor = registry.ghost_type(state.type_id)?;
        let smoothing = descriptor
            .component(component)
            .and_then(|c| c.field(field))
            .map(|f| f.spec.smoothing)
            .ok_or_else(|| CodecError::UnknownField {
                component: component.to_owned(),
                field: field.to_owned(),
            })?;

        let base = at.last_full_tick();
        let extra = if at.is_full() { 0.0 } else { at.fraction };
        let history = &state.history;
        let Some((from_tick, from)) = history.latest_at_or_before(base).or_else(|| history.iter().next()) else {
            return Ok(None);
        };
        let position = base.ticks_since(from_tick) as f32 + extra;
        let from_value = from.get(descriptor, component, field)?;

        if let Some((to_tick, to)) = history.earliest_after(from_tick) {
            let span = to_tick.ticks_since(from_tick) as f32;
            let to_value = to.get(descriptor, component, field)?;
            return Ok(Some(blend(smoothing, &from_value, &to_value, position / span)));
        }
        // Past the newest snapshot: extrapolate from the one before it.
        let before = history.iter().rev().nth(1);
        match before {
            Some((prev_tick, prev)) if position > 0.0 => {
                let span = from_tick.ticks_since(prev_tick) as f32;
                let prev_value = prev.get(descriptor, component, field)?;
                Ok(Some(blend(smoothing, &prev_value, &from_value, 1.0 + position / span)))
            }
            _ => Ok(Some(from_value)),
        }
    }
}

/// Resolves the baselines a record references, newest first.
fn baselines_for<'g>(ghost: Option<&'g ClientGhost>, header: &RecordHeader) -> CodecResult<Vec<&'g SnapshotData>> {
    let Some(ghost) = ghost else {
        return match header.baseline_ticks.first() {
            Some(_) => Err(CodecError::GhostNotFound {
                ghost: header.ghost.raw(),
            }),
            None => Ok(Vec::new()),
        };
    };
    if ghost.type_id != header.type_id {
        // A full record of another type replaces the ghost.
        if header.baseline_ticks.is_empty() {
            return Ok(Vec::new());
        }
        return Err(CodecError::GhostTypeMismatch {
            ghost: header.ghost.raw(),
            expected: ghost.type_id.get(),
            found: header.type_id.get(),
        });
    }
    header
        .baseline_ticks
        .iter()
        .map(|tick| {
            ghost.history.get(*tick).ok_or(CodecError::BaselineNotFound {
                ghost: header.ghost.raw(),
                tick: tick.raw(),
            })
        })
        .collect()
}
