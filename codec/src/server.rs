//! Server-side per-connection baseline tracking and ghost encoding.

use std::collections::{BTreeSet, HashMap};
use std::num::NonZeroUsize;

use schema::GhostTypeDescriptor;
use tick::NetworkTick;
use tracing::{debug, trace};

use crate::ack::{AckState, SnapshotAck, ACK_WINDOW};
use crate::baseline::BaselineStore;
use crate::error::CodecResult;
use crate::ghost::{encode_ghost_record, MAX_BASELINES};
use crate::limits::HistoryConfig;
use crate::packet::SnapshotPacketWriter;
use crate::scratch::CodecScratch;
use crate::snapshot::SnapshotData;
use crate::GhostId;

/// One ghost's sent and acknowledged history for one connection.
#[derive(Debug, Clone)]
pub struct GhostBaselines {
    sent: BaselineStore<SnapshotData>,
    acked: BaselineStore<SnapshotData>,
}

impl GhostBaselines {
    #[must_use]
    pub fn new(history: &HistoryConfig) -> Self {
        Self {
            sent: BaselineStore::new(non_zero(history.sent_history)),
            acked: BaselineStore::new(non_zero(history.acked_baselines.min(MAX_BASELINES))),
        }
    }

    /// Remembers what was sent at `tick`.
    pub fn record_sent(&mut self, tick: NetworkTick, data: SnapshotData) {
        if let Err(err) = self.sent.insert(tick, data) {
            debug!(?err, "ignoring out-of-order sent snapshot");
        }
    }

    /// Moves sent snapshots the client has acknowledged into the acked store.
    ///
    /// Returns how many were promoted.
    pub fn promote_acked(&mut self, acks: &AckState) -> usize {
        let newest_acked = self.acked.last_tick();
        let mut promoted = 0;
        for (tick, data) in self.sent.iter() {
            if newest_acked.is_some_and(|last| !tick.is_newer_than(last)) || !acks.contains(tick) {
                continue;
            }
            if self.acked.insert(tick, data.clone()).is_ok() {
                promoted += 1;
            }
        }
        promoted
    }

    /// Acknowledged baselines, newest first.
    pub fn acked(&self) -> impl Iterator<Item = (NetworkTick, &SnapshotData)> {
        self.acked.iter().rev()
    }

    #[must_use]
    pub fn newest_acked(&self) -> Option<(NetworkTick, &SnapshotData)> {
        self.acked.newest()
    }

    #[must_use]
    pub fn acked_len(&self) -> usize {
        self.acked.len()
    }

    #[must_use]
    pub fn sent_len(&self) -> usize {
        self.sent.len()
    }
}

fn non_zero(value: usize) -> NonZeroUsize {
    NonZeroUsize::new(value).unwrap_or(NonZeroUsize::MIN)
}

/// What [`ServerConnection::encode_ghost`] did with a ghost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GhostWrite {
    /// Record appended to the packet.
    Written { bits: usize, baselines: usize },
    /// Static ghost unchanged since the newest acked baseline; nothing sent.
    Unchanged,
    /// Record did not fit in the packet's remaining budget.
    Deferred { bits: usize },
}

/// Replication state the server keeps for one client.
#[derive(Debug)]
pub struct ServerConnection {
    history: HistoryConfig,
    ghosts: HashMap<GhostId, GhostBaselines>,
    acks: AckState,
    pending_despawns: BTreeSet<GhostId>,
    despawns_sent: BaselineStore<Vec<GhostId>>,
    sequence: u32,
    client_tick: NetworkTick,
    echo_tick: NetworkTick,
}

impl ServerConnection {
    pub fn new(history: HistoryConfig) -> CodecResult<Self> {
        history.validate()?;
        Ok(Self {
            history,
            ghosts: HashMap::new(),
            acks: AckState::new(),
            pending_despawns: BTreeSet::new(),
            despawns_sent: BaselineStore::new(non_zero(ACK_WINDOW as usize)),
            sequence: 0,
            client_tick: NetworkTick::INVALID,
            echo_tick: NetworkTick::INVALID,
        })
    }

    #[must_use]
    pub const fn acks(&self) -> &AckState {
        &self.acks
    }

    /// Newest client command tick seen, echoed in snapshot headers.
    #[must_use]
    pub const fn client_tick(&self) -> NetworkTick {
        self.client_tick
    }

    /// Server tick the client last echoed back.
    #[must_use]
    pub const fn echo_tick(&self) -> NetworkTick {
        self.echo_tick
    }

    #[must_use]
    pub fn ghost(&self, ghost: GhostId) -> Option<&GhostBaselines> {
        self.ghosts.get(&ghost)
    }

    #[must_use]
    pub fn ghost_count(&self) -> usize {
        self.ghosts.len()
    }

    pub fn pending_despawns(&self) -> impl Iterator<Item = GhostId> + '_ {
        self.pending_despawns.iter().copied()
    }

    /// Applies a client ack: promotes baselines and retires despawns.
    pub fn on_ack(&mut self, ack: &SnapshotAck) {
        let newer = !self.acks.last().is_valid()
            || (ack.received.last().is_valid() && !self.acks.last().is_newer_than(ack.received.last()));
        if newer {
            self.acks = ack.received;
        }
        if ack.client_tick.is_valid() && (!self.client_tick.is_valid() || ack.client_tick.is_newer_than(self.client_tick))
        {
            self.client_tick = ack.client_tick;
        }
        if ack.echo_tick.is_valid() {
            self.echo_tick = ack.echo_tick;
        }

        let acks = self.acks;
        for baselines in self.ghosts.values_mut() {
            baselines.promote_acked(&acks);
        }
        for (tick, ghosts) in self.despawns_sent.iter() {
            if acks.contains(tick) {
                for ghost in ghosts {
                    self.pending_despawns.remove(ghost);
                }
            }
        }
        trace!(last = acks.last().raw(), pending_despawns = self.pending_despawns.len(), "ack applied");
    }

    /// Forgets a ghost and queues its despawn until a packet carrying it is acked.
    pub fn despawn(&mut self, ghost: GhostId) {
        self.ghosts.remove(&ghost);
        self.pending_despawns.insert(ghost);
    }

    /// Writes as many pending despawns as fit; returns how many.
    pub fn write_despawns(&mut self, writer: &mut SnapshotPacketWriter) -> usize {
        let mut written = Vec::new();
        for ghost in &self.pending_despawns {
            if !writer.push_despawn(*ghost) {
                break;
            }
            written.push(*ghost);
        }
        let count = written.len();
        if count > 0 {
            if let Err(err) = self.despawns_sent.insert(writer.tick(), written) {
                debug!(?err, "despawns already recorded for this tick");
            }
        }
        count
    }

    /// Encodes `current` for `ghost` against its acked baselines and appends
    /// it to `writer` if it fits.
    pub fn encode_ghost(
        &mut self,
        scratch: &mut CodecScratch,
        descriptor: &GhostTypeDescriptor,
        ghost: GhostId,
        current: &SnapshotData,
        writer: &mut SnapshotPacketWriter,
    ) -> CodecResult<GhostWrite> {
        let tick = writer.tick();
        let history = &self.history;
        let baselines = self
            .ghosts
            .entry(ghost)
            .or_insert_with(|| GhostBaselines::new(history));

        if descriptor.static_optimization && baselines.newest_acked().is_some_and(|(_, data)| data == current) {
            return Ok(GhostWrite::Unchanged);
        }

        let mut refs = [(NetworkTick::INVALID, current); MAX_BASELINES];
        let mut count = 0;
        for (slot, baseline) in refs.iter_mut().zip(baselines.acked().filter(|(t, _)| tick.is_newer_than(*t))) {
            *slot = baseline;
            count += 1;
        }
        let encoded = encode_ghost_record(
            scratch,
            descriptor,
            ghost,
            tick,
            current,
            &refs[..count],
            writer.dynamic_bits(),
        )?;
        if !writer.push_record(scratch) {
            return Ok(GhostWrite::Deferred { bits: encoded.bits });
        }
        baselines.record_sent(tick, current.clone());
        self.pending_despawns.remove(&ghost);
        Ok(GhostWrite::Written {
            bits: encoded.bits,
            baselines: encoded.baselines,
        })
    }

    /// Sequence number for the next packet.
    pub fn next_sequence(&mut self) -> u32 {
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        sequence
    }

    /// Finishes a packet built for this connection.
    pub fn finish_packet(
        &mut self,
        writer: SnapshotPacketWriter,
        registry_hash: u64,
        wire_limits: &wire::Limits,
    ) -> CodecResult<Vec<u8>> {
        let sequence = self.next_sequence();
        writer.finish(registry_hash, sequence, self.client_tick, wire_limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::CodecLimits;
    use crate::value::FieldValue;
    use schema::{ComponentDef, FieldDef, FieldType, GhostTypeDef, Registry};

    fn t(index: u32) -> NetworkTick {
        NetworkTick::new(index)
    }

    fn registry() -> Registry {
        Registry::builder()
            .ghost_type(
                GhostTypeDef::new("door")
                    .static_optimization()
                    .component(ComponentDef::new("state").field(FieldDef::new("open", FieldType::Bool))),
            )
            .ghost_type(
                GhostTypeDef::new("bird")
                    .component(ComponentDef::new("pos").field(FieldDef::new("x", FieldType::SInt { bits: 24 }))),
            )
            .build()
            .unwrap()
    }

    fn data(descriptor: &GhostTypeDescriptor, component: &str, field: &str, value: FieldValue) -> SnapshotData {
        let mut data = SnapshotData::new(descriptor);
        data.set(descriptor, component, field, &value).unwrap();
        data
    }

    fn ack_through(acks: &mut AckState, tick: NetworkTick) -> SnapshotAck {
        acks.record(tick);
        SnapshotAck {
            received: *acks,
            client_tick: tick,
            echo_tick: tick,
        }
    }

    #[test]
    fn acked_store_keeps_three_newest() {
        let registry = registry();
        let bird = registry.ghost_type_by_name("bird").unwrap();
        let mut connection = ServerConnection::new(HistoryConfig::default()).unwrap();
        let mut scratch = CodecScratch::new();
        let mut client = AckState::new();
        let ghost = GhostId::new(1);

        for i in 1..=4 {
            let mut writer = SnapshotPacketWriter::new(t(i), 1400, &CodecLimits::default());
            let current = data(bird, "pos", "x", FieldValue::SInt(i as i32 * 10));
            connection
                .encode_ghost(&mut scratch, bird, ghost, &current, &mut writer)
                .unwrap();
            connection.on_ack(&ack_through(&mut client, t(i)));
        }
        let baselines = connection.ghost(ghost).unwrap();
        assert_eq!(baselines.acked_len(), 3);
        let ticks: Vec<NetworkTick> = baselines.acked().map(|(tick, _)| tick).collect();
        assert_eq!(ticks, vec![t(4), t(3), t(2)]);
    }

    #[test]
    fn uses_up_to_three_baselines() {
        let registry = registry();
        let bird = registry.ghost_type_by_name("bird").unwrap();
        let mut connection = ServerConnection::new(HistoryConfig::default()).unwrap();
        let mut scratch = CodecScratch::new();
        let mut client = AckState::new();
        let ghost = GhostId::new(1);

        let mut used = Vec::new();
        for i in 1..=5 {
            let mut writer = SnapshotPacketWriter::new(t(i), 1400, &CodecLimits::default());
            let current = data(bird, "pos", "x", FieldValue::SInt(i as i32));
            match connection
                .encode_ghost(&mut scratch, bird, ghost, &current, &mut writer)
                .unwrap()
            {
                GhostWrite::Written { baselines, .. } => used.push(baselines),
                other => panic!("unexpected {other:?}"),
            }
            connection.on_ack(&ack_through(&mut client, t(i)));
        }
        assert_eq!(used, vec![0, 1, 2, 3, 3]);
    }

    #[test]
    fn static_ghost_skipped_once_acked() {
        let registry = registry();
        let door = registry.ghost_type_by_name("door").unwrap();
        let mut connection = ServerConnection::new(HistoryConfig::default()).unwrap();
        let mut scratch = CodecScratch::new();
        let ghost = GhostId::new(2);
        let closed = data(door, "state", "open", FieldValue::Bool(false));

        let mut writer = SnapshotPacketWriter::new(t(1), 1400, &CodecLimits::default());
        let first = connection
            .encode_ghost(&mut scratch, door, ghost, &closed, &mut writer)
            .unwrap();
        assert!(matches!(first, GhostWrite::Written { .. }));

        // Not acked yet: still sent.
        let mut writer = SnapshotPacketWriter::new(t(2), 1400, &CodecLimits::default());
        let second = connection
            .encode_ghost(&mut scratch, door, ghost, &closed, &mut writer)
            .unwrap();
        assert!(matches!(second, GhostWrite::Written { .. }));

        let mut client = AckState::new();
        connection.on_ack(&ack_through(&mut client, t(1)));
        let mut writer = SnapshotPacketWriter::new(t(3), 1400, &CodecLimits::default());
        let third = connection
            .encode_ghost(&mut scratch, door, ghost, &closed, &mut writer)
            .unwrap();
        assert_eq!(third, GhostWrite::Unchanged);

        let open = data(door, "state", "open", FieldValue::Bool(true));
        let fourth = connection
            .encode_ghost(&mut scratch, door, ghost, &open, &mut writer)
            .unwrap();
        assert!(matches!(fourth, GhostWrite::Written { baselines: 1, .. }));
    }

    #[test]
    fn despawns_resent_until_acked() {
        let mut connection = ServerConnection::new(HistoryConfig::default()).unwrap();
        connection.despawn(GhostId::new(8));

        let mut writer = SnapshotPacketWriter::new(t(10), 1400, &CodecLimits::default());
        assert_eq!(connection.write_despawns(&mut writer), 1);
        // Packet 10 lost; 11 carries it again.
        let mut writer = SnapshotPacketWriter::new(t(11), 1400, &CodecLimits::default());
        assert_eq!(connection.write_despawns(&mut writer), 1);

        let mut client = AckState::new();
        connection.on_ack(&ack_through(&mut client, t(11)));
        assert_eq!(connection.pending_despawns().count(), 0);
    }

    #[test]
    fn deferred_record_not_remembered() {
        let registry = registry();
        let bird = registry.ghost_type_by_name("bird").unwrap();
        let mut connection = ServerConnection::new(HistoryConfig::default()).unwrap();
        let mut scratch = CodecScratch::new();
        let mut writer = SnapshotPacketWriter::new(t(1), wire::HEADER_SIZE + 1, &CodecLimits::default());
        let current = data(bird, "pos", "x", FieldValue::SInt(-77));
        let outcome = connection
            .encode_ghost(&mut scratch, bird, GhostId::new(1), &current, &mut writer)
            .unwrap();
        assert!(matches!(outcome, GhostWrite::Deferred { .. }));
        assert_eq!(connection.ghost(GhostId::new(1)).unwrap().sent_len(), 0);
    }

    #[test]
    fn sequence_and_echo() {
        let mut connection = ServerConnection::new(HistoryConfig::default()).unwrap();
        assert_eq!(connection.next_sequence(), 0);
        assert_eq!(connection.next_sequence(), 1);
        let mut client = AckState::new();
        connection.on_ack(&ack_through(&mut client, t(30)));
        assert_eq!(connection.client_tick(), t(30));
        assert!(ServerConnection::new(HistoryConfig {
            acked_baselines: 0,
            ..HistoryConfig::default()
        })
        .is_err());
    }
}
