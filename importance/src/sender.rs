//! Server-side snapshot sending across many connections.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::num::NonZeroUsize;

use codec::{
    decode_ack_packet, CodecError, CodecLimits, CodecScratch, GhostId, GhostWrite, HistoryConfig, ServerConnection,
    SnapshotData, SnapshotPacketWriter,
};
use rayon::prelude::*;
use schema::{GhostTypeId, Registry, SchemaError};
use thiserror::Error;
use tick::{NetworkTick, TickError, TickRateConfig};
use tracing::{debug, trace, warn};

use crate::chunk::GhostChunk;
use crate::scaling::ImportanceScaling;
use crate::scheduler::{ImportanceScheduler, SendAges};

/// Read access to the server's authoritative ghost state.
pub trait GhostSource: Sync {
    /// Current state of `ghost`, or `None` if it has no state this tick.
    fn snapshot(&self, ghost: GhostId) -> Option<&SnapshotData>;

    /// World position used for distance scaling.
    fn position(&self, _ghost: GhostId) -> Option<[f32; 3]> {
        None
    }

    /// Whether `ghost` should be replicated to `connection`.
    fn relevant(&self, _connection: ConnectionId, _ghost: GhostId) -> bool {
        true
    }
}

/// Identifies one client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u32);

impl ConnectionId {
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Result type for sender operations.
pub type SendResult<T> = Result<T, SendError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SendError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Tick(#[from] TickError),

    #[error("invalid sender config `{field}`: {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: &'static str,
    },

    #[error("unknown connection {0:?}")]
    UnknownConnection(ConnectionId),

    #[error("connection {0:?} already exists")]
    DuplicateConnection(ConnectionId),
}

/// Sender configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderConfig {
    /// Byte budget of one snapshot packet, header included.
    pub max_packet_bytes: usize,
    /// Maximum ghosts per chunk.
    pub chunk_capacity: NonZeroUsize,
    /// Consecutive deferrals of one ghost before a warning is logged.
    pub persistent_defer_warn: u32,
    pub codec_limits: CodecLimits,
    pub wire_limits: wire::Limits,
    pub history: HistoryConfig,
    pub rate: TickRateConfig,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            max_packet_bytes: 1200,
            chunk_capacity: NonZeroUsize::new(16).unwrap_or(NonZeroUsize::MIN),
            persistent_defer_warn: 30,
            codec_limits: CodecLimits::default(),
            wire_limits: wire::Limits::default(),
            history: HistoryConfig::default(),
            rate: TickRateConfig::default(),
        }
    }
}

impl SenderConfig {
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            max_packet_bytes: 512,
            chunk_capacity: NonZeroUsize::new(4).unwrap_or(NonZeroUsize::MIN),
            persistent_defer_warn: 8,
            codec_limits: CodecLimits::for_testing(),
            wire_limits: wire::Limits::for_testing(),
            history: HistoryConfig::for_testing(),
            rate: TickRateConfig::for_testing(),
        }
    }

    pub fn validate(&self) -> SendResult<()> {
        if self.max_packet_bytes <= wire::HEADER_SIZE {
            return Err(SendError::InvalidConfig {
                field: "max_packet_bytes",
                reason: "must exceed the packet header",
            });
        }
        if self.max_packet_bytes > self.wire_limits.max_packet_bytes {
            return Err(SendError::InvalidConfig {
                field: "max_packet_bytes",
                reason: "exceeds wire limit",
            });
        }
        if self.persistent_defer_warn == 0 {
            return Err(SendError::InvalidConfig {
                field: "persistent_defer_warn",
                reason: "must be positive",
            });
        }
        self.history.validate()?;
        self.rate.validate()?;
        Ok(())
    }
}

/// A record written into a snapshot packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentRecord {
    pub ghost: GhostId,
    pub type_id: GhostTypeId,
    pub bits: usize,
    /// Baselines the record was delta-encoded against; 0 means uncompressed.
    pub baselines: usize,
}

/// What one connection's packet contained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub connection: ConnectionId,
    pub tick: NetworkTick,
    pub records: Vec<SentRecord>,
    /// Static ghosts skipped because the client already holds their state.
    pub unchanged: usize,
    /// Ghosts that did not fit, in scheduling order.
    pub deferred: Vec<GhostId>,
    /// Ghosts whose state could not be encoded; the rest of the packet was
    /// still built.
    pub failed: Vec<(GhostId, CodecError)>,
    /// Chunks scheduled this tick.
    pub chunks_scheduled: usize,
    /// Chunks whose every relevant ghost was written or unchanged.
    pub chunks_completed: usize,
    pub despawns: usize,
    pub bytes: usize,
}

/// An encoded snapshot ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingPacket {
    pub connection: ConnectionId,
    pub bytes: Vec<u8>,
    pub report: SendReport,
}

#[derive(Debug)]
struct ConnectionState {
    id: ConnectionId,
    slot: u32,
    server: ServerConnection,
    ages: SendAges,
    scratch: CodecScratch,
    focus: Option<[f32; 3]>,
    known: BTreeSet<GhostId>,
    defer_counts: HashMap<GhostId, u32>,
}

/// Shared, read-only inputs of one send pass.
struct SendPass<'a, S: ?Sized> {
    tick: NetworkTick,
    registry: &'a Registry,
    source: &'a S,
    scaling: &'a dyn ImportanceScaling,
    scheduler: &'a ImportanceScheduler,
    ghosts: &'a BTreeMap<GhostId, GhostTypeId>,
    config: &'a SenderConfig,
}

impl ConnectionState {
    fn update_relevance<S: GhostSource + ?Sized>(&mut self, pass: &SendPass<'_, S>) {
        for ghost in pass.ghosts.keys() {
            if pass.source.relevant(self.id, *ghost) {
                self.ages.observe(*ghost, pass.tick);
            } else if self.ages.is_tracked(*ghost) {
                self.ages.forget(*ghost);
                self.defer_counts.remove(ghost);
                if self.known.remove(ghost) {
                    self.server.despawn(*ghost);
                }
            }
        }
    }

    fn despawn(&mut self, ghost: GhostId) {
        self.ages.forget(ghost);
        self.defer_counts.remove(&ghost);
        if self.known.remove(&ghost) {
            self.server.despawn(ghost);
        }
    }

    fn chunk_scale<S: GhostSource + ?Sized>(&self, pass: &SendPass<'_, S>, chunk: &GhostChunk) -> u32 {
        let position = chunk.ghosts.iter().find_map(|ghost| pass.source.position(*ghost));
        pass.scaling.scale(self.focus, position)
    }

    fn send<S: GhostSource + ?Sized>(&mut self, pass: &SendPass<'_, S>) -> SendResult<OutgoingPacket> {
        self.update_relevance(pass);

        let scored = pass
            .scheduler
            .prioritize(pass.tick, &self.ages, |chunk| self.chunk_scale(pass, chunk));
        let mut writer = SnapshotPacketWriter::new(pass.tick, pass.config.max_packet_bytes, &pass.config.codec_limits);
        let despawns = self.server.write_despawns(&mut writer);

        let mut report = SendReport {
            connection: self.id,
            tick: pass.tick,
            records: Vec::new(),
            unchanged: 0,
            deferred: Vec::new(),
            failed: Vec::new(),
            chunks_scheduled: scored.len(),
            chunks_completed: 0,
            despawns,
            bytes: 0,
        };
        let mut delivered = Vec::new();
        for entry in &scored {
            let Some(chunk) = pass.scheduler.chunks().get(entry.index) else {
                continue;
            };
            let descriptor = pass.registry.ghost_type(chunk.type_id)?;
            let mut complete = true;
            for ghost in &chunk.ghosts {
                if !self.ages.is_tracked(*ghost) {
                    continue;
                }
                let Some(current) = pass.source.snapshot(*ghost) else {
                    continue;
                };
                let written = match self
                    .server
                    .encode_ghost(&mut self.scratch, descriptor, *ghost, current, &mut writer)
                {
                    Ok(written) => written,
                    Err(err) => {
                        warn!(connection = self.id.raw(), ghost = ghost.raw(), %err, "ghost not encoded");
                        complete = false;
                        report.failed.push((*ghost, err));
                        continue;
                    }
                };
                match written {
                    GhostWrite::Written { bits, baselines } => {
                        report.records.push(SentRecord {
                            ghost: *ghost,
                            type_id: chunk.type_id,
                            bits,
                            baselines,
                        });
                        self.known.insert(*ghost);
                        self.defer_counts.remove(ghost);
                        delivered.push(*ghost);
                    }
                    GhostWrite::Unchanged => {
                        report.unchanged += 1;
                        self.defer_counts.remove(ghost);
                        delivered.push(*ghost);
                    }
                    GhostWrite::Deferred { bits } => {
                        complete = false;
                        report.deferred.push(*ghost);
                        self.note_deferral(*ghost, bits, writer.is_empty(), pass);
                    }
                }
            }
            if complete {
                report.chunks_completed += 1;
            }
        }
        self.ages.mark_sent(&delivered, pass.tick);

        let bytes = self
            .server
            .finish_packet(writer, pass.registry.hash(), &pass.config.wire_limits)?;
        report.bytes = bytes.len();
        trace!(
            connection = self.id.raw(),
            tick = pass.tick.index(),
            records = report.records.len(),
            deferred = report.deferred.len(),
            failed = report.failed.len(),
            bytes = report.bytes,
            "snapshot packet built"
        );
        Ok(OutgoingPacket {
            connection: self.id,
            bytes,
            report,
        })
    }

    fn note_deferral<S: GhostSource + ?Sized>(
        &mut self,
        ghost: GhostId,
        bits: usize,
        packet_empty: bool,
        pass: &SendPass<'_, S>,
    ) {
        let count = self.defer_counts.entry(ghost).or_insert(0);
        *count += 1;
        if packet_empty {
            if *count == 1 || *count % pass.config.persistent_defer_warn == 0 {
                warn!(
                    connection = self.id.raw(),
                    ghost = ghost.raw(),
                    bits,
                    max_packet_bytes = pass.config.max_packet_bytes,
                    "ghost does not fit in an empty packet"
                );
            }
        } else if *count == pass.config.persistent_defer_warn {
            warn!(
                connection = self.id.raw(),
                ghost = ghost.raw(),
                deferrals = *count,
                "ghost persistently deferred by packet budget"
            );
        }
    }
}

/// Builds per-connection snapshot packets each tick.
///
/// Spawns and despawns are queued and take effect at the start of the next
/// [`send_tick`](Self::send_tick), so chunk membership never changes while a
/// pass is running. Connections are served in parallel; each owns its
/// baselines, ages and scratch buffers.
#[derive(Debug)]
pub struct GhostSender {
    config: SenderConfig,
    scheduler: ImportanceScheduler,
    ghosts: BTreeMap<GhostId, GhostTypeId>,
    pending_spawns: BTreeMap<GhostId, GhostTypeId>,
    pending_despawns: BTreeSet<GhostId>,
    connections: Vec<ConnectionState>,
    next_slot: u32,
}

impl GhostSender {
    pub fn new(config: SenderConfig) -> SendResult<Self> {
        config.validate()?;
        Ok(Self {
            scheduler: ImportanceScheduler::new(config.chunk_capacity),
            config,
            ghosts: BTreeMap::new(),
            pending_spawns: BTreeMap::new(),
            pending_despawns: BTreeSet::new(),
            connections: Vec::new(),
            next_slot: 0,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &SenderConfig {
        &self.config
    }

    /// Ghosts currently replicated, excluding queued spawns.
    #[must_use]
    pub fn ghost_count(&self) -> usize {
        self.ghosts.len()
    }

    #[must_use]
    pub fn chunks(&self) -> &[GhostChunk] {
        self.scheduler.chunks()
    }

    pub fn connection_ids(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.connections.iter().map(|state| state.id)
    }

    /// Replication state of one connection.
    #[must_use]
    pub fn connection(&self, id: ConnectionId) -> Option<&ServerConnection> {
        self.connections
            .iter()
            .find(|state| state.id == id)
            .map(|state| &state.server)
    }

    /// Adds a connection and assigns it the next round-robin send slot.
    pub fn add_connection(&mut self, id: ConnectionId) -> SendResult<()> {
        if self.connections.iter().any(|state| state.id == id) {
            return Err(SendError::DuplicateConnection(id));
        }
        let slot = self.next_slot;
        self.next_slot = self.next_slot.wrapping_add(1);
        self.connections.push(ConnectionState {
            id,
            slot,
            server: ServerConnection::new(self.config.history.clone())?,
            ages: SendAges::new(),
            scratch: CodecScratch::new(),
            focus: None,
            known: BTreeSet::new(),
            defer_counts: HashMap::new(),
        });
        debug!(connection = id.raw(), slot, "connection added");
        Ok(())
    }

    /// Drops a connection and every baseline kept for it.
    pub fn remove_connection(&mut self, id: ConnectionId) -> SendResult<()> {
        let index = self.index_of(id)?;
        self.connections.remove(index);
        debug!(connection = id.raw(), "connection removed");
        Ok(())
    }

    /// Sets the point distance scaling is measured from.
    pub fn set_focus(&mut self, id: ConnectionId, focus: Option<[f32; 3]>) -> SendResult<()> {
        let index = self.index_of(id)?;
        self.connections[index].focus = focus;
        Ok(())
    }

    /// Applies an ack packet received from `id`.
    pub fn receive_ack(&mut self, id: ConnectionId, registry: &Registry, bytes: &[u8]) -> SendResult<()> {
        let index = self.index_of(id)?;
        let (_, ack) = decode_ack_packet(bytes, registry.hash(), &self.config.wire_limits)?;
        self.connections[index].server.on_ack(&ack);
        Ok(())
    }

    /// Queues `ghost` for replication from the next tick.
    pub fn spawn(&mut self, ghost: GhostId, type_id: GhostTypeId) {
        self.pending_despawns.remove(&ghost);
        self.pending_spawns.insert(ghost, type_id);
    }

    /// Queues `ghost` for removal at the next tick.
    pub fn despawn(&mut self, ghost: GhostId) {
        if self.pending_spawns.remove(&ghost).is_none() || self.ghosts.contains_key(&ghost) {
            self.pending_despawns.insert(ghost);
        }
    }

    fn index_of(&self, id: ConnectionId) -> SendResult<usize> {
        self.connections
            .iter()
            .position(|state| state.id == id)
            .ok_or(SendError::UnknownConnection(id))
    }

    fn apply_structural_changes(&mut self, registry: &Registry) -> SendResult<()> {
        if self.pending_spawns.is_empty() && self.pending_despawns.is_empty() {
            return Ok(());
        }
        for (ghost, type_id) in &self.pending_spawns {
            registry.ghost_type(*type_id)?;
            let retyped = self.ghosts.insert(*ghost, *type_id).is_some_and(|old| old != *type_id);
            if retyped {
                // Clients must drop the old instance before the new layout arrives.
                debug!(ghost = ghost.raw(), type_id = type_id.get(), "ghost changed type");
                for state in &mut self.connections {
                    state.despawn(*ghost);
                }
            }
        }
        for ghost in &self.pending_despawns {
            self.ghosts.remove(ghost);
            for state in &mut self.connections {
                state.despawn(*ghost);
            }
        }
        debug!(
            spawned = self.pending_spawns.len(),
            despawned = self.pending_despawns.len(),
            ghosts = self.ghosts.len(),
            "rebuilding chunks"
        );
        self.pending_spawns.clear();
        self.pending_despawns.clear();
        self.scheduler
            .rebuild_chunks(registry, self.ghosts.iter().map(|(ghost, type_id)| (*ghost, *type_id)))?;
        Ok(())
    }

    /// Builds this tick's packets for every connection whose send slot is due.
    ///
    /// Packets come back in connection insertion order regardless of how the
    /// work was spread across threads. A connection whose packet cannot be
    /// finished is logged and skipped; the others are still sent.
    pub fn send_tick<S: GhostSource + ?Sized>(
        &mut self,
        tick: NetworkTick,
        registry: &Registry,
        source: &S,
        scaling: &dyn ImportanceScaling,
    ) -> SendResult<Vec<OutgoingPacket>> {
        self.apply_structural_changes(registry)?;

        let pass = SendPass {
            tick,
            registry,
            source,
            scaling,
            scheduler: &self.scheduler,
            ghosts: &self.ghosts,
            config: &self.config,
        };
        let rate = &self.config.rate;
        let packets: Vec<Option<OutgoingPacket>> = self
            .connections
            .par_iter_mut()
            .map(|state| {
                if !rate.sends_on(tick, state.slot) {
                    return None;
                }
                match state.send(&pass) {
                    Ok(packet) => Some(packet),
                    Err(err) => {
                        warn!(connection = state.id.raw(), tick = tick.index(), %err, "snapshot packet not built");
                        None
                    }
                }
            })
            .collect();
        Ok(packets.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::{ClientReceiver, FieldValue};
    use schema::{ComponentDef, FieldDef, FieldType, GhostTypeDef};

    struct World {
        registry: Registry,
        states: BTreeMap<GhostId, SnapshotData>,
        hidden: BTreeSet<(ConnectionId, GhostId)>,
    }

    impl GhostSource for World {
        fn snapshot(&self, ghost: GhostId) -> Option<&SnapshotData> {
            self.states.get(&ghost)
        }

        fn relevant(&self, connection: ConnectionId, ghost: GhostId) -> bool {
            !self.hidden.contains(&(connection, ghost))
        }
    }

    impl World {
        fn new() -> Self {
            let registry = Registry::builder()
                .ghost_type(
                    GhostTypeDef::new("crate")
                        .component(ComponentDef::new("body").field(FieldDef::new("x", FieldType::SInt { bits: 16 }))),
                )
                .ghost_type(
                    GhostTypeDef::new("barrel").component(
                        ComponentDef::new("body")
                            .field(FieldDef::new("x", FieldType::SInt { bits: 16 }))
                            .field(FieldDef::new("fill", FieldType::UInt { bits: 8 })),
                    ),
                )
                .build()
                .unwrap();
            Self {
                registry,
                states: BTreeMap::new(),
                hidden: BTreeSet::new(),
            }
        }

        fn set(&mut self, ghost: u32, x: i32) {
            let descriptor = self.registry.ghost_type(GhostTypeId::new(0)).unwrap();
            let mut data = SnapshotData::new(descriptor);
            data.set(descriptor, "body", "x", &FieldValue::SInt(x)).unwrap();
            self.states.insert(GhostId::new(ghost), data);
        }

        fn set_barrel(&mut self, ghost: u32, fill: u32) {
            let descriptor = self.registry.ghost_type_by_name("barrel").unwrap();
            let mut data = SnapshotData::new(descriptor);
            data.set(descriptor, "body", "fill", &FieldValue::UInt(fill)).unwrap();
            self.states.insert(GhostId::new(ghost), data);
        }
    }

    fn t(index: u32) -> NetworkTick {
        NetworkTick::new(index)
    }

    #[test]
    fn config_validation() {
        assert!(SenderConfig::default().validate().is_ok());
        let config = SenderConfig {
            max_packet_bytes: 8,
            ..SenderConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SendError::InvalidConfig {
                field: "max_packet_bytes",
                ..
            })
        ));
    }

    #[test]
    fn spawns_apply_at_next_tick() {
        let mut world = World::new();
        world.set(1, 5);
        let mut sender = GhostSender::new(SenderConfig::for_testing()).unwrap();
        sender.add_connection(ConnectionId::new(1)).unwrap();
        assert_eq!(
            sender.add_connection(ConnectionId::new(1)),
            Err(SendError::DuplicateConnection(ConnectionId::new(1)))
        );

        sender.spawn(GhostId::new(1), GhostTypeId::new(0));
        assert_eq!(sender.ghost_count(), 0);
        let packets = sender
            .send_tick(t(1), &world.registry, &world, &crate::NoScaling)
            .unwrap();
        assert_eq!(sender.ghost_count(), 1);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].report.records.len(), 1);
        assert_eq!(packets[0].report.records[0].baselines, 0);
    }

    #[test]
    fn despawn_and_relevance_reach_the_client() {
        let mut world = World::new();
        world.set(1, 5);
        world.set(2, 6);
        let connection = ConnectionId::new(9);
        let mut sender = GhostSender::new(SenderConfig::for_testing()).unwrap();
        sender.add_connection(connection).unwrap();
        sender.spawn(GhostId::new(1), GhostTypeId::new(0));
        sender.spawn(GhostId::new(2), GhostTypeId::new(0));

        let config = SenderConfig::for_testing();
        let mut receiver = ClientReceiver::new(config.history, config.codec_limits, config.wire_limits).unwrap();
        let mut tick = t(1);
        let mut step = |sender: &mut GhostSender, world: &World, receiver: &mut ClientReceiver| {
            let packets = sender
                .send_tick(tick, &world.registry, world, &crate::NoScaling)
                .unwrap();
            let report = receiver.receive(&world.registry, &packets[0].bytes).unwrap();
            let ack = receiver.encode_ack(world.registry.hash(), tick).unwrap();
            sender.receive_ack(connection, &world.registry, &ack).unwrap();
            tick.increment();
            report
        };

        let first = step(&mut sender, &world, &mut receiver);
        assert_eq!(first.spawned, vec![GhostId::new(1), GhostId::new(2)]);

        sender.despawn(GhostId::new(1));
        world.hidden.insert((connection, GhostId::new(2)));
        let second = step(&mut sender, &world, &mut receiver);
        assert_eq!(second.despawned, vec![GhostId::new(1), GhostId::new(2)]);
        assert_eq!(sender.ghost_count(), 1);
    }

    #[test]
    fn bad_ghost_is_skipped_on_every_connection() {
        let mut world = World::new();
        world.set(1, 5);
        // Registered as a crate but holding barrel state.
        world.set_barrel(2, 7);
        let mut sender = GhostSender::new(SenderConfig::for_testing()).unwrap();
        for id in 1..=2 {
            sender.add_connection(ConnectionId::new(id)).unwrap();
        }
        sender.spawn(GhostId::new(1), GhostTypeId::new(0));
        sender.spawn(GhostId::new(2), GhostTypeId::new(0));

        let packets = sender
            .send_tick(t(1), &world.registry, &world, &crate::NoScaling)
            .unwrap();
        assert_eq!(packets.len(), 2);
        for packet in &packets {
            let report = &packet.report;
            assert_eq!(report.records.len(), 1);
            assert_eq!(report.records[0].ghost, GhostId::new(1));
            assert_eq!(report.failed.len(), 1);
            assert!(matches!(
                report.failed[0],
                (ghost, CodecError::LayoutMismatch { .. }) if ghost == GhostId::new(2)
            ));
        }
    }

    #[test]
    fn retyped_ghost_is_respawned() {
        let mut world = World::new();
        world.set(1, 5);
        world.set(2, 6);
        let config = SenderConfig::for_testing();
        let mut sender = GhostSender::new(config.clone()).unwrap();
        let mut receivers = Vec::new();
        for id in 1..=2 {
            sender.add_connection(ConnectionId::new(id)).unwrap();
            receivers.push(
                ClientReceiver::new(config.history.clone(), config.codec_limits.clone(), config.wire_limits.clone())
                    .unwrap(),
            );
        }
        sender.spawn(GhostId::new(1), GhostTypeId::new(0));
        sender.spawn(GhostId::new(2), GhostTypeId::new(0));

        for index in 1..=6 {
            if index == 4 {
                world.set_barrel(1, 3);
                sender.despawn(GhostId::new(1));
                sender.spawn(GhostId::new(1), GhostTypeId::new(1));
            }
            let packets = sender
                .send_tick(t(index), &world.registry, &world, &crate::NoScaling)
                .unwrap();
            assert_eq!(packets.len(), 2);
            for (packet, receiver) in packets.iter().zip(receivers.iter_mut()) {
                assert!(packet.report.failed.is_empty(), "tick {index}: {:?}", packet.report.failed);
                assert_eq!(packet.report.records.len(), 2);
                let report = receiver.receive(&world.registry, &packet.bytes).unwrap();
                assert!(report.is_complete(), "tick {index}: {:?}", report.dropped);
                let ack = receiver.encode_ack(world.registry.hash(), t(index)).unwrap();
                sender
                    .receive_ack(packet.connection, &world.registry, &ack)
                    .unwrap();
            }
        }
        for receiver in &receivers {
            assert_eq!(receiver.ghost(GhostId::new(1)).unwrap().type_id(), GhostTypeId::new(1));
            assert_eq!(receiver.latest(GhostId::new(1)).unwrap().0, t(6));
            assert_eq!(receiver.latest(GhostId::new(2)).unwrap().0, t(6));
        }
    }

    #[test]
    fn unknown_connection_rejected() {
        let world = World::new();
        let mut sender = GhostSender::new(SenderConfig::for_testing()).unwrap();
        assert_eq!(
            sender.receive_ack(ConnectionId::new(3), &world.registry, &[]),
            Err(SendError::UnknownConnection(ConnectionId::new(3)))
        );
        assert!(sender.remove_connection(ConnectionId::new(3)).is_err());
    }
}
