mod link;
mod registry;
mod summary;

use std::collections::BTreeMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use codec::{ClientReceiver, CodecLimits, GhostId, HistoryConfig, SnapshotData};
use importance::{ConnectionId, DistanceImportance, GhostSender, GhostSource, SenderConfig};
use prediction::{PredictedWorld, PredictionConfig, PredictionController};
use schema::{GhostTypeDescriptor, GhostTypeId, Registry, RegistryFile};
use stats::{StatsAccumulator, StatsSocket, TickStats, TimingSample};
use tick::{ClientTimeSync, NetworkTick, PartialTick, TickRateConfig, TimeSyncConfig};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::link::{LossyLink, Rng};
use crate::registry::{
    demo_registry_file, distance, AvatarState, CrateState, AVATAR, CRATE, POS_LIMIT, SPEED_LIMIT, YAW_STEPS,
};
use crate::summary::Summary;

/// Render frames per simulation tick; every other frame lands on a partial tick.
const FRAMES_PER_TICK: u32 = 2;
/// Crates are swapped out this often to exercise despawns.
const CRATE_SWAP_EVERY: u32 = 60;
/// Predicted positions kept for error measurement.
const PREDICTION_WINDOW: u32 = 128;

#[derive(Parser)]
#[command(
    name = "demo-sim",
    version,
    about = "Deterministic server/client replication over a lossy link"
)]
struct Cli {
    /// Number of replicated ghosts; every fourth one is a static crate.
    #[arg(long, default_value_t = 24)]
    ghosts: u32,
    /// Number of client connections.
    #[arg(long, default_value_t = 2)]
    clients: u32,
    /// Number of ticks to simulate.
    #[arg(long, default_value_t = 300)]
    ticks: u32,
    /// RNG seed for deterministic results.
    #[arg(long, default_value_t = 1)]
    seed: u64,
    /// Percentage of datagrams lost in each direction.
    #[arg(long, default_value_t = 5)]
    loss_percent: u32,
    /// One-way delay in ticks.
    #[arg(long, default_value_t = 3)]
    latency_ticks: u32,
    /// Snapshots go to each connection every this many ticks.
    #[arg(long, default_value_t = 1)]
    send_divisor: u32,
    /// Snapshot packet budget in bytes.
    #[arg(long, default_value_t = 1200)]
    packet_bytes: usize,
    /// Output directory for the registry, packet captures and summary.
    #[arg(long, default_value = "captures")]
    out_dir: PathBuf,
    /// Send per-tick stats to a local UDP listener.
    #[arg(long)]
    stats_addr: Option<SocketAddr>,
    /// Fail if p95 snapshot packet size exceeds this value.
    #[arg(long)]
    max_p95_packet_bytes: Option<u64>,
    /// Fail if average snapshot packet size exceeds this value.
    #[arg(long)]
    max_avg_packet_bytes: Option<u64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    if cli.ghosts == 0 || cli.clients == 0 {
        anyhow::bail!("need at least one ghost and one client");
    }
    if cli.loss_percent > 100 {
        anyhow::bail!("loss percent {} is over 100", cli.loss_percent);
    }

    fs::create_dir_all(cli.out_dir.join("packets"))
        .with_context(|| format!("create output dir {}", cli.out_dir.display()))?;
    let file = demo_registry_file();
    write_registry_json(&cli.out_dir, &file)?;
    let registry = file.build().context("build demo registry")?;

    let summary = run(&cli, &registry)?;
    summary.assert_budgets(cli.max_p95_packet_bytes, cli.max_avg_packet_bytes)?;
    write_summary_json(&cli.out_dir, &summary)?;
    info!(
        packets = summary.packets_sent,
        avg_bytes = summary.avg_packet_bytes,
        rollbacks = summary.rollbacks,
        max_error = summary.prediction_error_max,
        "demo finished"
    );
    Ok(())
}

fn run(cli: &Cli, registry: &Registry) -> Result<Summary> {
    let avatar = registry.ghost_type_by_name(AVATAR).context("avatar type")?;
    let crate_type = registry.ghost_type_by_name(CRATE).context("crate type")?;
    let rate = TickRateConfig {
        network_send_divisor: cli.send_divisor,
        ..TickRateConfig::default()
    };
    let tick_duration = rate.tick_duration();
    let dt = tick_duration.as_secs_f32();
    let sender_config = SenderConfig {
        max_packet_bytes: cli.packet_bytes,
        rate,
        ..SenderConfig::default()
    };
    let wire_limits = sender_config.wire_limits.clone();
    let codec_limits = sender_config.codec_limits.clone();
    let mut sender = GhostSender::new(sender_config).context("create sender")?;

    let mut rng = Rng::new(cli.seed);
    let mut server = ServerWorld::new(cli.ghosts, avatar.id, crate_type.id, &mut rng);
    server.refresh(registry)?;
    for (ghost, type_id) in server.ghost_types() {
        sender.spawn(ghost, type_id);
    }

    let mut clients = Vec::with_capacity(cli.clients as usize);
    for index in 0..cli.clients {
        let id = ConnectionId::new(index);
        sender.add_connection(id).context("add connection")?;
        let link_seed = cli.seed ^ (u64::from(index) + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        clients.push(Client {
            id,
            receiver: ClientReceiver::new(HistoryConfig::default(), codec_limits.clone(), wire_limits.clone())
                .context("create receiver")?,
            controller: PredictionController::new(PredictionConfig::default()).context("create prediction")?,
            sync: ClientTimeSync::new(TimeSyncConfig::default(), tick_duration).context("create time sync")?,
            world: ClientWorld::new(avatar.clone(), dt),
            downlink: LossyLink::new(cli.loss_percent, cli.latency_ticks, link_seed),
            uplink: LossyLink::new(cli.loss_percent, cli.latency_ticks, !link_seed),
            predicted: None,
            stats: StatsAccumulator::new(),
        });
    }

    let mut stats_socket = match cli.stats_addr {
        Some(addr) => Some(StatsSocket::bind(addr).with_context(|| format!("bind stats socket for {addr}"))?),
        None => None,
    };
    let scaling = DistanceImportance {
        tile_size: 64.0,
        near_weight: 16,
    };

    let mut summary = Summary {
        ghosts: cli.ghosts,
        clients: cli.clients,
        ticks: cli.ticks,
        seed: cli.seed,
        loss_percent: cli.loss_percent,
        latency_ticks: cli.latency_ticks,
        send_divisor: cli.send_divisor,
        packet_bytes: cli.packet_bytes,
        registry_hash: format!("0x{:016x}", registry.hash()),
        ..Summary::default()
    };

    info!(
        ghosts = cli.ghosts,
        clients = cli.clients,
        ticks = cli.ticks,
        seed = cli.seed,
        "demo starting"
    );
    for now in 1..=cli.ticks {
        let tick = NetworkTick::new(now);

        let (spawned, despawned) = server.step(now, dt, &mut rng);
        server.refresh(registry)?;
        for ghost in despawned {
            sender.despawn(ghost);
        }
        for (ghost, type_id) in spawned {
            sender.spawn(ghost, type_id);
        }
        for client in &clients {
            sender
                .set_focus(client.id, server.focus_for(client.id))
                .context("set focus")?;
        }

        let packets = sender
            .send_tick(tick, registry, &server, &scaling)
            .context("send tick")?;
        let mut accumulators = Vec::with_capacity(packets.len() + clients.len() + 1);
        for packet in packets {
            validate_packet(registry, &wire_limits, &codec_limits, &packet.bytes, packet.report.records.len())?;
            let path = cli
                .out_dir
                .join("packets")
                .join(format!("c{:02}_t{now:06}.bin", packet.connection.raw()));
            fs::write(&path, &packet.bytes).with_context(|| format!("write {}", path.display()))?;

            summary.push_packet(packet.bytes.len());
            summary.records_written += packet.report.records.len() as u64;
            summary.records_deferred += packet.report.deferred.len() as u64;
            summary.records_unchanged += packet.report.unchanged as u64;
            summary.despawns_sent += packet.report.despawns as u64;

            let mut acc = StatsAccumulator::new();
            acc.record_report(&packet.report);
            accumulators.push(acc);
            if let Some(client) = clients.get_mut(packet.connection.raw() as usize) {
                client.downlink.send(now, packet.bytes);
            }
        }
        let mut chunk_stats = StatsAccumulator::new();
        chunk_stats.record_chunks(sender.chunks());
        accumulators.push(chunk_stats);

        for client in &mut clients {
            client.run_tick(now, registry, tick_duration, &mut summary)?;
            for ack in client.uplink.deliver(now) {
                if let Err(err) = sender.receive_ack(client.id, registry, &ack) {
                    warn!(connection = client.id.raw(), error = %err, "ack rejected");
                }
            }
            accumulators.push(std::mem::replace(&mut client.stats, StatsAccumulator::new()));
        }

        let tick_stats = TickStats::merge(tick, accumulators);
        summary.push_tick(registry, &tick_stats);
        if let Some(socket) = stats_socket.as_mut() {
            socket.send(&tick_stats);
        }
        debug!(
            tick = now,
            bits = tick_stats.total_bits(),
            entities = tick_stats.total_entities(),
            "tick done"
        );
    }

    for client in &clients {
        let counters = client.controller.counters();
        summary.rollbacks += counters.rollbacks;
        summary.replayed_ticks += counters.replayed_ticks;
        summary.backups_taken += counters.backups_taken;
        summary.clamped_replays += counters.clamped_replays;
        summary.time_sync_resets += client.sync.resets();
        summary.packets_lost += client.downlink.lost();
        summary.acks_sent += client.uplink.sent();
        summary.acks_lost += client.uplink.lost();
    }
    summary.finalize();
    Ok(summary)
}

/// Authoritative server state.
struct ServerWorld {
    avatar_type: GhostTypeId,
    crate_type: GhostTypeId,
    avatars: BTreeMap<GhostId, AvatarState>,
    crates: BTreeMap<GhostId, CrateState>,
    snapshots: BTreeMap<GhostId, SnapshotData>,
    next_id: u32,
}

impl ServerWorld {
    fn new(ghosts: u32, avatar_type: GhostTypeId, crate_type: GhostTypeId, rng: &mut Rng) -> Self {
        let mut world = Self {
            avatar_type,
            crate_type,
            avatars: BTreeMap::new(),
            crates: BTreeMap::new(),
            snapshots: BTreeMap::new(),
            next_id: ghosts + 1,
        };
        for id in 1..=ghosts {
            let ghost = GhostId::new(id);
            if id % 4 == 0 {
                world.crates.insert(ghost, random_crate(rng));
            } else {
                let half = POS_LIMIT / 2.0;
                let speed = SPEED_LIMIT / 2.0;
                world.avatars.insert(
                    ghost,
                    AvatarState {
                        position: [rng.range_f32(-half, half), rng.range_f32(-half, half), 0.0],
                        velocity: [rng.range_f32(-speed, speed), rng.range_f32(-speed, speed), 0.0],
                        yaw: rng.next_u32() % YAW_STEPS,
                    },
                );
            }
        }
        world
    }

    fn ghost_types(&self) -> Vec<(GhostId, GhostTypeId)> {
        let avatars = self.avatars.keys().map(|ghost| (*ghost, self.avatar_type));
        let crates = self.crates.keys().map(|ghost| (*ghost, self.crate_type));
        avatars.chain(crates).collect()
    }

    /// Advances one tick. Returns the ghosts spawned and despawned.
    fn step(
        &mut self,
        now: u32,
        dt: f32,
        rng: &mut Rng,
    ) -> (Vec<(GhostId, GhostTypeId)>, Vec<GhostId>) {
        for state in self.avatars.values_mut() {
            if rng.chance(10) {
                let axis = (rng.next_u32() % 2) as usize;
                state.velocity[axis] = (state.velocity[axis] + rng.range_f32(-2.0, 2.0)).clamp(-SPEED_LIMIT, SPEED_LIMIT);
            }
            state.integrate(dt, 1.0);
            state.yaw = (state.yaw + rng.next_u32() % 13) % YAW_STEPS;
        }
        for state in self.crates.values_mut() {
            if rng.chance(2) {
                state.hp = if state.hp <= 10 { 100 } else { state.hp - 10 };
            }
        }

        let mut spawned = Vec::new();
        let mut despawned = Vec::new();
        if now % CRATE_SWAP_EVERY == 0 {
            if let Some(oldest) = self.crates.keys().next().copied() {
                self.crates.remove(&oldest);
                self.snapshots.remove(&oldest);
                despawned.push(oldest);
                let ghost = GhostId::new(self.next_id);
                self.next_id += 1;
                self.crates.insert(ghost, random_crate(rng));
                spawned.push((ghost, self.crate_type));
            }
        }
        (spawned, despawned)
    }

    /// Rebuilds every ghost's snapshot from simulation state.
    fn refresh(&mut self, registry: &Registry) -> Result<()> {
        let avatar = registry.ghost_type(self.avatar_type)?;
        let crate_type = registry.ghost_type(self.crate_type)?;
        for (ghost, state) in &self.avatars {
            self.snapshots.insert(*ghost, state.to_snapshot(avatar)?);
        }
        for (ghost, state) in &self.crates {
            self.snapshots.insert(*ghost, state.to_snapshot(crate_type)?);
        }
        Ok(())
    }

    /// Each client follows one avatar.
    fn focus_for(&self, connection: ConnectionId) -> Option<[f32; 3]> {
        let count = self.avatars.len();
        if count == 0 {
            return None;
        }
        self.avatars
            .values()
            .nth(connection.raw() as usize % count)
            .map(|state| state.position)
    }
}

impl GhostSource for ServerWorld {
    fn snapshot(&self, ghost: GhostId) -> Option<&SnapshotData> {
        self.snapshots.get(&ghost)
    }

    fn position(&self, ghost: GhostId) -> Option<[f32; 3]> {
        self.avatars
            .get(&ghost)
            .map(|state| state.position)
            .or_else(|| self.crates.get(&ghost).map(|state| state.position))
    }
}

fn random_crate(rng: &mut Rng) -> CrateState {
    CrateState {
        position: [
            rng.range_f32(-POS_LIMIT, POS_LIMIT),
            rng.range_f32(-POS_LIMIT, POS_LIMIT),
            0.0,
        ],
        hp: 100,
    }
}

/// A client's predicted avatars.
struct ClientWorld {
    descriptor: GhostTypeDescriptor,
    dt: f32,
    avatars: BTreeMap<GhostId, AvatarState>,
    /// Position each avatar was predicted at after a full tick.
    predicted_at: BTreeMap<(u32, GhostId), [f32; 3]>,
}

impl ClientWorld {
    const fn new(descriptor: GhostTypeDescriptor, dt: f32) -> Self {
        Self {
            descriptor,
            dt,
            avatars: BTreeMap::new(),
            predicted_at: BTreeMap::new(),
        }
    }

    fn prune(&mut self, now: u32) {
        let keep_from = now.saturating_sub(PREDICTION_WINDOW);
        self.predicted_at = self.predicted_at.split_off(&(keep_from, GhostId::new(0)));
    }
}

impl PredictedWorld for ClientWorld {
    fn predicted_ghosts(&self) -> Vec<GhostId> {
        self.avatars.keys().copied().collect()
    }

    fn capture(&self, ghost: GhostId) -> Option<SnapshotData> {
        let state = self.avatars.get(&ghost)?;
        state.to_snapshot(&self.descriptor).ok()
    }

    fn restore(&mut self, ghost: GhostId, data: &SnapshotData) {
        match AvatarState::from_snapshot(data, &self.descriptor) {
            Ok(state) => {
                self.avatars.insert(ghost, state);
            }
            Err(err) => warn!(ghost = ghost.raw(), error = %err, "restore failed"),
        }
    }

    fn simulate_tick(&mut self, tick: NetworkTick, fraction: f32, ghosts: &[GhostId]) {
        for ghost in ghosts {
            if let Some(state) = self.avatars.get_mut(ghost) {
                state.integrate(self.dt, fraction);
                if fraction >= 1.0 {
                    self.predicted_at.insert((tick.index(), *ghost), state.position);
                }
            }
        }
    }
}

struct Client {
    id: ConnectionId,
    receiver: ClientReceiver,
    controller: PredictionController,
    sync: ClientTimeSync,
    world: ClientWorld,
    downlink: LossyLink,
    uplink: LossyLink,
    predicted: Option<PartialTick>,
    stats: StatsAccumulator,
}

impl Client {
    fn run_tick(&mut self, now: u32, registry: &Registry, tick_duration: Duration, summary: &mut Summary) -> Result<()> {
        let delivered = self.downlink.deliver(now);
        let mut newest = None;
        for bytes in &delivered {
            match self.receiver.receive(registry, bytes) {
                Ok(report) => {
                    for (ghost, err) in &report.dropped {
                        warn!(connection = self.id.raw(), ghost = ghost.raw(), error = %err, "record dropped");
                    }
                    summary.records_dropped += report.dropped.len() as u64;
                    self.sync.on_server_tick(report.tick);
                    self.sample_rtt(report.echo_tick, tick_duration);

                    for ghost in &report.spawned {
                        summary.spawns_seen += 1;
                        self.adopt_if_predicted(*ghost);
                    }
                    for ghost in &report.despawned {
                        self.world.avatars.remove(ghost);
                    }
                    for ghost in &report.applied {
                        self.measure_error(*ghost, report.tick);
                    }
                    newest = Some(report.tick);
                }
                Err(err) => {
                    warn!(connection = self.id.raw(), error = %err, "snapshot packet dropped");
                }
            }
        }

        for _ in 0..FRAMES_PER_TICK {
            let Some(output) = self.sync.update(tick_duration / FRAMES_PER_TICK) else {
                break;
            };
            self.controller
                .update(&mut self.world, &mut self.receiver, output.predicted)
                .context("prediction update")?;
            self.predicted = Some(output.predicted);
        }
        self.world.prune(now);

        if let Some(server_tick) = newest {
            let client_tick = self.predicted.map_or(server_tick, |predicted| predicted.tick);
            let ack = self
                .receiver
                .encode_ack(registry.hash(), client_tick)
                .context("encode ack")?;
            self.uplink.send(now, ack);
        }
        if let Some(predicted) = self.predicted {
            let latest = self.sync.latest_server_tick();
            let command_age = if latest.is_valid() {
                predicted.tick.ticks_since(latest) as f32 + predicted.fraction
            } else {
                0.0
            };
            self.stats.record_timing(TimingSample {
                command_age,
                rtt_ms: self.sync.rtt().map_or(0.0, |rtt| rtt.as_secs_f32() * 1000.0),
                jitter_ms: self.sync.jitter().as_secs_f32() * 1000.0,
            });
        }
        Ok(())
    }

    /// The echoed tick is the client tick of the newest ack the server had;
    /// the distance to the current prediction tick is one round trip.
    fn sample_rtt(&mut self, echo: NetworkTick, tick_duration: Duration) {
        let Some(predicted) = self.predicted else {
            return;
        };
        if !echo.is_valid() {
            return;
        }
        let ticks = predicted.tick.ticks_since(echo).max(0);
        self.sync
            .record_rtt_sample(tick_duration.mul_f64(f64::from(ticks)));
    }

    fn adopt_if_predicted(&mut self, ghost: GhostId) {
        let is_avatar = self
            .receiver
            .ghost(ghost)
            .is_some_and(|state| state.type_id() == self.world.descriptor.id);
        if !is_avatar {
            return;
        }
        if let Some((_, data)) = self.receiver.latest(ghost) {
            self.world.restore(ghost, data);
        }
    }

    fn measure_error(&mut self, ghost: GhostId, tick: NetworkTick) {
        let Some(predicted) = self.world.predicted_at.get(&(tick.index(), ghost)).copied() else {
            return;
        };
        let Some((latest_tick, data)) = self.receiver.latest(ghost) else {
            return;
        };
        if latest_tick != tick {
            return;
        }
        if let Ok(actual) = AvatarState::from_snapshot(data, &self.world.descriptor) {
            self.stats
                .record_prediction_error(distance(predicted, actual.position));
        }
    }
}

fn validate_packet(
    registry: &Registry,
    wire_limits: &wire::Limits,
    limits: &CodecLimits,
    bytes: &[u8],
    expected_records: usize,
) -> Result<()> {
    let report = tools::inspect_packet(bytes, Some(registry), wire_limits, limits).context("inspect packet")?;
    let records = report.snapshot.map_or(0, |summary| summary.records.len());
    if records != expected_records {
        anyhow::bail!("packet holds {records} records, sender reported {expected_records}");
    }
    Ok(())
}

fn write_registry_json(out_dir: &Path, file: &RegistryFile) -> Result<()> {
    let path = out_dir.join("registry.json");
    let contents = serde_json::to_string_pretty(file).context("serialize registry")?;
    fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn write_summary_json(out_dir: &Path, summary: &Summary) -> Result<()> {
    let path = out_dir.join("summary.json");
    let contents = serde_json::to_string_pretty(summary).context("serialize summary")?;
    fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
