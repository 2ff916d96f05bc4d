use std::collections::BTreeMap;
use std::net::UdpSocket;
use std::time::Duration;

use codec::{FieldValue, GhostId, SnapshotData};
use importance::{ConnectionId, GhostSender, GhostSource, NoScaling, SenderConfig};
use schema::{ComponentDef, FieldDef, FieldType, GhostTypeDef, GhostTypeId, Registry};
use stats::{decode_stats_packet, StatsAccumulator, StatsSocket, TickStats, TimingSample};
use tick::NetworkTick;

struct Crowd(BTreeMap<GhostId, SnapshotData>);

impl GhostSource for Crowd {
    fn snapshot(&self, ghost: GhostId) -> Option<&SnapshotData> {
        self.0.get(&ghost)
    }
}

#[test]
fn per_connection_accumulators_merge_once() {
    let registry = Registry::builder()
        .ghost_type(
            GhostTypeDef::new("walker")
                .component(ComponentDef::new("pos").field(FieldDef::new("x", FieldType::SInt { bits: 20 }))),
        )
        .build()
        .unwrap();
    let descriptor = registry.ghost_type(GhostTypeId::new(0)).unwrap();
    let mut sender = GhostSender::new(SenderConfig::default()).unwrap();
    for id in 0..2 {
        sender.add_connection(ConnectionId::new(id)).unwrap();
    }
    let mut crowd = BTreeMap::new();
    for id in 1..=5u32 {
        let mut data = SnapshotData::new(descriptor);
        data.set(descriptor, "pos", "x", &FieldValue::SInt(id as i32 * 100))
            .unwrap();
        crowd.insert(GhostId::new(id), data);
        sender.spawn(GhostId::new(id), GhostTypeId::new(0));
    }

    let tick = NetworkTick::new(1);
    let packets = sender
        .send_tick(tick, &registry, &Crowd(crowd), &NoScaling)
        .unwrap();
    let accumulators: Vec<StatsAccumulator> = packets
        .iter()
        .map(|packet| {
            let mut acc = StatsAccumulator::new();
            acc.record_report(&packet.report);
            acc
        })
        .collect();
    let mut chunks = StatsAccumulator::new();
    chunks.record_chunks(sender.chunks());

    let stats = TickStats::merge(tick, accumulators.into_iter().chain([chunks]));
    let walker = stats.types[&GhostTypeId::new(0)];
    assert_eq!(walker.entity_count, 10);
    assert_eq!(walker.uncompressed_count, 10);
    assert_eq!(walker.chunk_count, sender.chunks().len() as u32);
    let written_bits: usize = packets
        .iter()
        .flat_map(|packet| &packet.report.records)
        .map(|record| record.bits)
        .sum();
    assert_eq!(stats.total_bits(), written_bits as u64);
}

#[test]
fn socket_delivers_to_local_listener() {
    let listener = UdpSocket::bind("127.0.0.1:0").unwrap();
    listener
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    let mut socket = StatsSocket::bind(listener.local_addr().unwrap()).unwrap();

    let mut acc = StatsAccumulator::new();
    acc.record_ghost(GhostTypeId::new(2), 64, false);
    acc.record_timing(TimingSample {
        command_age: 1.0,
        rtt_ms: 33.0,
        jitter_ms: 1.5,
    });
    let stats = TickStats::merge(NetworkTick::new(44), [acc]);
    socket.send(&stats);
    assert_eq!(socket.sent(), 1);

    let mut buf = [0u8; 512];
    let len = listener.recv(&mut buf).unwrap();
    assert_eq!(decode_stats_packet(&buf[..len]).unwrap(), stats);
}
