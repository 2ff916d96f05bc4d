use codec::{
    ClientReceiver, CodecError, CodecLimits, CodecScratch, FieldValue, GhostId, GhostWrite, HistoryConfig,
    ServerConnection, SnapshotData, SnapshotPacketWriter,
};
use proptest::prelude::*;
use schema::{ComponentDef, FieldDef, FieldSpecOverride, FieldType, GhostTypeDef, Registry};
use tick::NetworkTick;

fn registry() -> Registry {
    Registry::builder()
        .ghost_type(
            GhostTypeDef::new("ship")
                .component(
                    ComponentDef::new("transform")
                        .field(FieldDef::new("position", FieldType::Float3).with(FieldSpecOverride::quantized(100))),
                )
                .component(
                    ComponentDef::new("hull")
                        .field(FieldDef::new("health", FieldType::UInt { bits: 10 }))
                        .field(FieldDef::new("callsign", FieldType::FixedString { max_len: 12 })),
                )
                .component(
                    ComponentDef::buffer("cannons", 8).field(FieldDef::new("heat", FieldType::SInt { bits: 12 })),
                ),
        )
        .build()
        .unwrap()
}

fn ship(registry: &Registry, position: [f32; 3], health: u32, cannons: &[i32]) -> SnapshotData {
    let descriptor = registry.ghost_type_by_name("ship").unwrap();
    let mut data = SnapshotData::new(descriptor);
    data.set(descriptor, "transform", "position", &FieldValue::Float3(position))
        .unwrap();
    data.set(descriptor, "hull", "health", &FieldValue::UInt(health)).unwrap();
    data.set(descriptor, "hull", "callsign", &FieldValue::String("kestrel".into()))
        .unwrap();
    for heat in cannons {
        let at = data.push_element(descriptor, "cannons").unwrap();
        data.set_element(descriptor, "cannons", at, "heat", &FieldValue::SInt(*heat))
            .unwrap();
    }
    data
}

fn send(server: &mut ServerConnection, registry: &Registry, tick: NetworkTick, ghosts: &[(GhostId, &SnapshotData)]) -> Vec<u8> {
    let descriptor = registry.ghost_type_by_name("ship").unwrap();
    let mut scratch = CodecScratch::new();
    let mut writer = SnapshotPacketWriter::new(tick, 1400, &CodecLimits::default());
    server.write_despawns(&mut writer);
    for (ghost, data) in ghosts {
        let outcome = server
            .encode_ghost(&mut scratch, descriptor, *ghost, data, &mut writer)
            .unwrap();
        assert!(matches!(outcome, GhostWrite::Written { .. }), "{outcome:?}");
    }
    server
        .finish_packet(writer, registry.hash(), &wire::Limits::default())
        .unwrap()
}

fn client(history: HistoryConfig) -> ClientReceiver {
    ClientReceiver::new(history, CodecLimits::default(), wire::Limits::default()).unwrap()
}

#[test]
fn position_survives_full_round_trip() {
    let registry = registry();
    let descriptor = registry.ghost_type_by_name("ship").unwrap();
    let mut server = ServerConnection::new(HistoryConfig::default()).unwrap();
    let mut receiver = client(HistoryConfig::default());
    let ghost = GhostId::new(1);
    let tick = NetworkTick::new(100);

    let bytes = send(&mut server, &registry, tick, &[(ghost, &ship(&registry, [1.0, 2.0, 3.0], 100, &[]))]);
    let report = receiver.receive(&registry, &bytes).unwrap();
    assert_eq!(report.tick, tick);
    assert_eq!(report.spawned, vec![ghost]);

    let (received_at, data) = receiver.latest(ghost).unwrap();
    assert_eq!(received_at, tick);
    let FieldValue::Float3(position) = data.get(descriptor, "transform", "position").unwrap() else {
        panic!("position is not a float3");
    };
    for (got, want) in position.iter().zip([1.0f32, 2.0, 3.0]) {
        assert!((got - want).abs() <= 0.005, "{got} vs {want}");
    }
}

#[test]
fn evicted_baseline_drops_only_that_ghost() {
    let registry = registry();
    let mut server = ServerConnection::new(HistoryConfig::default()).unwrap();
    let mut receiver = client(HistoryConfig {
        client_history: 3,
        ..HistoryConfig::default()
    });
    let ghost = GhostId::new(7);

    for i in 1..=4u32 {
        let data = ship(&registry, [i as f32, 0.0, 0.0], 50, &[1]);
        let bytes = send(&mut server, &registry, NetworkTick::new(i), &[(ghost, &data)]);
        assert!(receiver.receive(&registry, &bytes).unwrap().is_complete());
        server.on_ack(&receiver.build_ack(NetworkTick::new(i)));
    }
    assert_eq!(server.ghost(ghost).unwrap().acked_len(), 3);
    assert_eq!(receiver.ghost(ghost).unwrap().history().len(), 3);

    // Tick 5 arrives but its ack is lost: the client evicts tick 2 while the
    // server still deltas against 4, 3 and 2.
    let data = ship(&registry, [5.0, 0.0, 0.0], 50, &[1]);
    let bytes = send(&mut server, &registry, NetworkTick::new(5), &[(ghost, &data)]);
    receiver.receive(&registry, &bytes).unwrap();

    let data = ship(&registry, [6.0, 0.0, 0.0], 49, &[1, 2]);
    let fresh = ship(&registry, [0.0, 0.0, 0.0], 10, &[]);
    let bytes = send(
        &mut server,
        &registry,
        NetworkTick::new(6),
        &[(ghost, &data), (GhostId::new(8), &fresh)],
    );
    let report = receiver.receive(&registry, &bytes).unwrap();
    assert_eq!(report.dropped.len(), 1);
    assert_eq!(report.dropped[0].0, ghost);
    assert_eq!(
        report.dropped[0].1,
        CodecError::BaselineNotFound {
            ghost: ghost.raw(),
            tick: NetworkTick::new(2).raw(),
        }
    );
    assert_eq!(report.spawned, vec![GhostId::new(8)]);
    assert!(!receiver.acks().contains(NetworkTick::new(6)));
    assert_eq!(receiver.latest(ghost).unwrap().0, NetworkTick::new(5));
}

#[test]
fn late_packet_becomes_a_usable_baseline() {
    let registry = registry();
    let mut server = ServerConnection::new(HistoryConfig::default()).unwrap();
    let mut receiver = client(HistoryConfig::default());
    let ghost = GhostId::new(1);

    let first = ship(&registry, [1.0, 0.0, 0.0], 90, &[3]);
    let bytes = send(&mut server, &registry, NetworkTick::new(1), &[(ghost, &first)]);
    receiver.receive(&registry, &bytes).unwrap();
    server.on_ack(&receiver.build_ack(NetworkTick::new(1)));

    let second = ship(&registry, [2.0, 0.0, 0.0], 80, &[3]);
    let third = ship(&registry, [3.0, 0.0, 0.0], 70, &[3, 4]);
    let p2 = send(&mut server, &registry, NetworkTick::new(2), &[(ghost, &second)]);
    let p3 = send(&mut server, &registry, NetworkTick::new(3), &[(ghost, &third)]);

    assert!(receiver.receive(&registry, &p3).unwrap().is_complete());
    let late = receiver.receive(&registry, &p2).unwrap();
    assert!(late.is_complete());
    assert_eq!(late.applied, vec![ghost]);
    assert_eq!(receiver.snapshot_at(ghost, NetworkTick::new(2)), Some(&second));
    assert_eq!(receiver.latest(ghost), Some((NetworkTick::new(3), &third)));

    // A duplicate changes nothing.
    let again = receiver.receive(&registry, &p2).unwrap();
    assert!(again.is_complete());
    assert!(again.applied.is_empty());

    server.on_ack(&receiver.build_ack(NetworkTick::new(3)));
    for i in 4..=10u32 {
        let data = ship(&registry, [i as f32, 0.0, 0.0], 60, &[3, 4]);
        let bytes = send(&mut server, &registry, NetworkTick::new(i), &[(ghost, &data)]);
        let report = receiver.receive(&registry, &bytes).unwrap();
        assert!(report.is_complete(), "tick {i}: {:?}", report.dropped);
        assert_eq!(receiver.latest(ghost), Some((NetworkTick::new(i), &data)));
        server.on_ack(&receiver.build_ack(NetworkTick::new(i)));
    }
}

#[test]
fn packet_older_than_full_history_is_dropped_and_unacked() {
    let registry = registry();
    let mut server = ServerConnection::new(HistoryConfig::default()).unwrap();
    let mut receiver = client(HistoryConfig {
        client_history: 2,
        ..HistoryConfig::default()
    });
    let ghost = GhostId::new(5);

    let packets: Vec<Vec<u8>> = (1..=3u32)
        .map(|i| {
            let data = ship(&registry, [i as f32, 0.0, 0.0], 10, &[]);
            send(&mut server, &registry, NetworkTick::new(i), &[(ghost, &data)])
        })
        .collect();
    receiver.receive(&registry, &packets[1]).unwrap();
    receiver.receive(&registry, &packets[2]).unwrap();

    let report = receiver.receive(&registry, &packets[0]).unwrap();
    assert_eq!(report.dropped.len(), 1);
    assert!(matches!(report.dropped[0].1, CodecError::StaleTick { .. }));
    assert!(!receiver.acks().contains(NetworkTick::new(1)));
    assert_eq!(receiver.latest(ghost).unwrap().0, NetworkTick::new(3));
}

#[test]
fn despawn_survives_lost_packet() {
    let registry = registry();
    let mut server = ServerConnection::new(HistoryConfig::default()).unwrap();
    let mut receiver = client(HistoryConfig::default());
    let ghost = GhostId::new(3);
    let data = ship(&registry, [0.0; 3], 1, &[]);

    let bytes = send(&mut server, &registry, NetworkTick::new(1), &[(ghost, &data)]);
    receiver.receive(&registry, &bytes).unwrap();
    server.on_ack(&receiver.build_ack(NetworkTick::new(1)));

    server.despawn(ghost);
    let _lost = send(&mut server, &registry, NetworkTick::new(2), &[]);
    let bytes = send(&mut server, &registry, NetworkTick::new(3), &[]);
    let report = receiver.receive(&registry, &bytes).unwrap();
    assert_eq!(report.despawned, vec![ghost]);
    server.on_ack(&receiver.build_ack(NetworkTick::new(3)));
    assert_eq!(server.pending_despawns().count(), 0);
}

fn ship_at(registry: &Registry, tick: u32, id: u32) -> SnapshotData {
    let t = tick as f32;
    let heat: Vec<i32> = (0..(tick + id) % 5).map(|i| (i as i32 * 37 + tick as i32) % 900).collect();
    ship(
        registry,
        [t * 0.25 + id as f32, (t * 0.1).sin() * 30.0, -t * 0.5],
        (1000 - tick * 3 - id) % 1024,
        &heat,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn lossy_channel_reconstructs_exact_state(
        snapshot_lost in prop::collection::vec(any::<bool>(), 40),
        ack_lost in prop::collection::vec(any::<bool>(), 40),
    ) {
        let registry = registry();
        let mut server = ServerConnection::new(HistoryConfig::default()).unwrap();
        let mut receiver = client(HistoryConfig::default());
        let ids = [GhostId::new(1), GhostId::new(2), GhostId::new(40)];

        for (i, (lost, ack_lost)) in snapshot_lost.iter().zip(&ack_lost).enumerate() {
            let tick = NetworkTick::new(i as u32 + 1);
            let states: Vec<SnapshotData> = ids
                .iter()
                .map(|id| ship_at(&registry, tick.index(), id.raw()))
                .collect();
            let ghosts: Vec<(GhostId, &SnapshotData)> = ids.iter().copied().zip(states.iter()).collect();
            let bytes = send(&mut server, &registry, tick, &ghosts);
            if *lost {
                continue;
            }
            let report = receiver.receive(&registry, &bytes).unwrap();
            prop_assert!(report.is_complete(), "{:?}", report.dropped);
            for (id, state) in &ghosts {
                prop_assert_eq!(receiver.latest(*id).map(|(_, data)| data), Some(*state));
            }
            if !ack_lost {
                server.on_ack(&receiver.build_ack(tick));
            }
        }
    }

    /// Per tick: 0 delivers, 1 holds the packet back behind the next one,
    /// 2 delivers it twice, 3 loses it.
    #[test]
    fn reordered_and_duplicated_packets_converge(
        actions in prop::collection::vec(0u8..4, 40),
    ) {
        let registry = registry();
        let mut server = ServerConnection::new(HistoryConfig::default()).unwrap();
        let mut receiver = client(HistoryConfig::default());
        let ids = [GhostId::new(1), GhostId::new(2), GhostId::new(40)];
        let mut held: Option<(NetworkTick, Vec<u8>, Vec<SnapshotData>)> = None;
        let mut newest: Option<(NetworkTick, Vec<SnapshotData>)> = None;

        for (i, action) in actions.iter().enumerate() {
            let tick = NetworkTick::new(i as u32 + 1);
            let states: Vec<SnapshotData> = ids
                .iter()
                .map(|id| ship_at(&registry, tick.index(), id.raw()))
                .collect();
            let ghosts: Vec<(GhostId, &SnapshotData)> = ids.iter().copied().zip(states.iter()).collect();
            let bytes = send(&mut server, &registry, tick, &ghosts);

            let mut deliveries = Vec::new();
            match action {
                1 if held.is_none() => {
                    held = Some((tick, bytes, states));
                    continue;
                }
                2 => {
                    deliveries.push((tick, bytes.clone(), states.clone()));
                    deliveries.push((tick, bytes, states));
                }
                3 => {}
                _ => deliveries.push((tick, bytes, states)),
            }
            deliveries.extend(held.take());

            for (sent_at, bytes, states) in deliveries {
                let report = receiver.receive(&registry, &bytes).unwrap();
                prop_assert!(report.is_complete(), "{:?}", report.dropped);
                if newest.as_ref().map_or(true, |(at, _)| sent_at.is_newer_than(*at)) {
                    newest = Some((sent_at, states));
                }
                if let Some((at, expected)) = &newest {
                    for (id, state) in ids.iter().zip(expected) {
                        prop_assert_eq!(receiver.latest(*id), Some((*at, state)));
                    }
                }
                server.on_ack(&receiver.build_ack(tick));
            }
        }
    }
}
