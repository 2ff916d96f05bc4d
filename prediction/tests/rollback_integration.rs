use std::collections::BTreeMap;

use codec::{
    ClientReceiver, CodecLimits, CodecScratch, FieldValue, GhostId, HistoryConfig, ServerConnection, SnapshotData,
    SnapshotPacketWriter,
};
use prediction::{PredictedWorld, PredictionConfig, PredictionController};
use schema::{ComponentDef, FieldDef, FieldType, GhostTypeDef, GhostTypeDescriptor, Registry};
use tick::{NetworkTick, PartialTick};

fn registry() -> Registry {
    Registry::builder()
        .ghost_type(
            GhostTypeDef::new("runner")
                .predicted()
                .component(ComponentDef::new("motion").field(FieldDef::new("x", FieldType::SInt { bits: 24 }))),
        )
        .build()
        .unwrap()
}

/// Runners move one unit per tick.
struct Track {
    descriptor: GhostTypeDescriptor,
    runners: BTreeMap<GhostId, SnapshotData>,
    simulated: Vec<u32>,
}

impl Track {
    fn x(&self, ghost: GhostId) -> i32 {
        match self.runners[&ghost].get(&self.descriptor, "motion", "x").unwrap() {
            FieldValue::SInt(x) => x,
            other => panic!("unexpected {other:?}"),
        }
    }
}

impl PredictedWorld for Track {
    fn predicted_ghosts(&self) -> Vec<GhostId> {
        self.runners.keys().copied().collect()
    }

    fn capture(&self, ghost: GhostId) -> Option<SnapshotData> {
        self.runners.get(&ghost).cloned()
    }

    fn restore(&mut self, ghost: GhostId, data: &SnapshotData) {
        self.runners.insert(ghost, data.clone());
    }

    fn simulate_tick(&mut self, tick: NetworkTick, _fraction: f32, ghosts: &[GhostId]) {
        self.simulated.push(tick.index());
        for ghost in ghosts {
            let x = self.x(*ghost);
            let runner = self.runners.get_mut(ghost).unwrap();
            runner
                .set(&self.descriptor, "motion", "x", &FieldValue::SInt(x + 1))
                .unwrap();
        }
    }
}

fn server_snapshot(registry: &Registry, tick: NetworkTick, ghost: GhostId, x: i32) -> Vec<u8> {
    let descriptor = registry.ghost_type_by_name("runner").unwrap();
    let mut data = SnapshotData::new(descriptor);
    data.set(descriptor, "motion", "x", &FieldValue::SInt(x)).unwrap();
    let mut server = ServerConnection::new(HistoryConfig::default()).unwrap();
    let mut writer = SnapshotPacketWriter::new(tick, 1400, &CodecLimits::default());
    server
        .encode_ghost(&mut CodecScratch::new(), descriptor, ghost, &data, &mut writer)
        .unwrap();
    server
        .finish_packet(writer, registry.hash(), &wire::Limits::default())
        .unwrap()
}

#[test]
fn rollback_happens_once_and_only_on_new_data() {
    let registry = registry();
    let ghost = GhostId::new(4);
    let descriptor = registry.ghost_type_by_name("runner").unwrap().clone();
    let mut track = Track {
        runners: [(ghost, SnapshotData::new(&descriptor))].into_iter().collect(),
        descriptor,
        simulated: Vec::new(),
    };
    let mut receiver =
        ClientReceiver::new(HistoryConfig::default(), CodecLimits::default(), wire::Limits::default()).unwrap();
    let mut controller = PredictionController::new(PredictionConfig::default()).unwrap();

    // Predict 50 -> 60 with no authoritative data.
    for index in 50..=60 {
        controller
            .update(&mut track, &mut receiver, PartialTick::full(NetworkTick::new(index)))
            .unwrap();
    }
    let counters = controller.counters();
    assert_eq!(counters.rollbacks, 0);
    assert_eq!(counters.replayed_ticks, 0);
    assert_eq!(counters.backups_taken, 0);
    assert_eq!(counters.backups_restored, 0);
    assert_eq!(track.simulated, (51..=60).collect::<Vec<_>>());
    assert_eq!(track.x(ghost), 10);

    // The server says the runner was at 65 on tick 55.
    let bytes = server_snapshot(&registry, NetworkTick::new(55), ghost, 65);
    receiver.receive(&registry, &bytes).unwrap();
    track.simulated.clear();
    let outcome = controller
        .update(&mut track, &mut receiver, PartialTick::full(NetworkTick::new(60)))
        .unwrap();

    assert_eq!(outcome.rollback_tick, Some(NetworkTick::new(55)));
    assert_eq!(outcome.restored, vec![ghost]);
    assert_eq!(track.simulated, vec![56, 57, 58, 59, 60]);
    assert_eq!(track.x(ghost), 70);
    let counters = controller.counters();
    assert_eq!(counters.rollbacks, 1);
    assert_eq!(counters.replayed_ticks, 5);

    // Nothing new: no second rollback.
    track.simulated.clear();
    let outcome = controller
        .update(&mut track, &mut receiver, PartialTick::full(NetworkTick::new(60)))
        .unwrap();
    assert_eq!(outcome.rollback_tick, None);
    assert!(track.simulated.is_empty());
    assert_eq!(controller.counters().rollbacks, 1);
}
