#![no_main]

use codec::{decode_ack_packet, inspect_snapshot_packet, ClientReceiver, CodecLimits, HistoryConfig};
use libfuzzer_sys::fuzz_target;
use schema::{ComponentDef, FieldDef, FieldType, GhostTypeDef, Registry};
use tick::NetworkTick;

fn registry() -> Option<Registry> {
    Registry::builder()
        .ghost_type(
            GhostTypeDef::new("probe")
                .component(ComponentDef::new("state").field(FieldDef::new("on", FieldType::Bool)))
                .component(
                    ComponentDef::buffer("trail", 4).field(FieldDef::new("x", FieldType::SInt { bits: 12 })),
                ),
        )
        .build()
        .ok()
}

fuzz_target!(|data: &[u8]| {
    let Some(registry) = registry() else {
        return;
    };
    let limits = CodecLimits::for_testing();
    let wire_limits = wire::Limits::for_testing();
    let Ok(mut receiver) = ClientReceiver::new(HistoryConfig::for_testing(), limits.clone(), wire_limits.clone())
    else {
        return;
    };

    // Split the input into frames and feed each one to every decoder.
    let mut idx = 0usize;
    while idx < data.len() && idx < 4096 {
        let len = (data[idx] as usize % 200).saturating_add(1);
        idx += 1;
        let end = (idx + len).min(data.len());
        let frame = &data[idx..end];
        idx = end;

        let _ = wire::decode_packet(frame, &wire_limits);
        let _ = inspect_snapshot_packet(frame, &registry, &wire_limits, &limits);
        let _ = decode_ack_packet(frame, registry.hash(), &wire_limits);
        let _ = receiver.receive(&registry, frame);
        let _ = receiver.take_updates();
    }

    // Whatever was accepted must still produce a valid ack.
    let _ = receiver.encode_ack(registry.hash(), NetworkTick::new(1));
});
