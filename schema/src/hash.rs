//! Deterministic descriptor and registry hashing.

use blake3::Hasher;

use crate::field::{FieldCodecSpec, FieldType, Quantization, Smoothing};
use crate::registry::{ComponentKind, GhostMode, GhostTypeDescriptor};
use crate::template::CodecTemplate;

/// Hash of one ghost type's replicated layout.
///
/// Covers names, flags, component order and every resolved field spec, so
/// two peers agree on the hash only if they encode the type identically.
#[must_use]
pub fn descriptor_hash(descriptor: &GhostTypeDescriptor) -> u64 {
    let mut hasher = Hasher::new();
    write_str(&mut hasher, &descriptor.name);
    write_u32(&mut hasher, descriptor.importance);
    write_u8(
        &mut hasher,
        u8::from(descriptor.single_baseline) | u8::from(descriptor.static_optimization) << 1,
    );
    write_u8(
        &mut hasher,
        match descriptor.mode {
            GhostMode::Interpolated => 0,
            GhostMode::Predicted => 1,
        },
    );
    write_u32(&mut hasher, descriptor.components.len() as u32);

    for component in &descriptor.components {
        write_str(&mut hasher, &component.name);
        match component.kind {
            ComponentKind::Component => write_u8(&mut hasher, 0),
            ComponentKind::Buffer { max_len } => {
                write_u8(&mut hasher, 1);
                write_u16(&mut hasher, max_len);
            }
        }
        write_u32(&mut hasher, component.fields.len() as u32);
        for field in &component.fields {
            write_str(&mut hasher, &field.name);
            write_spec(&mut hasher, &field.spec);
        }
    }

    finish(&hasher)
}

/// Hash of the whole registry: templates, then each type's hash in id order.
#[must_use]
pub fn registry_hash(templates: &[CodecTemplate], ghost_types: &[GhostTypeDescriptor]) -> u64 {
    let mut hasher = Hasher::new();
    write_u32(&mut hasher, templates.len() as u32);
    for template in templates {
        write_u16(&mut hasher, template.id);
        write_u8(&mut hasher, template.kind as u8);
        write_u8(
            &mut hasher,
            u8::from(template.quantized)
                | u8::from(template.composite) << 1
                | u8::from(template.interpolatable) << 2
                | u8::from(template.supports_command) << 3,
        );
    }
    write_u32(&mut hasher, ghost_types.len() as u32);
    for ghost_type in ghost_types {
        write_u64(&mut hasher, ghost_type.hash);
    }
    finish(&hasher)
}

fn write_spec(hasher: &mut Hasher, spec: &FieldCodecSpec) {
    match spec.field_type {
        FieldType::Bool => write_u8(hasher, 0),
        FieldType::UInt { bits } => {
            write_u8(hasher, 1);
            write_u8(hasher, bits);
        }
        FieldType::SInt { bits } => {
            write_u8(hasher, 2);
            write_u8(hasher, bits);
        }
        FieldType::Float => write_u8(hasher, 3),
        FieldType::Float2 => write_u8(hasher, 4),
        FieldType::Float3 => write_u8(hasher, 5),
        FieldType::Float4 => write_u8(hasher, 6),
        FieldType::Quaternion => write_u8(hasher, 7),
        FieldType::FixedString { max_len } => {
            write_u8(hasher, 8);
            write_u16(hasher, max_len);
        }
        FieldType::EntityRef => write_u8(hasher, 9),
    }
    match spec.quantization {
        Quantization::Unquantized => write_i64(hasher, -1),
        Quantization::Scale(scale) => write_i64(hasher, i64::from(scale)),
    }
    write_u8(
        hasher,
        match spec.smoothing {
            Smoothing::None => 0,
            Smoothing::Clamp => 1,
            Smoothing::Interpolate => 2,
            Smoothing::InterpolateAndExtrapolate => 3,
        },
    );
    write_u8(hasher, u8::from(spec.composite));
    write_u16(hasher, spec.subtype);
}

fn finish(hasher: &Hasher) -> u64 {
    let hash = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[0..8]);
    u64::from_le_bytes(bytes)
}

fn write_str(hasher: &mut Hasher, value: &str) {
    write_u32(hasher, value.len() as u32);
    hasher.update(value.as_bytes());
}

fn write_u8(hasher: &mut Hasher, value: u8) {
    hasher.update(&[value]);
}

fn write_u16(hasher: &mut Hasher, value: u16) {
    hasher.update(&value.to_le_bytes());
}

fn write_u32(hasher: &mut Hasher, value: u32) {
    hasher.update(&value.to_le_bytes());
}

fn write_u64(hasher: &mut Hasher, value: u64) {
    hasher.update(&value.to_le_bytes());
}

fn write_i64(hasher: &mut Hasher, value: i64) {
    hasher.update(&value.to_le_bytes());
}
