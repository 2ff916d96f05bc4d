//! Field values, quantization and their lane representation.
//!
//! Every field occupies one or more `u32` lanes in a [`crate::SnapshotData`].
//! Integer and quantized lanes hold two's-complement `i32` values so the
//! delta predictor can extrapolate them; raw lanes hold opaque bits.

use schema::{FieldCodecSpec, FieldType, FieldTypeKind, Quantization};

use crate::error::{CodecError, CodecResult};
use crate::GhostId;

/// A field value in decoded form.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    UInt(u32),
    SInt(i32),
    Float(f32),
    Float2([f32; 2]),
    Float3([f32; 3]),
    Float4([f32; 4]),
    /// `[x, y, z, w]`, expected to be unit length.
    Quaternion([f32; 4]),
    String(String),
    EntityRef(Option<GhostId>),
}

impl FieldValue {
    const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::UInt(_) => "uint",
            Self::SInt(_) => "sint",
            Self::Float(_) => "float",
            Self::Float2(_) => "float2",
            Self::Float3(_) => "float3",
            Self::Float4(_) => "float4",
            Self::Quaternion(_) => "quaternion",
            Self::String(_) => "string",
            Self::EntityRef(_) => "entity ref",
        }
    }

    /// Float components of numeric values, if any.
    #[must_use]
    pub fn components(&self) -> Option<&[f32]> {
        match self {
            Self::Float(v) => Some(std::slice::from_ref(v)),
            Self::Float2(v) => Some(v.as_slice()),
            Self::Float3(v) => Some(v.as_slice()),
            Self::Float4(v) | Self::Quaternion(v) => Some(v.as_slice()),
            _ => None,
        }
    }
}

/// Quantizes `value` to `round(value * scale)`, saturating at the `i32` range.
///
/// NaN quantizes to zero.
#[must_use]
pub fn quantize(value: f32, scale: u32) -> i32 {
    let scaled = (f64::from(value) * f64::from(scale)).round();
    scaled.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
}

/// Inverse of [`quantize`].
#[must_use]
pub fn dequantize(quantized: i32, scale: u32) -> f32 {
    (f64::from(quantized) / f64::from(scale.max(1))) as f32
}

fn write_float(quantization: Quantization, value: f32) -> u32 {
    match quantization {
        Quantization::Unquantized => value.to_bits(),
        Quantization::Scale(scale) => quantize(value, scale) as u32,
    }
}

fn read_float(quantization: Quantization, lane: u32) -> f32 {
    match quantization {
        Quantization::Unquantized => f32::from_bits(lane),
        Quantization::Scale(scale) => dequantize(lane as i32, scale),
    }
}

/// Writes `value` into the lanes of one field.
///
/// `lanes` must be exactly the field's lane count.
pub(crate) fn write_value(
    field: &str,
    spec: &FieldCodecSpec,
    value: &FieldValue,
    lanes: &mut [u32],
) -> CodecResult<()> {
    let mismatch = || CodecError::ValueTypeMismatch {
        field: field.to_owned(),
        expected: spec.field_type.kind(),
        found: value.type_name(),
    };
    match (spec.field_type, value) {
        (FieldType::Bool, FieldValue::Bool(v)) => lanes[0] = u32::from(*v),
        (FieldType::UInt { bits }, FieldValue::UInt(v)) => {
            if bits < 32 && *v >> bits != 0 {
                return Err(CodecError::ValueOutOfRange {
                    field: field.to_owned(),
                    value: i64::from(*v),
                    bits,
                });
            }
            lanes[0] = *v;
        }
        (FieldType::SInt { bits }, FieldValue::SInt(v)) => {
            let min = -(1i64 << (bits - 1));
            let max = (1i64 << (bits - 1)) - 1;
            if !(min..=max).contains(&i64::from(*v)) {
                return Err(CodecError::ValueOutOfRange {
                    field: field.to_owned(),
                    value: i64::from(*v),
                    bits,
                });
            }
            lanes[0] = *v as u32;
        }
        (FieldType::Float, FieldValue::Float(v)) => lanes[0] = write_float(spec.quantization, *v),
        (FieldType::Float2, FieldValue::Float2(v)) => write_floats(spec.quantization, v, lanes),
        (FieldType::Float3, FieldValue::Float3(v)) => write_floats(spec.quantization, v, lanes),
        (FieldType::Float4, FieldValue::Float4(v)) => write_floats(spec.quantization, v, lanes),
        (FieldType::Quaternion, FieldValue::Quaternion(q)) => {
            write_quaternion(spec.quantization, *q, lanes);
        }
        (FieldType::FixedString { max_len }, FieldValue::String(text)) => {
            let bytes = text.as_bytes();
            if bytes.len() > usize::from(max_len) {
                return Err(CodecError::StringTooLong {
                    field: field.to_owned(),
                    len: bytes.len(),
                    max: max_len,
                });
            }
            lanes.fill(0);
            lanes[0] = bytes.len() as u32;
            for (lane, chunk) in lanes[1..].iter_mut().zip(bytes.chunks(4)) {
                let mut word = [0u8; 4];
                word[..chunk.len()].copy_from_slice(chunk);
                *lane = u32::from_le_bytes(word);
            }
        }
        (FieldType::EntityRef, FieldValue::EntityRef(target)) => {
            lanes[0] = match target {
                None => 0,
                Some(id) => id.raw().checked_add(1).ok_or_else(|| {
                    CodecError::ValueOutOfRange {
                        field: field.to_owned(),
                        value: i64::from(id.raw()),
                        bits: 32,
                    }
                })?,
            };
        }
        _ => return Err(mismatch()),
    }
    Ok(())
}

fn write_floats(quantization: Quantization, values: &[f32], lanes: &mut [u32]) {
    for (lane, value) in lanes.iter_mut().zip(values) {
        *lane = write_float(quantization, *value);
    }
}

/// Reads one field's value from its lanes. Never fails: lanes received from
/// the network are interpreted leniently.
pub(crate) fn read_value(spec: &FieldCodecSpec, lanes: &[u32]) -> FieldValue {
    let q = spec.quantization;
    match spec.field_type {
        FieldType::Bool => FieldValue::Bool(lanes[0] != 0),
        FieldType::UInt { .. } => FieldValue::UInt(lanes[0]),
        FieldType::SInt { .. } => FieldValue::SInt(lanes[0] as i32),
        FieldType::Float => FieldValue::Float(read_float(q, lanes[0])),
        FieldType::Float2 => FieldValue::Float2([read_float(q, lanes[0]), read_float(q, lanes[1])]),
        FieldType::Float3 => FieldValue::Float3([
            read_float(q, lanes[0]),
            read_float(q, lanes[1]),
            read_float(q, lanes[2]),
        ]),
        FieldType::Float4 => FieldValue::Float4([
            read_float(q, lanes[0]),
            read_float(q, lanes[1]),
            read_float(q, lanes[2]),
            read_float(q, lanes[3]),
        ]),
        FieldType::Quaternion => FieldValue::Quaternion(read_quaternion(q, lanes)),
        FieldType::FixedString { max_len } => {
            let len = (lanes[0] as usize).min(usize::from(max_len));
            let bytes: Vec<u8> = lanes[1..]
                .iter()
                .flat_map(|lane| lane.to_le_bytes())
                .take(len)
                .collect();
            FieldValue::String(String::from_utf8_lossy(&bytes).into_owned())
        }
        FieldType::EntityRef => {
            FieldValue::EntityRef(lanes[0].checked_sub(1).map(GhostId::new))
        }
    }
}

/// Smallest-three: lane 0 holds the index of the dropped (largest) component,
/// lanes 1..4 the other three in order. The dropped component is made
/// non-negative by negating the whole quaternion, which is the same rotation.
fn write_quaternion(quantization: Quantization, q: [f32; 4], lanes: &mut [u32]) {
    let norm = q.iter().map(|c| c * c).sum::<f32>().sqrt();
    let q = if norm > f32::EPSILON {
        q.map(|c| c / norm)
    } else {
        [0.0, 0.0, 0.0, 1.0]
    };
    let mut largest = 0;
    for i in 1..4 {
        if q[i].abs() > q[largest].abs() {
            largest = i;
        }
    }
    let sign = if q[largest] < 0.0 { -1.0 } else { 1.0 };
    lanes[0] = largest as u32;
    let mut lane = 1;
    for (i, component) in q.iter().enumerate() {
        if i != largest {
            lanes[lane] = write_float(quantization, component * sign);
            lane += 1;
        }
    }
}

fn read_quaternion(quantization: Quantization, lanes: &[u32]) -> [f32; 4] {
    let largest = (lanes[0] & 3) as usize;
    let small = [
        read_float(quantization, lanes[1]),
        read_float(quantization, lanes[2]),
        read_float(quantization, lanes[3]),
    ];
    let sum: f32 = small.iter().map(|c| c * c).sum();
    let mut q = [0.0; 4];
    let mut next = small.iter();
    for (i, component) in q.iter_mut().enumerate() {
        if i == largest {
            *component = (1.0 - sum).max(0.0).sqrt();
        } else if let Some(value) = next.next() {
            *component = *value;
        }
    }
    q
}

/// Whether `kind` can hold `value` at all; used by tooling.
#[must_use]
pub fn value_matches(kind: FieldTypeKind, value: &FieldValue) -> bool {
    matches!(
        (kind, value),
        (FieldTypeKind::Bool, FieldValue::Bool(_))
            | (FieldTypeKind::UInt, FieldValue::UInt(_))
            | (FieldTypeKind::SInt, FieldValue::SInt(_))
            | (FieldTypeKind::Float, FieldValue::Float(_))
            | (FieldTypeKind::Float2, FieldValue::Float2(_))
            | (FieldTypeKind::Float3, FieldValue::Float3(_))
            | (FieldTypeKind::Float4, FieldValue::Float4(_))
            | (FieldTypeKind::Quaternion, FieldValue::Quaternion(_))
            | (FieldTypeKind::FixedString, FieldValue::String(_))
            | (FieldTypeKind::EntityRef, FieldValue::EntityRef(_))
    )
}
