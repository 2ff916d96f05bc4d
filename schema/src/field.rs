//! Field types, codec specs and lane layout.

use crate::error::SchemaError;

/// The value type of a replicated field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
pub enum FieldType {
    Bool,
    /// Unsigned integer of `bits` width (1..=32).
    #[cfg_attr(feature = "serde", serde(rename = "uint"))]
    UInt { bits: u8 },
    /// Signed integer of `bits` width (1..=32).
    #[cfg_attr(feature = "serde", serde(rename = "sint"))]
    SInt { bits: u8 },
    Float,
    Float2,
    Float3,
    Float4,
    /// Unit rotation, encoded smallest-three.
    Quaternion,
    /// UTF-8 string of at most `max_len` bytes.
    FixedString { max_len: u16 },
    /// Reference to another ghost by id (0 = none).
    EntityRef,
}

/// [`FieldType`] without parameters, used to key templates and defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FieldTypeKind {
    Bool,
    #[cfg_attr(feature = "serde", serde(rename = "uint"))]
    UInt,
    #[cfg_attr(feature = "serde", serde(rename = "sint"))]
    SInt,
    Float,
    Float2,
    Float3,
    Float4,
    Quaternion,
    FixedString,
    EntityRef,
}

impl FieldType {
    #[must_use]
    pub const fn kind(self) -> FieldTypeKind {
        match self {
            Self::Bool => FieldTypeKind::Bool,
            Self::UInt { .. } => FieldTypeKind::UInt,
            Self::SInt { .. } => FieldTypeKind::SInt,
            Self::Float => FieldTypeKind::Float,
            Self::Float2 => FieldTypeKind::Float2,
            Self::Float3 => FieldTypeKind::Float3,
            Self::Float4 => FieldTypeKind::Float4,
            Self::Quaternion => FieldTypeKind::Quaternion,
            Self::FixedString { .. } => FieldTypeKind::FixedString,
            Self::EntityRef => FieldTypeKind::EntityRef,
        }
    }

    /// Number of `u32` snapshot slots the field occupies.
    #[must_use]
    pub const fn lane_count(self) -> usize {
        match self {
            Self::Bool | Self::UInt { .. } | Self::SInt { .. } | Self::Float | Self::EntityRef => 1,
            Self::Float2 => 2,
            Self::Float3 => 3,
            Self::Float4 | Self::Quaternion => 4,
            Self::FixedString { max_len } => 1 + (max_len as usize).div_ceil(4),
        }
    }
}

impl FieldTypeKind {
    /// Multi-lane numeric types whose lanes share one scale.
    #[must_use]
    pub const fn is_composite(self) -> bool {
        matches!(
            self,
            Self::Float2 | Self::Float3 | Self::Float4 | Self::Quaternion
        )
    }
}

/// Fixed-point quantization of float fields.
///
/// On the wire and in registry files this is a single integer: `-1` means
/// unquantized, a positive value is the scale (units per 1.0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "i64", into = "i64"))]
pub enum Quantization {
    /// Raw IEEE-754 bits.
    #[default]
    Unquantized,
    /// `round(x * scale)` stored as an integer.
    Scale(u32),
}

impl Quantization {
    /// Raw representation used by registry files.
    pub const UNQUANTIZED_RAW: i64 = -1;

    #[must_use]
    pub const fn is_quantized(self) -> bool {
        matches!(self, Self::Scale(_))
    }

    #[must_use]
    pub const fn raw(self) -> i64 {
        match self {
            Self::Unquantized => Self::UNQUANTIZED_RAW,
            Self::Scale(scale) => scale as i64,
        }
    }
}

impl TryFrom<i64> for Quantization {
    type Error = SchemaError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        match raw {
            Self::UNQUANTIZED_RAW => Ok(Self::Unquantized),
            1..=0xFFFF_FFFF => Ok(Self::Scale(raw as u32)),
            _ => Err(SchemaError::InvalidQuantization { raw }),
        }
    }
}

impl From<Quantization> for i64 {
    fn from(value: Quantization) -> Self {
        value.raw()
    }
}

/// Receiver-side smoothing. Metadata only: the wire format is identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Smoothing {
    #[default]
    None,
    /// Snap to the newest value.
    Clamp,
    /// Blend between the two snapshots around the render tick.
    Interpolate,
    /// Blend, and extrapolate past the newest snapshot.
    InterpolateAndExtrapolate,
}

impl Smoothing {
    #[must_use]
    pub const fn interpolates(self) -> bool {
        matches!(self, Self::Interpolate | Self::InterpolateAndExtrapolate)
    }
}

/// How one field is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldCodecSpec {
    pub field_type: FieldType,
    pub quantization: Quantization,
    pub smoothing: Smoothing,
    pub composite: bool,
    /// Opaque user tag, carried into the descriptor hash.
    pub subtype: u16,
}

impl FieldCodecSpec {
    /// Per-slot encoding of this field, in slot order.
    #[must_use]
    pub fn lane_kinds(&self) -> Vec<LaneKind> {
        let numeric = if self.quantization.is_quantized() {
            LaneKind::Delta
        } else {
            LaneKind::Raw { bits: 32 }
        };
        match self.field_type {
            FieldType::Bool => vec![LaneKind::Raw { bits: 1 }],
            FieldType::UInt { .. } | FieldType::SInt { .. } => vec![LaneKind::Delta],
            FieldType::Float => vec![numeric],
            FieldType::Float2 => vec![numeric; 2],
            FieldType::Float3 => vec![numeric; 3],
            FieldType::Float4 => vec![numeric; 4],
            FieldType::Quaternion => {
                let mut lanes = vec![LaneKind::Raw { bits: 2 }];
                lanes.extend([numeric; 3]);
                lanes
            }
            FieldType::FixedString { max_len } => {
                let mut lanes = vec![LaneKind::Raw {
                    bits: bits_for(u32::from(max_len)),
                }];
                let byte_lanes = self.field_type.lane_count() - 1;
                lanes.extend(std::iter::repeat(LaneKind::Raw { bits: 32 }).take(byte_lanes));
                lanes
            }
            FieldType::EntityRef => vec![LaneKind::Raw { bits: 32 }],
        }
    }
}

/// Encoding of a single `u32` snapshot slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaneKind {
    /// Integer lane: packed signed difference against a predicted baseline.
    Delta,
    /// Opaque lane: a changed bit, then `bits` raw bits when changed.
    Raw { bits: u8 },
}

impl LaneKind {
    #[must_use]
    pub const fn is_predictable(self) -> bool {
        matches!(self, Self::Delta)
    }
}

/// Partial spec used at each level of override resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FieldSpecOverride {
    pub quantization: Option<Quantization>,
    pub smoothing: Option<Smoothing>,
    pub composite: Option<bool>,
    pub subtype: Option<u16>,
}

impl FieldSpecOverride {
    #[must_use]
    pub const fn quantized(scale: u32) -> Self {
        Self {
            quantization: Some(Quantization::Scale(scale)),
            smoothing: None,
            composite: None,
            subtype: None,
        }
    }

    #[must_use]
    pub const fn with_smoothing(mut self, smoothing: Smoothing) -> Self {
        self.smoothing = Some(smoothing);
        self
    }

    #[must_use]
    pub const fn with_subtype(mut self, subtype: u16) -> Self {
        self.subtype = Some(subtype);
        self
    }

    #[must_use]
    pub const fn with_composite(mut self, composite: bool) -> Self {
        self.composite = Some(composite);
        self
    }
}

/// Resolves a field's codec spec: instance override, then type default,
/// then registry default, then the built-in fallback.
#[must_use]
pub fn resolve_spec(
    field_type: FieldType,
    instance: &FieldSpecOverride,
    type_default: &FieldSpecOverride,
    registry_default: &FieldSpecOverride,
) -> FieldCodecSpec {
    let levels = [instance, type_default, registry_default];
    FieldCodecSpec {
        field_type,
        quantization: levels
            .iter()
            .find_map(|level| level.quantization)
            .unwrap_or_default(),
        smoothing: levels
            .iter()
            .find_map(|level| level.smoothing)
            .unwrap_or_default(),
        composite: levels
            .iter()
            .find_map(|level| level.composite)
            .unwrap_or_else(|| field_type.kind().is_composite()),
        subtype: levels.iter().find_map(|level| level.subtype).unwrap_or(0),
    }
}

/// Bits needed to represent `0..=max`.
pub(crate) const fn bits_for(max: u32) -> u8 {
    if max == 0 {
        1
    } else {
        (32 - max.leading_zeros()) as u8
    }
}
