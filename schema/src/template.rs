//! Codec templates: the closed set of field encodings a registry can generate.

use crate::field::{FieldCodecSpec, FieldTypeKind};

/// One generatable encoding.
///
/// A field is supported only if some registered template matches its type
/// kind, quantization flag and composite flag, and allows its smoothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CodecTemplate {
    pub id: u16,
    pub kind: FieldTypeKind,
    pub quantized: bool,
    pub composite: bool,
    /// Whether interpolating smoothing modes are allowed.
    pub interpolatable: bool,
    /// Whether the encoding may also be used for client commands.
    pub supports_command: bool,
}

impl CodecTemplate {
    #[must_use]
    pub const fn new(id: u16, kind: FieldTypeKind, quantized: bool) -> Self {
        Self {
            id,
            kind,
            quantized,
            composite: kind.is_composite(),
            interpolatable: false,
            supports_command: true,
        }
    }

    #[must_use]
    pub const fn interpolatable(mut self) -> Self {
        self.interpolatable = true;
        self
    }

    #[must_use]
    pub const fn without_command_support(mut self) -> Self {
        self.supports_command = false;
        self
    }

    /// Whether this template can encode `spec`.
    #[must_use]
    pub fn matches(&self, spec: &FieldCodecSpec) -> bool {
        self.kind == spec.field_type.kind()
            && self.quantized == spec.quantization.is_quantized()
            && self.composite == spec.composite
            && (self.interpolatable || !spec.smoothing.interpolates())
    }
}

/// The built-in template set.
///
/// Floats interpolate only when quantized; quaternions exist only quantized;
/// integers, bools, strings and entity references are never quantized.
#[must_use]
pub fn default_templates() -> Vec<CodecTemplate> {
    use FieldTypeKind as K;
    vec![
        CodecTemplate::new(1, K::Bool, false),
        CodecTemplate::new(2, K::UInt, false).interpolatable(),
        CodecTemplate::new(3, K::SInt, false).interpolatable(),
        CodecTemplate::new(4, K::Float, false),
        CodecTemplate::new(5, K::Float, true).interpolatable(),
        CodecTemplate::new(6, K::Float2, false),
        CodecTemplate::new(7, K::Float2, true).interpolatable(),
        CodecTemplate::new(8, K::Float3, false),
        CodecTemplate::new(9, K::Float3, true).interpolatable(),
        CodecTemplate::new(10, K::Float4, false),
        CodecTemplate::new(11, K::Float4, true).interpolatable(),
        CodecTemplate::new(12, K::Quaternion, true).interpolatable(),
        CodecTemplate::new(13, K::FixedString, false).without_command_support(),
        CodecTemplate::new(14, K::EntityRef, false),
    ]
}
