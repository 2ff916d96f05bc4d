//! Registry validation errors.

use thiserror::Error;

use crate::{FieldType, Quantization, Smoothing};

/// Result type for registry operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors that can occur when building or querying a registry.
///
/// All of these surface at registry build time; a built [`crate::Registry`]
/// never produces them mid-snapshot except for lookups by id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// No codec template can generate this field.
    #[error(
        "no codec for field `{component}.{field}`: {field_type:?} with {quantization:?} and {smoothing:?}"
    )]
    UnsupportedField {
        component: String,
        field: String,
        field_type: FieldType,
        quantization: Quantization,
        smoothing: Smoothing,
    },

    /// Composite flag does not match the field type.
    #[error("field `{component}.{field}` composite flag {composite} does not match {field_type:?}")]
    CompositeMismatch {
        component: String,
        field: String,
        field_type: FieldType,
        composite: bool,
    },

    /// Integer width outside `1..=32`.
    #[error("invalid bit width {bits} for field `{field}`")]
    InvalidBitWidth { field: String, bits: u8 },

    /// Fixed string with zero capacity.
    #[error("fixed string field `{field}` has zero max length")]
    InvalidStringLength { field: String },

    /// Quantization scale of zero, or a raw value other than `-1` or positive.
    #[error("invalid quantization {raw}")]
    InvalidQuantization { raw: i64 },

    /// Two ghost types share a name.
    #[error("duplicate ghost type `{name}`")]
    DuplicateGhostType { name: String },

    /// Two components of one ghost type share a name.
    #[error("duplicate component `{component}` in ghost type `{ghost_type}`")]
    DuplicateComponent {
        ghost_type: String,
        component: String,
    },

    /// Two fields of one component share a name.
    #[error("duplicate field `{field}` in component `{component}`")]
    DuplicateField { component: String, field: String },

    /// Two templates declare the same identifier.
    #[error("duplicate codec template id {id}")]
    DuplicateTemplate { id: u16 },

    /// A ghost type has more components than the change mask can address.
    #[error("ghost type `{ghost_type}` has {count} components, max {max}")]
    TooManyComponents {
        ghost_type: String,
        count: usize,
        max: usize,
    },

    /// A ghost type or component has no fields to replicate.
    #[error("`{name}` replicates nothing")]
    Empty { name: String },

    /// Dynamic buffer with zero capacity.
    #[error("buffer component `{component}` has zero max length")]
    InvalidBufferLength { component: String },

    /// Importance must be positive so every ghost eventually ages into a send.
    #[error("ghost type `{ghost_type}` has zero importance")]
    ZeroImportance { ghost_type: String },

    /// Lookup of a ghost type id that was never registered.
    #[error("unknown ghost type id {id}")]
    UnknownGhostType { id: u16 },

    /// Lookup of a ghost type name that was never registered.
    #[error("unknown ghost type `{name}`")]
    UnknownGhostTypeName { name: String },
}
