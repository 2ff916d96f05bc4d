//! Ghost type registry and field codec generation for ghostwire.
//!
//! This crate defines how game state is described for replication:
//! - Ghost types made of components (fixed or dynamic buffers) made of fields
//! - Field codec specs: type, quantization, smoothing, composite, subtype
//! - Codec templates that decide which specs can be generated
//! - Slot layout: every field maps to one or more `u32` lanes
//! - Deterministic descriptor and registry hashing
//!
//! # Design Principles
//!
//! - **Fail closed** - a field no template can generate rejects the registry at build time.
//! - **Explicit ownership** - a [`Registry`] is a plain value passed by reference, never a global.
//! - **Deterministic hashing** - peers compare [`Registry::hash`] before exchanging snapshots.

mod error;
mod field;
#[cfg(feature = "serde")]
mod file;
mod hash;
mod registry;
mod template;

pub use error::{SchemaError, SchemaResult};
pub use field::{
    resolve_spec, FieldCodecSpec, FieldSpecOverride, FieldType, FieldTypeKind, LaneKind,
    Quantization, Smoothing,
};
#[cfg(feature = "serde")]
pub use file::RegistryFile;
pub use hash::{descriptor_hash, registry_hash};
pub use registry::{
    ComponentDef, ComponentDescriptor, ComponentKind, FieldDef, FieldDescriptor, GhostMode,
    GhostTypeDef, GhostTypeDescriptor, Registry, RegistryBuilder, MAX_COMPONENTS,
};
pub use template::{default_templates, CodecTemplate};

/// Dense ghost type identifier, assigned in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GhostTypeId(u16);

impl GhostTypeId {
    #[must_use]
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}
