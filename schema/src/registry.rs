//! Ghost type definitions, the registry builder and built descriptors.

use std::collections::{BTreeMap, HashSet};
use std::ops::Range;

use crate::error::{SchemaError, SchemaResult};
use crate::field::{
    resolve_spec, FieldCodecSpec, FieldSpecOverride, FieldType, FieldTypeKind, LaneKind,
};
use crate::hash::{descriptor_hash, registry_hash};
use crate::template::{default_templates, CodecTemplate};
use crate::GhostTypeId;

/// Components per ghost type; one change-mask bit each.
pub const MAX_COMPONENTS: usize = 32;

/// Whether a component is a single value or a bounded list of elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum ComponentKind {
    #[default]
    Component,
    /// Dynamic buffer of up to `max_len` elements, stored out of line.
    Buffer { max_len: u16 },
}

/// How clients present a ghost type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum GhostMode {
    /// Rendered behind the server from interpolated snapshots.
    #[default]
    Interpolated,
    /// Simulated ahead of the server and corrected by rollback.
    Predicted,
}

/// A field as declared by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    #[cfg_attr(feature = "serde", serde(default))]
    pub spec: FieldSpecOverride,
}

impl FieldDef {
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            spec: FieldSpecOverride::default(),
        }
    }

    /// Sets the per-instance spec override.
    #[must_use]
    pub const fn with(mut self, spec: FieldSpecOverride) -> Self {
        self.spec = spec;
        self
    }
}

/// A component as declared by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ComponentDef {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub kind: ComponentKind,
    pub fields: Vec<FieldDef>,
}

impl ComponentDef {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ComponentKind::Component,
            fields: Vec::new(),
        }
    }

    /// A dynamic buffer component whose elements have this component's fields.
    #[must_use]
    pub fn buffer(name: impl Into<String>, max_len: u16) -> Self {
        Self {
            name: name.into(),
            kind: ComponentKind::Buffer { max_len },
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }
}

const fn default_importance() -> u32 {
    1
}

/// A ghost type as declared by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GhostTypeDef {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default = "default_importance"))]
    pub importance: u32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub single_baseline: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub static_optimization: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub mode: GhostMode,
    pub components: Vec<ComponentDef>,
    /// Type-level spec defaults per field kind.
    #[cfg_attr(feature = "serde", serde(default))]
    pub defaults: BTreeMap<FieldTypeKind, FieldSpecOverride>,
}

impl GhostTypeDef {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            importance: default_importance(),
            single_baseline: false,
            static_optimization: false,
            mode: GhostMode::Interpolated,
            components: Vec::new(),
            defaults: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn importance(mut self, importance: u32) -> Self {
        self.importance = importance;
        self
    }

    /// Delta against one baseline only.
    #[must_use]
    pub const fn single_baseline(mut self) -> Self {
        self.single_baseline = true;
        self
    }

    /// Skip sending while unchanged since the newest acknowledged baseline.
    #[must_use]
    pub const fn static_optimization(mut self) -> Self {
        self.static_optimization = true;
        self
    }

    #[must_use]
    pub const fn predicted(mut self) -> Self {
        self.mode = GhostMode::Predicted;
        self
    }

    #[must_use]
    pub fn component(mut self, component: ComponentDef) -> Self {
        self.components.push(component);
        self
    }

    #[must_use]
    pub fn default_for(mut self, kind: FieldTypeKind, spec: FieldSpecOverride) -> Self {
        self.defaults.insert(kind, spec);
        self
    }
}

/// A field with its resolved codec and slot position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub spec: FieldCodecSpec,
    pub template_id: u16,
    /// First lane within the component (or buffer element).
    pub lane_offset: usize,
    pub lane_count: usize,
}

impl FieldDescriptor {
    #[must_use]
    pub const fn lanes(&self) -> Range<usize> {
        self.lane_offset..self.lane_offset + self.lane_count
    }
}

/// A component with its resolved fields and slot layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentDescriptor {
    pub name: String,
    /// Position within the ghost type; also the change-mask bit.
    pub index: usize,
    pub kind: ComponentKind,
    /// First slot of a fixed component within the ghost's slots. Zero for buffers.
    pub slot_offset: usize,
    /// Lane encodings of the component, or of one element for buffers.
    pub lanes: Vec<LaneKind>,
    pub fields: Vec<FieldDescriptor>,
}

impl ComponentDescriptor {
    #[must_use]
    pub const fn is_buffer(&self) -> bool {
        matches!(self.kind, ComponentKind::Buffer { .. })
    }

    /// Slots of a fixed component; empty for buffers.
    #[must_use]
    pub fn slot_range(&self) -> Range<usize> {
        if self.is_buffer() {
            self.slot_offset..self.slot_offset
        } else {
            self.slot_offset..self.slot_offset + self.lanes.len()
        }
    }

    #[must_use]
    pub const fn max_elements(&self) -> usize {
        match self.kind {
            ComponentKind::Component => 1,
            ComponentKind::Buffer { max_len } => max_len as usize,
        }
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }
}

/// The immutable, content-hashed description of a ghost type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GhostTypeDescriptor {
    pub id: GhostTypeId,
    pub name: String,
    pub hash: u64,
    pub importance: u32,
    pub single_baseline: bool,
    pub static_optimization: bool,
    pub mode: GhostMode,
    pub components: Vec<ComponentDescriptor>,
    /// Total fixed slots.
    pub slot_count: usize,
    /// Encoding of each fixed slot.
    pub lanes: Vec<LaneKind>,
}

impl GhostTypeDescriptor {
    /// Baselines the delta predictor may use for this type.
    #[must_use]
    pub const fn max_baselines(&self) -> usize {
        if self.single_baseline || self.static_optimization {
            1
        } else {
            3
        }
    }

    #[must_use]
    pub fn component(&self, name: &str) -> Option<&ComponentDescriptor> {
        self.components.iter().find(|component| component.name == name)
    }

    #[must_use]
    pub fn has_buffers(&self) -> bool {
        self.components.iter().any(ComponentDescriptor::is_buffer)
    }

    /// Resolves `component.field` to the fixed slot range it occupies.
    #[must_use]
    pub fn field_slots(&self, component: &str, field: &str) -> Option<Range<usize>> {
        let component = self.component(component)?;
        if component.is_buffer() {
            return None;
        }
        let lanes = component.field(field)?.lanes();
        Some(component.slot_offset + lanes.start..component.slot_offset + lanes.end)
    }
}

/// Builder for [`Registry`].
#[derive(Debug, Clone)]
pub struct RegistryBuilder {
    templates: Vec<CodecTemplate>,
    defaults: BTreeMap<FieldTypeKind, FieldSpecOverride>,
    ghost_types: Vec<GhostTypeDef>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self {
            templates: default_templates(),
            defaults: BTreeMap::new(),
            ghost_types: Vec::new(),
        }
    }
}

impl RegistryBuilder {
    /// A builder with no templates; every field needs an explicit template.
    #[must_use]
    pub fn without_templates() -> Self {
        Self {
            templates: Vec::new(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn template(mut self, template: CodecTemplate) -> Self {
        self.templates.push(template);
        self
    }

    /// Registry-level spec default for a field kind.
    #[must_use]
    pub fn default_for(mut self, kind: FieldTypeKind, spec: FieldSpecOverride) -> Self {
        self.defaults.insert(kind, spec);
        self
    }

    /// Registers a ghost type. Ids are assigned in registration order.
    #[must_use]
    pub fn ghost_type(mut self, ghost_type: GhostTypeDef) -> Self {
        self.ghost_types.push(ghost_type);
        self
    }

    pub fn build(self) -> SchemaResult<Registry> {
        let mut template_ids = HashSet::new();
        for template in &self.templates {
            if !template_ids.insert(template.id) {
                return Err(SchemaError::DuplicateTemplate { id: template.id });
            }
        }

        let mut names = HashSet::new();
        let mut ghost_types = Vec::with_capacity(self.ghost_types.len());
        for (index, def) in self.ghost_types.iter().enumerate() {
            if !names.insert(def.name.as_str()) {
                return Err(SchemaError::DuplicateGhostType {
                    name: def.name.clone(),
                });
            }
            let id = GhostTypeId::new(index as u16);
            ghost_types.push(build_descriptor(id, def, &self.templates, &self.defaults)?);
        }

        let hash = registry_hash(&self.templates, &ghost_types);
        Ok(Registry {
            templates: self.templates,
            ghost_types,
            hash,
        })
    }
}

/// The built, immutable set of ghost types.
///
/// Owned explicitly and shared by reference; both peers must build identical
/// registries, which [`hash`](Self::hash) verifies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    templates: Vec<CodecTemplate>,
    ghost_types: Vec<GhostTypeDescriptor>,
    hash: u64,
}

impl Registry {
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    #[must_use]
    pub const fn hash(&self) -> u64 {
        self.hash
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ghost_types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ghost_types.is_empty()
    }

    pub fn ghost_type(&self, id: GhostTypeId) -> SchemaResult<&GhostTypeDescriptor> {
        self.ghost_types
            .get(id.get() as usize)
            .ok_or(SchemaError::UnknownGhostType { id: id.get() })
    }

    pub fn ghost_type_by_name(&self, name: &str) -> SchemaResult<&GhostTypeDescriptor> {
        self.ghost_types
            .iter()
            .find(|ghost_type| ghost_type.name == name)
            .ok_or_else(|| SchemaError::UnknownGhostTypeName {
                name: name.to_owned(),
            })
    }

    pub fn ghost_types(&self) -> impl Iterator<Item = &GhostTypeDescriptor> {
        self.ghost_types.iter()
    }

    #[must_use]
    pub fn templates(&self) -> &[CodecTemplate] {
        &self.templates
    }

    /// The template that generates `spec`, if any.
    #[must_use]
    pub fn can_generate(&self, spec: &FieldCodecSpec) -> Option<&CodecTemplate> {
        find_template(&self.templates, spec)
    }
}

fn find_template<'a>(
    templates: &'a [CodecTemplate],
    spec: &FieldCodecSpec,
) -> Option<&'a CodecTemplate> {
    templates.iter().find(|template| template.matches(spec))
}

fn build_descriptor(
    id: GhostTypeId,
    def: &GhostTypeDef,
    templates: &[CodecTemplate],
    registry_defaults: &BTreeMap<FieldTypeKind, FieldSpecOverride>,
) -> SchemaResult<GhostTypeDescriptor> {
    if def.importance == 0 {
        return Err(SchemaError::ZeroImportance {
            ghost_type: def.name.clone(),
        });
    }
    if def.components.is_empty() {
        return Err(SchemaError::Empty {
            name: def.name.clone(),
        });
    }
    if def.components.len() > MAX_COMPONENTS {
        return Err(SchemaError::TooManyComponents {
            ghost_type: def.name.clone(),
            count: def.components.len(),
            max: MAX_COMPONENTS,
        });
    }

    let none = FieldSpecOverride::default();
    let mut component_names = HashSet::new();
    let mut components = Vec::with_capacity(def.components.len());
    let mut lanes = Vec::new();

    for (index, component) in def.components.iter().enumerate() {
        if !component_names.insert(component.name.as_str()) {
            return Err(SchemaError::DuplicateComponent {
                ghost_type: def.name.clone(),
                component: component.name.clone(),
            });
        }
        if component.fields.is_empty() {
            return Err(SchemaError::Empty {
                name: format!("{}.{}", def.name, component.name),
            });
        }
        if component.kind == (ComponentKind::Buffer { max_len: 0 }) {
            return Err(SchemaError::InvalidBufferLength {
                component: component.name.clone(),
            });
        }

        let mut field_names = HashSet::new();
        let mut fields = Vec::with_capacity(component.fields.len());
        let mut component_lanes = Vec::new();
        for field in &component.fields {
            if !field_names.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    component: component.name.clone(),
                    field: field.name.clone(),
                });
            }
            let kind = field.field_type.kind();
            let spec = resolve_spec(
                field.field_type,
                &field.spec,
                def.defaults.get(&kind).unwrap_or(&none),
                registry_defaults.get(&kind).unwrap_or(&none),
            );
            let template_id = check_field(&component.name, &field.name, &spec, templates)?;
            let field_lanes = spec.lane_kinds();
            fields.push(FieldDescriptor {
                name: field.name.clone(),
                spec,
                template_id,
                lane_offset: component_lanes.len(),
                lane_count: field_lanes.len(),
            });
            component_lanes.extend(field_lanes);
        }

        let slot_offset = if component.kind == ComponentKind::Component {
            let offset = lanes.len();
            lanes.extend_from_slice(&component_lanes);
            offset
        } else {
            0
        };
        components.push(ComponentDescriptor {
            name: component.name.clone(),
            index,
            kind: component.kind,
            slot_offset,
            lanes: component_lanes,
            fields,
        });
    }

    let mut descriptor = GhostTypeDescriptor {
        id,
        name: def.name.clone(),
        hash: 0,
        importance: def.importance,
        single_baseline: def.single_baseline,
        static_optimization: def.static_optimization,
        mode: def.mode,
        components,
        slot_count: lanes.len(),
        lanes,
    };
    descriptor.hash = descriptor_hash(&descriptor);
    Ok(descriptor)
}

/// Fails closed: every field must be generatable by a registered template.
fn check_field(
    component: &str,
    field: &str,
    spec: &FieldCodecSpec,
    templates: &[CodecTemplate],
) -> SchemaResult<u16> {
    match spec.field_type {
        FieldType::UInt { bits } | FieldType::SInt { bits } if bits == 0 || bits > 32 => {
            return Err(SchemaError::InvalidBitWidth {
                field: field.to_owned(),
                bits,
            });
        }
        FieldType::FixedString { max_len: 0 } => {
            return Err(SchemaError::InvalidStringLength {
                field: field.to_owned(),
            });
        }
        _ => {}
    }
    if spec.composite != spec.field_type.kind().is_composite() {
        return Err(SchemaError::CompositeMismatch {
            component: component.to_owned(),
            field: field.to_owned(),
            field_type: spec.field_type,
            composite: spec.composite,
        });
    }
    find_template(templates, spec)
        .map(|template| template.id)
        .ok_or_else(|| SchemaError::UnsupportedField {
            component: component.to_owned(),
            field: field.to_owned(),
            field_type: spec.field_type,
            quantization: spec.quantization,
            smoothing: spec.smoothing,
        })
}
