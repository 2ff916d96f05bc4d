//! Per-ghost snapshot data in slot form.

use schema::{ComponentDescriptor, FieldDescriptor, GhostTypeDescriptor};

use crate::error::{CodecError, CodecResult};
use crate::value::{read_value, write_value, FieldValue};

/// One ghost's replicated state at one tick.
///
/// Fixed components live in `slots`, one `u32` per lane, in the layout of
/// the ghost type's descriptor. Each dynamic buffer component has its own
/// out-of-line lane list of `elements * element_lanes` values.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SnapshotData {
    slots: Vec<u32>,
    buffers: Vec<Vec<u32>>,
}

impl SnapshotData {
    /// Zeroed data with empty buffers for `descriptor`.
    #[must_use]
    pub fn new(descriptor: &GhostTypeDescriptor) -> Self {
        let buffer_count = descriptor
            .components
            .iter()
            .filter(|component| component.is_buffer())
            .count();
        Self {
            slots: vec![0; descriptor.slot_count],
            buffers: vec![Vec::new(); buffer_count],
        }
    }

    #[must_use]
    pub const fn from_parts(slots: Vec<u32>, buffers: Vec<Vec<u32>>) -> Self {
        Self { slots, buffers }
    }

    #[must_use]
    pub fn slots(&self) -> &[u32] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut [u32] {
        &mut self.slots
    }

    /// Lane lists of the buffer components, in component order.
    #[must_use]
    pub fn buffers(&self) -> &[Vec<u32>] {
        &self.buffers
    }

    pub(crate) fn buffers_mut(&mut self) -> &mut [Vec<u32>] {
        &mut self.buffers
    }

    /// Fails if this data was not built for `descriptor`.
    pub fn check_layout(&self, descriptor: &GhostTypeDescriptor) -> CodecResult<()> {
        if self.slots.len() != descriptor.slot_count {
            return Err(CodecError::LayoutMismatch {
                expected: descriptor.slot_count,
                found: self.slots.len(),
            });
        }
        let buffers = descriptor
            .components
            .iter()
            .filter(|component| component.is_buffer());
        if self.buffers.len() != buffers.clone().count() {
            return Err(CodecError::LayoutMismatch {
                expected: buffers.count(),
                found: self.buffers.len(),
            });
        }
        for (lanes, component) in self.buffers.iter().zip(buffers) {
            if lanes.len() % component.lanes.len() != 0 {
                return Err(CodecError::LayoutMismatch {
                    expected: component.lanes.len(),
                    found: lanes.len(),
                });
            }
        }
        Ok(())
    }

    /// Sets a field of a fixed component.
    pub fn set(
        &mut self,
        descriptor: &GhostTypeDescriptor,
        component: &str,
        field: &str,
        value: &FieldValue,
    ) -> CodecResult<()> {
        let (component, field) = locate(descriptor, component, field, false)?;
        let start = component.slot_offset + field.lane_offset;
        let found = self.slots.len();
        let lanes = self
            .slots
            .get_mut(start..start + field.lane_count)
            .ok_or(CodecError::LayoutMismatch {
                expected: descriptor.slot_count,
                found,
            })?;
        write_value(&field.name, &field.spec, value, lanes)
    }

    /// Reads a field of a fixed component.
    pub fn get(
        &self,
        descriptor: &GhostTypeDescriptor,
        component: &str,
        field: &str,
    ) -> CodecResult<FieldValue> {
        let (component, field) = locate(descriptor, component, field, false)?;
        let start = component.slot_offset + field.lane_offset;
        let lanes = self
            .slots
            .get(start..start + field.lane_count)
            .ok_or(CodecError::LayoutMismatch {
                expected: descriptor.slot_count,
                found: self.slots.len(),
            })?;
        Ok(read_value(&field.spec, lanes))
    }

    /// Number of elements in a buffer component.
    pub fn element_count(&self, descriptor: &GhostTypeDescriptor, component: &str) -> CodecResult<usize> {
        let (component, buffer) = self.buffer_ref(descriptor, component)?;
        Ok(buffer.len() / component.lanes.len())
    }

    /// Appends a zeroed element to a buffer component and returns its index.
    pub fn push_element(&mut self, descriptor: &GhostTypeDescriptor, component: &str) -> CodecResult<usize> {
        let index = buffer_index(descriptor, component)?;
        let component = &descriptor.components[index.component];
        let buffer = self
            .buffers
            .get_mut(index.buffer)
            .ok_or(CodecError::LayoutMismatch {
                expected: index.buffer + 1,
                found: 0,
            })?;
        let element_lanes = component.lanes.len();
        let len = buffer.len() / element_lanes;
        if len >= component.max_elements() {
            return Err(CodecError::BufferFull {
                component: component.name.clone(),
                max: component.max_elements(),
            });
        }
        buffer.resize(buffer.len() + element_lanes, 0);
        Ok(len)
    }

    /// Removes every element of a buffer component.
    pub fn clear_buffer(&mut self, descriptor: &GhostTypeDescriptor, component: &str) -> CodecResult<()> {
        let index = buffer_index(descriptor, component)?;
        if let Some(buffer) = self.buffers.get_mut(index.buffer) {
            buffer.clear();
        }
        Ok(())
    }

    /// Sets a field of one buffer element.
    pub fn set_element(
        &mut self,
        descriptor: &GhostTypeDescriptor,
        component: &str,
        index: usize,
        field: &str,
        value: &FieldValue,
    ) -> CodecResult<()> {
        let (component, field) = locate(descriptor, component, field, true)?;
        let buffer_at = buffer_index(descriptor, &component.name)?.buffer;
        let buffer = self.buffers.get_mut(buffer_at).ok_or(CodecError::LayoutMismatch {
            expected: buffer_at + 1,
            found: 0,
        })?;
        let lanes = element_lanes_mut(buffer, component, field, index)?;
        write_value(&field.name, &field.spec, value, lanes)
    }

    /// Reads a field of one buffer element.
    pub fn element(
        &self,
        descriptor: &GhostTypeDescriptor,
        component: &str,
        index: usize,
        field: &str,
    ) -> CodecResult<FieldValue> {
        let (component, field) = locate(descriptor, component, field, true)?;
        let (_, buffer) = self.buffer_ref(descriptor, &component.name)?;
        let element_lanes = component.lanes.len();
        let len = buffer.len() / element_lanes;
        if index >= len {
            return Err(CodecError::ElementOutOfRange {
                component: component.name.clone(),
                index,
                len,
            });
        }
        let start = index * element_lanes + field.lane_offset;
        Ok(read_value(&field.spec, &buffer[start..start + field.lane_count]))
    }

    /// Copies one component's data from `other`, which must share the layout.
    pub fn copy_component_from(
        &mut self,
        descriptor: &GhostTypeDescriptor,
        other: &Self,
        component_index: usize,
    ) -> CodecResult<()> {
        let component = descriptor
            .components
            .get(component_index)
            .ok_or(CodecError::LayoutMismatch {
                expected: descriptor.components.len(),
                found: component_index,
            })?;
        if component.is_buffer() {
            let index = buffer_index(descriptor, &component.name)?.buffer;
            if let (Some(dst), Some(src)) = (self.buffers.get_mut(index), other.buffers.get(index)) {
                dst.clone_from(src);
            }
        } else {
            let range = component.slot_range();
            if let (Some(dst), Some(src)) = (self.slots.get_mut(range.clone()), other.slots.get(range)) {
                dst.copy_from_slice(src);
            }
        }
        Ok(())
    }

    fn buffer_ref<'d>(
        &self,
        descriptor: &'d GhostTypeDescriptor,
        component: &str,
    ) -> CodecResult<(&'d ComponentDescriptor, &[u32])> {
        let index = buffer_index(descriptor, component)?;
        let buffer = self.buffers.get(index.buffer).ok_or(CodecError::LayoutMismatch {
            expected: index.buffer + 1,
            found: self.buffers.len(),
        })?;
        Ok((&descriptor.components[index.component], buffer))
    }
}

struct BufferIndex {
    component: usize,
    buffer: usize,
}

fn buffer_index(descriptor: &GhostTypeDescriptor, component: &str) -> CodecResult<BufferIndex> {
    let mut buffer = 0;
    for (index, candidate) in descriptor.components.iter().enumerate() {
        if candidate.name == component {
            if !candidate.is_buffer() {
                return Err(CodecError::ComponentKindMismatch {
                    component: component.to_owned(),
                    actual: "not a buffer",
                });
            }
            return Ok(BufferIndex {
                component: index,
                buffer,
            });
        }
        if candidate.is_buffer() {
            buffer += 1;
        }
    }
    Err(CodecError::UnknownField {
        component: component.to_owned(),
        field: String::new(),
    })
}

fn locate<'d>(
    descriptor: &'d GhostTypeDescriptor,
    component: &str,
    field: &str,
    buffer: bool,
) -> CodecResult<(&'d ComponentDescriptor, &'d FieldDescriptor)> {
    let unknown = || CodecError::UnknownField {
        component: component.to_owned(),
        field: field.to_owned(),
    };
    let found = descriptor.component(component).ok_or_else(unknown)?;
    if found.is_buffer() != buffer {
        return Err(CodecError::ComponentKindMismatch {
            component: component.to_owned(),
            actual: if buffer { "not a buffer" } else { "a buffer" },
        });
    }
    let field = found.field(field).ok_or_else(unknown)?;
    Ok((found, field))
}

fn element_lanes_mut<'b>(
    buffer: &'b mut [u32],
    component: &ComponentDescriptor,
    field: &FieldDescriptor,
    index: usize,
) -> CodecResult<&'b mut [u32]> {
    let element_lanes = component.lanes.len();
    let len = buffer.len() / element_lanes;
    if index >= len {
        return Err(CodecError::ElementOutOfRange {
            component: component.name.clone(),
            index,
            len,
        });
    }
    let start = index * element_lanes + field.lane_offset;
    Ok(&mut buffer[start..start + field.lane_count])
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema::{ComponentDef, FieldDef, FieldSpecOverride, FieldType, GhostTypeDef, Registry};

    fn registry() -> Registry {
        Registry::builder()
            .ghost_type(
                GhostTypeDef::new("crate")
                    .component(
                        ComponentDef::new("body")
                            .field(FieldDef::new("position", FieldType::Float2).with(FieldSpecOverride::quantized(100)))
                            .field(FieldDef::new("open", FieldType::Bool)),
                    )
                    .component(
                        ComponentDef::buffer("loot", 2)
                            .field(FieldDef::new("item", FieldType::UInt { bits: 12 }))
                            .field(FieldDef::new("label", FieldType::FixedString { max_len: 6 })),
                    ),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn fixed_fields_set_and_get() {
        let registry = registry();
        let descriptor = registry.ghost_type_by_name("crate").unwrap();
        let mut data = SnapshotData::new(descriptor);
        data.check_layout(descriptor).unwrap();
        data.set(descriptor, "body", "open", &FieldValue::Bool(true)).unwrap();
        data.set(descriptor, "body", "position", &FieldValue::Float2([1.5, -2.25]))
            .unwrap();
        assert_eq!(data.get(descriptor, "body", "open").unwrap(), FieldValue::Bool(true));
        assert_eq!(
            data.get(descriptor, "body", "position").unwrap(),
            FieldValue::Float2([1.5, -2.25])
        );
        assert_eq!(data.slots()[0] as i32, 150);
    }

    #[test]
    fn buffer_elements() {
        let registry = registry();
        let descriptor = registry.ghost_type_by_name("crate").unwrap();
        let mut data = SnapshotData::new(descriptor);
        let first = data.push_element(descriptor, "loot").unwrap();
        data.set_element(descriptor, "loot", first, "item", &FieldValue::UInt(99)).unwrap();
        data.set_element(descriptor, "loot", first, "label", &FieldValue::String("gem".into()))
            .unwrap();
        data.push_element(descriptor, "loot").unwrap();
        assert!(matches!(
            data.push_element(descriptor, "loot"),
            Err(CodecError::BufferFull { max: 2, .. })
        ));
        assert_eq!(data.element_count(descriptor, "loot").unwrap(), 2);
        assert_eq!(data.element(descriptor, "loot", 0, "item").unwrap(), FieldValue::UInt(99));
        assert_eq!(
            data.element(descriptor, "loot", 0, "label").unwrap(),
            FieldValue::String("gem".into())
        );
        assert!(matches!(
            data.element(descriptor, "loot", 2, "item"),
            Err(CodecError::ElementOutOfRange { .. })
        ));
        data.clear_buffer(descriptor, "loot").unwrap();
        assert_eq!(data.element_count(descriptor, "loot").unwrap(), 0);
    }

    #[test]
    fn wrong_component_kind() {
        let registry = registry();
        let descriptor = registry.ghost_type_by_name("crate").unwrap();
        let mut data = SnapshotData::new(descriptor);
        assert!(matches!(
            data.set(descriptor, "loot", "item", &FieldValue::UInt(1)),
            Err(CodecError::ComponentKindMismatch { .. })
        ));
        assert!(matches!(
            data.push_element(descriptor, "body"),
            Err(CodecError::ComponentKindMismatch { .. })
        ));
        assert!(matches!(
            data.get(descriptor, "body", "missing"),
            Err(CodecError::UnknownField { .. })
        ));
    }

    #[test]
    fn copy_component() {
        let registry = registry();
        let descriptor = registry.ghost_type_by_name("crate").unwrap();
        let mut source = SnapshotData::new(descriptor);
        source.set(descriptor, "body", "open", &FieldValue::Bool(true)).unwrap();
        source.push_element(descriptor, "loot").unwrap();
        let mut target = SnapshotData::new(descriptor);
        target.copy_component_from(descriptor, &source, 1).unwrap();
        assert_eq!(target.element_count(descriptor, "loot").unwrap(), 1);
        assert_eq!(target.get(descriptor, "body", "open").unwrap(), FieldValue::Bool(false));
        target.copy_component_from(descriptor, &source, 0).unwrap();
        assert_eq!(target, source);
    }

    #[test]
    fn layout_mismatch_detected() {
        let registry = registry();
        let descriptor = registry.ghost_type_by_name("crate").unwrap();
        let data = SnapshotData::from_parts(vec![0; 1], vec![Vec::new()]);
        assert!(matches!(
            data.check_layout(descriptor),
            Err(CodecError::LayoutMismatch { .. })
        ));
    }
}
