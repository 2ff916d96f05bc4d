//! Ghost types replicated by the demo.

use std::collections::BTreeMap;

use codec::{CodecResult, FieldValue, SnapshotData};
use schema::{
    ComponentDef, FieldDef, FieldSpecOverride, FieldType, FieldTypeKind, GhostTypeDef, GhostTypeDescriptor,
    RegistryFile, Smoothing,
};

pub const AVATAR: &str = "avatar";
pub const CRATE: &str = "crate";

pub const POS_SCALE: u32 = 100;
pub const YAW_STEPS: u32 = 4096;
pub const POS_LIMIT: f32 = 500.0;
pub const SPEED_LIMIT: f32 = 12.0;

/// Avatars are predicted and move every tick; crates are static and only
/// change health now and then.
pub fn demo_registry_file() -> RegistryFile {
    let mut defaults = BTreeMap::new();
    defaults.insert(FieldTypeKind::Float3, FieldSpecOverride::quantized(POS_SCALE));

    let avatar = GhostTypeDef::new(AVATAR)
        .importance(20)
        .predicted()
        .component(
            ComponentDef::new("motion")
                .field(
                    FieldDef::new("position", FieldType::Float3)
                        .with(FieldSpecOverride::quantized(POS_SCALE).with_smoothing(Smoothing::Interpolate)),
                )
                .field(FieldDef::new("velocity", FieldType::Float3)),
        )
        .component(ComponentDef::new("look").field(FieldDef::new("yaw", FieldType::UInt { bits: 12 })));

    let crate_type = GhostTypeDef::new(CRATE)
        .importance(2)
        .static_optimization()
        .component(ComponentDef::new("body").field(FieldDef::new("position", FieldType::Float3)))
        .component(ComponentDef::new("health").field(FieldDef::new("hp", FieldType::UInt { bits: 7 })));

    RegistryFile {
        defaults,
        ghost_types: vec![avatar, crate_type],
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AvatarState {
    pub position: [f32; 3],
    pub velocity: [f32; 3],
    pub yaw: u32,
}

impl AvatarState {
    pub fn to_snapshot(&self, descriptor: &GhostTypeDescriptor) -> CodecResult<SnapshotData> {
        let mut data = SnapshotData::new(descriptor);
        write_avatar(&mut data, descriptor, self)?;
        Ok(data)
    }

    pub fn from_snapshot(data: &SnapshotData, descriptor: &GhostTypeDescriptor) -> CodecResult<Self> {
        let position = float3(data.get(descriptor, "motion", "position")?);
        let velocity = float3(data.get(descriptor, "motion", "velocity")?);
        let yaw = match data.get(descriptor, "look", "yaw")? {
            FieldValue::UInt(yaw) => yaw,
            _ => 0,
        };
        Ok(Self {
            position,
            velocity,
            yaw,
        })
    }

    /// Moves by `fraction` of one tick. Shared by the server and the
    /// client's prediction so both agree when no input changes.
    pub fn integrate(&mut self, dt: f32, fraction: f32) {
        for axis in 0..3 {
            let next = self.velocity[axis].mul_add(dt * fraction, self.position[axis]);
            if next.abs() >= POS_LIMIT {
                self.position[axis] = next.clamp(-POS_LIMIT, POS_LIMIT);
                self.velocity[axis] = -self.velocity[axis];
            } else {
                self.position[axis] = next;
            }
        }
    }
}

pub fn write_avatar(data: &mut SnapshotData, descriptor: &GhostTypeDescriptor, state: &AvatarState) -> CodecResult<()> {
    data.set(descriptor, "motion", "position", &FieldValue::Float3(state.position))?;
    data.set(descriptor, "motion", "velocity", &FieldValue::Float3(state.velocity))?;
    data.set(descriptor, "look", "yaw", &FieldValue::UInt(state.yaw % YAW_STEPS))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrateState {
    pub position: [f32; 3],
    pub hp: u32,
}

impl CrateState {
    pub fn to_snapshot(&self, descriptor: &GhostTypeDescriptor) -> CodecResult<SnapshotData> {
        let mut data = SnapshotData::new(descriptor);
        data.set(descriptor, "body", "position", &FieldValue::Float3(self.position))?;
        data.set(descriptor, "health", "hp", &FieldValue::UInt(self.hp.min(127)))?;
        Ok(data)
    }
}

fn float3(value: FieldValue) -> [f32; 3] {
    match value {
        FieldValue::Float3(v) => v,
        _ => [0.0; 3],
    }
}

/// Distance between two points, the prediction error metric.
pub fn distance(a: [f32; 3], b: [f32; 3]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dz.mul_add(dz, dx.mul_add(dx, dy * dy)).sqrt()
}
