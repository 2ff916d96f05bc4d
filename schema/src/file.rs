//! Registry description files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::SchemaResult;
use crate::field::{FieldSpecOverride, FieldTypeKind};
use crate::registry::{GhostTypeDef, Registry, RegistryBuilder};

/// A serializable registry definition, using the built-in templates.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegistryFile {
    #[serde(default)]
    pub defaults: BTreeMap<FieldTypeKind, FieldSpecOverride>,
    pub ghost_types: Vec<GhostTypeDef>,
}

impl RegistryFile {
    #[must_use]
    pub fn into_builder(self) -> RegistryBuilder {
        let builder = self
            .defaults
            .into_iter()
            .fold(Registry::builder(), |builder, (kind, spec)| {
                builder.default_for(kind, spec)
            });
        self.ghost_types
            .into_iter()
            .fold(builder, RegistryBuilder::ghost_type)
    }

    pub fn build(self) -> SchemaResult<Registry> {
        self.into_builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GhostMode, Quantization};

    const SAMPLE: &str = r#"{
        "defaults": { "float3": { "quantization": 100 } },
        "ghost_types": [
            {
                "name": "player",
                "importance": 10,
                "mode": "predicted",
                "components": [
                    {
                        "name": "transform",
                        "fields": [
                            { "name": "position", "field_type": { "type": "float3" } },
                            { "name": "rotation", "field_type": { "type": "quaternion" },
                              "spec": { "quantization": 1000, "smoothing": "interpolate" } }
                        ]
                    },
                    {
                        "name": "trail",
                        "kind": { "kind": "buffer", "max_len": 4 },
                        "fields": [ { "name": "x", "field_type": { "type": "sint", "bits": 16 } } ]
                    }
                ]
            }
        ]
    }"#;

    #[test]
    fn parses_and_builds() {
        let file: RegistryFile = serde_json::from_str(SAMPLE).unwrap();
        let registry = file.build().unwrap();
        let player = registry.ghost_type_by_name("player").unwrap();
        assert_eq!(player.mode, GhostMode::Predicted);
        assert_eq!(player.importance, 10);
        let position = player.component("transform").unwrap().field("position").unwrap();
        assert_eq!(position.spec.quantization, Quantization::Scale(100));
        assert!(player.component("trail").unwrap().is_buffer());
    }

    #[test]
    fn round_trips_through_json() {
        let file: RegistryFile = serde_json::from_str(SAMPLE).unwrap();
        let text = serde_json::to_string(&file).unwrap();
        let again: RegistryFile = serde_json::from_str(&text).unwrap();
        assert_eq!(file, again);
    }

    #[test]
    fn zero_scale_rejected() {
        let text = r#"{ "ghost_types": [ { "name": "x", "components": [ { "name": "c",
            "fields": [ { "name": "f", "field_type": { "type": "float" },
            "spec": { "quantization": 0 } } ] } ] } ] }"#;
        assert!(serde_json::from_str::<RegistryFile>(text).is_err());
    }
}
