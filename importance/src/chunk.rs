//! Grouping ghosts into schedulable chunks.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use codec::GhostId;
use schema::{GhostTypeId, Registry, SchemaResult};

/// Position of a chunk in the current chunk list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId(u32);

impl ChunkId {
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Ghosts of one type that are scheduled together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GhostChunk {
    pub id: ChunkId,
    pub type_id: GhostTypeId,
    /// Importance weight of the ghost type.
    pub importance: u32,
    /// Members in ascending id order.
    pub ghosts: Vec<GhostId>,
}

/// Splits `ghosts` into chunks of at most `capacity` ghosts of the same type.
///
/// Chunks are ordered by type id, then by their first ghost id, and numbered
/// in that order, so the same ghost set always yields the same chunks.
pub fn build_chunks(
    registry: &Registry,
    ghosts: impl IntoIterator<Item = (GhostId, GhostTypeId)>,
    capacity: NonZeroUsize,
) -> SchemaResult<Vec<GhostChunk>> {
    let mut by_type: BTreeMap<GhostTypeId, Vec<GhostId>> = BTreeMap::new();
    for (ghost, type_id) in ghosts {
        by_type.entry(type_id).or_default().push(ghost);
    }

    let mut chunks = Vec::new();
    for (type_id, mut members) in by_type {
        let importance = registry.ghost_type(type_id)?.importance;
        members.sort_unstable();
        members.dedup();
        for group in members.chunks(capacity.get()) {
            chunks.push(GhostChunk {
                id: ChunkId::new(chunks.len() as u32),
                type_id,
                importance,
                ghosts: group.to_vec(),
            });
        }
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema::{ComponentDef, FieldDef, FieldType, GhostTypeDef};

    fn registry() -> Registry {
        let component = || ComponentDef::new("c").field(FieldDef::new("v", FieldType::Bool));
        Registry::builder()
            .ghost_type(GhostTypeDef::new("a").importance(5).component(component()))
            .ghost_type(GhostTypeDef::new("b").component(component()))
            .build()
            .unwrap()
    }

    #[test]
    fn groups_by_type_in_id_order() {
        let registry = registry();
        let a = GhostTypeId::new(0);
        let b = GhostTypeId::new(1);
        let ghosts = [(9, b), (3, a), (1, a), (7, a), (2, b)].map(|(id, t)| (GhostId::new(id), t));
        let chunks = build_chunks(&registry, ghosts, NonZeroUsize::new(2).unwrap()).unwrap();

        let layout: Vec<(u16, Vec<u32>)> = chunks
            .iter()
            .map(|chunk| (chunk.type_id.get(), chunk.ghosts.iter().map(|g| g.raw()).collect()))
            .collect();
        assert_eq!(layout, vec![(0, vec![1, 3]), (0, vec![7]), (1, vec![2, 9])]);
        assert_eq!(chunks[0].importance, 5);
        assert_eq!(chunks[2].importance, 1);
        assert_eq!(chunks[2].id, ChunkId::new(2));
    }

    #[test]
    fn unknown_type_is_an_error() {
        let registry = registry();
        let ghosts = [(GhostId::new(1), GhostTypeId::new(42))];
        assert!(build_chunks(&registry, ghosts, NonZeroUsize::MIN).is_err());
    }
}
