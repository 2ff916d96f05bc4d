//! Chunk prioritization.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::num::NonZeroUsize;

use codec::GhostId;
use schema::{GhostTypeId, Registry, SchemaResult};
use tick::NetworkTick;

use crate::chunk::{build_chunks, ChunkId, GhostChunk};

/// Per-connection send history used to age chunks.
#[derive(Debug, Clone, Default)]
pub struct SendAges {
    last_sent: HashMap<GhostId, NetworkTick>,
    relevant_since: HashMap<GhostId, NetworkTick>,
}

impl SendAges {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts aging `ghost` from `tick` if it was not already tracked.
    pub fn observe(&mut self, ghost: GhostId, tick: NetworkTick) {
        self.relevant_since.entry(ghost).or_insert(tick);
    }

    /// Stops tracking `ghost`.
    pub fn forget(&mut self, ghost: GhostId) {
        self.last_sent.remove(&ghost);
        self.relevant_since.remove(&ghost);
    }

    #[must_use]
    pub fn is_tracked(&self, ghost: GhostId) -> bool {
        self.relevant_since.contains_key(&ghost)
    }

    /// Records that every listed ghost reached the client at `tick`.
    pub fn mark_sent<'a>(&mut self, ghosts: impl IntoIterator<Item = &'a GhostId>, tick: NetworkTick) {
        for ghost in ghosts {
            self.last_sent.insert(*ghost, tick);
        }
    }

    #[must_use]
    pub fn last_sent(&self, ghost: GhostId) -> Option<NetworkTick> {
        self.last_sent.get(&ghost).copied()
    }

    /// Ticks since `ghost` was last sent, or since it became relevant; at least 1.
    #[must_use]
    pub fn ghost_age(&self, ghost: GhostId, tick: NetworkTick) -> u32 {
        self.last_sent
            .get(&ghost)
            .or_else(|| self.relevant_since.get(&ghost))
            .map_or(1, |since| tick.ticks_since(*since).max(1) as u32)
    }

    /// Age of the stalest tracked member of `chunk`; 0 if none is tracked.
    #[must_use]
    pub fn chunk_age(&self, chunk: &GhostChunk, tick: NetworkTick) -> u32 {
        chunk
            .ghosts
            .iter()
            .filter(|ghost| self.is_tracked(**ghost))
            .map(|ghost| self.ghost_age(*ghost, tick))
            .max()
            .unwrap_or(0)
    }
}

/// A chunk with its score for one connection and tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoredChunk {
    pub index: usize,
    pub id: ChunkId,
    pub score: u64,
    pub age: u32,
}

/// Orders chunks by `importance × age × scale`.
///
/// Higher scores go first; ties go to the older chunk, then the lower chunk
/// id. Because age grows every tick a chunk is not sent, any chunk with a
/// non-zero scale is eventually scheduled.
#[derive(Debug, Clone)]
pub struct ImportanceScheduler {
    chunk_capacity: NonZeroUsize,
    chunks: Vec<GhostChunk>,
}

impl ImportanceScheduler {
    #[must_use]
    pub const fn new(chunk_capacity: NonZeroUsize) -> Self {
        Self {
            chunk_capacity,
            chunks: Vec::new(),
        }
    }

    /// Recomputes chunk membership. Call only between ticks.
    pub fn rebuild_chunks(
        &mut self,
        registry: &Registry,
        ghosts: impl IntoIterator<Item = (GhostId, GhostTypeId)>,
    ) -> SchemaResult<()> {
        self.chunks = build_chunks(registry, ghosts, self.chunk_capacity)?;
        Ok(())
    }

    #[must_use]
    pub fn chunks(&self) -> &[GhostChunk] {
        &self.chunks
    }

    /// Scores every chunk with at least one tracked ghost, best first.
    ///
    /// `scale` maps a chunk to its connection-specific multiplier; chunks
    /// scaled to zero are left out.
    pub fn prioritize(
        &self,
        tick: NetworkTick,
        ages: &SendAges,
        mut scale: impl FnMut(&GhostChunk) -> u32,
    ) -> Vec<ScoredChunk> {
        let mut scored: Vec<ScoredChunk> = self
            .chunks
            .iter()
            .enumerate()
            .filter_map(|(index, chunk)| {
                let age = ages.chunk_age(chunk, tick);
                let scale = scale(chunk);
                if age == 0 || scale == 0 {
                    return None;
                }
                Some(ScoredChunk {
                    index,
                    id: chunk.id,
                    score: u64::from(chunk.importance) * u64::from(age) * u64::from(scale),
                    age,
                })
            })
            .collect();
        scored.sort_by(compare);
        scored
    }
}

fn compare(a: &ScoredChunk, b: &ScoredChunk) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| b.age.cmp(&a.age))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use schema::{ComponentDef, FieldDef, FieldType, GhostTypeDef};

    fn registry() -> Registry {
        let component = || ComponentDef::new("c").field(FieldDef::new("v", FieldType::Bool));
        Registry::builder()
            .ghost_type(GhostTypeDef::new("boss").importance(1000).component(component()))
            .ghost_type(GhostTypeDef::new("pebble").importance(1).component(component()))
            .build()
            .unwrap()
    }

    fn t(index: u32) -> NetworkTick {
        NetworkTick::new(index)
    }

    #[test]
    fn importance_then_age_then_id() {
        let registry = registry();
        let mut scheduler = ImportanceScheduler::new(NonZeroUsize::MIN);
        let ghosts = [(1, 0), (2, 1), (3, 1)].map(|(id, ty)| (GhostId::new(id), GhostTypeId::new(ty)));
        scheduler.rebuild_chunks(&registry, ghosts).unwrap();

        let mut ages = SendAges::new();
        for (ghost, _) in ghosts {
            ages.observe(ghost, t(10));
        }
        ages.mark_sent([GhostId::new(3)].iter(), t(12));

        let order: Vec<u32> = scheduler
            .prioritize(t(14), &ages, |_| 1)
            .iter()
            .map(|chunk| chunk.id.raw())
            .collect();
        // boss: 1000*4; pebble 2: 1*4; pebble 3: 1*2.
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn equal_scores_prefer_older_then_lower_id() {
        let registry = registry();
        let mut scheduler = ImportanceScheduler::new(NonZeroUsize::MIN);
        let ghosts = [(5, 1), (6, 1), (7, 1)].map(|(id, ty)| (GhostId::new(id), GhostTypeId::new(ty)));
        scheduler.rebuild_chunks(&registry, ghosts).unwrap();
        let mut ages = SendAges::new();
        for (ghost, _) in ghosts {
            ages.observe(ghost, t(1));
        }
        ages.mark_sent([GhostId::new(5)].iter(), t(6));

        // Ghost 5 has age 5 with scale 2, ghosts 6 and 7 age 10 with scale 1.
        let scored = scheduler.prioritize(t(11), &ages, |chunk| if chunk.id.raw() == 0 { 2 } else { 1 });
        let order: Vec<u32> = scored.iter().map(|chunk| chunk.id.raw()).collect();
        assert_eq!(order, vec![1, 2, 0]);
        assert_eq!(scored[0].score, scored[2].score);
    }

    #[test]
    fn untracked_and_zero_scaled_chunks_skipped() {
        let registry = registry();
        let mut scheduler = ImportanceScheduler::new(NonZeroUsize::MIN);
        let ghosts = [(1, 0), (2, 1)].map(|(id, ty)| (GhostId::new(id), GhostTypeId::new(ty)));
        scheduler.rebuild_chunks(&registry, ghosts).unwrap();
        let mut ages = SendAges::new();
        ages.observe(GhostId::new(2), t(1));
        assert_eq!(scheduler.prioritize(t(3), &ages, |_| 1).len(), 1);
        assert!(scheduler.prioritize(t(3), &ages, |_| 0).is_empty());
    }

    #[test]
    fn age_is_at_least_one() {
        let mut ages = SendAges::new();
        ages.observe(GhostId::new(1), t(20));
        assert_eq!(ages.ghost_age(GhostId::new(1), t(20)), 1);
        assert_eq!(ages.ghost_age(GhostId::new(1), t(25)), 5);
    }

    proptest! {
        #[test]
        fn order_is_total_and_repeatable(
            scales in proptest::collection::vec(0u32..5, 8),
            sent in proptest::collection::vec(1u32..20, 8),
        ) {
            let registry = registry();
            let mut scheduler = ImportanceScheduler::new(NonZeroUsize::MIN);
            let ghosts: Vec<_> = (1..=8u32)
                .map(|id| (GhostId::new(id), GhostTypeId::new((id % 2) as u16)))
                .collect();
            scheduler.rebuild_chunks(&registry, ghosts.iter().copied()).unwrap();
            let mut ages = SendAges::new();
            for (index, (ghost, _)) in ghosts.iter().enumerate() {
                ages.observe(*ghost, t(1));
                ages.mark_sent([*ghost].iter(), t(sent[index]));
            }
            let scale = |chunk: &GhostChunk| scales[chunk.id.raw() as usize % scales.len()];

            let first = scheduler.prioritize(t(30), &ages, scale);
            let second = scheduler.prioritize(t(30), &ages, scale);
            prop_assert_eq!(&first, &second);
            for pair in first.windows(2) {
                prop_assert_ne!(compare(&pair[0], &pair[1]), Ordering::Greater);
                prop_assert_ne!(pair[0].id, pair[1].id);
            }
            let expected = scheduler
                .chunks()
                .iter()
                .filter(|chunk| scale(chunk) > 0)
                .count();
            prop_assert_eq!(first.len(), expected);
        }
    }
}
