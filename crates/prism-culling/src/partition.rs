//! Batch partitioning: which chunks may share a GPU draw batch.

use std::hash::{Hash, Hasher};

use prism_chunk::{CHUNK_CAPACITY, ComponentSet, SharedComponents};
use rustc_hash::{FxHashMap, FxHasher};

use crate::query::{RenderableQuery, require_record};
use crate::CullingStore;

/// Everything that keeps instances out of the same batch.
///
/// Chunks with different keys never share a batch. Keys order by component
/// set, then render filter, then partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    pub components: ComponentSet,
    pub render_filter: u32,
    pub partition: u64,
}

impl PartitionKey {
    pub fn new(components: ComponentSet, render_filter: u32, partition: u64) -> Self {
        Self {
            components,
            render_filter,
            partition,
        }
    }

    pub fn from_shared(components: ComponentSet, shared: &SharedComponents) -> Self {
        Self::new(components, shared.render_filter, shared.partition)
    }

    /// Compact hash of the key, for logs and debug labels. Not unique.
    pub fn digest(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// One batch and the chunks assigned to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchPartition {
    pub key: PartitionKey,
    /// Store indices of the member chunks, in slot order.
    pub chunks: Vec<usize>,
}

impl BatchPartition {
    /// Instance slots reserved by this batch.
    pub fn instance_capacity(&self) -> usize {
        self.chunks.len() * CHUNK_CAPACITY
    }
}

/// Group renderable chunks by partition key and write each chunk's
/// `offset_in_batch`.
///
/// Every chunk reserves a full [`CHUNK_CAPACITY`] run of slots, so a chunk's
/// offset stays valid while its instance count changes. Partitions are
/// returned sorted by key.
///
/// # Panics
///
/// Panics if a renderable chunk has no culling record.
pub fn assign_batches(store: &mut CullingStore, query: &RenderableQuery) -> Vec<BatchPartition> {
    let _span = tracing::debug_span!("assign_batches").entered();
    let mut partitions: FxHashMap<PartitionKey, Vec<usize>> = FxHashMap::default();

    for (index, chunk) in store.chunks_mut().iter_mut().enumerate() {
        if !query.matches(chunk) {
            continue;
        }
        let archetype = chunk.archetype();
        let key = PartitionKey::from_shared(archetype.components, &archetype.shared);
        let members = partitions.entry(key).or_default();
        let record = require_record(chunk.meta_mut(), index);
        record.offset_in_batch = (members.len() * CHUNK_CAPACITY) as u32;
        members.push(index);
    }

    let mut batches: Vec<BatchPartition> = partitions
        .into_iter()
        .map(|(key, chunks)| BatchPartition { key, chunks })
        .collect();
    batches.sort_unstable_by_key(|batch| batch.key);
    tracing::trace!(batches = batches.len(), "chunks partitioned");
    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_depends_on_every_input() {
        let base = PartitionKey::new(ComponentSet::RENDERABLE, 0, 0);
        assert_eq!(base, PartitionKey::new(ComponentSet::RENDERABLE, 0, 0));
        assert_ne!(base, PartitionKey::new(ComponentSet::RENDERABLE, 1, 0));
        assert_ne!(base, PartitionKey::new(ComponentSet::RENDERABLE, 0, 1));
        assert_ne!(
            base,
            PartitionKey::new(ComponentSet::RENDERABLE | ComponentSet::MESH_LOD, 0, 0)
        );
    }

    #[test]
    fn test_distinct_inputs_are_distinct_keys() {
        // Swapping values between fields must not produce the same key.
        let a = PartitionKey::new(ComponentSet::RENDERABLE, 1, 2);
        let b = PartitionKey::new(ComponentSet::RENDERABLE, 2, 1);
        assert_ne!(a, b);
        assert!(a < b);
        assert_eq!(a.digest(), PartitionKey::new(ComponentSet::RENDERABLE, 1, 2).digest());
    }

    #[test]
    fn test_partitions_split_by_filter_and_sorted() {
        use glam::{Mat4, Vec3};
        use prism_chunk::{ArchetypeKey, InstanceData};
        use prism_math::Aabb;

        use crate::maintainer::ChunkStructureMaintainer;

        let mut store = CullingStore::new();
        for filter in [3, 1, 3] {
            let archetype = ArchetypeKey::new(
                ComponentSet::RENDERABLE,
                SharedComponents {
                    render_filter: filter,
                    partition: 0,
                },
            );
            store.spawn(
                archetype,
                InstanceData {
                    local_to_world: Mat4::IDENTITY,
                    render_bounds: Aabb::new(Vec3::ZERO, Vec3::ONE),
                    mesh_lod: None,
                },
            );
        }
        ChunkStructureMaintainer::default().run(&mut store);
        let batches = assign_batches(&mut store, &RenderableQuery::default());
        let filters: Vec<u32> = batches.iter().map(|b| b.key.render_filter).collect();
        assert_eq!(filters, vec![1, 3]);
        assert_eq!(batches[1].chunks.len(), 1);
    }

    #[test]
    fn test_from_shared_matches_new() {
        let shared = SharedComponents {
            render_filter: 4,
            partition: 99,
        };
        assert_eq!(
            PartitionKey::from_shared(ComponentSet::RENDERABLE, &shared),
            PartitionKey::new(ComponentSet::RENDERABLE, 4, 99)
        );
    }
}
