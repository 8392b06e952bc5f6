//! Hand-off of per-chunk culling state to GPU batching.

use prism_math::Aabb;

use crate::bitset::InstanceBits128;
use crate::partition::PartitionKey;
use crate::query::{RenderableQuery, require_record};
use crate::record::{ChunkCullingFlags, ChunkCullingRecord};
use crate::CullingStore;

/// Debug switches for one frame of batch export.
///
/// Owned by the caller, passed into the export and cleared with
/// [`take`](Self::take) once the frame is done.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchDebugOptions {
    /// Export every renderable chunk, changed or not.
    pub force_rebuild_all_batches: bool,
    /// Mark every exported chunk as needing an instance data upload.
    pub force_instance_data_upload: bool,
}

impl BatchDebugOptions {
    /// Return the current options and reset them to off.
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    pub fn any(&self) -> bool {
        self.force_rebuild_all_batches || self.force_instance_data_upload
    }
}

/// Everything the batching side needs about one chunk.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChunkBatchInfo {
    /// Store index of the chunk.
    pub chunk: usize,
    pub partition: PartitionKey,
    pub offset_in_batch: u32,
    pub count: usize,
    pub flags: ChunkCullingFlags,
    pub flipped_winding: InstanceBits128,
    pub instance_lod_enabled: InstanceBits128,
    pub world_bounds: Aabb,
    /// Per-instance data (transforms) changed since the last export.
    pub needs_instance_upload: bool,
}

impl ChunkBatchInfo {
    pub fn per_object_motion(&self) -> bool {
        self.flags.contains(ChunkCullingFlags::PER_OBJECT_MOTION)
    }
}

#[derive(Clone, Copy, Debug)]
struct Exported {
    change_version: u64,
    count: usize,
    record: ChunkCullingRecord,
}

/// Remembers what each chunk looked like when it was last exported.
#[derive(Debug, Default)]
pub struct BatchExporter {
    exported: Vec<Option<Exported>>,
}

impl BatchExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget all export history so the next export includes every chunk.
    pub fn invalidate(&mut self) {
        self.exported.clear();
    }

    /// Collect batch info for every renderable chunk whose instance data or
    /// record changed since it was last exported.
    ///
    /// # Panics
    ///
    /// Panics if a renderable chunk has no culling record.
    pub fn export_batches(
        &mut self,
        store: &CullingStore,
        query: &RenderableQuery,
        options: &BatchDebugOptions,
    ) -> Vec<ChunkBatchInfo> {
        let _span = tracing::debug_span!("export_batches").entered();
        debug_assert!(
            store.is_metadata_settled(),
            "batch export ran before chunk structure maintenance"
        );
        self.exported.resize(store.chunk_count(), None);

        let mut infos = Vec::new();
        for (index, chunk) in store.chunks().iter().enumerate() {
            if !query.matches(chunk) {
                self.exported[index] = None;
                continue;
            }
            let record = *require_record(chunk.meta(), index);
            let current = Exported {
                change_version: chunk.change_version(),
                count: chunk.count(),
                record,
            };

            let instances_changed = match &self.exported[index] {
                Some(last) => {
                    last.change_version != current.change_version || last.count != current.count
                }
                None => true,
            };
            let record_changed = self.exported[index].is_none_or(|last| last.record != record);
            if !(instances_changed || record_changed || options.force_rebuild_all_batches) {
                continue;
            }

            let archetype = chunk.archetype();
            infos.push(ChunkBatchInfo {
                chunk: index,
                partition: PartitionKey::from_shared(archetype.components, &archetype.shared),
                offset_in_batch: record.offset_in_batch,
                count: current.count,
                flags: record.flags,
                flipped_winding: record.flipped_winding,
                instance_lod_enabled: record.instance_lod_enabled,
                world_bounds: chunk.chunk_world_bounds(),
                needs_instance_upload: instances_changed || options.force_instance_data_upload,
            });
            self.exported[index] = Some(current);
        }

        if options.any() {
            tracing::debug!(
                exported = infos.len(),
                force_rebuild = options.force_rebuild_all_batches,
                force_upload = options.force_instance_data_upload,
                "batch export with debug overrides"
            );
        }
        infos
    }
}
