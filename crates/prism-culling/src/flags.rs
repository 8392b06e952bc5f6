//! Per-chunk winding and motion flags.

use glam::Mat4;
use prism_chunk::ComponentSet;
use rayon::prelude::*;

use crate::bitset::InstanceBits128;
use crate::filter::{RenderFilterSettings, RenderFilterTable};
use crate::query::{RenderableQuery, require_record};
use crate::record::{ChunkCullingFlags, ChunkCullingRecord};
use crate::CullingStore;

/// Derive a chunk's flags from its transforms and filter settings.
///
/// Bit `i` of the winding set is written for every `i < transforms.len()`;
/// higher bits are cleared. The record's other fields are left alone, so
/// running this twice on the same inputs is a no-op.
pub fn compute_chunk_flags(
    record: &mut ChunkCullingRecord,
    components: ComponentSet,
    transforms: &[Mat4],
    settings: &RenderFilterSettings,
) {
    record.flags.set(
        ChunkCullingFlags::PER_OBJECT_MOTION,
        settings.motion_mode.is_per_object(),
    );
    record.flags.set(
        ChunkCullingFlags::INSTANCE_CULLING,
        components.contains(ComponentSet::WORLD_RENDER_BOUNDS),
    );

    let mut flipped = InstanceBits128::empty();
    for (slot, matrix) in transforms.iter().enumerate() {
        flipped.set(slot, matrix.determinant() < 0.0);
    }
    record.flipped_winding = flipped;
}

/// Parallel flags pass over every renderable chunk.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChunkFlagsComputer {
    query: RenderableQuery,
}

impl ChunkFlagsComputer {
    pub fn new(query: RenderableQuery) -> Self {
        Self { query }
    }

    /// Update the record of every renderable chunk. Returns the number of
    /// chunks processed.
    ///
    /// # Panics
    ///
    /// Panics if a renderable chunk has no culling record.
    pub fn run(&self, store: &mut CullingStore, filters: &RenderFilterTable) -> usize {
        let _span = tracing::debug_span!("chunk_flags").entered();
        debug_assert!(
            store.is_metadata_settled(),
            "chunk flags pass ran before chunk structure maintenance"
        );

        let query = self.query;
        store
            .chunks_mut()
            .par_iter_mut()
            .enumerate()
            .filter(|(_, chunk)| query.matches(chunk))
            .map(|(index, chunk)| {
                let arrays = chunk.arrays_mut();
                let record = require_record(arrays.meta, index);
                let settings = filters.resolve(arrays.archetype.shared.render_filter);
                compute_chunk_flags(
                    record,
                    arrays.archetype.components,
                    arrays.local_to_world,
                    settings,
                );
            })
            .count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::MotionVectorMode;
    use glam::Vec3;

    #[test]
    fn test_winding_follows_determinant_sign() {
        let transforms = [
            Mat4::from_scale(Vec3::new(-1.0, 1.0, 1.0)),
            Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0)),
            Mat4::from_scale(Vec3::new(0.1, 0.1, -0.1)),
        ];
        assert!((transforms[2].determinant() + 0.001).abs() < 1e-6);

        let mut record = ChunkCullingRecord::default();
        compute_chunk_flags(
            &mut record,
            ComponentSet::RENDERABLE,
            &transforms,
            &RenderFilterSettings::default(),
        );
        assert_eq!(record.flipped_winding.bits_below(3), 0b101);
    }

    #[test]
    fn test_motion_flag_tracks_filter() {
        let mut record = ChunkCullingRecord::default();
        let object = RenderFilterSettings {
            motion_mode: MotionVectorMode::Object,
            ..Default::default()
        };
        compute_chunk_flags(&mut record, ComponentSet::RENDERABLE, &[], &object);
        assert!(record.has_per_object_motion());

        compute_chunk_flags(
            &mut record,
            ComponentSet::RENDERABLE,
            &[],
            &RenderFilterSettings::default(),
        );
        assert!(!record.has_per_object_motion());
    }

    #[test]
    fn test_instance_culling_needs_world_bounds() {
        let mut record = ChunkCullingRecord::default();
        let settings = RenderFilterSettings::default();
        compute_chunk_flags(&mut record, ComponentSet::RENDERABLE, &[], &settings);
        assert!(record.flags.contains(ChunkCullingFlags::INSTANCE_CULLING));

        compute_chunk_flags(&mut record, ComponentSet::LOCAL_TO_WORLD, &[], &settings);
        assert!(!record.flags.contains(ChunkCullingFlags::INSTANCE_CULLING));
    }

    #[test]
    fn test_compute_is_idempotent() {
        let transforms = [Mat4::IDENTITY, Mat4::from_scale(Vec3::splat(-1.0))];
        let settings = RenderFilterSettings {
            motion_mode: MotionVectorMode::ForceNoMotion,
            ..Default::default()
        };
        let mut record = ChunkCullingRecord::new(40);
        compute_chunk_flags(&mut record, ComponentSet::RENDERABLE, &transforms, &settings);
        let first = record;
        compute_chunk_flags(&mut record, ComponentSet::RENDERABLE, &transforms, &settings);
        assert_eq!(bytemuck::bytes_of(&first), bytemuck::bytes_of(&record));
    }
}
