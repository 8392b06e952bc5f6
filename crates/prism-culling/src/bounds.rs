//! World-space bounds pass and its per-worker accumulator.
//!
//! Every worker owns one [`ThreadLocalAabb`] slot for the whole pass and
//! grows it with the chunks it processes. Slots are cache-line sized and
//! aligned so two workers never write the same line. The slots are reduced
//! into a single world box once the parallel part is done.

use prism_math::Aabb;
use rayon::prelude::*;

use crate::query::{RenderableQuery, require_record};
use crate::{ChunkCullingRecord, CullingStore};

/// Destructive-interference size assumed for padding.
pub const CACHE_LINE_SIZE: usize = 64;

const AABB_FLOATS: usize = 6;
const PADDING_FLOATS: usize = CACHE_LINE_SIZE / std::mem::size_of::<f32>() - AABB_FLOATS;

/// One worker's running bounds, padded to a full cache line.
#[repr(C, align(64))]
#[derive(Clone, Copy, Debug)]
pub struct ThreadLocalAabb {
    pub aabb: Aabb,
    _padding: [f32; PADDING_FLOATS],
}

static_assertions::assert_eq_size!(ThreadLocalAabb, [u8; CACHE_LINE_SIZE]);
static_assertions::const_assert_eq!(std::mem::align_of::<ThreadLocalAabb>(), CACHE_LINE_SIZE);
static_assertions::assert_eq_size!(Aabb, [f32; AABB_FLOATS]);

impl ThreadLocalAabb {
    pub const EMPTY: ThreadLocalAabb = ThreadLocalAabb {
        aabb: Aabb::EMPTY,
        _padding: [0.0; PADDING_FLOATS],
    };
}

impl Default for ThreadLocalAabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Fixed set of per-worker bounds slots.
#[derive(Clone, Debug)]
pub struct ThreadLocalBoundsAccumulator {
    slots: Vec<ThreadLocalAabb>,
}

impl ThreadLocalBoundsAccumulator {
    /// Create one slot per worker. At least one slot is always allocated.
    pub fn new(worker_count: usize) -> Self {
        Self {
            slots: vec![ThreadLocalAabb::EMPTY; worker_count.max(1)],
        }
    }

    /// One slot per thread of the current rayon pool.
    pub fn for_current_pool() -> Self {
        Self::new(rayon::current_num_threads())
    }

    pub fn worker_count(&self) -> usize {
        self.slots.len()
    }

    /// Reset every slot to the empty box.
    pub fn reset(&mut self) {
        self.slots.fill(ThreadLocalAabb::EMPTY);
    }

    /// Grow `slot` to enclose `bounds`.
    pub fn accumulate(&mut self, slot: usize, bounds: &Aabb) {
        self.slots[slot].aabb.include(bounds);
    }

    pub fn slots(&self) -> &[ThreadLocalAabb] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut [ThreadLocalAabb] {
        &mut self.slots
    }

    /// Union of all slots. Empty when nothing was accumulated.
    pub fn reduce(&self) -> Aabb {
        self.slots
            .iter()
            .fold(Aabb::EMPTY, |acc, slot| acc.union(&slot.aabb))
    }
}

/// Recompute per-instance and per-chunk world bounds for every renderable
/// chunk and return the bounds of the whole scene.
///
/// # Panics
///
/// Panics if a renderable chunk has no culling record.
pub fn update_world_bounds(
    store: &mut CullingStore,
    query: &RenderableQuery,
    accumulator: &mut ThreadLocalBoundsAccumulator,
) -> Aabb {
    let _span = tracing::debug_span!("update_world_bounds").entered();
    debug_assert!(
        store.is_metadata_settled(),
        "world bounds pass ran before chunk structure maintenance"
    );
    accumulator.reset();

    let chunks = store.chunks_mut();
    let per_worker = chunks.len().div_ceil(accumulator.worker_count()).max(1);
    accumulator
        .slots_mut()
        .par_iter_mut()
        .zip(chunks.par_chunks_mut(per_worker))
        .enumerate()
        .for_each(|(worker, (slot, batch))| {
            let first = worker * per_worker;
            for (offset, chunk) in batch.iter_mut().enumerate() {
                if !query.matches(chunk) {
                    continue;
                }
                let arrays = chunk.arrays_mut();
                require_record::<&mut ChunkCullingRecord>(arrays.meta, first + offset);

                let mut chunk_bounds = Aabb::EMPTY;
                for ((world, local), matrix) in arrays
                    .world_render_bounds
                    .iter_mut()
                    .zip(arrays.render_bounds)
                    .zip(arrays.local_to_world)
                {
                    *world = local.transformed(matrix);
                    chunk_bounds.include(world);
                }
                *arrays.chunk_world_bounds = chunk_bounds;
                slot.aabb.include(&chunk_bounds);
            }
        });

    let world = accumulator.reduce();
    if world.is_empty() {
        tracing::trace!("world bounds pass found no renderable instances");
    } else {
        tracing::trace!(min = ?world.min, max = ?world.max, "world bounds updated");
    }
    world
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
