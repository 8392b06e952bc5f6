//! Chunk culling metadata: per-chunk records, world bounds, winding and motion
//! flags, LOD visibility and the batch hand-off built on top of them.
//!
//! Passes run in a fixed order each frame. [`ChunkStructureMaintainer`] goes
//! first and settles which chunks own a [`ChunkCullingRecord`]; every other
//! pass only reads and writes records of chunks matching the same
//! [`RenderableQuery`] and treats a missing record as a fatal error.

mod bitset;
mod bounds;
mod export;
mod filter;
mod flags;
mod gpu_property;
mod lod_select;
mod maintainer;
mod partition;
mod query;
mod record;

pub use bitset::InstanceBits128;
pub use bounds::{
    CACHE_LINE_SIZE, ThreadLocalAabb, ThreadLocalBoundsAccumulator, update_world_bounds,
};
pub use export::{BatchDebugOptions, BatchExporter, ChunkBatchInfo};
pub use filter::{MotionVectorMode, RenderFilterSettings, RenderFilterTable};
pub use flags::{ChunkFlagsComputer, compute_chunk_flags};
pub use gpu_property::{
    GpuProperty, GpuPropertyDesc, GpuPropertyError, GpuPropertyId, GpuPropertyRegistry,
    MotionFlags, ObjectToWorld, WorldToObject,
};
pub use lod_select::{
    LodSelectionReport, LodSelectionSettings, LodSelectionState, select_lods,
};
pub use maintainer::{ChunkStructureMaintainer, MaintenanceReport};
pub use partition::{BatchPartition, PartitionKey, assign_batches};
pub use query::RenderableQuery;
pub use record::{ChunkCullingFlags, ChunkCullingRecord};

/// Instance storage whose chunks carry culling records.
pub type CullingStore = prism_chunk::ChunkStore<ChunkCullingRecord>;
