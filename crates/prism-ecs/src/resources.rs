//! Resources shared by the culling systems.

use bevy_ecs::prelude::*;
use glam::{Mat4, Vec3};
use prism_config::CullingConfig;
use prism_culling::{
    BatchDebugOptions, BatchExporter, BatchPartition, ChunkBatchInfo, CullingStore,
    LodSelectionReport, LodSelectionState, MaintenanceReport, RenderFilterTable, RenderableQuery,
    ThreadLocalBoundsAccumulator,
};
use prism_lod::{LodHierarchy, MeshLod};
use prism_math::Aabb;

/// All renderable instance storage.
#[derive(Resource, Default)]
pub struct ChunkTable {
    pub store: CullingStore,
}

/// Render-filter lookup used by the flags pass.
#[derive(Resource, Default)]
pub struct FilterSettings {
    pub table: RenderFilterTable,
}

/// Baked LOD data plus the current transform of every group.
#[derive(Resource)]
pub struct LodState {
    pub hierarchy: LodHierarchy,
    /// Indexed by each instance's `mesh_lod`.
    pub meshes: Vec<MeshLod>,
    /// Indexed by group id.
    pub group_transforms: Vec<Mat4>,
    /// Levels chosen by the previous frame.
    pub selection: LodSelectionState,
}

impl Default for LodState {
    fn default() -> Self {
        Self {
            hierarchy: LodHierarchy::new(Vec::new()),
            meshes: Vec::new(),
            group_transforms: Vec::new(),
            selection: LodSelectionState::new(),
        }
    }
}

#[derive(Resource, Clone, Copy, Debug, Default)]
pub struct CullingCamera {
    pub position: Vec3,
}

/// Per-frame tuning of the culling passes.
#[derive(Resource, Clone, Copy, Debug)]
pub struct CullingSettings {
    pub query: RenderableQuery,
    /// Slots for the bounds pass; 0 means one per rayon thread.
    pub worker_threads: usize,
    /// World units of LOD hysteresis, also stored in every chunk record.
    pub movement_grace_distance: f32,
    pub lod_bias: f32,
    pub force_lowest_lod: bool,
}

impl Default for CullingSettings {
    fn default() -> Self {
        Self::from_config(&CullingConfig::default())
    }
}

impl CullingSettings {
    pub fn from_config(config: &CullingConfig) -> Self {
        Self {
            query: RenderableQuery::default(),
            worker_threads: config.worker_threads,
            movement_grace_distance: config.movement_grace_distance,
            lod_bias: config.lod_bias,
            force_lowest_lod: false,
        }
    }

    pub fn bounds_accumulator(&self) -> ThreadLocalBoundsAccumulator {
        match self.worker_threads {
            0 => ThreadLocalBoundsAccumulator::for_current_pool(),
            n => ThreadLocalBoundsAccumulator::new(n),
        }
    }
}

/// Debug switches for the next export; cleared by it.
#[derive(Resource, Clone, Copy, Debug, Default)]
pub struct BatchDebug {
    pub options: BatchDebugOptions,
}

/// Per-worker bounds slots, reused across frames.
#[derive(Resource)]
pub struct BoundsScratch {
    pub accumulator: ThreadLocalBoundsAccumulator,
}

#[derive(Resource, Default)]
pub struct BatchExportState {
    pub exporter: BatchExporter,
}

/// What the last frame produced.
#[derive(Resource, Debug, Default)]
pub struct FrameOutput {
    /// Frames completed so far.
    pub frame: u64,
    pub maintenance: MaintenanceReport,
    pub partitions: Vec<BatchPartition>,
    pub lod: LodSelectionReport,
    pub flagged_chunks: usize,
    pub scene_bounds: Aabb,
    /// Chunks exported to batching this frame.
    pub batches: Vec<ChunkBatchInfo>,
}
