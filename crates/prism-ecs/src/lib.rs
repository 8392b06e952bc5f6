//! bevy_ecs integration of the culling passes.
//!
//! Culling state lives in [`World`](bevy_ecs::world::World) resources and the
//! passes run as systems grouped into [`CullingSet`]s, ordered so structure
//! maintenance always completes before anything reads chunk records.

mod resources;
mod schedule;
mod systems;

pub use resources::{
    BatchDebug, BatchExportState, BoundsScratch, ChunkTable, CullingCamera, CullingSettings,
    FilterSettings, FrameOutput, LodState,
};
pub use schedule::{
    CullingSchedule, CullingSet, build_culling_schedule, configure_culling_ordering,
    create_culling_world, register_culling_resources, run_frame,
};
pub use systems::{
    compute_flags, export_chunk_batches, maintain_chunk_structure, select_instance_lods,
    update_bounds,
};
