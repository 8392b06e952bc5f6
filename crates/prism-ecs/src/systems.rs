//! The culling passes as bevy systems.

use bevy_ecs::prelude::*;
use prism_culling::{
    ChunkFlagsComputer, ChunkStructureMaintainer, LodSelectionSettings, assign_batches,
    select_lods, update_world_bounds,
};

use crate::resources::{
    BatchDebug, BatchExportState, BoundsScratch, ChunkTable, CullingCamera, CullingSettings,
    FilterSettings, FrameOutput, LodState,
};

/// Attach/detach chunk records, then lay chunks out in batches.
pub fn maintain_chunk_structure(
    mut table: ResMut<'_, ChunkTable>,
    settings: Res<'_, CullingSettings>,
    mut output: ResMut<'_, FrameOutput>,
) {
    let maintainer =
        ChunkStructureMaintainer::new(settings.query, settings.movement_grace_distance);
    output.maintenance = maintainer.run(&mut table.store);
    output.partitions = assign_batches(&mut table.store, &settings.query);
}

/// Refresh group reference points and per-instance LOD visibility.
pub fn select_instance_lods(
    mut table: ResMut<'_, ChunkTable>,
    mut lod: ResMut<'_, LodState>,
    camera: Res<'_, CullingCamera>,
    settings: Res<'_, CullingSettings>,
    mut output: ResMut<'_, FrameOutput>,
) {
    let LodState {
        hierarchy,
        meshes,
        group_transforms,
        selection: state,
    } = &mut *lod;
    hierarchy.update_world_reference_points(group_transforms);

    let selection = LodSelectionSettings {
        camera_position: camera.position,
        lod_bias: settings.lod_bias,
        force_lowest_lod: settings.force_lowest_lod,
        movement_grace_distance: settings.movement_grace_distance,
    };
    output.lod = select_lods(
        &mut table.store,
        &settings.query,
        hierarchy,
        meshes,
        state,
        &selection,
    );
}

pub fn compute_flags(
    mut table: ResMut<'_, ChunkTable>,
    filters: Res<'_, FilterSettings>,
    settings: Res<'_, CullingSettings>,
    mut output: ResMut<'_, FrameOutput>,
) {
    output.flagged_chunks =
        ChunkFlagsComputer::new(settings.query).run(&mut table.store, &filters.table);
}

pub fn update_bounds(
    mut table: ResMut<'_, ChunkTable>,
    mut scratch: ResMut<'_, BoundsScratch>,
    settings: Res<'_, CullingSettings>,
    mut output: ResMut<'_, FrameOutput>,
) {
    output.scene_bounds =
        update_world_bounds(&mut table.store, &settings.query, &mut scratch.accumulator);
}

/// Hand changed chunks to batching and clear the frame's debug switches.
pub fn export_chunk_batches(
    table: Res<'_, ChunkTable>,
    mut export: ResMut<'_, BatchExportState>,
    mut debug: ResMut<'_, BatchDebug>,
    settings: Res<'_, CullingSettings>,
    mut output: ResMut<'_, FrameOutput>,
) {
    let options = debug.options.take();
    output.batches = export
        .exporter
        .export_batches(&table.store, &settings.query, &options);
    output.frame += 1;
    tracing::debug!(
        frame = output.frame,
        exported = output.batches.len(),
        renderable = output.maintenance.renderable,
        "culling frame complete"
    );
}
