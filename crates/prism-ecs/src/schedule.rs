//! Culling schedule, system sets and world setup.

use bevy_ecs::prelude::*;
use bevy_ecs::schedule::ScheduleLabel;
use bevy_ecs::world::error::TryRunScheduleError;

use crate::resources::{
    BatchDebug, BatchExportState, BoundsScratch, ChunkTable, CullingCamera, CullingSettings,
    FilterSettings, FrameOutput, LodState,
};
use crate::systems::{
    compute_flags, export_chunk_batches, maintain_chunk_structure, select_instance_lods,
    update_bounds,
};

/// Label of the schedule that runs one culling frame.
#[derive(ScheduleLabel, Debug, Clone, PartialEq, Eq, Hash)]
pub struct CullingSchedule;

/// Sets for the culling passes, in execution order.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum CullingSet {
    /// Attach/detach chunk records and assign batch offsets.
    Structure,
    /// Per-instance LOD visibility.
    Lod,
    /// Winding and motion flags.
    Flags,
    /// Instance, chunk and scene world bounds.
    Bounds,
    /// Hand-off to GPU batching.
    Export,
}

/// Order the culling sets: `Structure` first, `Export` last.
pub fn configure_culling_ordering(schedule: &mut Schedule) {
    schedule.configure_sets(
        (
            CullingSet::Structure,
            CullingSet::Lod,
            CullingSet::Flags,
            CullingSet::Bounds,
            CullingSet::Export,
        )
            .chain(),
    );
}

/// A schedule with every culling system registered in its set.
pub fn build_culling_schedule() -> Schedule {
    let mut schedule = Schedule::new(CullingSchedule);
    configure_culling_ordering(&mut schedule);
    schedule.add_systems((
        maintain_chunk_structure.in_set(CullingSet::Structure),
        select_instance_lods.in_set(CullingSet::Lod),
        compute_flags.in_set(CullingSet::Flags),
        update_bounds.in_set(CullingSet::Bounds),
        export_chunk_batches.in_set(CullingSet::Export),
    ));
    schedule
}

/// Insert every culling resource with defaults derived from `settings`.
pub fn register_culling_resources(world: &mut World, settings: CullingSettings) {
    world.insert_resource(BoundsScratch {
        accumulator: settings.bounds_accumulator(),
    });
    world.insert_resource(settings);
    world.insert_resource(ChunkTable::default());
    world.insert_resource(FilterSettings::default());
    world.insert_resource(LodState::default());
    world.insert_resource(CullingCamera::default());
    world.insert_resource(BatchDebug::default());
    world.insert_resource(BatchExportState::default());
    world.insert_resource(FrameOutput::default());
}

/// A world holding all culling resources and the culling schedule.
pub fn create_culling_world(settings: CullingSettings) -> World {
    let mut world = World::new();
    register_culling_resources(&mut world, settings);
    world.add_schedule(build_culling_schedule());
    world
}

/// Run one culling frame.
///
/// # Errors
///
/// Returns an error if the world has no [`CullingSchedule`].
pub fn run_frame(world: &mut World) -> Result<(), TryRunScheduleError> {
    world.try_run_schedule(CullingSchedule)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Vec3};
    use prism_chunk::{ArchetypeKey, ComponentSet, InstanceData, SharedComponents};
    use prism_culling::{MotionVectorMode, RenderFilterSettings};
    use prism_lod::{LodGroup, LodGroupId, LodHierarchy, MeshLod};
    use prism_math::Aabb;

    #[derive(Resource, Default)]
    struct ExecutionOrder(Vec<&'static str>);

    fn renderable(render_filter: u32) -> ArchetypeKey {
        ArchetypeKey::new(
            ComponentSet::RENDERABLE,
            SharedComponents {
                render_filter,
                partition: 0,
            },
        )
    }

    fn instance(translation: Vec3, scale: Vec3) -> InstanceData {
        InstanceData {
            local_to_world: Mat4::from_scale_rotation_translation(
                scale,
                glam::Quat::IDENTITY,
                translation,
            ),
            render_bounds: Aabb::new(Vec3::splat(-1.0), Vec3::ONE),
            mesh_lod: None,
        }
    }

    fn settings() -> CullingSettings {
        CullingSettings {
            worker_threads: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_structure_runs_before_everything() {
        let mut world = World::new();
        world.insert_resource(ExecutionOrder::default());

        let mut schedule = Schedule::default();
        configure_culling_ordering(&mut schedule);
        schedule.add_systems((
            (|mut order: ResMut<ExecutionOrder>| order.0.push("export"))
                .in_set(CullingSet::Export),
            (|mut order: ResMut<ExecutionOrder>| order.0.push("bounds"))
                .in_set(CullingSet::Bounds),
            (|mut order: ResMut<ExecutionOrder>| order.0.push("flags"))
                .in_set(CullingSet::Flags),
            (|mut order: ResMut<ExecutionOrder>| order.0.push("lod")).in_set(CullingSet::Lod),
            (|mut order: ResMut<ExecutionOrder>| order.0.push("structure"))
                .in_set(CullingSet::Structure),
        ));
        schedule.run(&mut world);

        let order = &world.resource::<ExecutionOrder>().0;
        assert_eq!(order, &vec!["structure", "lod", "flags", "bounds", "export"]);
    }

    #[test]
    fn test_frame_produces_records_and_bounds() {
        let mut world = create_culling_world(settings());
        {
            let mut table = world.resource_mut::<ChunkTable>();
            table
                .store
                .spawn(renderable(0), instance(Vec3::new(10.0, 0.0, 0.0), Vec3::ONE));
            table.store.spawn(
                renderable(0),
                instance(Vec3::new(-10.0, 0.0, 0.0), Vec3::new(-1.0, 1.0, 1.0)),
            );
        }

        run_frame(&mut world).unwrap();

        let output = world.resource::<FrameOutput>();
        assert_eq!(output.frame, 1);
        assert_eq!(output.maintenance.attached, 1);
        assert_eq!(output.flagged_chunks, 1);
        assert_eq!(output.scene_bounds.min, Vec3::new(-11.0, -1.0, -1.0));
        assert_eq!(output.scene_bounds.max, Vec3::new(11.0, 1.0, 1.0));
        assert_eq!(output.batches.len(), 1);
        assert_eq!(output.batches[0].flipped_winding.bits_below(2), 0b10);
        assert!(!output.batches[0].per_object_motion());
    }

    #[test]
    fn test_unchanged_frame_exports_nothing() {
        let mut world = create_culling_world(settings());
        world
            .resource_mut::<ChunkTable>()
            .store
            .spawn(renderable(0), instance(Vec3::ZERO, Vec3::ONE));

        run_frame(&mut world).unwrap();
        run_frame(&mut world).unwrap();
        let output = world.resource::<FrameOutput>();
        assert_eq!(output.frame, 2);
        assert!(output.batches.is_empty());
        assert!(!output.maintenance.changed());
    }

    #[test]
    fn test_filter_change_exports_motion_flag() {
        let mut world = create_culling_world(settings());
        world
            .resource_mut::<ChunkTable>()
            .store
            .spawn(renderable(5), instance(Vec3::ZERO, Vec3::ONE));
        run_frame(&mut world).unwrap();

        world.resource_mut::<FilterSettings>().table.insert(
            5,
            RenderFilterSettings {
                motion_mode: MotionVectorMode::Object,
                ..Default::default()
            },
        );
        run_frame(&mut world).unwrap();

        let output = world.resource::<FrameOutput>();
        assert_eq!(output.batches.len(), 1);
        assert!(output.batches[0].per_object_motion());
        assert!(!output.batches[0].needs_instance_upload);
    }

    #[test]
    fn test_debug_options_reset_after_frame() {
        let mut world = create_culling_world(settings());
        world
            .resource_mut::<ChunkTable>()
            .store
            .spawn(renderable(0), instance(Vec3::ZERO, Vec3::ONE));
        run_frame(&mut world).unwrap();

        {
            let mut debug = world.resource_mut::<BatchDebug>();
            debug.options.force_rebuild_all_batches = true;
            debug.options.force_instance_data_upload = true;
        }
        run_frame(&mut world).unwrap();
        let output = world.resource::<FrameOutput>();
        assert_eq!(output.batches.len(), 1);
        assert!(output.batches[0].needs_instance_upload);
        assert!(!world.resource::<BatchDebug>().options.any());

        run_frame(&mut world).unwrap();
        assert!(world.resource::<FrameOutput>().batches.is_empty());
    }

    #[test]
    fn test_lod_state_drives_selection() {
        let mut world = create_culling_world(settings());
        let group = LodGroup::build(10.0, Vec3::ZERO, &[0.5, 0.25], 2).unwrap();
        {
            let mut lod = world.resource_mut::<LodState>();
            lod.hierarchy = LodHierarchy::new(vec![group]);
            lod.group_transforms = vec![Mat4::IDENTITY];
            lod.meshes = vec![
                MeshLod {
                    group: LodGroupId(0),
                    parent_group: None,
                    lod_mask: 0b01,
                },
                MeshLod {
                    group: LodGroupId(0),
                    parent_group: None,
                    lod_mask: 0b10,
                },
            ];
        }
        {
            let archetype = renderable(0)
                .with_components(ComponentSet::RENDERABLE | ComponentSet::MESH_LOD);
            let mut table = world.resource_mut::<ChunkTable>();
            for mesh_lod in [0, 1] {
                table.store.spawn(
                    archetype,
                    InstanceData {
                        mesh_lod: Some(mesh_lod),
                        ..instance(Vec3::ZERO, Vec3::ONE)
                    },
                );
            }
        }
        world.resource_mut::<CullingCamera>().position = Vec3::new(0.0, 0.0, 30.0);

        run_frame(&mut world).unwrap();
        let output = world.resource::<FrameOutput>();
        assert_eq!(output.lod.lod_instances, 2);
        assert_eq!(output.batches[0].instance_lod_enabled.bits_below(2), 0b10);
    }

    #[test]
    fn test_run_frame_without_schedule_fails() {
        let mut world = World::new();
        register_culling_resources(&mut world, settings());
        assert!(run_frame(&mut world).is_err());
    }
}
