//! End-to-end runs of the culling passes over a populated store.

use glam::{Mat4, Quat, Vec3};
use prism_chunk::{
    ArchetypeKey, CHUNK_CAPACITY, ComponentSet, Entity, InstanceData, SharedComponents,
};
use prism_culling::{
    BatchDebugOptions, BatchExporter, ChunkFlagsComputer, ChunkStructureMaintainer, CullingStore,
    LodSelectionSettings, LodSelectionState, MotionVectorMode, RenderFilterSettings, RenderFilterTable,
    RenderableQuery, ThreadLocalBoundsAccumulator, assign_batches, select_lods,
    update_world_bounds,
};
use prism_lod::{LodGroupAuthoring, LodHierarchy, ParentLink, bake_lod_groups};
use prism_math::Aabb;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn archetype(render_filter: u32) -> ArchetypeKey {
    ArchetypeKey::new(
        ComponentSet::RENDERABLE,
        SharedComponents {
            render_filter,
            partition: 0,
        },
    )
}

fn unit_instance(local_to_world: Mat4) -> InstanceData {
    InstanceData {
        local_to_world,
        render_bounds: Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5)),
        mesh_lod: None,
    }
}

fn settle(store: &mut CullingStore) {
    ChunkStructureMaintainer::default().run(store);
}

fn random_store(rng: &mut StdRng, count: usize) -> CullingStore {
    let mut store = CullingStore::new();
    for i in 0..count {
        let translation = Vec3::new(
            rng.random_range(-500.0..500.0),
            rng.random_range(-50.0..50.0),
            rng.random_range(-500.0..500.0),
        );
        let scale = if rng.random_bool(0.2) {
            Vec3::new(-1.0, 1.0, 1.0)
        } else {
            Vec3::ONE
        };
        let rotation = Quat::from_rotation_y(rng.random_range(0.0..std::f32::consts::TAU));
        let matrix = Mat4::from_scale_rotation_translation(scale, rotation, translation);
        store.spawn(archetype((i % 3) as u32), unit_instance(matrix));
    }
    store
}

// ---------------------------------------------------------------------------
// Flags
// ---------------------------------------------------------------------------

#[test]
fn test_flipped_winding_scenario() {
    let mut store = CullingStore::new();
    for scale in [
        Vec3::new(-1.0, 1.0, 1.0),
        Vec3::new(2.0, 1.0, 1.0),
        Vec3::new(0.1, 0.1, -0.1),
    ] {
        store.spawn(archetype(0), unit_instance(Mat4::from_scale(scale)));
    }
    settle(&mut store);

    let processed = ChunkFlagsComputer::default().run(&mut store, &RenderFilterTable::default());
    assert_eq!(processed, 1);
    let record = store.chunks()[0].meta().unwrap();
    assert_eq!(record.flipped_winding.bits_below(3), 0b101);
}

#[test]
fn test_flags_pass_is_idempotent() {
    let mut rng = StdRng::seed_from_u64(11);
    let mut store = random_store(&mut rng, 700);
    settle(&mut store);
    let filters = RenderFilterTable::default();
    let computer = ChunkFlagsComputer::default();

    computer.run(&mut store, &filters);
    let first: Vec<_> = store.chunks().iter().map(|c| *c.meta().unwrap()).collect();
    computer.run(&mut store, &filters);
    let second: Vec<_> = store.chunks().iter().map(|c| *c.meta().unwrap()).collect();
    assert_eq!(
        bytemuck::cast_slice::<_, u8>(first.as_slice()),
        bytemuck::cast_slice::<_, u8>(second.as_slice())
    );
}

#[test]
fn test_filter_change_only_touches_motion_flag() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut store = random_store(&mut rng, 300);
    settle(&mut store);
    let computer = ChunkFlagsComputer::default();

    let mut filters = RenderFilterTable::default();
    computer.run(&mut store, &filters);
    let before: Vec<_> = store.chunks().iter().map(|c| *c.meta().unwrap()).collect();
    assert!(before.iter().all(|record| !record.has_per_object_motion()));

    filters.insert(
        1,
        RenderFilterSettings {
            motion_mode: MotionVectorMode::Object,
            ..Default::default()
        },
    );
    computer.run(&mut store, &filters);

    for (chunk, old) in store.chunks().iter().zip(&before) {
        let record = chunk.meta().unwrap();
        let expect_motion = chunk.archetype().shared.render_filter == 1;
        assert_eq!(record.has_per_object_motion(), expect_motion);
        assert_eq!(
            record.flipped_winding.bits_below(chunk.count()),
            old.flipped_winding.bits_below(chunk.count())
        );
    }
}

#[test]
fn test_winding_matches_determinants_everywhere() {
    let mut rng = StdRng::seed_from_u64(5);
    let mut store = random_store(&mut rng, 1000);
    settle(&mut store);
    ChunkFlagsComputer::default().run(&mut store, &RenderFilterTable::default());

    for chunk in store.chunks() {
        let record = chunk.meta().unwrap();
        for (slot, matrix) in chunk.local_to_world().iter().enumerate() {
            assert_eq!(record.flipped_winding.get(slot), matrix.determinant() < 0.0);
        }
    }
}

#[test]
#[should_panic(expected = "no culling record")]
fn test_flags_without_record_panics() {
    let mut store = CullingStore::new();
    store.spawn(archetype(0), unit_instance(Mat4::IDENTITY));
    store.mark_metadata_settled();
    ChunkFlagsComputer::default().run(&mut store, &RenderFilterTable::default());
}

// ---------------------------------------------------------------------------
// Structure
// ---------------------------------------------------------------------------

#[test]
fn test_disabled_chunk_is_skipped_after_detach() {
    let mut store = CullingStore::new();
    let kept = store.spawn(archetype(0), unit_instance(Mat4::IDENTITY));
    let disabled = store.spawn(archetype(0), unit_instance(Mat4::from_scale(Vec3::splat(-1.0))));
    settle(&mut store);

    store.add_components(disabled, ComponentSet::DISABLED).unwrap();
    let report = ChunkStructureMaintainer::default().run(&mut store);
    assert!(!report.changed());
    assert_eq!(report.renderable, 1);

    let processed = ChunkFlagsComputer::default().run(&mut store, &RenderFilterTable::default());
    assert_eq!(processed, 1);
    let location = store.location(disabled).unwrap();
    assert!(!store.chunks()[location.chunk].has_meta());
    let location = store.location(kept).unwrap();
    assert!(store.chunks()[location.chunk].has_meta());
}

#[test]
fn test_emptied_chunk_loses_record() {
    let mut store = CullingStore::new();
    let entity = store.spawn(archetype(0), unit_instance(Mat4::IDENTITY));
    settle(&mut store);
    assert!(store.despawn(entity));

    let report = ChunkStructureMaintainer::default().run(&mut store);
    assert_eq!(report.detached, 1);
    assert!(!store.chunks()[0].has_meta());
}

// ---------------------------------------------------------------------------
// Bounds
// ---------------------------------------------------------------------------

#[test]
fn test_world_bounds_reduce_to_union() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut store = random_store(&mut rng, 2000);
    settle(&mut store);

    let mut results = Vec::new();
    for workers in [1, 3, 8, 64] {
        let mut accumulator = ThreadLocalBoundsAccumulator::new(workers);
        results.push(update_world_bounds(
            &mut store,
            &RenderableQuery::default(),
            &mut accumulator,
        ));
    }

    let mut expected = Aabb::EMPTY;
    for chunk in store.chunks() {
        let mut chunk_bounds = Aabb::EMPTY;
        for (local, matrix) in chunk.render_bounds().iter().zip(chunk.local_to_world()) {
            chunk_bounds.include(&local.transformed(matrix));
        }
        assert_eq!(chunk.chunk_world_bounds(), chunk_bounds);
        expected.include(&chunk_bounds);
    }
    for result in results {
        assert_eq!(result, expected);
    }
}

#[test]
fn test_world_bounds_of_empty_store() {
    let mut store = CullingStore::new();
    settle(&mut store);
    let mut accumulator = ThreadLocalBoundsAccumulator::new(4);
    let bounds = update_world_bounds(&mut store, &RenderableQuery::default(), &mut accumulator);
    assert!(bounds.is_empty());
}

// ---------------------------------------------------------------------------
// LOD
// ---------------------------------------------------------------------------

#[test]
fn test_lod_selection_through_store() {
    let baked = bake_lod_groups(&[LodGroupAuthoring {
        local_reference_point: Vec3::ZERO,
        size: 10.0,
        lossy_scale: Vec3::ONE,
        transition_heights: vec![0.5, 0.25],
        level_count: 2,
        parent: None,
        meshes: vec![0b01, 0b10],
    }]);
    assert!(baked.warnings.is_empty());
    let meshes: Vec<_> = baked.meshes.iter().filter_map(|m| m.lod).collect();
    let mut hierarchy = LodHierarchy::new(baked.groups);
    hierarchy.update_world_reference_points(&[Mat4::IDENTITY]);

    let lod_archetype =
        archetype(0).with_components(ComponentSet::RENDERABLE | ComponentSet::MESH_LOD);
    let mut store = CullingStore::new();
    for mesh_lod in [Some(0), Some(1), None] {
        store.spawn(
            lod_archetype,
            InstanceData {
                mesh_lod,
                ..unit_instance(Mat4::IDENTITY)
            },
        );
    }
    settle(&mut store);
    let query = RenderableQuery::default();
    let mut state = LodSelectionState::new();

    let near = LodSelectionSettings {
        camera_position: Vec3::new(5.0, 0.0, 0.0),
        ..Default::default()
    };
    let report = select_lods(&mut store, &query, &hierarchy, &meshes, &mut state, &near);
    assert_eq!(report.lod_instances, 2);
    assert_eq!(report.enabled_lod_instances, 1);
    let record = store.chunks()[0].meta().unwrap();
    assert!(record.has_lod_data());
    assert_eq!(record.instance_lod_enabled.bits_below(3), 0b101);

    let far = LodSelectionSettings {
        camera_position: Vec3::new(30.0, 0.0, 0.0),
        ..Default::default()
    };
    select_lods(&mut store, &query, &hierarchy, &meshes, &mut state, &far);
    let record = store.chunks()[0].meta().unwrap();
    assert_eq!(record.instance_lod_enabled.bits_below(3), 0b110);

    let forced = LodSelectionSettings {
        force_lowest_lod: true,
        ..near
    };
    let report = select_lods(&mut store, &query, &hierarchy, &meshes, &mut state, &forced);
    assert_eq!(report.forcing_changed, 1);
    let record = store.chunks()[0].meta().unwrap();
    assert_eq!(record.force_low_lod_previous, 1);
    assert_eq!(record.instance_lod_enabled.bits_below(3), 0b110);
}

fn nested_authoring() -> Vec<LodGroupAuthoring> {
    let parent = LodGroupAuthoring {
        local_reference_point: Vec3::ZERO,
        size: 10.0,
        lossy_scale: Vec3::ONE,
        // Thresholds 20, 40, 100.
        transition_heights: vec![0.5, 0.25, 0.1],
        level_count: 3,
        parent: None,
        meshes: vec![0b001, 0b010, 0b100],
    };
    // Detail group shown only while the parent is at level 0.
    let child = LodGroupAuthoring {
        parent: Some(ParentLink {
            group: 0,
            level_mask: 0b001,
        }),
        meshes: vec![0b011, 0b100],
        ..parent.clone()
    };
    vec![parent, child]
}

#[test]
fn test_nested_lod_groups_through_store() {
    let baked = bake_lod_groups(&nested_authoring());
    assert!(baked.warnings.is_empty());
    let meshes: Vec<_> = baked.meshes.iter().filter_map(|m| m.lod).collect();
    assert_eq!(meshes.len(), 5);
    let mut hierarchy = LodHierarchy::new(baked.groups);
    hierarchy.update_world_reference_points(&[Mat4::IDENTITY, Mat4::IDENTITY]);

    let lod_archetype =
        archetype(0).with_components(ComponentSet::RENDERABLE | ComponentSet::MESH_LOD);
    let mut store = CullingStore::new();
    for mesh_lod in 0..5 {
        store.spawn(
            lod_archetype,
            InstanceData {
                mesh_lod: Some(mesh_lod),
                ..unit_instance(Mat4::IDENTITY)
            },
        );
    }
    settle(&mut store);
    let query = RenderableQuery::default();
    let mut state = LodSelectionState::new();
    let enabled = |store: &CullingStore| {
        store.chunks()[0]
            .meta()
            .unwrap()
            .instance_lod_enabled
            .bits_below(5)
    };

    // Parent and child at level 0.
    let near = LodSelectionSettings {
        camera_position: Vec3::new(10.0, 0.0, 0.0),
        ..Default::default()
    };
    let report = select_lods(&mut store, &query, &hierarchy, &meshes, &mut state, &near);
    assert_eq!(report.enabled_lod_instances, 2);
    assert_eq!(enabled(&store), 0b01001);

    // Parent at level 1: the child's level-1 mesh stays hidden.
    let mid = LodSelectionSettings {
        camera_position: Vec3::new(30.0, 0.0, 0.0),
        ..Default::default()
    };
    select_lods(&mut store, &query, &hierarchy, &meshes, &mut state, &mid);
    assert_eq!(enabled(&store), 0b00010);

    // Forced: the parent shows its coarsest level, which hides the child.
    let forced = LodSelectionSettings {
        force_lowest_lod: true,
        ..near
    };
    let report = select_lods(&mut store, &query, &hierarchy, &meshes, &mut state, &forced);
    assert_eq!(report.enabled_lod_instances, 1);
    assert_eq!(enabled(&store), 0b00100);
}

#[test]
fn test_lod_grace_never_enables_two_levels() {
    let baked = bake_lod_groups(&nested_authoring()[..1]);
    let meshes: Vec<_> = baked.meshes.iter().filter_map(|m| m.lod).collect();
    let mut hierarchy = LodHierarchy::new(baked.groups);
    hierarchy.update_world_reference_points(&[Mat4::IDENTITY]);

    let lod_archetype =
        archetype(0).with_components(ComponentSet::RENDERABLE | ComponentSet::MESH_LOD);
    let mut store = CullingStore::new();
    for mesh_lod in 0..3 {
        store.spawn(
            lod_archetype,
            InstanceData {
                mesh_lod: Some(mesh_lod),
                ..unit_instance(Mat4::IDENTITY)
            },
        );
    }
    settle(&mut store);
    let query = RenderableQuery::default();
    let mut state = LodSelectionState::new();

    for x in [15.0, 19.0, 21.0, 22.0, 21.0, 19.0, 18.0, 38.0, 41.0, 42.5, 39.0] {
        let settings = LodSelectionSettings {
            camera_position: Vec3::new(x, 0.0, 0.0),
            movement_grace_distance: 2.0,
            ..Default::default()
        };
        select_lods(&mut store, &query, &hierarchy, &meshes, &mut state, &settings);
        let record = store.chunks()[0].meta().unwrap();
        assert_eq!(
            record.instance_lod_enabled.count_ones_below(3),
            1,
            "camera at {x}"
        );
        assert_eq!(record.movement_grace_distance, 200);
    }
}

// ---------------------------------------------------------------------------
// Batching
// ---------------------------------------------------------------------------

#[test]
fn test_batch_offsets_reserve_full_chunks() {
    let mut store = CullingStore::new();
    for _ in 0..(CHUNK_CAPACITY + 10) {
        store.spawn(archetype(0), unit_instance(Mat4::IDENTITY));
    }
    store.spawn(archetype(1), unit_instance(Mat4::IDENTITY));
    settle(&mut store);

    let batches = assign_batches(&mut store, &RenderableQuery::default());
    assert_eq!(batches.len(), 2);
    let big = batches.iter().find(|b| b.chunks.len() == 2).unwrap();
    assert_eq!(big.instance_capacity(), 2 * CHUNK_CAPACITY);
    let offsets: Vec<u32> = big
        .chunks
        .iter()
        .map(|&i| store.chunks()[i].meta().unwrap().offset_in_batch)
        .collect();
    assert_eq!(offsets, vec![0, CHUNK_CAPACITY as u32]);
}

#[test]
fn test_export_tracks_changes() {
    let mut store = CullingStore::new();
    let entities: Vec<Entity> = (0..(CHUNK_CAPACITY + 1))
        .map(|_| store.spawn(archetype(0), unit_instance(Mat4::IDENTITY)))
        .collect();
    settle(&mut store);
    let query = RenderableQuery::default();
    let mut exporter = BatchExporter::new();
    let mut options = BatchDebugOptions::default();

    let first = exporter.export_batches(&store, &query, &options);
    assert_eq!(first.len(), 2);
    assert!(first.iter().all(|info| info.needs_instance_upload));
    assert!(exporter.export_batches(&store, &query, &options).is_empty());

    store
        .set_local_to_world(entities[0], Mat4::from_translation(Vec3::X))
        .unwrap();
    let changed = exporter.export_batches(&store, &query, &options);
    assert_eq!(changed.len(), 1);
    assert!(changed[0].needs_instance_upload);

    options.force_rebuild_all_batches = true;
    let forced = exporter.export_batches(&store, &query, &options.take());
    assert_eq!(forced.len(), 2);
    assert!(forced.iter().all(|info| !info.needs_instance_upload));
    assert!(exporter.export_batches(&store, &query, &options).is_empty());
}
