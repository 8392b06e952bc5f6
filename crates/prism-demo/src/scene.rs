//! Random scene generation.

use bevy_ecs::world::World;
use glam::{Mat4, Quat, Vec3};
use prism_chunk::{ArchetypeKey, ComponentSet, Entity, InstanceData, SharedComponents};
use prism_config::SceneConfig;
use prism_culling::{LodSelectionState, MotionVectorMode, RenderFilterSettings};
use prism_ecs::{ChunkTable, FilterSettings, LodState};
use prism_lod::{LodGroupAuthoring, LodHierarchy, bake_lod_groups};
use prism_math::Aabb;
use rand::Rng;
use rand::rngs::StdRng;

/// Instances placed around each LOD group.
const INSTANCES_PER_GROUP: usize = 32;
/// Half-size of the square the groups are scattered over.
const SCENE_HALF_EXTENT: f32 = 1_000.0;
/// Render filters used by the scene; see [`register_filters`].
const FILTER_COUNT: u32 = 4;

#[derive(Debug, Default)]
pub struct SceneStats {
    pub groups: usize,
    pub rejected_groups: usize,
    pub instances: usize,
    pub mirrored: usize,
    pub entities: Vec<Entity>,
}

/// Fill the world's chunk table, LOD state and filter table.
pub fn populate(
    world: &mut World,
    config: &SceneConfig,
    max_lod_levels: u32,
    rng: &mut StdRng,
) -> SceneStats {
    let group_count = config.instances.div_ceil(INSTANCES_PER_GROUP);
    let authoring: Vec<LodGroupAuthoring> = (0..group_count)
        .map(|_| random_group(rng, max_lod_levels as usize))
        .collect();
    let group_transforms: Vec<Mat4> = (0..group_count)
        .map(|_| {
            Mat4::from_translation(Vec3::new(
                rng.random_range(-SCENE_HALF_EXTENT..SCENE_HALF_EXTENT),
                0.0,
                rng.random_range(-SCENE_HALF_EXTENT..SCENE_HALF_EXTENT),
            ))
        })
        .collect();

    let baked = bake_lod_groups(&authoring);
    let mut stats = SceneStats {
        groups: baked.groups.len(),
        rejected_groups: baked.warnings.len(),
        ..Default::default()
    };

    // Runtime mesh table plus, per authoring group, the indices of its meshes.
    let mut meshes = Vec::new();
    let mut group_meshes: Vec<Vec<Option<u32>>> = vec![Vec::new(); group_count];
    for mesh in &baked.meshes {
        let index = mesh.lod.map(|lod| {
            meshes.push(lod);
            (meshes.len() - 1) as u32
        });
        group_meshes[mesh.authoring_group].push(index);
    }

    let mut runtime_transforms = vec![Mat4::IDENTITY; baked.groups.len()];
    for (authoring_index, id) in baked.group_ids.iter().enumerate() {
        if let Some(id) = id {
            runtime_transforms[id.index()] = group_transforms[authoring_index];
        }
    }

    {
        let mut table = world.resource_mut::<ChunkTable>();
        for i in 0..config.instances {
            let group = i / INSTANCES_PER_GROUP;
            let candidates = &group_meshes[group];
            let mesh_lod = candidates[rng.random_range(0..candidates.len())];

            let mirrored = rng.random_bool(f64::from(config.mirrored_fraction.clamp(0.0, 1.0)));
            stats.mirrored += usize::from(mirrored);
            let data = InstanceData {
                local_to_world: random_instance_transform(rng, &group_transforms[group], mirrored),
                render_bounds: Aabb::from_center_extents(Vec3::ZERO, Vec3::splat(0.5)),
                mesh_lod,
            };

            let mut components = ComponentSet::RENDERABLE;
            if mesh_lod.is_some() {
                components |= ComponentSet::MESH_LOD;
            }
            let archetype = ArchetypeKey::new(
                components,
                SharedComponents {
                    render_filter: rng.random_range(0..FILTER_COUNT),
                    partition: 0,
                },
            );
            stats.entities.push(table.store.spawn(archetype, data));
        }
        stats.instances = table.store.entity_count();
    }

    *world.resource_mut::<LodState>() = LodState {
        hierarchy: LodHierarchy::new(baked.groups),
        meshes,
        group_transforms: runtime_transforms,
        selection: LodSelectionState::new(),
    };
    register_filters(&mut world.resource_mut::<FilterSettings>());
    stats
}

fn random_group(rng: &mut StdRng, max_levels: usize) -> LodGroupAuthoring {
    let level_count = rng.random_range(1..=max_levels.max(1));
    let first_height = rng.random_range(0.3..0.8);
    let transition_heights = (0..level_count)
        .map(|level| first_height / (1 << level) as f32)
        .collect();
    LodGroupAuthoring {
        local_reference_point: Vec3::ZERO,
        size: rng.random_range(1.0..8.0),
        lossy_scale: Vec3::ONE,
        transition_heights,
        level_count,
        parent: None,
        meshes: (0..level_count).map(|level| 1u8 << level).collect(),
    }
}

fn random_instance_transform(rng: &mut StdRng, group: &Mat4, mirrored: bool) -> Mat4 {
    let offset = Vec3::new(
        rng.random_range(-20.0..20.0),
        rng.random_range(0.0..5.0),
        rng.random_range(-20.0..20.0),
    );
    let rotation = Quat::from_rotation_y(rng.random_range(0.0..std::f32::consts::TAU));
    let scale = if mirrored {
        Vec3::new(-1.0, 1.0, 1.0)
    } else {
        Vec3::ONE
    };
    *group * Mat4::from_scale_rotation_translation(scale, rotation, offset)
}

/// Filter 0 uses the default; 1 writes object motion, 2 forces no motion,
/// 3 is left unregistered and falls back to the default.
fn register_filters(filters: &mut FilterSettings) {
    filters.table.insert(0, RenderFilterSettings::default());
    filters.table.insert(
        1,
        RenderFilterSettings {
            motion_mode: MotionVectorMode::Object,
            ..Default::default()
        },
    );
    filters.table.insert(
        2,
        RenderFilterSettings {
            motion_mode: MotionVectorMode::ForceNoMotion,
            cast_shadows: false,
            ..Default::default()
        },
    );
}
