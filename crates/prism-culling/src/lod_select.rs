//! Per-instance LOD visibility.
//!
//! Each pass first resolves one level per LOD group ([`LodSelectionState`]),
//! then decides, instance by instance, whether the mesh the instance draws
//! belongs to that level. Group distances are measured from the group's world
//! reference point, so the hierarchy's reference points must be up to date
//! before the pass runs.

use glam::Vec3;
use prism_lod::{LodGroupId, LodHierarchy, MeshLod};
use prism_math::encode_ceil;
use rayon::prelude::*;

use crate::bitset::InstanceBits128;
use crate::query::{RenderableQuery, require_record};
use crate::record::ChunkCullingFlags;
use crate::CullingStore;

/// Camera and tuning inputs of one selection pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LodSelectionSettings {
    pub camera_position: Vec3,
    /// Multiplier applied to measured distances. Values above 1 switch to
    /// coarser levels sooner.
    pub lod_bias: f32,
    /// Show only the coarsest level of every group.
    pub force_lowest_lod: bool,
    /// World units the camera may move past a threshold before a group
    /// leaves its previous level.
    pub movement_grace_distance: f32,
}

impl Default for LodSelectionSettings {
    fn default() -> Self {
        Self {
            camera_position: Vec3::ZERO,
            lod_bias: 1.0,
            force_lowest_lod: false,
            movement_grace_distance: 0.0,
        }
    }
}

/// Totals from one selection pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LodSelectionReport {
    pub chunks: usize,
    /// Instances that take part in LOD selection.
    pub lod_instances: usize,
    /// Of those, instances enabled at the current level.
    pub enabled_lod_instances: usize,
    /// Chunks whose forcing state differs from their previous pass.
    pub forcing_changed: usize,
}

impl std::ops::Add for LodSelectionReport {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            chunks: self.chunks + other.chunks,
            lod_instances: self.lod_instances + other.lod_instances,
            enabled_lod_instances: self.enabled_lod_instances + other.enabled_lod_instances,
            forcing_changed: self.forcing_changed + other.forcing_changed,
        }
    }
}

/// The level every LOD group shows, kept between passes for hysteresis.
///
/// A group shows at most one level, so two meshes of the same group are never
/// enabled together.
#[derive(Clone, Debug, Default)]
pub struct LodSelectionState {
    levels: Vec<Option<u8>>,
    /// Every ancestor of the group shows a level the group is nested under.
    admitted: Vec<bool>,
    has_history: bool,
}

impl LodSelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Level shown by `group`, `None` when it is culled or unknown.
    pub fn level(&self, group: LodGroupId) -> Option<u8> {
        self.levels.get(group.index()).copied().flatten()
    }

    pub fn is_admitted(&self, group: LodGroupId) -> bool {
        self.admitted.get(group.index()).copied().unwrap_or(false)
    }

    /// Forget the previous levels; the next pass selects without hysteresis.
    pub fn reset(&mut self) {
        self.levels.clear();
        self.admitted.clear();
        self.has_history = false;
    }

    /// Select the level of every group in `hierarchy`.
    ///
    /// Hysteresis applies only when the previous pass resolved the same
    /// number of groups.
    pub fn resolve(&mut self, hierarchy: &LodHierarchy, settings: &LodSelectionSettings) {
        let history = self.has_history && self.levels.len() == hierarchy.len();
        let grace = settings.movement_grace_distance * settings.lod_bias;

        let levels: Vec<Option<u8>> = hierarchy
            .groups()
            .iter()
            .enumerate()
            .map(|(index, group)| {
                if settings.force_lowest_lod {
                    return group.coarsest_level();
                }
                let distance = hierarchy.biased_distance(
                    LodGroupId(index as u32),
                    settings.camera_position,
                    settings.lod_bias,
                );
                if history {
                    group.select_level_with_grace(distance, self.levels[index], grace)
                } else {
                    group.select_level(distance)
                }
            })
            .collect();

        self.admitted = (0..levels.len())
            .map(|index| ancestors_admit(hierarchy, &levels, LodGroupId(index as u32)))
            .collect();
        self.levels = levels;
        self.has_history = true;
    }

    /// Whether `mesh` is drawn at the resolved levels.
    pub fn shows(&self, hierarchy: &LodHierarchy, mesh: &MeshLod) -> bool {
        let Some(level) = self.level(mesh.group) else {
            return false;
        };
        if mesh.lod_mask & (1 << level) == 0 {
            return false;
        }
        match hierarchy.parent_of(mesh.group) {
            None => true,
            Some(parent) => {
                let mask = hierarchy.resolve_parent_mask(mesh, parent);
                self.level(parent).is_some_and(|l| mask & (1 << l) != 0)
                    && self.is_admitted(parent)
            }
        }
    }
}

fn ancestors_admit(hierarchy: &LodHierarchy, levels: &[Option<u8>], group: LodGroupId) -> bool {
    let mut current = group;
    while let Some(parent) = hierarchy.parent_of(current) {
        let mask = hierarchy.group(current).map_or(0, |g| g.parent_mask);
        match levels[parent.index()] {
            Some(level) if mask & (1 << level) != 0 => current = parent,
            _ => return false,
        }
    }
    true
}

/// Rewrite `instance_lod_enabled` and `HAS_LOD_DATA` for every renderable chunk.
///
/// Group levels are resolved into `state` first, with `state`'s previous
/// levels as the hysteresis reference. `meshes` is indexed by each instance's `mesh_lod`. Instances without one,
/// or with an index outside `meshes`, are always enabled.
///
/// # Panics
///
/// Panics if a renderable chunk has no culling record.
pub fn select_lods(
    store: &mut CullingStore,
    query: &RenderableQuery,
    hierarchy: &LodHierarchy,
    meshes: &[MeshLod],
    state: &mut LodSelectionState,
    settings: &LodSelectionSettings,
) -> LodSelectionReport {
    let _span = tracing::debug_span!("select_lods").entered();
    debug_assert!(
        store.is_metadata_settled(),
        "LOD selection ran before chunk structure maintenance"
    );
    let forced = u8::from(settings.force_lowest_lod);
    let grace = encode_ceil(settings.movement_grace_distance);
    state.resolve(hierarchy, settings);
    let state = &*state;

    let report = store
        .chunks_mut()
        .par_iter_mut()
        .enumerate()
        .filter(|(_, chunk)| query.matches(chunk))
        .map(|(index, chunk)| {
            let arrays = chunk.arrays_mut();
            let record = require_record(arrays.meta, index);

            let mut report = LodSelectionReport {
                chunks: 1,
                ..Default::default()
            };
            let mut enabled = InstanceBits128::empty();
            for (slot, lod) in arrays.mesh_lod.iter().enumerate() {
                let mesh = lod.and_then(|i| meshes.get(i as usize));
                let visible = match mesh {
                    Some(mesh) => {
                        let visible = state.shows(hierarchy, mesh);
                        report.lod_instances += 1;
                        report.enabled_lod_instances += usize::from(visible);
                        visible
                    }
                    None => true,
                };
                enabled.set(slot, visible);
            }

            record.instance_lod_enabled = enabled;
            record.movement_grace_distance = grace;
            record
                .flags
                .set(ChunkCullingFlags::HAS_LOD_DATA, report.lod_instances > 0);
            if record.force_low_lod_previous != forced {
                report.forcing_changed = 1;
                record.force_low_lod_previous = forced;
            }
            report
        })
        .reduce(LodSelectionReport::default, |a, b| a + b);

    tracing::trace!(
        chunks = report.chunks,
        lod_instances = report.lod_instances,
        enabled = report.enabled_lod_instances,
        "LOD selection done"
    );
    report
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
