//! Conversion from authoring LOD descriptions to runtime [`LodGroup`] / [`MeshLod`] data.
//!
//! Baking is a pure function of its input: nothing here touches a live scene.
//! Groups that cannot be built are reported as warnings and their meshes are
//! emitted without LOD, so they still render.

use glam::Vec3;

use crate::group::{LodBuildError, LodGroup, LodGroupId, MeshLod};

/// Link from a nested authoring group to its enclosing group.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParentLink {
    /// Index of the parent in the authoring slice.
    pub group: usize,
    /// Parent levels under which this group is visible.
    pub level_mask: u8,
}

/// Authoring-side description of one LOD group.
#[derive(Clone, Debug, PartialEq)]
pub struct LodGroupAuthoring {
    /// Distance-measurement origin in group-local space.
    pub local_reference_point: Vec3,
    /// Object size in local units.
    pub size: f32,
    /// Scale of the group's transform; the largest absolute axis scales `size`.
    pub lossy_scale: Vec3,
    /// Screen-relative transition height per level, ordered from LOD 0.
    pub transition_heights: Vec<f32>,
    /// Number of levels.
    pub level_count: usize,
    /// Enclosing group, for nested LOD.
    pub parent: Option<ParentLink>,
    /// LOD masks of the meshes this group selects between.
    pub meshes: Vec<u8>,
}

impl LodGroupAuthoring {
    /// World-space size used as the numerator of every LOD distance.
    pub fn world_scale(&self) -> f32 {
        self.size * self.lossy_scale.abs().max_element()
    }
}

/// A group that could not be baked.
#[derive(Clone, Debug, PartialEq)]
pub struct BakeWarning {
    /// Index of the offending group in the authoring slice.
    pub authoring_index: usize,
    pub error: LodBuildError,
}

/// One authored mesh after baking.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BakedMesh {
    /// Authoring group the mesh belongs to.
    pub authoring_group: usize,
    /// Runtime LOD data, or `None` when the group was rejected.
    pub lod: Option<MeshLod>,
}

/// Output of [`bake_lod_groups`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BakedLods {
    /// Successfully built groups; `LodGroupId(i)` indexes this vector.
    pub groups: Vec<LodGroup>,
    /// Runtime id of each authoring group, `None` if rejected.
    pub group_ids: Vec<Option<LodGroupId>>,
    /// All authored meshes, in authoring order.
    pub meshes: Vec<BakedMesh>,
    pub warnings: Vec<BakeWarning>,
}

/// Bake a set of authoring groups.
///
/// Parent links are remapped to runtime ids; a link to a rejected or
/// out-of-range group is dropped and the child becomes a root.
pub fn bake_lod_groups(authoring: &[LodGroupAuthoring]) -> BakedLods {
    let mut baked = BakedLods::default();

    for (index, source) in authoring.iter().enumerate() {
        match LodGroup::build(
            source.world_scale(),
            source.local_reference_point,
            &source.transition_heights,
            source.level_count,
        ) {
            Ok(group) => {
                baked.group_ids.push(Some(LodGroupId(baked.groups.len() as u32)));
                baked.groups.push(group);
            }
            Err(error) => {
                tracing::warn!(group = index, %error, "LOD group rejected; meshes render without LOD");
                baked.group_ids.push(None);
                baked.warnings.push(BakeWarning {
                    authoring_index: index,
                    error,
                });
            }
        }
    }

    for (index, source) in authoring.iter().enumerate() {
        let Some(id) = baked.group_ids[index] else {
            continue;
        };
        let parent = source.parent.and_then(|link| {
            let parent_id = baked.group_ids.get(link.group).copied().flatten();
            parent_id.map(|p| (p, link.level_mask))
        });
        if let Some((parent_id, mask)) = parent {
            let group = &mut baked.groups[id.index()];
            *group = group.with_parent(parent_id, mask);
        }
    }

    for (index, source) in authoring.iter().enumerate() {
        let group_id = baked.group_ids[index];
        let parent_group = group_id.and_then(|id| baked.groups[id.index()].parent);
        for &lod_mask in &source.meshes {
            baked.meshes.push(BakedMesh {
                authoring_group: index,
                lod: group_id.map(|group| MeshLod {
                    group,
                    parent_group,
                    lod_mask,
                }),
            });
        }
    }

    baked
}
