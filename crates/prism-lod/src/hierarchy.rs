//! Resolved LOD group hierarchy: parent chains, depths, nested visibility masks.
//!
//! Parent references come from baked data and are not trusted. On
//! construction every chain is walked once, iteratively; a reference to a
//! missing group is dropped, and a cycle is broken by treating the group that
//! is reached a second time as having no parent. Both cases are logged and the
//! remaining groups resolve normally.

use glam::{Mat4, Vec3};

use crate::group::{LodGroup, LodGroupId, MeshLod};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    Unvisited,
    InProgress,
    Done,
}

/// All LOD groups of a scene with their parent links resolved into a forest.
#[derive(Clone, Debug, Default)]
pub struct LodHierarchy {
    groups: Vec<LodGroup>,
    parents: Vec<Option<LodGroupId>>,
    depths: Vec<u32>,
    world_reference_points: Vec<Vec3>,
    broken_cycles: usize,
}

impl LodHierarchy {
    /// Resolve parent chains of `groups`. Group `i` has id `LodGroupId(i)`.
    pub fn new(groups: Vec<LodGroup>) -> Self {
        let count = groups.len();
        let mut parents: Vec<Option<LodGroupId>> = groups
            .iter()
            .enumerate()
            .map(|(i, group)| match group.parent {
                Some(parent) if parent.index() < count => Some(parent),
                Some(parent) => {
                    tracing::warn!(
                        group = i,
                        parent = parent.0,
                        "LOD group references a missing parent; treating it as a root"
                    );
                    None
                }
                None => None,
            })
            .collect();

        let broken_cycles = break_cycles(&mut parents);
        let depths = compute_depths(&parents);
        let world_reference_points = groups.iter().map(|g| g.local_reference_point).collect();

        Self {
            groups,
            parents,
            depths,
            world_reference_points,
            broken_cycles,
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn group(&self, id: LodGroupId) -> Option<&LodGroup> {
        self.groups.get(id.index())
    }

    pub fn groups(&self) -> &[LodGroup] {
        &self.groups
    }

    /// Parent after resolution (missing parents and cycle-closing links removed).
    pub fn parent_of(&self, id: LodGroupId) -> Option<LodGroupId> {
        self.parents.get(id.index()).copied().flatten()
    }

    /// Number of ancestors of `id` (0 for roots).
    pub fn depth(&self, id: LodGroupId) -> u32 {
        self.depths.get(id.index()).copied().unwrap_or(0)
    }

    /// Topmost ancestor of `id`.
    pub fn root_of(&self, id: LodGroupId) -> LodGroupId {
        let mut current = id;
        while let Some(parent) = self.parent_of(current) {
            current = parent;
        }
        current
    }

    /// Number of parent links dropped to break cycles.
    pub fn broken_cycles(&self) -> usize {
        self.broken_cycles
    }

    /// Recompute world-space reference points from one transform per group.
    /// Groups without a transform keep their previous point.
    pub fn update_world_reference_points(&mut self, group_transforms: &[Mat4]) {
        for ((point, group), transform) in self
            .world_reference_points
            .iter_mut()
            .zip(&self.groups)
            .zip(group_transforms)
        {
            *point = group.world_reference_point(transform);
        }
    }

    pub fn world_reference_point(&self, id: LodGroupId) -> Option<Vec3> {
        self.world_reference_points.get(id.index()).copied()
    }

    /// Parent levels of `parent` under which `child` stays visible.
    ///
    /// Walks up from the child's group until the group directly below
    /// `parent` is found and returns that group's parent mask, restricted to
    /// levels `parent` actually has. Returns 0 if `parent` is not an ancestor.
    pub fn resolve_parent_mask(&self, child: &MeshLod, parent: LodGroupId) -> u8 {
        let Some(parent_group) = self.group(parent) else {
            return 0;
        };
        let active = parent_group.active_level_mask();

        if child.parent_group == Some(parent) && self.parent_of(child.group) == Some(parent) {
            return self
                .group(child.group)
                .map_or(0, |group| group.parent_mask & active);
        }

        let mut current = child.group;
        while let Some(next) = self.parent_of(current) {
            if next == parent {
                return self.groups[current.index()].parent_mask & active;
            }
            current = next;
        }
        0
    }

    /// Distance from `camera` to a group's world reference point, multiplied by `lod_bias`.
    pub fn biased_distance(&self, id: LodGroupId, camera: Vec3, lod_bias: f32) -> f32 {
        self.world_reference_point(id)
            .map_or(f32::INFINITY, |point| point.distance(camera) * lod_bias)
    }
}

/// Remove one link per cycle. Returns the number of links removed.
fn break_cycles(parents: &mut [Option<LodGroupId>]) -> usize {
    let mut state = vec![Visit::Unvisited; parents.len()];
    let mut path = Vec::new();
    let mut broken = 0;

    for start in 0..parents.len() {
        if state[start] != Visit::Unvisited {
            continue;
        }
        path.clear();
        let mut current = Some(start);
        while let Some(index) = current {
            match state[index] {
                Visit::Done => break,
                Visit::InProgress => {
                    tracing::warn!(
                        group = index,
                        "cyclic LOD group parent chain; treating group as a root"
                    );
                    parents[index] = None;
                    broken += 1;
                    break;
                }
                Visit::Unvisited => {
                    state[index] = Visit::InProgress;
                    path.push(index);
                    current = parents[index].map(LodGroupId::index);
                }
            }
        }
        for &index in &path {
            state[index] = Visit::Done;
        }
    }
    broken
}

/// Depth of every node of an acyclic parent forest.
fn compute_depths(parents: &[Option<LodGroupId>]) -> Vec<u32> {
    let mut depths: Vec<Option<u32>> = vec![None; parents.len()];
    let mut chain = Vec::new();

    for start in 0..parents.len() {
        chain.clear();
        let mut known = None;
        let mut current = Some(start);
        while let Some(index) = current {
            if let Some(depth) = depths[index] {
                known = Some(depth);
                break;
            }
            chain.push(index);
            current = parents[index].map(LodGroupId::index);
        }
        // `chain` runs child -> ancestor; its last entry is either a root or
        // the child of a node whose depth is already known.
        let mut depth = known.map_or(0, |d| d + 1);
        for &index in chain.iter().rev() {
            depths[index] = Some(depth);
            depth += 1;
        }
    }
    depths.into_iter().map(|d| d.unwrap_or(0)).collect()
}
