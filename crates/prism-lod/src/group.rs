//! A single LOD group: per-level distance thresholds split across two 4-lane vectors.

use glam::{Mat4, Vec3, Vec4};

/// Hard cap on LOD levels per group, imposed by the 8-bit level masks.
pub const MAX_LOD_LEVELS: usize = 8;

/// Index of a group inside a [`LodHierarchy`](crate::LodHierarchy).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LodGroupId(pub u32);

impl LodGroupId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Reasons a group cannot be built. These are warnings for the operator: the
/// source object still renders, just without LOD switching.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LodBuildError {
    /// More levels than the level masks can address.
    #[error("LOD group has {count} levels, at most {max} are supported", max = MAX_LOD_LEVELS)]
    TooManyLevels {
        /// Requested level count.
        count: usize,
    },
    /// Fewer transition heights than declared levels.
    #[error("LOD group declares {levels} levels but provides {heights} transition heights")]
    MissingTransitionHeights {
        /// Declared level count.
        levels: usize,
        /// Transition heights supplied.
        heights: usize,
    },
}

/// World-space distance interval in which a mesh LOD is shown: `(min_dist, max_dist]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LodRange {
    pub min_dist: f32,
    pub max_dist: f32,
}

impl LodRange {
    /// Returns `true` if `distance` selects this range.
    pub fn contains(&self, distance: f32) -> bool {
        (self.min_dist == 0.0 || distance > self.min_dist) && distance <= self.max_dist
    }
}

/// A node of the LOD hierarchy.
///
/// `lod_distances0` holds the thresholds for levels 0–3 and `lod_distances1`
/// for levels 4–7. Unused lanes are `+inf`. Level `i` is selected for a
/// distance `d` when `i` is the lowest index with `d <= threshold[i]`.
/// Thresholds are expected to be non-decreasing; this is not enforced.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LodGroup {
    /// Enclosing group, for nested LOD.
    pub parent: Option<LodGroupId>,
    /// Parent levels this group is visible under (bit `i` = parent level `i`).
    pub parent_mask: u8,
    /// Distance-measurement origin in group-local space.
    pub local_reference_point: Vec3,
    pub lod_distances0: Vec4,
    pub lod_distances1: Vec4,
}

impl LodGroup {
    /// Build a root group from transition heights.
    ///
    /// `distance[i] = world_scale / transition_heights[i]` for each of the
    /// `level_count` levels.
    pub fn build(
        world_scale: f32,
        local_reference_point: Vec3,
        transition_heights: &[f32],
        level_count: usize,
    ) -> Result<Self, LodBuildError> {
        if level_count > MAX_LOD_LEVELS {
            return Err(LodBuildError::TooManyLevels { count: level_count });
        }
        if transition_heights.len() < level_count {
            return Err(LodBuildError::MissingTransitionHeights {
                levels: level_count,
                heights: transition_heights.len(),
            });
        }

        let mut distances = [f32::INFINITY; MAX_LOD_LEVELS];
        for (slot, height) in distances.iter_mut().zip(&transition_heights[..level_count]) {
            *slot = world_scale / height;
        }

        Ok(Self {
            parent: None,
            parent_mask: 0,
            local_reference_point,
            lod_distances0: Vec4::from_slice(&distances[0..4]),
            lod_distances1: Vec4::from_slice(&distances[4..8]),
        })
    }

    /// Nest this group under `parent`, visible for the parent levels in `mask`.
    pub fn with_parent(mut self, parent: LodGroupId, mask: u8) -> Self {
        self.parent = Some(parent);
        self.parent_mask = mask;
        self
    }

    /// Threshold for `level`; `+inf` for unused or out-of-range levels.
    pub fn distance(&self, level: usize) -> f32 {
        match level {
            0..4 => self.lod_distances0[level],
            4..8 => self.lod_distances1[level - 4],
            _ => f32::INFINITY,
        }
    }

    /// All eight thresholds in level order.
    pub fn distances(&self) -> [f32; MAX_LOD_LEVELS] {
        let mut out = [0.0; MAX_LOD_LEVELS];
        self.lod_distances0.write_to_slice(&mut out[0..4]);
        self.lod_distances1.write_to_slice(&mut out[4..8]);
        out
    }

    /// Bit `i` set for every level with a finite threshold.
    pub fn active_level_mask(&self) -> u8 {
        self.distances()
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_finite())
            .fold(0u8, |mask, (i, _)| mask | (1 << i))
    }

    /// Lowest level whose threshold is at least `distance`, or `None` when the
    /// distance lies beyond every finite threshold.
    pub fn select_level(&self, distance: f32) -> Option<u8> {
        self.distances()
            .iter()
            .position(|&threshold| threshold.is_finite() && distance <= threshold)
            .map(|level| level as u8)
    }

    /// [`select_level`](Self::select_level) with hysteresis.
    ///
    /// `previous` stays selected while it would still be chosen somewhere
    /// within `grace` of `distance`. Otherwise the plain selection wins.
    pub fn select_level_with_grace(
        &self,
        distance: f32,
        previous: Option<u8>,
        grace: f32,
    ) -> Option<u8> {
        let current = self.select_level(distance);
        if current == previous || grace.is_nan() || grace <= 0.0 {
            return current;
        }
        let nearer = self.select_level((distance - grace).max(0.0));
        let farther = self.select_level(distance + grace);
        if nearer == previous || farther == previous {
            previous
        } else {
            current
        }
    }

    /// Highest level with a finite threshold, or `None` for a group without levels.
    pub fn coarsest_level(&self) -> Option<u8> {
        let active = self.active_level_mask();
        (active != 0).then(|| 7 - active.leading_zeros() as u8)
    }

    /// Distance interval covered by the levels in `lod_mask`.
    ///
    /// Returns `None` for an empty mask.
    pub fn range_for_mask(&self, lod_mask: u8) -> Option<LodRange> {
        if lod_mask == 0 {
            return None;
        }
        let lowest = lod_mask.trailing_zeros() as usize;
        let highest = 7 - lod_mask.leading_zeros() as usize;
        let min_dist = if lowest == 0 {
            0.0
        } else {
            self.distance(lowest - 1)
        };
        Some(LodRange {
            min_dist,
            max_dist: self.distance(highest),
        })
    }

    /// Reference point transformed into world space.
    pub fn world_reference_point(&self, local_to_world: &Mat4) -> Vec3 {
        local_to_world.transform_point3(self.local_reference_point)
    }
}

/// Per-mesh LOD membership.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeshLod {
    /// Group that selects this mesh.
    pub group: LodGroupId,
    /// Parent of `group`, cached to skip the hierarchy lookup for one-level nesting.
    pub parent_group: Option<LodGroupId>,
    /// Levels this mesh represents (a mesh may cover several).
    pub lod_mask: u8,
}
