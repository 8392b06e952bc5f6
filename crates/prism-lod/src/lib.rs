//! Level-of-detail groups: distance thresholds, nested group hierarchies, and baking
//! from authoring descriptions.

mod bake;
mod group;
mod hierarchy;

pub use bake::{BakeWarning, BakedLods, BakedMesh, LodGroupAuthoring, ParentLink, bake_lod_groups};
pub use group::{LodBuildError, LodGroup, LodGroupId, LodRange, MAX_LOD_LEVELS, MeshLod};
pub use hierarchy::LodHierarchy;
