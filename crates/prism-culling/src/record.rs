//! Per-chunk culling metadata, laid out for direct upload.

use crate::bitset::InstanceBits128;

/// Chunk-level culling flags.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ChunkCullingFlags(u8);

impl ChunkCullingFlags {
    /// At least one instance takes part in LOD selection.
    pub const HAS_LOD_DATA: ChunkCullingFlags = ChunkCullingFlags(1 << 0);
    /// Instances are culled individually against their world bounds.
    pub const INSTANCE_CULLING: ChunkCullingFlags = ChunkCullingFlags(1 << 1);
    /// Instances need individual motion vectors.
    pub const PER_OBJECT_MOTION: ChunkCullingFlags = ChunkCullingFlags(1 << 2);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, flag: ChunkCullingFlags) -> bool {
        self.0 & flag.0 == flag.0
    }

    pub fn insert(&mut self, flag: ChunkCullingFlags) {
        self.0 |= flag.0;
    }

    pub fn remove(&mut self, flag: ChunkCullingFlags) {
        self.0 &= !flag.0;
    }

    /// Insert or remove `flag` depending on `value`.
    pub fn set(&mut self, flag: ChunkCullingFlags, value: bool) {
        if value {
            self.insert(flag);
        } else {
            self.remove(flag);
        }
    }
}

/// Culling metadata owned by one chunk.
///
/// Attached and detached only by
/// [`ChunkStructureMaintainer`](crate::ChunkStructureMaintainer). The two
/// bitsets follow the [`InstanceBits128`] contract: only bits below the
/// chunk's instance count are meaningful.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ChunkCullingRecord {
    /// Slot offset of the chunk inside its GPU batch.
    pub offset_in_batch: u32,
    /// Extra LOD/cull margin, fixed-point (see `prism_math::encode_ceil`).
    pub movement_grace_distance: u16,
    pub flags: ChunkCullingFlags,
    /// LOD forcing state of the previous selection pass (0 or 1).
    pub force_low_lod_previous: u8,
    /// Bit `i` set when instance `i` is visible at its currently selected LOD.
    pub instance_lod_enabled: InstanceBits128,
    /// Bit `i` set when instance `i` has a mirroring (negative determinant) transform.
    pub flipped_winding: InstanceBits128,
}

static_assertions::assert_eq_size!(ChunkCullingRecord, [u8; 40]);
static_assertions::const_assert_eq!(std::mem::align_of::<ChunkCullingRecord>(), 8);

impl ChunkCullingRecord {
    /// A cleared record carrying the given movement grace distance.
    pub fn new(movement_grace_distance: u16) -> Self {
        Self {
            movement_grace_distance,
            ..Self::default()
        }
    }

    pub fn has_per_object_motion(&self) -> bool {
        self.flags.contains(ChunkCullingFlags::PER_OBJECT_MOTION)
    }

    pub fn has_lod_data(&self) -> bool {
        self.flags.contains(ChunkCullingFlags::HAS_LOD_DATA)
    }
}
