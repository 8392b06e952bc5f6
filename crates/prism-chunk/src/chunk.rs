//! A single fixed-capacity chunk: structure-of-arrays instance storage plus an
//! optional chunk-level metadata record.

use glam::Mat4;
use prism_math::Aabb;

use crate::archetype::ArchetypeKey;
use crate::store::Entity;

/// Maximum number of instances in one chunk.
///
/// Bounded by the 128-bit per-instance bitsets carried in chunk metadata.
pub const CHUNK_CAPACITY: usize = 128;

/// Per-instance values supplied when spawning or moving an instance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InstanceData {
    /// Local-to-world transform.
    pub local_to_world: Mat4,
    /// Bounds in local (mesh) space.
    pub render_bounds: Aabb,
    /// Index of the instance's mesh LOD entry, if it takes part in LOD selection.
    pub mesh_lod: Option<u32>,
}

impl Default for InstanceData {
    fn default() -> Self {
        Self {
            local_to_world: Mat4::IDENTITY,
            render_bounds: Aabb::EMPTY,
            mesh_lod: None,
        }
    }
}

/// Fixed-capacity, archetype-homogeneous block of instances.
///
/// Slot order is stable until a structural change (spawn, despawn, archetype
/// move) touches this chunk. `M` is the chunk-level metadata type; its
/// presence or absence is tracked by the chunk itself.
#[derive(Debug)]
pub struct Chunk<M> {
    archetype: ArchetypeKey,
    pub(crate) entities: Vec<Entity>,
    pub(crate) local_to_world: Vec<Mat4>,
    pub(crate) render_bounds: Vec<Aabb>,
    pub(crate) mesh_lod: Vec<Option<u32>>,
    world_render_bounds: Vec<Aabb>,
    chunk_world_bounds: Aabb,
    pub(crate) change_version: u64,
    meta: Option<M>,
}

/// Split borrow of a chunk: read-only inputs, writable derived data and metadata.
pub struct ChunkArraysMut<'a, M> {
    pub archetype: ArchetypeKey,
    pub entities: &'a [Entity],
    pub local_to_world: &'a [Mat4],
    pub render_bounds: &'a [Aabb],
    pub mesh_lod: &'a [Option<u32>],
    pub world_render_bounds: &'a mut [Aabb],
    pub chunk_world_bounds: &'a mut Aabb,
    pub meta: Option<&'a mut M>,
}

impl<M> Chunk<M> {
    pub(crate) fn new(archetype: ArchetypeKey) -> Self {
        Self {
            archetype,
            entities: Vec::with_capacity(CHUNK_CAPACITY),
            local_to_world: Vec::with_capacity(CHUNK_CAPACITY),
            render_bounds: Vec::with_capacity(CHUNK_CAPACITY),
            mesh_lod: Vec::with_capacity(CHUNK_CAPACITY),
            world_render_bounds: Vec::with_capacity(CHUNK_CAPACITY),
            chunk_world_bounds: Aabb::EMPTY,
            change_version: 0,
            meta: None,
        }
    }

    /// The archetype every instance in this chunk shares.
    pub fn archetype(&self) -> ArchetypeKey {
        self.archetype
    }

    /// Number of occupied slots.
    pub fn count(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entities.len() >= CHUNK_CAPACITY
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn local_to_world(&self) -> &[Mat4] {
        &self.local_to_world
    }

    pub fn render_bounds(&self) -> &[Aabb] {
        &self.render_bounds
    }

    pub fn world_render_bounds(&self) -> &[Aabb] {
        &self.world_render_bounds
    }

    pub fn mesh_lod(&self) -> &[Option<u32>] {
        &self.mesh_lod
    }

    /// Union of all world render bounds, as of the last bounds pass.
    pub fn chunk_world_bounds(&self) -> Aabb {
        self.chunk_world_bounds
    }

    /// Version stamp of the last write to any per-instance array or membership.
    pub fn change_version(&self) -> u64 {
        self.change_version
    }

    // --- chunk metadata (tagged presence) ---

    pub fn has_meta(&self) -> bool {
        self.meta.is_some()
    }

    pub fn meta(&self) -> Option<&M> {
        self.meta.as_ref()
    }

    pub fn meta_mut(&mut self) -> Option<&mut M> {
        self.meta.as_mut()
    }

    /// Attach a metadata record, replacing and returning any previous one.
    pub fn attach_meta(&mut self, meta: M) -> Option<M> {
        self.meta.replace(meta)
    }

    /// Detach and return the metadata record.
    pub fn detach_meta(&mut self) -> Option<M> {
        self.meta.take()
    }

    /// Borrow inputs and outputs of a per-chunk pass at the same time.
    pub fn arrays_mut(&mut self) -> ChunkArraysMut<'_, M> {
        ChunkArraysMut {
            archetype: self.archetype,
            entities: &self.entities,
            local_to_world: &self.local_to_world,
            render_bounds: &self.render_bounds,
            mesh_lod: &self.mesh_lod,
            world_render_bounds: &mut self.world_render_bounds,
            chunk_world_bounds: &mut self.chunk_world_bounds,
            meta: self.meta.as_mut(),
        }
    }

    pub(crate) fn push(&mut self, entity: Entity, data: InstanceData) -> usize {
        debug_assert!(!self.is_full(), "push into a full chunk");
        self.entities.push(entity);
        self.local_to_world.push(data.local_to_world);
        self.render_bounds.push(data.render_bounds);
        self.mesh_lod.push(data.mesh_lod);
        self.world_render_bounds
            .push(data.render_bounds.transformed(&data.local_to_world));
        self.entities.len() - 1
    }

    /// Swap-remove the instance in `slot`. Returns its data and, if another
    /// instance was moved into `slot`, that instance's entity.
    pub(crate) fn swap_remove(&mut self, slot: usize) -> (InstanceData, Option<Entity>) {
        self.entities.swap_remove(slot);
        let data = InstanceData {
            local_to_world: self.local_to_world.swap_remove(slot),
            render_bounds: self.render_bounds.swap_remove(slot),
            mesh_lod: self.mesh_lod.swap_remove(slot),
        };
        self.world_render_bounds.swap_remove(slot);
        let moved = self.entities.get(slot).copied();
        (data, moved)
    }

    pub(crate) fn instance(&self, slot: usize) -> InstanceData {
        InstanceData {
            local_to_world: self.local_to_world[slot],
            render_bounds: self.render_bounds[slot],
            mesh_lod: self.mesh_lod[slot],
        }
    }
}
