//! Owner of all chunks and the entity → (chunk, slot) mapping.
//!
//! Every structural change (spawn, despawn, archetype move) bumps
//! [`ChunkStore::structural_version`]. Chunk metadata is reconciled by an
//! external maintainer, which calls [`ChunkStore::mark_metadata_settled`] once
//! it has processed the current version; per-chunk passes check
//! [`ChunkStore::is_metadata_settled`] before touching metadata.

use glam::Mat4;
use prism_math::Aabb;
use rustc_hash::FxHashMap;

use crate::archetype::{ArchetypeKey, ComponentSet};
use crate::chunk::{Chunk, InstanceData};

/// Opaque handle to one instance. Stale handles (after despawn) are rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

/// Where an entity currently lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntityLocation {
    pub chunk: usize,
    pub slot: usize,
}

/// Errors returned by entity-level store operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChunkError {
    /// The handle was never issued or its entity has been despawned.
    #[error("no such entity: index {index}, generation {generation}")]
    NoSuchEntity {
        /// Entity index.
        index: u32,
        /// Entity generation.
        generation: u32,
    },
}

impl ChunkError {
    fn missing(entity: Entity) -> Self {
        Self::NoSuchEntity {
            index: entity.index,
            generation: entity.generation,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct EntityRecord {
    generation: u32,
    location: Option<EntityLocation>,
}

/// Chunked storage for all renderable instances.
pub struct ChunkStore<M> {
    chunks: Vec<Chunk<M>>,
    archetype_chunks: FxHashMap<ArchetypeKey, Vec<usize>>,
    entities: Vec<EntityRecord>,
    free_entities: Vec<u32>,
    live_count: usize,
    global_version: u64,
    structural_version: u64,
    settled_version: u64,
}

impl<M> ChunkStore<M> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            chunks: Vec::new(),
            archetype_chunks: FxHashMap::default(),
            entities: Vec::new(),
            free_entities: Vec::new(),
            live_count: 0,
            global_version: 0,
            structural_version: 0,
            settled_version: 0,
        }
    }

    /// Create a new instance of the given archetype.
    pub fn spawn(&mut self, archetype: ArchetypeKey, data: InstanceData) -> Entity {
        let entity = match self.free_entities.pop() {
            Some(index) => Entity {
                index,
                generation: self.entities[index as usize].generation,
            },
            None => {
                let index = self.entities.len() as u32;
                self.entities.push(EntityRecord {
                    generation: 0,
                    location: None,
                });
                Entity {
                    index,
                    generation: 0,
                }
            }
        };
        let location = self.insert(archetype, entity, data);
        self.entities[entity.index as usize].location = Some(location);
        self.live_count += 1;
        self.bump_structural();
        entity
    }

    /// Remove an instance. Returns `false` for stale or unknown handles.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        let Some(location) = self.location(entity) else {
            return false;
        };
        self.remove_at(location);
        let record = &mut self.entities[entity.index as usize];
        record.location = None;
        record.generation = record.generation.wrapping_add(1);
        self.free_entities.push(entity.index);
        self.live_count -= 1;
        self.bump_structural();
        true
    }

    /// Add components to an instance, moving it to a chunk of the new archetype.
    /// A no-op if all components are already present.
    pub fn add_components(
        &mut self,
        entity: Entity,
        components: ComponentSet,
    ) -> Result<(), ChunkError> {
        let location = self.location(entity).ok_or_else(|| ChunkError::missing(entity))?;
        let current = self.chunks[location.chunk].archetype();
        if current.components.contains(components) {
            return Ok(());
        }
        let target = current.with_components(current.components | components);
        self.move_entity(entity, location, target);
        Ok(())
    }

    /// Remove components from an instance, moving it to a chunk of the new
    /// archetype. A no-op if none of the components are present.
    pub fn remove_components(
        &mut self,
        entity: Entity,
        components: ComponentSet,
    ) -> Result<(), ChunkError> {
        let location = self.location(entity).ok_or_else(|| ChunkError::missing(entity))?;
        let current = self.chunks[location.chunk].archetype();
        if !current.components.intersects(components) {
            return Ok(());
        }
        let target = current.with_components(current.components.difference(components));
        self.move_entity(entity, location, target);
        Ok(())
    }

    /// Overwrite an instance's transform. Not a structural change.
    pub fn set_local_to_world(&mut self, entity: Entity, matrix: Mat4) -> Result<(), ChunkError> {
        let location = self.location(entity).ok_or_else(|| ChunkError::missing(entity))?;
        self.global_version += 1;
        let chunk = &mut self.chunks[location.chunk];
        chunk.local_to_world[location.slot] = matrix;
        chunk.change_version = self.global_version;
        Ok(())
    }

    /// Overwrite an instance's local render bounds. Not a structural change.
    pub fn set_render_bounds(&mut self, entity: Entity, bounds: Aabb) -> Result<(), ChunkError> {
        let location = self.location(entity).ok_or_else(|| ChunkError::missing(entity))?;
        self.global_version += 1;
        let chunk = &mut self.chunks[location.chunk];
        chunk.render_bounds[location.slot] = bounds;
        chunk.change_version = self.global_version;
        Ok(())
    }

    /// Current location of a live entity.
    pub fn location(&self, entity: Entity) -> Option<EntityLocation> {
        let record = self.entities.get(entity.index as usize)?;
        if record.generation != entity.generation {
            return None;
        }
        record.location
    }

    /// Snapshot of a live entity's per-instance data.
    pub fn instance(&self, entity: Entity) -> Option<InstanceData> {
        let location = self.location(entity)?;
        Some(self.chunks[location.chunk].instance(location.slot))
    }

    pub fn chunks(&self) -> &[Chunk<M>] {
        &self.chunks
    }

    /// Mutable access to all chunks; slices can be handed to parallel iterators.
    pub fn chunks_mut(&mut self) -> &mut [Chunk<M>] {
        &mut self.chunks
    }

    pub fn chunk(&self, index: usize) -> Option<&Chunk<M>> {
        self.chunks.get(index)
    }

    pub fn chunk_mut(&mut self, index: usize) -> Option<&mut Chunk<M>> {
        self.chunks.get_mut(index)
    }

    /// Number of allocated chunks, including empty ones awaiting reuse.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.live_count
    }

    /// Monotonic stamp bumped by every write.
    pub fn global_version(&self) -> u64 {
        self.global_version
    }

    /// Monotonic stamp bumped by every structural change.
    pub fn structural_version(&self) -> u64 {
        self.structural_version
    }

    /// Record that chunk metadata reflects the current structural version.
    pub fn mark_metadata_settled(&mut self) {
        self.settled_version = self.structural_version;
    }

    /// Returns `true` if no structural change happened since metadata was last settled.
    pub fn is_metadata_settled(&self) -> bool {
        self.settled_version == self.structural_version
    }

    fn bump_structural(&mut self) {
        self.structural_version += 1;
    }

    fn move_entity(&mut self, entity: Entity, from: EntityLocation, target: ArchetypeKey) {
        let data = self.remove_at(from);
        let location = self.insert(target, entity, data);
        self.entities[entity.index as usize].location = Some(location);
        self.bump_structural();
        tracing::trace!(
            entity = entity.index,
            from_chunk = from.chunk,
            to_chunk = location.chunk,
            "moved entity between archetypes"
        );
    }

    fn insert(&mut self, archetype: ArchetypeKey, entity: Entity, data: InstanceData) -> EntityLocation {
        let chunk_index = self.chunk_with_room(archetype);
        self.global_version += 1;
        let chunk = &mut self.chunks[chunk_index];
        let slot = chunk.push(entity, data);
        chunk.change_version = self.global_version;
        EntityLocation {
            chunk: chunk_index,
            slot,
        }
    }

    fn remove_at(&mut self, location: EntityLocation) -> InstanceData {
        self.global_version += 1;
        let chunk = &mut self.chunks[location.chunk];
        let (data, moved) = chunk.swap_remove(location.slot);
        chunk.change_version = self.global_version;
        if let Some(moved) = moved {
            self.entities[moved.index as usize].location = Some(location);
        }
        data
    }

    fn chunk_with_room(&mut self, archetype: ArchetypeKey) -> usize {
        let indices = self.archetype_chunks.entry(archetype).or_default();
        if let Some(&index) = indices.iter().find(|&&i| !self.chunks[i].is_full()) {
            return index;
        }
        let index = self.chunks.len();
        self.chunks.push(Chunk::new(archetype));
        indices.push(index);
        index
    }
}

impl<M> Default for ChunkStore<M> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
