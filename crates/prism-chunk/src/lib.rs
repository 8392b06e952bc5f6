//! Chunked instance storage: entities grouped into fixed-capacity, archetype-homogeneous
//! chunks with typed per-instance arrays and an optional chunk-level metadata slot.

mod archetype;
mod chunk;
mod store;

pub use archetype::{ArchetypeKey, ComponentSet, SharedComponents};
pub use chunk::{CHUNK_CAPACITY, Chunk, ChunkArraysMut, InstanceData};
pub use store::{ChunkError, ChunkStore, Entity, EntityLocation};
