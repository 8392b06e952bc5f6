//! Which chunks the culling passes operate on.

use prism_chunk::{Chunk, ComponentSet};

/// Archetype predicate selecting renderable chunks.
///
/// A chunk matches when its archetype carries every `required` component,
/// none of the `excluded` ones, and it holds at least one instance. Matching
/// chunks are exactly the ones that own a
/// [`ChunkCullingRecord`](crate::ChunkCullingRecord) once structure
/// maintenance has run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderableQuery {
    pub required: ComponentSet,
    pub excluded: ComponentSet,
}

impl Default for RenderableQuery {
    fn default() -> Self {
        Self {
            required: ComponentSet::RENDERABLE,
            excluded: ComponentSet::DISABLED,
        }
    }
}

impl RenderableQuery {
    pub fn matches_components(&self, components: ComponentSet) -> bool {
        components.contains(self.required) && !components.intersects(self.excluded)
    }

    pub fn matches<M>(&self, chunk: &Chunk<M>) -> bool {
        !chunk.is_empty() && self.matches_components(chunk.archetype().components)
    }
}

/// Panic unless a matching chunk carries its record.
///
/// Passes that run after structure maintenance rely on this; a missing record
/// means the maintainer was skipped or reordered.
#[track_caller]
pub(crate) fn require_record<M>(record: Option<M>, chunk_index: usize) -> M {
    match record {
        Some(record) => record,
        None => panic!("renderable chunk {chunk_index} has no culling record"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_query_needs_all_renderable_components() {
        let query = RenderableQuery::default();
        assert!(query.matches_components(ComponentSet::RENDERABLE));
        assert!(query.matches_components(ComponentSet::RENDERABLE | ComponentSet::MESH_LOD));
        assert!(!query.matches_components(ComponentSet::LOCAL_TO_WORLD));
        assert!(!query.matches_components(ComponentSet::RENDERABLE | ComponentSet::DISABLED));
    }
}
