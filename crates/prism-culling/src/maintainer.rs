//! Keeps record ownership in step with chunk renderability.

use prism_math::encode_ceil;

use crate::query::RenderableQuery;
use crate::record::ChunkCullingRecord;
use crate::CullingStore;

/// Counts from one maintenance run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Chunks that gained a record.
    pub attached: usize,
    /// Chunks that lost their record.
    pub detached: usize,
    /// Chunks that own a record after the run.
    pub renderable: usize,
}

impl MaintenanceReport {
    pub fn changed(&self) -> bool {
        self.attached > 0 || self.detached > 0
    }
}

/// Attaches a cleared [`ChunkCullingRecord`] to every chunk matching the
/// renderable query and detaches it from every chunk that no longer does.
///
/// Must run to completion before any other culling pass touches the store in
/// the same frame; it marks the store's metadata as settled when done.
#[derive(Clone, Copy, Debug)]
pub struct ChunkStructureMaintainer {
    query: RenderableQuery,
    movement_grace_distance: u16,
}

impl Default for ChunkStructureMaintainer {
    fn default() -> Self {
        Self::new(RenderableQuery::default(), 0.0)
    }
}

impl ChunkStructureMaintainer {
    /// `movement_grace_distance` is in world units and is stored rounded up.
    pub fn new(query: RenderableQuery, movement_grace_distance: f32) -> Self {
        Self {
            query,
            movement_grace_distance: encode_ceil(movement_grace_distance),
        }
    }

    pub fn query(&self) -> &RenderableQuery {
        &self.query
    }

    pub fn run(&self, store: &mut CullingStore) -> MaintenanceReport {
        let _span = tracing::debug_span!("chunk_structure").entered();
        let mut report = MaintenanceReport::default();

        for chunk in store.chunks_mut() {
            let eligible = self.query.matches(chunk);
            match (eligible, chunk.has_meta()) {
                (true, false) => {
                    chunk.attach_meta(ChunkCullingRecord::new(self.movement_grace_distance));
                    report.attached += 1;
                }
                (false, true) => {
                    chunk.detach_meta();
                    report.detached += 1;
                }
                _ => {}
            }
            if eligible {
                report.renderable += 1;
            }
        }

        store.mark_metadata_settled();
        if report.changed() {
            tracing::debug!(
                attached = report.attached,
                detached = report.detached,
                renderable = report.renderable,
                "chunk culling records updated"
            );
        }
        report
    }
}
