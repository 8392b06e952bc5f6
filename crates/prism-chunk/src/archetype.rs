//! Archetype identity: which render components an instance carries plus the
//! shared (per-chunk) values that split otherwise identical archetypes.

use std::ops::{BitOr, BitOrAssign};

/// Bitmask over the render-relevant component types.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentSet(u32);

impl ComponentSet {
    /// No components.
    pub const EMPTY: ComponentSet = ComponentSet(0);
    /// Local-to-world transform.
    pub const LOCAL_TO_WORLD: ComponentSet = ComponentSet(1 << 0);
    /// Local-space render bounds.
    pub const RENDER_BOUNDS: ComponentSet = ComponentSet(1 << 1);
    /// World-space render bounds (derived each frame).
    pub const WORLD_RENDER_BOUNDS: ComponentSet = ComponentSet(1 << 2);
    /// Reference to a mesh/material pair.
    pub const MESH_REFERENCE: ComponentSet = ComponentSet(1 << 3);
    /// Participates in LOD selection.
    pub const MESH_LOD: ComponentSet = ComponentSet(1 << 4);
    /// Explicitly excluded from rendering.
    pub const DISABLED: ComponentSet = ComponentSet(1 << 5);

    /// The minimum component set an instance needs to be renderable.
    pub const RENDERABLE: ComponentSet = ComponentSet(
        Self::LOCAL_TO_WORLD.0
            | Self::RENDER_BOUNDS.0
            | Self::WORLD_RENDER_BOUNDS.0
            | Self::MESH_REFERENCE.0,
    );

    /// Construct from raw bits.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` if every component in `other` is present in `self`.
    pub const fn contains(self, other: ComponentSet) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if any component in `other` is present in `self`.
    pub const fn intersects(self, other: ComponentSet) -> bool {
        self.0 & other.0 != 0
    }

    /// Components in `self` that are not in `other`.
    pub const fn difference(self, other: ComponentSet) -> Self {
        Self(self.0 & !other.0)
    }

    /// Returns `true` if no component is present.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ComponentSet {
    type Output = ComponentSet;

    fn bitor(self, rhs: ComponentSet) -> ComponentSet {
        ComponentSet(self.0 | rhs.0)
    }
}

impl BitOrAssign for ComponentSet {
    fn bitor_assign(&mut self, rhs: ComponentSet) {
        self.0 |= rhs.0;
    }
}

/// Values shared by every instance of a chunk.
///
/// Instances that differ in any shared value never share a chunk, which is
/// what lets per-chunk passes resolve these values once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SharedComponents {
    /// Index into the render-filter settings table.
    pub render_filter: u32,
    /// Opaque partition value. Distinct values force distinct GPU batches.
    pub partition: u64,
}

/// Full chunk identity: component set plus shared values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ArchetypeKey {
    pub components: ComponentSet,
    pub shared: SharedComponents,
}

impl ArchetypeKey {
    pub fn new(components: ComponentSet, shared: SharedComponents) -> Self {
        Self { components, shared }
    }

    /// Same shared values, different components.
    pub fn with_components(self, components: ComponentSet) -> Self {
        Self {
            components,
            shared: self.shared,
        }
    }
}
