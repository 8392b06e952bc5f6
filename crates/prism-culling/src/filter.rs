//! Shared render-filter settings, looked up per chunk by filter index.

use rustc_hash::FxHashMap;

/// How motion vectors are produced for an instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MotionVectorMode {
    /// Motion comes from camera movement only.
    #[default]
    Camera,
    /// Instances write their own motion vectors.
    Object,
    /// Always write zero motion, even when the camera moves.
    ForceNoMotion,
}

impl MotionVectorMode {
    /// Anything other than camera-only motion needs per-object handling.
    pub fn is_per_object(self) -> bool {
        self != MotionVectorMode::Camera
    }
}

/// Rendering settings shared by every instance of a chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderFilterSettings {
    pub layer: u32,
    pub rendering_layer_mask: u32,
    pub motion_mode: MotionVectorMode,
    pub cast_shadows: bool,
    pub receive_shadows: bool,
    pub static_shadow_caster: bool,
}

impl Default for RenderFilterSettings {
    fn default() -> Self {
        Self {
            layer: 0,
            rendering_layer_mask: 1,
            motion_mode: MotionVectorMode::Camera,
            cast_shadows: true,
            receive_shadows: true,
            static_shadow_caster: false,
        }
    }
}

/// Filter settings keyed by filter index, with a fallback for unknown indices.
///
/// Read-only while the flags pass runs.
#[derive(Clone, Debug, Default)]
pub struct RenderFilterTable {
    settings: FxHashMap<u32, RenderFilterSettings>,
    default_settings: RenderFilterSettings,
}

impl RenderFilterTable {
    pub fn new(default_settings: RenderFilterSettings) -> Self {
        Self {
            settings: FxHashMap::default(),
            default_settings,
        }
    }

    /// Register or replace the settings for `index`. Returns the previous value.
    pub fn insert(
        &mut self,
        index: u32,
        settings: RenderFilterSettings,
    ) -> Option<RenderFilterSettings> {
        self.settings.insert(index, settings)
    }

    pub fn remove(&mut self, index: u32) -> Option<RenderFilterSettings> {
        self.settings.remove(&index)
    }

    /// Settings for `index`, or the default when none are registered.
    pub fn resolve(&self, index: u32) -> &RenderFilterSettings {
        self.settings.get(&index).unwrap_or(&self.default_settings)
    }

    pub fn default_settings(&self) -> &RenderFilterSettings {
        &self.default_settings
    }

    pub fn set_default_settings(&mut self, settings: RenderFilterSettings) {
        self.default_settings = settings;
    }

    pub fn len(&self) -> usize {
        self.settings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }
}
