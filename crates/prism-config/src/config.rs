//! Configuration structs with defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Upper bound on `culling.max_lod_levels`, set by the 8-bit LOD masks.
pub const MAX_LOD_LEVELS_CAP: u32 = 8;

const CONFIG_FILE: &str = "config.ron";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Culling pass settings.
    pub culling: CullingConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
    /// Synthetic scene used by the demo binary.
    pub scene: SceneConfig,
}

/// Culling pass configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CullingConfig {
    /// Worker slots for the bounds pass (0 = size of the thread pool).
    pub worker_threads: usize,
    /// Metres the camera may move past a LOD threshold before a group switches level.
    pub movement_grace_distance: f32,
    /// Multiplier on measured LOD distances (higher = coarser sooner).
    pub lod_bias: f32,
    /// Levels allowed per LOD group, capped at [`MAX_LOD_LEVELS_CAP`].
    pub max_lod_levels: u32,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Export every chunk to batching on the next frame.
    pub force_rebuild_all_batches: bool,
    /// Re-upload instance data of every exported chunk on the next frame.
    pub force_instance_data_upload: bool,
}

/// Synthetic scene configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SceneConfig {
    /// Expected chunk count, used to pre-size buffers.
    pub chunk_count_hint: usize,
    /// Number of instances to spawn.
    pub instances: usize,
    /// Fraction of instances with a mirroring transform (0.0 - 1.0).
    pub mirrored_fraction: f32,
    /// RNG seed.
    pub seed: u64,
    /// Frames to simulate.
    pub frames: u32,
}

// --- Default implementations ---

impl Default for CullingConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            movement_grace_distance: 0.5,
            lod_bias: 1.0,
            max_lod_levels: MAX_LOD_LEVELS_CAP,
        }
    }
}

impl CullingConfig {
    /// `max_lod_levels` clamped to `1..=8`.
    pub fn effective_max_lod_levels(&self) -> u32 {
        self.max_lod_levels.clamp(1, MAX_LOD_LEVELS_CAP)
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            force_rebuild_all_batches: false,
            force_instance_data_upload: false,
        }
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            chunk_count_hint: 256,
            instances: 20_000,
            mirrored_fraction: 0.1,
            seed: 0x5EED,
            frames: 60,
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Platform config directory for this application.
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("prism"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let config = Self::read(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(config_dir.join(CONFIG_FILE), serialized).map_err(ConfigError::WriteError)
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = Self::read(&config_dir.join(CONFIG_FILE))?;
        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        ron::from_str(&contents).map_err(ConfigError::ParseError)
    }
}
