//! Configuration for the culling pipeline.
//!
//! Settings persist to disk as RON, can be overridden from the command line,
//! and are compared on reload so callers only react to real changes. Every
//! section tolerates missing and unknown fields.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{Config, CullingConfig, DebugConfig, MAX_LOD_LEVELS_CAP, SceneConfig};
pub use error::ConfigError;
