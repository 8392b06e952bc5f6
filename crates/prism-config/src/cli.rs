//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Command-line arguments of the culling demo.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "prism", about = "Chunk culling metadata pipeline")]
pub struct CliArgs {
    /// Number of instances to spawn.
    #[arg(long)]
    pub instances: Option<usize>,

    /// Frames to simulate.
    #[arg(long)]
    pub frames: Option<u32>,

    /// Scene RNG seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Worker slots for the bounds pass (0 = thread pool size).
    #[arg(long)]
    pub workers: Option<usize>,

    /// LOD distance multiplier.
    #[arg(long)]
    pub lod_bias: Option<f32>,

    /// Export every chunk on the first frame.
    #[arg(long)]
    pub force_rebuild: bool,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(instances) = args.instances {
            self.scene.instances = instances;
        }
        if let Some(frames) = args.frames {
            self.scene.frames = frames;
        }
        if let Some(seed) = args.seed {
            self.scene.seed = seed;
        }
        if let Some(workers) = args.workers {
            self.culling.worker_threads = workers;
        }
        if let Some(bias) = args.lod_bias {
            self.culling.lod_bias = bias;
        }
        if args.force_rebuild {
            self.debug.force_rebuild_all_batches = true;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            instances: Some(500),
            lod_bias: Some(1.5),
            force_rebuild: true,
            ..Default::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.scene.instances, 500);
        assert_eq!(config.culling.lod_bias, 1.5);
        assert!(config.debug.force_rebuild_all_batches);
        // Non-overridden fields retain defaults
        assert_eq!(config.scene.frames, 60);
        assert_eq!(config.culling.worker_threads, 0);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_parses_flags() {
        let args = CliArgs::parse_from(["prism", "--frames", "3", "--force-rebuild"]);
        assert_eq!(args.frames, Some(3));
        assert!(args.force_rebuild);
        assert!(args.config.is_none());
    }
}
