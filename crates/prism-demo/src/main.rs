//! Headless driver for the chunk culling pipeline.
//!
//! Builds a random scene of LOD-grouped instances, then runs the culling
//! schedule for a number of frames while the camera orbits the scene and a
//! few instances move every frame.
//!
//! Run with: `cargo run -p prism-demo -- --instances 50000 --frames 120`

mod scene;

use std::time::{Duration, Instant};

use clap::Parser;
use glam::{Mat4, Vec3};
use prism_config::{CliArgs, Config, ConfigError};
use prism_culling::{BatchDebugOptions, GpuPropertyRegistry};
use prism_ecs::{BatchDebug, ChunkTable, CullingCamera, CullingSettings, FrameOutput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{error, info, warn};

/// Instances nudged every frame.
const MOVERS_PER_FRAME: usize = 64;
const CAMERA_ORBIT_RADIUS: f32 = 600.0;

fn main() {
    let args = CliArgs::parse();

    let config_dir = args.config.clone().map_or_else(Config::default_dir, Ok);
    let loaded = match &config_dir {
        Ok(dir) => Config::load_or_create(dir),
        Err(_) => Err(ConfigError::NoConfigDir),
    };
    let (mut config, load_error) = match loaded {
        Ok(config) => (config, None),
        Err(err) => (Config::default(), Some(err)),
    };
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.as_ref().ok().map(|dir| dir.join("logs"));
    prism_log::init_logging(log_dir.as_deref(), cfg!(debug_assertions), Some(&config));
    if let Some(err) = load_error {
        warn!(%err, "using default configuration");
    }

    info!("prism culling demo");
    info!(
        "Scene: {} instances, seed {:#x}, {} frames",
        config.scene.instances, config.scene.seed, config.scene.frames
    );

    let properties = match GpuPropertyRegistry::with_builtins() {
        Ok(registry) => registry,
        Err(err) => {
            error!(%err, "failed to register GPU properties");
            std::process::exit(1);
        }
    };
    for property in properties.iter() {
        info!(
            name = property.name,
            size = property.size,
            offset = property.offset,
            "GPU property"
        );
    }

    let mut world = prism_ecs::create_culling_world(CullingSettings::from_config(&config.culling));
    world.resource_mut::<BatchDebug>().options = BatchDebugOptions {
        force_rebuild_all_batches: config.debug.force_rebuild_all_batches,
        force_instance_data_upload: config.debug.force_instance_data_upload,
    };

    let mut rng = StdRng::seed_from_u64(config.scene.seed);
    let build_start = Instant::now();
    let stats = scene::populate(
        &mut world,
        &config.scene,
        config.culling.effective_max_lod_levels(),
        &mut rng,
    );
    let chunk_count = world.resource::<ChunkTable>().store.chunk_count();
    info!(
        instances = stats.instances,
        mirrored = stats.mirrored,
        lod_groups = stats.groups,
        rejected_groups = stats.rejected_groups,
        chunks = chunk_count,
        chunk_hint = config.scene.chunk_count_hint,
        elapsed_ms = build_start.elapsed().as_secs_f64() * 1000.0,
        "scene built"
    );

    let mut total = Duration::ZERO;
    let mut slowest = Duration::ZERO;
    for frame in 0..config.scene.frames {
        let angle = frame as f32 * 0.05;
        world.resource_mut::<CullingCamera>().position = Vec3::new(
            angle.cos() * CAMERA_ORBIT_RADIUS,
            40.0,
            angle.sin() * CAMERA_ORBIT_RADIUS,
        );
        move_some_instances(&mut world, &stats.entities, &mut rng);

        let start = Instant::now();
        if let Err(err) = prism_ecs::run_frame(&mut world) {
            error!(%err, "culling schedule missing");
            std::process::exit(1);
        }
        let elapsed = start.elapsed();
        total += elapsed;
        slowest = slowest.max(elapsed);

        let output = world.resource::<FrameOutput>();
        tracing::debug!(
            frame = output.frame,
            exported = output.batches.len(),
            lod_enabled = output.lod.enabled_lod_instances,
            batches = output.partitions.len(),
            elapsed_us = elapsed.as_micros() as u64,
            "frame"
        );
    }

    let output = world.resource::<FrameOutput>();
    let frames = config.scene.frames.max(1);
    info!(
        "Ran {} frames: avg {:.3} ms, worst {:.3} ms",
        config.scene.frames,
        total.as_secs_f64() * 1000.0 / f64::from(frames),
        slowest.as_secs_f64() * 1000.0,
    );
    if !output.scene_bounds.is_empty() {
        info!(
            "Scene bounds: min {:?} max {:?}",
            output.scene_bounds.min, output.scene_bounds.max
        );
    }
    info!(
        renderable_chunks = output.maintenance.renderable,
        batches = output.partitions.len(),
        instance_stride = properties.instance_stride(),
        "done"
    );
}

/// Shift a few random instances sideways so their chunks re-export.
fn move_some_instances(
    world: &mut bevy_ecs::world::World,
    entities: &[prism_chunk::Entity],
    rng: &mut StdRng,
) {
    if entities.is_empty() {
        return;
    }
    let mut table = world.resource_mut::<ChunkTable>();
    for _ in 0..MOVERS_PER_FRAME {
        let entity = entities[rng.random_range(0..entities.len())];
        let Some(instance) = table.store.instance(entity) else {
            continue;
        };
        let step = Mat4::from_translation(Vec3::new(rng.random_range(-0.5..0.5), 0.0, 0.0));
        if let Err(err) = table.store.set_local_to_world(entity, step * instance.local_to_world) {
            warn!(%err, "failed to move instance");
        }
    }
}
