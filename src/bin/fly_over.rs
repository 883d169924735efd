//! Fly-over demo: a scripted viewer crossing a procedural heightfield world
//! while the quadtree refines and coarsens around it in the background.
//!
//! Usage: cargo run --release --bin fly_over -- [OPTIONS]
//!
//! Options:
//!   --config <PATH>     Quadtree config JSON (default: built-in 4x4 world)
//!   --frames <N>        Frames to simulate (default: 600)
//!   --speed <UNITS>     Viewer speed per frame (default: 24.0)
//!   --seed <SEED>       Terrain seed (default: 12345)
//!   --resolution <N>    Heightfield samples per chunk side (default: 17)
//!   --budget-kb <KB>    Heightfield memory budget (default: unlimited)
//!   --verbose           Log every update pass (same as RUST_LOG=quadlod=debug)

use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};

use glam::Vec2;

use quadlod::core::{logging, Result};
use quadlod::quadtree::{
    DistanceLodConfig, DistanceLodPolicy, Quadtree, QuadtreeConfig, QuadtreeEvent, ViewerHandle,
    WorldView,
};
use quadlod::terrain::{HeightfieldFactory, TerrainParams};

const FRAME_TIME: Duration = Duration::from_millis(4);

/// Viewer flying a straight line across the world, hovering every few seconds.
struct ScriptedFlight {
    frame: u32,
    position: Vec2,
    velocity: Vec2,
}

impl ScriptedFlight {
    fn new(start: Vec2, velocity: Vec2) -> Self {
        Self { frame: 0, position: start, velocity }
    }
}

impl WorldView for ScriptedFlight {
    fn has_viewer_moved(&mut self) -> bool {
        self.frame += 1;
        // Hover for 30 of every 150 frames
        if self.frame % 150 >= 120 {
            return false;
        }
        self.position += self.velocity;
        true
    }

    fn viewer_position(&self) -> Vec2 {
        self.position
    }
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--verbose") {
        logging::init_with_default("quadlod=debug");
    } else {
        logging::init();
    }

    let frames: u32 = parse_arg(&args, "--frames").unwrap_or(600);
    let speed: f32 = parse_arg(&args, "--speed").unwrap_or(24.0);
    let seed: u32 = parse_arg(&args, "--seed").unwrap_or(12345);
    let resolution: u32 = parse_arg(&args, "--resolution").unwrap_or(17);
    let budget_kb: Option<usize> = parse_arg(&args, "--budget-kb");

    let config = match parse_arg::<String>(&args, "--config") {
        Some(path) => QuadtreeConfig::load(path)?,
        None => QuadtreeConfig {
            update_coalescing_threshold: 2,
            cache_capacity: 256,
            root_chunks: 4,
            root_gap: 4096.0,
            origin: Vec2::splat(-8192.0),
            max_lod: 6,
        },
    };

    let params = TerrainParams { seed, scale: 600.0, height_scale: 120.0, ..Default::default() };
    let mut factory = HeightfieldFactory::new(params, resolution)?;
    if let Some(kb) = budget_kb {
        factory = factory.with_memory_budget(kb * 1024);
    }

    let world_size = config.root_gap * config.root_chunks as f32;
    let start = config.origin + Vec2::splat(world_size * 0.1);
    let viewer = ViewerHandle::new(start);
    let policy = DistanceLodPolicy::new(DistanceLodConfig::default(), viewer.clone())?;

    println!("=== Quadlod Fly-over ===");
    println!("World:  {}m x {}m ({} roots per side)", world_size, world_size, config.root_chunks);
    println!("Frames: {} at {} units/frame", frames, speed);
    println!("Chunk:  {}x{} samples", resolution, resolution);
    match budget_kb {
        Some(kb) => println!("Budget: {} KB", kb),
        None => println!("Budget: unlimited"),
    }
    println!();

    let quadtree = Quadtree::new(config, factory, policy)?;
    quadtree.start()?;

    let mut flight = ScriptedFlight::new(start, Vec2::new(1.0, 0.6).normalize() * speed);
    let started = Instant::now();
    let mut passes = 0u32;
    let mut failures = 0u32;
    let mut peak_leaves = 0usize;

    for frame in 0..frames {
        quadtree.drive(&mut flight, &viewer);

        for event in quadtree.poll_events() {
            match event {
                QuadtreeEvent::PassCompleted(stats) => {
                    passes += 1;
                    peak_leaves = peak_leaves.max(stats.leaf_count);
                    if stats.splits + stats.merges > 0 {
                        log::info!(
                            "frame {:4}: +{} splits, -{} merges, {} leaves, {} cache hits, {:.2}ms",
                            frame,
                            stats.splits,
                            stats.merges,
                            stats.leaf_count,
                            stats.cache_hits,
                            stats.duration_ms
                        );
                    }
                }
                QuadtreeEvent::BuildFailed { key, error } => {
                    failures += 1;
                    log::warn!("frame {:4}: chunk {:?} not built: {}", frame, key, error);
                }
            }
        }

        thread::sleep(FRAME_TIME);
    }

    quadtree.stop()?;
    let depth = quadtree.with_roots(|roots| roots.iter().map(|r| r.max_depth()).max().unwrap_or(0));

    println!();
    println!("=== Summary ===");
    println!("Elapsed:       {:.2}s", started.elapsed().as_secs_f32());
    println!("Viewer at:     ({:.0}, {:.0})", viewer.get().x, viewer.get().y);
    println!("Passes:        {}", passes);
    println!("Failed builds: {}", failures);
    println!("Leaves:        {} (peak {})", quadtree.leaf_count(), peak_leaves);
    println!("Max depth:     {}", depth);
    println!("Cached chunks: {}", quadtree.cache_len());
    println!(
        "Live memory:   {:.1} KB in {} chunks",
        quadtree.factory().live_bytes() as f32 / 1024.0,
        quadtree.factory().live_chunks()
    );

    quadtree.shutdown()
}

fn parse_arg<T: FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}
