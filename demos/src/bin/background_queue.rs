//! Background queue demo
//!
//! Submits a batch of procedurally jittered terrain patches to a
//! `LodWorkQueue`, sharing a handful of tags so some requests serialize
//! behind each other, then drains the completion channel and picks the
//! results up through the handles. One request is cancelled and one result
//! is taken by an `on_complete` callback to show both delivery paths.

use anyhow::Result;
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use meshlod_core::{LodConfig, MeshBuffers, Point3f, ReductionMethod, SubmeshBuffers};
use meshlod_queue::{LodRequest, LodWorkQueue};

#[derive(Parser, Debug)]
#[command(name = "background_queue")]
#[command(about = "Generates LODs for a batch of meshes on background workers")]
struct Args {
    /// Worker threads to start.
    #[arg(short, long, default_value_t = 2)]
    workers: usize,

    /// Meshes to submit.
    #[arg(short, long, default_value_t = 6)]
    meshes: usize,

    /// Fraction of the original vertices removed per level.
    #[arg(short, long, default_value_t = 0.25)]
    ratio: f32,

    /// Seed for the procedural meshes.
    #[arg(short, long, default_value_t = 42)]
    seed: u64,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut queue = LodWorkQueue::start(args.workers)?;
    let mut rng = StdRng::seed_from_u64(args.seed);
    let config = LodConfig {
        method: ReductionMethod::ConstantReductionRatio {
            levels: 3,
            ratio: args.ratio,
        },
        use_vertex_normals: false,
        ..LodConfig::default()
    };

    println!("Submitting {} meshes to {} workers", args.meshes, args.workers);
    let mut handles = Vec::with_capacity(args.meshes);
    for i in 0..args.meshes {
        let size = rng.gen_range(12..=24);
        let mesh = generate_jittered_grid(size, &mut rng);
        // A few shared tags, so same-asset requests run one at a time.
        let tag = format!("asset-{}", i % 3);
        let handle = queue.submit(LodRequest::new(mesh, config.clone(), tag))?;
        println!(
            "  queued request {} ('{}'), grid {}x{}",
            handle.id(),
            handle.tag(),
            size,
            size
        );
        handles.push(handle);
    }

    if let Some(first) = handles.first() {
        let id = first.id();
        first.on_complete(move |result| match result {
            Ok(lods) => println!("  callback: request {} finished with {} levels", id, lods.level_count()),
            Err(err) => println!("  callback: request {} ended with: {}", id, err),
        });
    }
    if let Some(last) = handles.last() {
        println!("  cancelling request {}", last.id());
        last.cancel();
    }

    println!("\nCompletions:");
    for _ in 0..handles.len() {
        let completion = queue.completions().recv()?;
        println!(
            "  [{}] '{}' -> {:?}",
            completion.id, completion.tag, completion.status
        );
    }

    println!("\nResults:");
    for handle in &handles {
        match handle.poll() {
            Some(Ok(lods)) => {
                let counts: Vec<String> = lods
                    .levels
                    .iter()
                    .map(|level| level.unique_vertex_count.to_string())
                    .collect();
                println!(
                    "  request {} ('{}'): vertices {}",
                    handle.id(),
                    handle.tag(),
                    counts.join(" -> ")
                );
            }
            Some(Err(err)) => {
                println!("  request {} ('{}') ended with: {}", handle.id(), handle.tag(), err);
            }
            None => {
                println!(
                    "  request {} ('{}') was already delivered to its callback",
                    handle.id(),
                    handle.tag()
                );
            }
        }
    }

    queue.shutdown();
    println!("\nQueue shut down");
    Ok(())
}

/// Sine hills with per-vertex height jitter, a different patch per call.
fn generate_jittered_grid(size: usize, rng: &mut StdRng) -> MeshBuffers {
    let mut positions = Vec::with_capacity(size * size);
    for y in 0..size {
        for x in 0..size {
            let fx = x as f32 / size as f32;
            let fy = y as f32 / size as f32;
            let height = (fx * std::f32::consts::PI * 3.0).sin()
                * (fy * std::f32::consts::PI * 2.0).sin()
                * 2.0
                + rng.gen_range(-0.1..0.1);
            positions.push(Point3f::new(x as f32, y as f32, height));
        }
    }
    let mut indices = Vec::new();
    for y in 0..size - 1 {
        for x in 0..size - 1 {
            let tl = (y * size + x) as u32;
            let bl = tl + size as u32;
            let tr = tl + 1;
            let br = bl + 1;
            indices.extend_from_slice(&[tl, bl, tr, tr, bl, br]);
        }
    }
    MeshBuffers::from_submeshes(vec![SubmeshBuffers::new(positions, indices)])
}
