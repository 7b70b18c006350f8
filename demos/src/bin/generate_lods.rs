//! Synchronous LOD generation demo
//!
//! Builds a procedural terrain patch, runs the full reduction pipeline on
//! the calling thread and prints a per-level summary:
//! - vertex/triangle counts per level
//! - cumulative collapse log length
//! - wall-clock time for the whole run

use std::time::Instant;

use anyhow::Result;
use clap::{Parser, ValueEnum};

use meshlod_core::{CostCalculatorKind, LodConfig, MeshBuffers, Point3f, ReductionMethod, SubmeshBuffers};
use meshlod_simplification::generate_lods;

#[derive(Parser, Debug)]
#[command(name = "generate_lods")]
#[command(about = "Generates LOD levels for a procedural terrain patch")]
struct Args {
    /// Vertices per side of the terrain grid.
    #[arg(short, long, default_value_t = 64)]
    grid_size: usize,

    /// Number of LOD levels to generate.
    #[arg(short, long, default_value_t = 4)]
    levels: u16,

    /// Fraction of the original vertices removed per level.
    #[arg(short, long, default_value_t = 0.2)]
    ratio: f32,

    /// Collapse cost calculator to drive the reduction.
    #[arg(short, long, value_enum, default_value = "default")]
    calculator: CalculatorArg,

    /// Cost multiplier for silhouette-visible vertices (outside/combined).
    #[arg(long, default_value_t = 1.5)]
    outside_weight: f32,

    /// Allow collapses that flip a surviving triangle's facing.
    #[arg(long)]
    allow_flips: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CalculatorArg {
    Default,
    Outside,
    Profile,
    Combined,
}

impl CalculatorArg {
    fn kind(self) -> CostCalculatorKind {
        match self {
            CalculatorArg::Default => CostCalculatorKind::Default,
            CalculatorArg::Outside => CostCalculatorKind::OutsideWeighted,
            CalculatorArg::Profile => CostCalculatorKind::ProfileBoundary,
            CalculatorArg::Combined => CostCalculatorKind::Combined,
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mesh = generate_terrain_grid(args.grid_size);
    println!(
        "Input: {} vertices, {} triangles (grid {}x{})",
        mesh.vertex_count(),
        mesh.triangle_count(),
        args.grid_size,
        args.grid_size,
    );

    let config = LodConfig {
        method: ReductionMethod::ConstantReductionRatio {
            levels: args.levels,
            ratio: args.ratio,
        },
        calculator: args.calculator.kind(),
        outside_weight: args.outside_weight,
        preserve_boundary_edges: !args.allow_flips,
        ..LodConfig::default()
    };

    let started = Instant::now();
    let lods = generate_lods(&mesh, &config)?;
    let elapsed = started.elapsed();

    println!("\nlevel  vertices  triangles  indices  collapses");
    for (i, level) in lods.levels.iter().enumerate() {
        println!(
            "{:>5}  {:>8}  {:>9}  {:>7}  {:>9}{}",
            i,
            level.unique_vertex_count,
            level.triangle_count,
            level.index_count(),
            level.collapse_log.len(),
            if level.skipped { "  (skipped)" } else { "" },
        );
    }
    println!(
        "\nGenerated {} levels in {:.2?}",
        lods.level_count(),
        elapsed
    );
    Ok(())
}

/// Rolling sine hills, the same surface the benchmarks reduce.
fn generate_terrain_grid(size: usize) -> MeshBuffers {
    let mut positions = Vec::with_capacity(size * size);
    for y in 0..size {
        for x in 0..size {
            let fx = x as f32 / size as f32;
            let fy = y as f32 / size as f32;
            let height = (fx * std::f32::consts::PI * 3.0).sin()
                * (fy * std::f32::consts::PI * 2.0).sin()
                * 2.0;
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
