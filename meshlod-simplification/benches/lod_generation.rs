//! Benchmarks for graph construction and full LOD generation

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use meshlod_core::{
    CostCalculatorKind, LodConfig, MeshBuffers, Point3f, ReductionMethod, SubmeshBuffers,
};
use meshlod_simplification::{generate_lods, MeshGraph};

fn generate_sine_grid(size: usize) -> MeshBuffers {
    let mut positions = Vec::with_capacity(size * size);
    for y in 0..size {
        for x in 0..size {
            let fx = x as f32 / (size - 1) as f32 * std::f32::consts::PI;
            let fy = y as f32 / (size - 1) as f32 * std::f32::consts::PI;
            positions.push(Point3f::new(
                x as f32,
                y as f32,
                (fx.sin() * fy.sin()) * 2.0,
            ));
        }
    }
    let mut indices = Vec::with_capacity((size - 1) * (size - 1) * 6);
    for y in 0..(size - 1) {
        for x in 0..(size - 1) {
            let tl = (y * size + x) as u32;
            let tr = tl + 1;
            let bl = tl + size as u32;
            let br = bl + 1;
            indices.extend_from_slice(&[tl, bl, tr, tr, bl, br]);
        }
    }
    MeshBuffers::from_submeshes(vec![SubmeshBuffers::new(positions, indices)])
}

fn make_config(ratio: f32, calculator: CostCalculatorKind) -> LodConfig {
    LodConfig {
        method: ReductionMethod::ConstantReductionRatio { levels: 1, ratio },
        calculator,
        preserve_boundary_edges: false,
        use_vertex_normals: false,
        ..LodConfig::default()
    }
}

fn bench_graph_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_build");
    for &size in &[10, 20, 40] {
        let mesh = generate_sine_grid(size);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}v", size * size)),
            &mesh,
            |b, mesh| {
                b.iter(|| {
                    let graph = MeshGraph::build(black_box(mesh)).unwrap();
                    black_box(graph);
                });
            },
        );
    }
    group.finish();
}

fn bench_lod_generation(c: &mut Criterion) {
    let sizes = [10, 20, 40];
    let ratios = [0.3, 0.5];

    let mut group = c.benchmark_group("lod_generation");

    for &size in &sizes {
        let mesh = generate_sine_grid(size);
        let vertex_count = mesh.vertex_count();

        for &ratio in &ratios {
            group.bench_with_input(
                BenchmarkId::new(
                    "default",
                    format!("{}v_r{}", vertex_count, (ratio * 100.0) as u32),
                ),
                &(&mesh, ratio),
                |b, &(mesh, ratio)| {
                    let config = make_config(ratio, CostCalculatorKind::Default);
                    b.iter(|| {
                        let lods = generate_lods(black_box(mesh), &config).unwrap();
                        black_box(lods);
                    });
                },
            );

            group.bench_with_input(
                BenchmarkId::new(
                    "outside_weighted",
                    format!("{}v_r{}", vertex_count, (ratio * 100.0) as u32),
                ),
                &(&mesh, ratio),
                |b, &(mesh, ratio)| {
                    let config = make_config(ratio, CostCalculatorKind::OutsideWeighted);
                    b.iter(|| {
                        let lods = generate_lods(black_box(mesh), &config).unwrap();
                        black_box(lods);
                    });
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_graph_build, bench_lod_generation);
criterion_main!(benches);
