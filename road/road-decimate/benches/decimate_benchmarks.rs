//! Benchmarks for road-decimate.
//!
//! Run with: cargo bench -p road-decimate
//!
//! To compare against baseline:
//! 1. First run: cargo bench -p road-decimate -- --save-baseline main
//! 2. After changes: cargo bench -p road-decimate -- --baseline main

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use road_decimate::{decimate_mesh, DecimateParams};
use road_types::{grid_patch, Mesh, VertexColor};

// =============================================================================
// Test Mesh Generation
// =============================================================================

/// A rolling road patch with a camber, some surface noise and colors.
fn road_patch(cells: usize) -> Mesh {
    let mut mesh = grid_patch(cells, cells, 0.1);
    let mut rng = StdRng::seed_from_u64(7);
    let half = cells as f64 * 0.05;
    for p in &mut mesh.positions {
        let camber = -0.02 * (p.x - half).powi(2);
        p.y = camber + (p.z * 0.3).sin() * 0.2 + rng.gen_range(-0.005..0.005);
    }
    let colors = (0..mesh.positions.len())
        .map(|_| VertexColor::new(rng.gen_range(60..90), rng.gen_range(60..90), rng.gen_range(60..90)))
        .collect();
    mesh.with_colors(colors)
}

// =============================================================================
// Decimation Benchmarks
// =============================================================================

fn bench_decimation(c: &mut Criterion) {
    let mut group = c.benchmark_group("Decimation");
    group.sample_size(20);

    let test_cases = [
        ("road_2k_tri", road_patch(32)),
        ("road_8k_tri", road_patch(64)),
        ("road_32k_tri", road_patch(128)),
    ];

    for (name, mesh) in &test_cases {
        group.throughput(Throughput::Elements(mesh.faces.len() as u64));

        for (label, ratio) in [("decimate_50pct", 0.5), ("decimate_90pct", 0.1)] {
            let params = DecimateParams::with_target_ratio(ratio);
            group.bench_with_input(BenchmarkId::new(label, name), mesh, |b, mesh| {
                b.iter(|| decimate_mesh(black_box(mesh), black_box(&params)));
            });
        }
    }

    group.finish();
}

// =============================================================================
// Criterion Setup
// =============================================================================

criterion_group!(benches, bench_decimation);
criterion_main!(benches);
