//! Benchmarks for quadric edge-collapse decimation

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use stlnorm_core::{Point3f, TriangleMesh};
use stlnorm_simplification::{MeshSimplifier, QuadricDecimator};

fn generate_wavy_grid(size: usize) -> TriangleMesh {
    let mut vertices = Vec::with_capacity(size * size);
    for y in 0..size {
        for x in 0..size {
            let fx = x as f32 / (size - 1) as f32 * std::f32::consts::PI;
            let fy = y as f32 / (size - 1) as f32 * std::f32::consts::PI;
            vertices.push(Point3f::new(x as f32, y as f32, (fx.sin() * fy.sin()) * 2.0));
        }
    }
    let mut faces = Vec::with_capacity((size - 1) * (size - 1) * 2);
    for y in 0..(size - 1) {
        for x in 0..(size - 1) {
            let tl = y * size + x;
            let tr = tl + 1;
            let bl = (y + 1) * size + x;
            let br = bl + 1;
            faces.push([tl, tr, bl]);
            faces.push([tr, br, bl]);
        }
    }
    TriangleMesh::from_vertices_and_faces(vertices, faces)
}

fn bench_decimation(c: &mut Criterion) {
    let decimators = [
        ("pinned_boundary", QuadricDecimator::new()),
        ("free_boundary", QuadricDecimator::with_params(None, false, 100.0)),
    ];
    let mut group = c.benchmark_group("decimation");

    for &size in &[20usize, 50, 100] {
        let mesh = generate_wavy_grid(size);
        let face_count = mesh.face_count();

        for (label, decimator) in &decimators {
            group.bench_with_input(
                BenchmarkId::new(*label, format!("{}f", face_count)),
                &mesh,
                |b, mesh| {
                    b.iter(|| {
                        let result = decimator
                            .simplify_to_face_count(black_box(mesh), face_count / 4)
                            .unwrap();
                        black_box(result);
                    });
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_decimation);
criterion_main!(benches);
