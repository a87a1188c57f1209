use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use georef::{TiePoint, TiePointSet, TiePointSolver, Transform, TransformFamily};
use nalgebra::{Matrix3, Vector2};
use ndarray::Array2;
use ndarray_rand::{rand_distr::Uniform, RandomExt};

fn ground_truth() -> Transform<f64> {
    Transform::new(
        TransformFamily::Projective,
        Matrix3::new(1.1, 0.2, 3., -0.1, 0.95, -2., 5e-7, -3e-7, 1.),
    )
}

fn tie_points(n: usize) -> TiePointSet<f64> {
    let truth = ground_truth();
    let pixels = Array2::random((n, 2), Uniform::new(0., 1000.));

    let mut points = TiePointSet::new();
    for row in pixels.rows() {
        let image = Vector2::new(row[0], row[1]);
        points.push(TiePoint::new(truth.forward(image), image));
    }
    points
}

fn fit_benchmark(c: &mut Criterion) {
    let mut fit = c.benchmark_group("fit");

    for n in [2usize, 4, 16, 256] {
        let solver = TiePointSolver::new(tie_points(n));
        fit.bench_with_input(BenchmarkId::from_parameter(n), &solver, |b, solver| {
            b.iter(|| solver.fit().unwrap())
        });
    }
}

fn warp_benchmark(c: &mut Criterion) {
    let mut warp = c.benchmark_group("warp");
    warp.sample_size(10);

    let transform = ground_truth();
    let grid = Array2::random((1_000_000, 2), Uniform::new(0., 4096.));

    warp.bench_function("warp blocking", |b| {
        b.iter(|| transform.forward_points(grid.view()))
    });

    #[cfg(feature = "parallel")]
    warp.bench_function("warp parallel", |b| {
        b.iter(|| transform.forward_points_par(grid.view()))
    });
}

criterion_group!(benches, fit_benchmark, warp_benchmark);
criterion_main!(benches);
