//! Benchmarks for Q1 operator assembly.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use imexflow_core::{ConvectiveTermWeakForm, FlowAssembler};
use imexflow_fem::unit_square;

fn bench_mass_stiffness(c: &mut Criterion) {
    let mut group = c.benchmark_group("velocity_mass_stiffness");

    for n in [16, 64, 128] {
        let asm = unit_square(n).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |bencher, _| {
            bencher.iter(|| {
                let m = asm.velocity_mass_matrix().unwrap();
                let k = asm.velocity_stiffness_matrix().unwrap();
                black_box((m, k))
            });
        });
    }

    group.finish();
}

fn bench_advection(c: &mut Criterion) {
    let mut group = c.benchmark_group("velocity_advection");

    for n in [16, 64, 128] {
        let asm = unit_square(n).unwrap();
        let transport: Vec<f64> = (0..asm.n_velocity_dofs())
            .map(|i| ((i as f64) * 0.01).sin())
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |bencher, _| {
            bencher.iter(|| {
                asm.velocity_advection_matrix(black_box(&transport), ConvectiveTermWeakForm::SkewSymmetric)
                    .unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_mass_stiffness, bench_advection);
criterion_main!(benches);
