//! Benchmarks for Krylov solvers and preconditioners.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use imexflow_core::CsrMatrix;
use imexflow_solver::{
    Ilu0Preconditioner, KrylovMethod, KrylovSolver, LinearSolve, LinearSolverParameters,
    PreconditionerKind,
};

/// Five-point convection-diffusion operator on an m x m grid.
fn convection_diffusion_2d(m: usize, convection: f64) -> CsrMatrix {
    let n = m * m;
    let mut triplets = Vec::with_capacity(5 * n);
    for j in 0..m {
        for i in 0..m {
            let row = j * m + i;
            triplets.push((row, row, 4.0 + 1.0));
            if i > 0 {
                triplets.push((row, row - 1, -1.0 - convection));
            }
            if i + 1 < m {
                triplets.push((row, row + 1, -1.0 + convection));
            }
            if j > 0 {
                triplets.push((row, row - m, -1.0));
            }
            if j + 1 < m {
                triplets.push((row, row + m, -1.0));
            }
        }
    }
    CsrMatrix::from_triplets(n, n, &triplets)
}

fn bench_krylov(c: &mut Criterion) {
    let mut group = c.benchmark_group("krylov");
    let service = KrylovSolver::new();
    let params = LinearSolverParameters::default();

    for m in [16, 32, 64] {
        let a = convection_diffusion_2d(m, 0.3);
        let rhs = vec![1.0; m * m];

        for (method, kind) in [
            (KrylovMethod::Gmres, PreconditionerKind::Ilu0),
            (KrylovMethod::Gmres, PreconditionerKind::Jacobi),
        ] {
            let p = service.build_preconditioner(&a, kind).unwrap();
            group.bench_with_input(
                BenchmarkId::new(format!("{}-{}", method, kind), m * m),
                &m,
                |bencher, _| {
                    bencher.iter(|| {
                        let mut x = vec![0.0; m * m];
                        service
                            .solve(method, black_box(&a), &mut x, black_box(&rhs), p.as_ref(), &params)
                            .unwrap()
                    })
                },
            );
        }
    }

    group.finish();
}

fn bench_ilu_factorization(c: &mut Criterion) {
    let mut group = c.benchmark_group("ilu0_factorize");

    for m in [32, 64, 128] {
        let a = convection_diffusion_2d(m, 0.3);
        group.bench_with_input(BenchmarkId::from_parameter(m * m), &a, |bencher, a| {
            bencher.iter(|| Ilu0Preconditioner::from_matrix(black_box(a)).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_krylov, bench_ilu_factorization);
criterion_main!(benches);
