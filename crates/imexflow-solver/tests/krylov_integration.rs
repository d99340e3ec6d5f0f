//! Integration tests for the linear-solve service on finite-element-like systems.

use imexflow_core::{Constraints, CsrMatrix};
use imexflow_solver::{
    Error, KrylovMethod, KrylovSolver, LinearSolve, LinearSolverParameters, PreconditionerKind,
};

/// Q1 Laplacian stencil on an m x m node grid of unit cells.
fn q1_laplace(m: usize) -> CsrMatrix {
    let n = m * m;
    let mut triplets = Vec::new();
    let local = [
        [4.0, -1.0, -2.0, -1.0],
        [-1.0, 4.0, -1.0, -2.0],
        [-2.0, -1.0, 4.0, -1.0],
        [-1.0, -2.0, -1.0, 4.0],
    ];
    for j in 0..m - 1 {
        for i in 0..m - 1 {
            let nodes = [j * m + i, j * m + i + 1, (j + 1) * m + i + 1, (j + 1) * m + i];
            for a in 0..4 {
                for b in 0..4 {
                    triplets.push((nodes[a], nodes[b], local[a][b] / 6.0));
                }
            }
        }
    }
    CsrMatrix::from_triplets(n, n, &triplets)
}

/// A pure-Neumann Laplacian anchored at one dof is SPD and CG solves it.
#[test]
fn test_anchored_neumann_problem_with_cg() {
    let m = 9;
    let mut a = q1_laplace(m);
    let n = a.n_rows();

    // Compatible right-hand side (zero sum)
    let mut rhs: Vec<f64> = (0..n).map(|i| ((i % m) as f64) - (m as f64 - 1.0) / 2.0).collect();
    let mut x = vec![0.0; n];

    let mut datum = Constraints::new();
    datum.add_dirichlet(0, 0.0);
    datum.apply_to_system(&mut a, &mut rhs, &mut x).unwrap();
    assert!(a.is_symmetric(1e-15));

    let service = KrylovSolver::new();
    let params = LinearSolverParameters::tight();
    let p = service.build_preconditioner(&a, PreconditionerKind::Ilu0).unwrap();
    let stats = service
        .solve(KrylovMethod::Cg, &a, &mut x, &rhs, p.as_ref(), &params)
        .unwrap();

    assert!(stats.iterations > 0);
    assert_eq!(x[0], 0.0);
    let mut ax = vec![0.0; n];
    a.mul_vec(&x, &mut ax);
    for (l, r) in ax.iter().zip(&rhs) {
        assert!((l - r).abs() < 1e-9, "residual entry {} vs {}", l, r);
    }
}

/// The unanchored singular Laplacian with an incompatible load cannot converge.
#[test]
fn test_singular_system_reports_failure() {
    let a = q1_laplace(5);
    let n = a.n_rows();
    let rhs = vec![1.0; n];
    let mut x = vec![0.0; n];

    let service = KrylovSolver::new();
    let params = LinearSolverParameters {
        n_maximum_iterations: 200,
        ..LinearSolverParameters::tight()
    };
    let p = service
        .build_preconditioner(&a, PreconditionerKind::Jacobi)
        .unwrap();
    let result = service.solve(KrylovMethod::Gmres, &a, &mut x, &rhs, p.as_ref(), &params);

    assert!(matches!(result, Err(Error::ConvergenceFailed { .. })));
}
