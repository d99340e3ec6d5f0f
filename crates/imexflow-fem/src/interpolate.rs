//! Nodal interpolation and discrete error norms.

use imexflow_core::{ScalarFunction, VectorFunction};

use crate::element::{GAUSS_3, Q1Element};
use crate::error::{Error, Result};
use crate::mesh::StructuredQuadMesh;

/// Nodal interpolant of a scalar function.
pub fn interpolate_scalar(mesh: &StructuredQuadMesh, f: &dyn ScalarFunction, time: f64) -> Vec<f64> {
    (0..mesh.n_nodes())
        .map(|node| f.value(&mesh.node_coords(node), time))
        .collect()
}

/// Nodal interpolant of a 2D vector function in component-blocked layout.
pub fn interpolate_vector(mesh: &StructuredQuadMesh, f: &dyn VectorFunction, time: f64) -> Vec<f64> {
    let n = mesh.n_nodes();
    let mut result = vec![0.0; 2 * n];
    let mut value = [0.0; 2];
    for node in 0..n {
        f.value(&mesh.node_coords(node), time, &mut value);
        result[node] = value[0];
        result[n + node] = value[1];
    }
    result
}

/// L2 and nodal max-norm of an error.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ErrorNorms {
    pub l2: f64,
    pub linf: f64,
}

fn check_len(expected: usize, values: &[f64]) -> Result<()> {
    if values.len() != expected {
        return Err(Error::DimensionMismatch {
            expected,
            actual: values.len(),
        });
    }
    Ok(())
}

fn cell_values(nodes: &[usize; 4], values: &[f64], offset: usize) -> [f64; 4] {
    [
        values[offset + nodes[0]],
        values[offset + nodes[1]],
        values[offset + nodes[2]],
        values[offset + nodes[3]],
    ]
}

/// Velocity error against an exact solution.
pub fn vector_error(
    mesh: &StructuredQuadMesh,
    discrete: &[f64],
    exact: &dyn VectorFunction,
    time: f64,
) -> Result<ErrorNorms> {
    let n = mesh.n_nodes();
    check_len(2 * n, discrete)?;
    let element = Q1Element::with_rule(mesh.hx(), mesh.hy(), &GAUSS_3.0, &GAUSS_3.1);

    let mut l2 = 0.0;
    let mut value = [0.0; 2];
    for cell in 0..mesh.n_cells() {
        let nodes = mesh.cell_nodes(cell);
        let origin = mesh.cell_origin(cell);
        let ux = cell_values(&nodes, discrete, 0);
        let uy = cell_values(&nodes, discrete, n);
        for q in element.quadrature_points() {
            let point = [origin[0] + q.offset[0], origin[1] + q.offset[1]];
            exact.value(&point, time, &mut value);
            let ex = q.value(&ux) - value[0];
            let ey = q.value(&uy) - value[1];
            l2 += q.jxw * (ex * ex + ey * ey);
        }
    }

    let mut linf: f64 = 0.0;
    for node in 0..n {
        exact.value(&mesh.node_coords(node), time, &mut value);
        linf = linf
            .max((discrete[node] - value[0]).abs())
            .max((discrete[n + node] - value[1]).abs());
    }

    Ok(ErrorNorms { l2: l2.sqrt(), linf })
}

/// Scalar error against an exact solution.
///
/// With `mean_free` both fields are compared after subtracting their
/// domain means, as needed for a pressure fixed only up to a constant.
pub fn scalar_error(
    mesh: &StructuredQuadMesh,
    discrete: &[f64],
    exact: &dyn ScalarFunction,
    time: f64,
    mean_free: bool,
) -> Result<ErrorNorms> {
    check_len(mesh.n_nodes(), discrete)?;
    let element = Q1Element::with_rule(mesh.hx(), mesh.hy(), &GAUSS_3.0, &GAUSS_3.1);

    let (mean_discrete, mean_exact) = if mean_free {
        let mut integral_discrete = 0.0;
        let mut integral_exact = 0.0;
        for cell in 0..mesh.n_cells() {
            let nodes = mesh.cell_nodes(cell);
            let origin = mesh.cell_origin(cell);
            let local = cell_values(&nodes, discrete, 0);
            for q in element.quadrature_points() {
                let point = [origin[0] + q.offset[0], origin[1] + q.offset[1]];
                integral_discrete += q.jxw * q.value(&local);
                integral_exact += q.jxw * exact.value(&point, time);
            }
        }
        (integral_discrete / mesh.area(), integral_exact / mesh.area())
    } else {
        (0.0, 0.0)
    };

    let mut l2 = 0.0;
    for cell in 0..mesh.n_cells() {
        let nodes = mesh.cell_nodes(cell);
        let origin = mesh.cell_origin(cell);
        let local = cell_values(&nodes, discrete, 0);
        for q in element.quadrature_points() {
            let point = [origin[0] + q.offset[0], origin[1] + q.offset[1]];
            let e = (q.value(&local) - mean_discrete) - (exact.value(&point, time) - mean_exact);
            l2 += q.jxw * e * e;
        }
    }

    let linf = (0..mesh.n_nodes())
        .map(|node| {
            let e = (discrete[node] - mean_discrete)
                - (exact.value(&mesh.node_coords(node), time) - mean_exact);
            e.abs()
        })
        .fold(0.0, f64::max);

    Ok(ErrorNorms { l2: l2.sqrt(), linf })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bilinear_interpolation_is_exact() {
        let mesh = StructuredQuadMesh::unit_square(3).unwrap();
        let f = |p: &[f64], t: f64| 1.0 + 2.0 * p[0] - p[1] + p[0] * p[1] + t;
        let values = interpolate_scalar(&mesh, &f, 0.5);
        let err = scalar_error(&mesh, &values, &f, 0.5, false).unwrap();
        assert!(err.l2 < 1e-14 && err.linf < 1e-14);
    }

    #[test]
    fn test_mean_free_ignores_constants() {
        let mesh = StructuredQuadMesh::unit_square(4).unwrap();
        let f = |p: &[f64], _t: f64| p[0] - p[1];
        let shifted = |p: &[f64], _t: f64| p[0] - p[1] + 3.0;
        let values = interpolate_scalar(&mesh, &shifted, 0.0);

        let raw = scalar_error(&mesh, &values, &f, 0.0, false).unwrap();
        let mean_free = scalar_error(&mesh, &values, &f, 0.0, true).unwrap();

        assert_relative_eq!(raw.l2, 3.0, epsilon = 1e-12);
        assert!(mean_free.l2 < 1e-12 && mean_free.linf < 1e-12);
    }

    #[test]
    fn test_vector_error_converges() {
        let exact = |p: &[f64], _t: f64, v: &mut [f64]| {
            v[0] = p[0].sin() * p[1].sin();
            v[1] = p[0].cos() * p[1].cos();
        };
        let errors: Vec<f64> = [4, 8]
            .into_iter()
            .map(|n| {
                let mesh = StructuredQuadMesh::unit_square(n).unwrap();
                let values = interpolate_vector(&mesh, &exact, 0.0);
                vector_error(&mesh, &values, &exact, 0.0).unwrap().l2
            })
            .collect();
        let rate = (errors[0] / errors[1]).log2();
        assert!((rate - 2.0).abs() < 0.2, "rate {}", rate);
    }

    #[test]
    fn test_length_checked() {
        let mesh = StructuredQuadMesh::unit_square(2).unwrap();
        let f = |_p: &[f64], _t: f64| 0.0;
        assert!(matches!(
            scalar_error(&mesh, &[0.0; 3], &f, 0.0, false),
            Err(Error::DimensionMismatch { expected: 9, actual: 3 })
        ));
    }
}
