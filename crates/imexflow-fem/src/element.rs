//! Bilinear (Q1) element on an axis-aligned rectangle.
//!
//! Local node order follows [`StructuredQuadMesh::cell_nodes`]: reference
//! corners `(-1,-1), (1,-1), (1,1), (-1,1)`. With 2x2 Gauss points every
//! kernel below is integrated exactly for bilinear data.
//!
//! [`StructuredQuadMesh::cell_nodes`]: crate::mesh::StructuredQuadMesh::cell_nodes

use imexflow_core::ConvectiveTermWeakForm;
use nalgebra::Matrix4;

const REF_XI: [f64; 4] = [-1.0, 1.0, 1.0, -1.0];
const REF_ETA: [f64; 4] = [-1.0, -1.0, 1.0, 1.0];

/// Two-point Gauss rule on `[-1, 1]`.
pub const GAUSS_2: ([f64; 2], [f64; 2]) = ([-0.5773502691896257, 0.5773502691896257], [1.0, 1.0]);

/// Three-point Gauss rule on `[-1, 1]`, used for error norms.
pub const GAUSS_3: ([f64; 3], [f64; 3]) = (
    [-0.7745966692414834, 0.0, 0.7745966692414834],
    [5.0 / 9.0, 8.0 / 9.0, 5.0 / 9.0],
);

/// Shape data at one quadrature point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadraturePoint {
    /// Offset from the cell's lower-left corner.
    pub offset: [f64; 2],
    /// Quadrature weight times Jacobian determinant.
    pub jxw: f64,
    pub shape: [f64; 4],
    /// Physical gradients `[d/dx, d/dy]` of each shape function.
    pub grad: [[f64; 2]; 4],
}

impl QuadraturePoint {
    /// Interpolate nodal values.
    #[inline]
    pub fn value(&self, nodal: &[f64; 4]) -> f64 {
        (0..4).map(|a| self.shape[a] * nodal[a]).sum()
    }
}

/// Q1 element of size `hx x hy` with precomputed shape data.
#[derive(Debug, Clone)]
pub struct Q1Element {
    hx: f64,
    hy: f64,
    points: Vec<QuadraturePoint>,
}

impl Q1Element {
    pub fn new(hx: f64, hy: f64) -> Self {
        Self::with_rule(hx, hy, &GAUSS_2.0, &GAUSS_2.1)
    }

    /// Tensor-product rule built from a 1D rule on `[-1, 1]`.
    pub fn with_rule(hx: f64, hy: f64, points: &[f64], weights: &[f64]) -> Self {
        let det = 0.25 * hx * hy;
        let mut quadrature = Vec::with_capacity(points.len() * points.len());
        for (&eta, &w_eta) in points.iter().zip(weights) {
            for (&xi, &w_xi) in points.iter().zip(weights) {
                let mut shape = [0.0; 4];
                let mut grad = [[0.0; 2]; 4];
                for a in 0..4 {
                    let sx = 1.0 + REF_XI[a] * xi;
                    let sy = 1.0 + REF_ETA[a] * eta;
                    shape[a] = 0.25 * sx * sy;
                    grad[a] = [0.5 * REF_XI[a] * sy / hx, 0.5 * REF_ETA[a] * sx / hy];
                }
                quadrature.push(QuadraturePoint {
                    offset: [0.5 * (xi + 1.0) * hx, 0.5 * (eta + 1.0) * hy],
                    jxw: w_xi * w_eta * det,
                    shape,
                    grad,
                });
            }
        }
        Self {
            hx,
            hy,
            points: quadrature,
        }
    }

    pub fn hx(&self) -> f64 {
        self.hx
    }

    pub fn hy(&self) -> f64 {
        self.hy
    }

    pub fn quadrature_points(&self) -> &[QuadraturePoint] {
        &self.points
    }

    /// `(N_a, N_b)`.
    pub fn mass(&self) -> Matrix4<f64> {
        let mut m = Matrix4::zeros();
        for q in &self.points {
            for a in 0..4 {
                for b in 0..4 {
                    m[(a, b)] += q.jxw * q.shape[a] * q.shape[b];
                }
            }
        }
        m
    }

    /// `(∇N_a, ∇N_b)`.
    pub fn stiffness(&self) -> Matrix4<f64> {
        let mut k = Matrix4::zeros();
        for q in &self.points {
            for a in 0..4 {
                for b in 0..4 {
                    k[(a, b)] += q.jxw * (q.grad[a][0] * q.grad[b][0] + q.grad[a][1] * q.grad[b][1]);
                }
            }
        }
        k
    }

    /// Component-wise advection `(N_a, w·∇N_b) + κ((∇·w) N_a, N_b)` for a
    /// bilinear transport field given by its nodal values, with `κ` the
    /// divergence weight of `form`. The rotational form couples velocity
    /// components and is assembled by [`Self::rotational_advection`]; here it
    /// reduces to the standard form.
    pub fn advection(&self, w: &[[f64; 2]; 4], form: ConvectiveTermWeakForm) -> Matrix4<f64> {
        let kappa = form.divergence_weight();
        let mut c = Matrix4::zeros();
        for q in &self.points {
            let (wq, div) = transport_at(q, w);
            for a in 0..4 {
                for b in 0..4 {
                    let transport = wq[0] * q.grad[b][0] + wq[1] * q.grad[b][1];
                    c[(a, b)] += q.jxw * q.shape[a] * (transport + kappa * div * q.shape[b]);
                }
            }
        }
        c
    }

    /// `((∇×φ_b)×w, φ_a)` split into `[test component][trial component]`
    /// blocks. In 2D `(∇×u)×w = ω(-w_y, w_x)` with `ω = ∂_x u_y - ∂_y u_x`.
    pub fn rotational_advection(&self, w: &[[f64; 2]; 4]) -> [[Matrix4<f64>; 2]; 2] {
        let mut blocks = [[Matrix4::zeros(); 2]; 2];
        for q in &self.points {
            let (wq, _) = transport_at(q, w);
            for a in 0..4 {
                for b in 0..4 {
                    let weight = q.jxw * q.shape[a];
                    let [dx, dy] = q.grad[b];
                    blocks[0][0][(a, b)] += weight * wq[1] * dy;
                    blocks[0][1][(a, b)] -= weight * wq[1] * dx;
                    blocks[1][0][(a, b)] -= weight * wq[0] * dy;
                    blocks[1][1][(a, b)] += weight * wq[0] * dx;
                }
            }
        }
        blocks
    }

    /// `-(∂_c N_a, N_b)` for component `c` of the velocity test function.
    pub fn gradient(&self, component: usize) -> Matrix4<f64> {
        let mut g = Matrix4::zeros();
        for q in &self.points {
            for a in 0..4 {
                for b in 0..4 {
                    g[(a, b)] -= q.jxw * q.grad[a][component] * q.shape[b];
                }
            }
        }
        g
    }
}

/// Transport value and divergence at a quadrature point.
#[inline]
fn transport_at(q: &QuadraturePoint, w: &[[f64; 2]; 4]) -> ([f64; 2], f64) {
    let mut wq = [0.0; 2];
    let mut div = 0.0;
    for a in 0..4 {
        wq[0] += q.shape[a] * w[a][0];
        wq[1] += q.shape[a] * w[a][1];
        div += q.grad[a][0] * w[a][0] + q.grad[a][1] * w[a][1];
    }
    (wq, div)
}
