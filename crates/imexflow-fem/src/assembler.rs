//! Q1 assembler for velocity, pressure and temperature on a structured mesh.
//!
//! All fields use bilinear elements on the mesh nodes. Velocity dofs are
//! blocked by component: `dof = component * n_nodes + node`. Pressure and
//! temperature dofs are the node indices.

use std::sync::Arc;

use imexflow_core::{
    CellGeometry, Constraints, ConvectiveTermWeakForm, CsrMatrix, Discretization, FlowAssembler,
    HeatAssembler, ScalarFunction, SparsityPattern, VectorFunction, ZeroVector,
};
use imexflow_core::error::{Error as CoreError, Result as CoreResult};
use log::debug;
use nalgebra::Matrix4;

use crate::element::{GAUSS_2, Q1Element};
use crate::error::Result;
use crate::interpolate::{interpolate_scalar, interpolate_vector};
use crate::mesh::{BoundaryId, StructuredQuadMesh};
use crate::parallel::{Triplet, assemble_triplets, assemble_vector};

const DIM: usize = 2;

/// Continuous Q1 discretization with boundary data and source terms.
pub struct Q1Assembler {
    mesh: StructuredQuadMesh,
    element: Q1Element,
    scalar_pattern: Arc<SparsityPattern>,
    velocity_pattern: Arc<SparsityPattern>,
    velocity_bcs: Vec<(BoundaryId, Arc<dyn VectorFunction>)>,
    temperature_bcs: Vec<(BoundaryId, Arc<dyn ScalarFunction>)>,
    temperature_fluxes: Vec<(BoundaryId, Arc<dyn ScalarFunction>)>,
    body_force: Option<Arc<dyn VectorFunction>>,
    heat_source: Option<Arc<dyn ScalarFunction>>,
    gravity: [f64; 2],
}

impl Q1Assembler {
    pub fn new(mesh: StructuredQuadMesh) -> Self {
        let element = Q1Element::new(mesh.hx(), mesh.hy());
        let (scalar_pattern, velocity_pattern) = build_patterns(&mesh);
        Self {
            mesh,
            element,
            scalar_pattern,
            velocity_pattern,
            velocity_bcs: Vec::new(),
            temperature_bcs: Vec::new(),
            temperature_fluxes: Vec::new(),
            body_force: None,
            heat_source: None,
            gravity: [0.0, -1.0],
        }
    }

    /// Prescribe the velocity on a side. Later entries override earlier ones
    /// on shared corners.
    pub fn with_velocity_bc(mut self, id: BoundaryId, f: impl VectorFunction + 'static) -> Self {
        self.velocity_bcs.push((id, Arc::new(f)));
        self
    }

    pub fn with_no_slip(self, id: BoundaryId) -> Self {
        self.with_velocity_bc(id, ZeroVector)
    }

    pub fn with_temperature_bc(mut self, id: BoundaryId, f: impl ScalarFunction + 'static) -> Self {
        self.temperature_bcs.push((id, Arc::new(f)));
        self
    }

    /// Prescribe the outward normal derivative `∇θ·n` on a side. A side
    /// that also carries a temperature value keeps the value.
    pub fn with_temperature_flux(mut self, id: BoundaryId, q: impl ScalarFunction + 'static) -> Self {
        self.temperature_fluxes.push((id, Arc::new(q)));
        self
    }

    pub fn with_body_force(mut self, f: impl VectorFunction + 'static) -> Self {
        self.body_force = Some(Arc::new(f));
        self
    }

    pub fn with_heat_source(mut self, f: impl ScalarFunction + 'static) -> Self {
        self.heat_source = Some(Arc::new(f));
        self
    }

    /// Gravity direction; buoyancy acts along its opposite.
    pub fn with_gravity(mut self, gravity: [f64; 2]) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn mesh(&self) -> &StructuredQuadMesh {
        &self.mesh
    }

    pub fn n_nodes(&self) -> usize {
        self.mesh.n_nodes()
    }

    /// Refine every cell and rebuild the dof structures.
    pub fn refine_global(&mut self) {
        self.mesh.refine_global();
        self.element = Q1Element::new(self.mesh.hx(), self.mesh.hy());
        let (scalar_pattern, velocity_pattern) = build_patterns(&self.mesh);
        self.scalar_pattern = scalar_pattern;
        self.velocity_pattern = velocity_pattern;
        debug!(
            "refined to {}x{} cells ({} nodes), mesh version {}",
            self.mesh.nx(),
            self.mesh.ny(),
            self.mesh.n_nodes(),
            self.mesh.version()
        );
    }

    pub fn interpolate_velocity(&self, f: &dyn VectorFunction, time: f64) -> Vec<f64> {
        interpolate_vector(&self.mesh, f, time)
    }

    pub fn interpolate_scalar(&self, f: &dyn ScalarFunction, time: f64) -> Vec<f64> {
        interpolate_scalar(&self.mesh, f, time)
    }

    fn check_transport(&self, transport: &[f64]) -> CoreResult<()> {
        let expected = DIM * self.mesh.n_nodes();
        if transport.len() != expected {
            return Err(CoreError::DimensionMismatch {
                expected,
                actual: transport.len(),
            });
        }
        Ok(())
    }

    fn nodal_transport(&self, cell: usize, transport: &[f64]) -> [[f64; 2]; 4] {
        let n = self.mesh.n_nodes();
        self.mesh
            .cell_nodes(cell)
            .map(|node| [transport[node], transport[n + node]])
    }

    /// Scalar operator from a per-cell local matrix.
    fn assemble_scalar<F>(&self, local: F) -> CoreResult<CsrMatrix>
    where
        F: Fn(usize) -> Matrix4<f64> + Sync,
    {
        let mesh = &self.mesh;
        let triplets = assemble_triplets(mesh.n_cells(), |cell, buf| {
            stamp_block(buf, &mesh.cell_nodes(cell), &local(cell), 0, 0);
        });
        CsrMatrix::from_triplets_with_pattern(self.scalar_pattern.clone(), &triplets)
    }

    /// Velocity operator from per-cell `[test][trial]` component blocks.
    fn assemble_coupled_velocity<F>(&self, local: F) -> CoreResult<CsrMatrix>
    where
        F: Fn(usize) -> [[Matrix4<f64>; 2]; 2] + Sync,
    {
        let mesh = &self.mesh;
        let n = mesh.n_nodes();
        let triplets = assemble_triplets(mesh.n_cells(), |cell, buf| {
            let nodes = mesh.cell_nodes(cell);
            let blocks = local(cell);
            for (row, trial_blocks) in blocks.iter().enumerate() {
                for (col, block) in trial_blocks.iter().enumerate() {
                    stamp_block(buf, &nodes, block, row * n, col * n);
                }
            }
        });
        CsrMatrix::from_triplets_with_pattern(self.velocity_pattern.clone(), &triplets)
    }

    /// Component-diagonal velocity operator from a per-cell local matrix.
    fn assemble_velocity<F>(&self, local: F) -> CoreResult<CsrMatrix>
    where
        F: Fn(usize) -> Matrix4<f64> + Sync,
    {
        let mesh = &self.mesh;
        let n = mesh.n_nodes();
        let triplets = assemble_triplets(mesh.n_cells(), |cell, buf| {
            let nodes = mesh.cell_nodes(cell);
            let m = local(cell);
            for component in 0..DIM {
                stamp_block(buf, &nodes, &m, component * n, component * n);
            }
        });
        CsrMatrix::from_triplets_with_pattern(self.velocity_pattern.clone(), &triplets)
    }

    /// `(F, ∇ψ_i)` for a vector field sampled at quadrature points.
    fn gradient_load<F>(&self, sample: F) -> Vec<f64>
    where
        F: Fn(usize, &[f64; 2], usize, &mut [f64; 2]) + Sync,
    {
        let mesh = &self.mesh;
        let element = &self.element;
        assemble_vector(mesh.n_nodes(), mesh.n_cells(), |cell, buf| {
            let nodes = mesh.cell_nodes(cell);
            let origin = mesh.cell_origin(cell);
            for (qi, q) in element.quadrature_points().iter().enumerate() {
                let point = [origin[0] + q.offset[0], origin[1] + q.offset[1]];
                let mut force = [0.0; 2];
                sample(cell, &point, qi, &mut force);
                for a in 0..4 {
                    let flux = force[0] * q.grad[a][0] + force[1] * q.grad[a][1];
                    buf.push((nodes[a], q.jxw * flux));
                }
            }
        })
    }

    fn buoyancy_direction(&self) -> [f64; 2] {
        [-self.gravity[0], -self.gravity[1]]
    }
}

fn stamp_block(
    buf: &mut Vec<Triplet>,
    nodes: &[usize; 4],
    local: &Matrix4<f64>,
    row_offset: usize,
    col_offset: usize,
) {
    for a in 0..4 {
        for b in 0..4 {
            buf.push((row_offset + nodes[a], col_offset + nodes[b], local[(a, b)]));
        }
    }
}

fn build_patterns(mesh: &StructuredQuadMesh) -> (Arc<SparsityPattern>, Arc<SparsityPattern>) {
    let n = mesh.n_nodes();
    let mut scalar = Vec::with_capacity(16 * mesh.n_cells());
    for cell in 0..mesh.n_cells() {
        let nodes = mesh.cell_nodes(cell);
        for &a in &nodes {
            for &b in &nodes {
                scalar.push((a, b));
            }
        }
    }
    // every component pair, so the rotational convective form fits too
    let velocity = (0..DIM * DIM).flat_map(|block| {
        let (row, col) = (block / DIM, block % DIM);
        scalar.iter().map(move |&(a, b)| (row * n + a, col * n + b))
    });
    let velocity = SparsityPattern::from_entries(DIM * n, DIM * n, velocity);
    let scalar = SparsityPattern::from_entries(n, n, scalar.iter().copied());
    (Arc::new(scalar), Arc::new(velocity))
}

impl Discretization for Q1Assembler {
    fn mesh_version(&self) -> u64 {
        self.mesh.version()
    }

    fn dim(&self) -> usize {
        DIM
    }
}

impl FlowAssembler for Q1Assembler {
    fn n_velocity_dofs(&self) -> usize {
        DIM * self.mesh.n_nodes()
    }

    fn n_pressure_dofs(&self) -> usize {
        self.mesh.n_nodes()
    }

    fn velocity_mass_matrix(&self) -> CoreResult<CsrMatrix> {
        let local = self.element.mass();
        self.assemble_velocity(|_| local)
    }

    fn velocity_stiffness_matrix(&self) -> CoreResult<CsrMatrix> {
        let local = self.element.stiffness();
        self.assemble_velocity(|_| local)
    }

    fn velocity_advection_matrix(
        &self,
        transport: &[f64],
        form: ConvectiveTermWeakForm,
    ) -> CoreResult<CsrMatrix> {
        self.check_transport(transport)?;
        match form {
            ConvectiveTermWeakForm::Rotational => self.assemble_coupled_velocity(|cell| {
                self.element.rotational_advection(&self.nodal_transport(cell, transport))
            }),
            _ => self.assemble_velocity(|cell| {
                self.element.advection(&self.nodal_transport(cell, transport), form)
            }),
        }
    }

    fn pressure_gradient_matrix(&self) -> CoreResult<CsrMatrix> {
        let mesh = &self.mesh;
        let n = mesh.n_nodes();
        let local = [self.element.gradient(0), self.element.gradient(1)];
        let triplets = assemble_triplets(mesh.n_cells(), |cell, buf| {
            let nodes = mesh.cell_nodes(cell);
            for (component, g) in local.iter().enumerate() {
                stamp_block(buf, &nodes, g, component * n, 0);
            }
        });
        Ok(CsrMatrix::from_triplets(DIM * n, n, &triplets))
    }

    fn pressure_mass_matrix(&self) -> CoreResult<CsrMatrix> {
        let local = self.element.mass();
        self.assemble_scalar(|_| local)
    }

    fn pressure_laplace_matrix(&self) -> CoreResult<CsrMatrix> {
        let local = self.element.stiffness();
        self.assemble_scalar(|_| local)
    }

    fn velocity_constraints(&self, time: f64) -> Constraints {
        let n = self.mesh.n_nodes();
        let mut constraints = Constraints::new();
        let mut value = [0.0; 2];
        for (id, f) in &self.velocity_bcs {
            for node in self.mesh.boundary_nodes(*id) {
                f.value(&self.mesh.node_coords(node), time, &mut value);
                constraints.add_dirichlet(node, value[0]);
                constraints.add_dirichlet(n + node, value[1]);
            }
        }
        constraints
    }

    fn pressure_constraints(&self) -> Constraints {
        let mut constraints = Constraints::new();
        constraints.add_dirichlet(0, 0.0);
        constraints
    }

    fn pressure_needs_normalization(&self) -> bool {
        true
    }

    fn body_force_load(&self, time: f64) -> Option<Vec<f64>> {
        let f = self.body_force.as_ref()?;
        let mesh = &self.mesh;
        let element = &self.element;
        let n = mesh.n_nodes();
        Some(assemble_vector(DIM * n, mesh.n_cells(), |cell, buf| {
            let nodes = mesh.cell_nodes(cell);
            let origin = mesh.cell_origin(cell);
            let mut value = [0.0; 2];
            for q in element.quadrature_points() {
                let point = [origin[0] + q.offset[0], origin[1] + q.offset[1]];
                f.value(&point, time, &mut value);
                for a in 0..4 {
                    buf.push((nodes[a], q.jxw * q.shape[a] * value[0]));
                    buf.push((n + nodes[a], q.jxw * q.shape[a] * value[1]));
                }
            }
        }))
    }

    fn coriolis_matrix(&self) -> Option<CsrMatrix> {
        // e_z × u = (-u_y, u_x)
        let mesh = &self.mesh;
        let n = mesh.n_nodes();
        let mass = self.element.mass();
        let triplets = assemble_triplets(mesh.n_cells(), |cell, buf| {
            let nodes = mesh.cell_nodes(cell);
            stamp_block(buf, &nodes, &(-mass), 0, n);
            stamp_block(buf, &nodes, &mass, n, 0);
        });
        Some(CsrMatrix::from_triplets(DIM * n, DIM * n, &triplets))
    }

    fn buoyancy_matrix(&self) -> Option<CsrMatrix> {
        let mesh = &self.mesh;
        let n = mesh.n_nodes();
        let mass = self.element.mass();
        let direction = self.buoyancy_direction();
        let triplets = assemble_triplets(mesh.n_cells(), |cell, buf| {
            let nodes = mesh.cell_nodes(cell);
            for (component, &e) in direction.iter().enumerate() {
                if e != 0.0 {
                    stamp_block(buf, &nodes, &(mass * e), component * n, 0);
                }
            }
        });
        Some(CsrMatrix::from_triplets(DIM * n, n, &triplets))
    }

    fn poisson_prestep_load(
        &self,
        time: f64,
        body_force_scale: f64,
        buoyancy: Option<(f64, &[f64])>,
    ) -> Vec<f64> {
        let direction = self.buoyancy_direction();
        let mesh = &self.mesh;
        let element = &self.element;
        self.gradient_load(|cell, point, qi, force| {
            if let Some(f) = &self.body_force {
                let mut value = [0.0; 2];
                f.value(point, time, &mut value);
                force[0] += body_force_scale * value[0];
                force[1] += body_force_scale * value[1];
            }
            if let Some((scale, theta)) = buoyancy {
                let nodes = mesh.cell_nodes(cell);
                let local = [theta[nodes[0]], theta[nodes[1]], theta[nodes[2]], theta[nodes[3]]];
                let theta_q = element.quadrature_points()[qi].value(&local);
                force[0] += scale * theta_q * direction[0];
                force[1] += scale * theta_q * direction[1];
            }
        })
    }
}

impl HeatAssembler for Q1Assembler {
    fn n_temperature_dofs(&self) -> usize {
        self.mesh.n_nodes()
    }

    fn temperature_mass_matrix(&self) -> CoreResult<CsrMatrix> {
        let local = self.element.mass();
        self.assemble_scalar(|_| local)
    }

    fn temperature_stiffness_matrix(&self) -> CoreResult<CsrMatrix> {
        let local = self.element.stiffness();
        self.assemble_scalar(|_| local)
    }

    fn temperature_advection_matrix(
        &self,
        transport: &[f64],
        form: ConvectiveTermWeakForm,
    ) -> CoreResult<CsrMatrix> {
        self.check_transport(transport)?;
        self.assemble_scalar(|cell| {
            self.element.advection(&self.nodal_transport(cell, transport), form)
        })
    }

    fn temperature_constraints(&self, time: f64) -> Constraints {
        let mut constraints = Constraints::new();
        for (id, f) in &self.temperature_bcs {
            for node in self.mesh.boundary_nodes(*id) {
                constraints.add_dirichlet(node, f.value(&self.mesh.node_coords(node), time));
            }
        }
        constraints
    }

    fn heat_source_load(&self, time: f64) -> Option<Vec<f64>> {
        let r = self.heat_source.as_ref()?;
        let mesh = &self.mesh;
        let element = &self.element;
        Some(assemble_vector(mesh.n_nodes(), mesh.n_cells(), |cell, buf| {
            let nodes = mesh.cell_nodes(cell);
            let origin = mesh.cell_origin(cell);
            for q in element.quadrature_points() {
                let point = [origin[0] + q.offset[0], origin[1] + q.offset[1]];
                let value = r.value(&point, time);
                for a in 0..4 {
                    buf.push((nodes[a], q.jxw * q.shape[a] * value));
                }
            }
        }))
    }

    fn temperature_neumann_load(&self, time: f64) -> Option<Vec<f64>> {
        if self.temperature_fluxes.is_empty() {
            return None;
        }
        let (points, weights) = GAUSS_2;
        let mut load = vec![0.0; self.mesh.n_nodes()];
        for (id, q) in &self.temperature_fluxes {
            for edge in self.mesh.boundary_nodes(*id).windows(2) {
                let start = self.mesh.node_coords(edge[0]);
                let end = self.mesh.node_coords(edge[1]);
                let half_length = 0.5 * (end[0] - start[0]).hypot(end[1] - start[1]);
                for (&s, &w) in points.iter().zip(&weights) {
                    // linear shape functions of the edge at s ∈ [-1, 1]
                    let shape = [0.5 * (1.0 - s), 0.5 * (1.0 + s)];
                    let point = [
                        shape[0] * start[0] + shape[1] * end[0],
                        shape[0] * start[1] + shape[1] * end[1],
                    ];
                    let flux = q.value(&point, time);
                    load[edge[0]] += w * half_length * shape[0] * flux;
                    load[edge[1]] += w * half_length * shape[1] * flux;
                }
            }
        }
        Some(load)
    }

    fn interpolate_transport(&self, velocity: &dyn VectorFunction, time: f64) -> Vec<f64> {
        interpolate_vector(&self.mesh, velocity, time)
    }
}

impl CellGeometry for Q1Assembler {
    fn n_active_cells(&self) -> usize {
        self.mesh.n_cells()
    }

    fn cell_diameter(&self, _cell: usize) -> f64 {
        self.mesh.cell_diameter()
    }

    fn max_velocity_magnitude(&self, cell: usize, velocity: &[f64]) -> f64 {
        let n = self.mesh.n_nodes();
        self.mesh
            .cell_nodes(cell)
            .iter()
            .map(|&node| velocity[node].hypot(velocity[n + node]))
            .fold(0.0, f64::max)
    }
}

/// Build an assembler on the unit square with `n x n` cells.
pub fn unit_square(n: usize) -> Result<Q1Assembler> {
    Ok(Q1Assembler::new(StructuredQuadMesh::unit_square(n)?))
}
