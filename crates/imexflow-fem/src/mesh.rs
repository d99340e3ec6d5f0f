//! Structured quadrilateral meshes of rectangles.
//!
//! Nodes are numbered row by row, `node = j * (nx + 1) + i`, cells likewise
//! with their four nodes listed counter-clockwise from the lower left.

use std::fmt;

use crate::error::{Error, Result};

/// Boundary tag of a rectangle side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BoundaryId {
    Left,
    Right,
    Bottom,
    Top,
}

impl BoundaryId {
    pub const ALL: [BoundaryId; 4] = [
        BoundaryId::Left,
        BoundaryId::Right,
        BoundaryId::Bottom,
        BoundaryId::Top,
    ];
}

impl fmt::Display for BoundaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BoundaryId::Left => "left",
            BoundaryId::Right => "right",
            BoundaryId::Bottom => "bottom",
            BoundaryId::Top => "top",
        };
        write!(f, "{}", name)
    }
}

/// Uniform `nx x ny` grid over `[x0, x0 + lx] x [y0, y0 + ly]`.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredQuadMesh {
    origin: [f64; 2],
    extent: [f64; 2],
    nx: usize,
    ny: usize,
    version: u64,
}

impl StructuredQuadMesh {
    pub fn new(origin: [f64; 2], extent: [f64; 2], nx: usize, ny: usize) -> Result<Self> {
        if nx == 0 || ny == 0 {
            return Err(Error::InvalidMesh(format!(
                "need at least one cell per direction, got {}x{}",
                nx, ny
            )));
        }
        if !(extent[0] > 0.0 && extent[1] > 0.0) {
            return Err(Error::InvalidMesh(format!(
                "extent must be positive, got {:?}",
                extent
            )));
        }
        Ok(Self {
            origin,
            extent,
            nx,
            ny,
            version: 0,
        })
    }

    /// `[0, 1]^2` with `n x n` cells.
    pub fn unit_square(n: usize) -> Result<Self> {
        Self::new([0.0, 0.0], [1.0, 1.0], n, n)
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn ny(&self) -> usize {
        self.ny
    }

    pub fn n_nodes(&self) -> usize {
        (self.nx + 1) * (self.ny + 1)
    }

    pub fn n_cells(&self) -> usize {
        self.nx * self.ny
    }

    pub fn hx(&self) -> f64 {
        self.extent[0] / self.nx as f64
    }

    pub fn hy(&self) -> f64 {
        self.extent[1] / self.ny as f64
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn area(&self) -> f64 {
        self.extent[0] * self.extent[1]
    }

    pub fn node_index(&self, i: usize, j: usize) -> usize {
        j * (self.nx + 1) + i
    }

    pub fn node_coords(&self, node: usize) -> [f64; 2] {
        let i = node % (self.nx + 1);
        let j = node / (self.nx + 1);
        [
            self.origin[0] + i as f64 * self.hx(),
            self.origin[1] + j as f64 * self.hy(),
        ]
    }

    /// Lower-left corner of a cell.
    pub fn cell_origin(&self, cell: usize) -> [f64; 2] {
        let i = cell % self.nx;
        let j = cell / self.nx;
        [
            self.origin[0] + i as f64 * self.hx(),
            self.origin[1] + j as f64 * self.hy(),
        ]
    }

    /// Nodes of a cell, counter-clockwise from the lower left.
    pub fn cell_nodes(&self, cell: usize) -> [usize; 4] {
        let i = cell % self.nx;
        let j = cell / self.nx;
        [
            self.node_index(i, j),
            self.node_index(i + 1, j),
            self.node_index(i + 1, j + 1),
            self.node_index(i, j + 1),
        ]
    }

    pub fn cell_diameter(&self) -> f64 {
        self.hx().hypot(self.hy())
    }

    /// Nodes on one side, corners included.
    pub fn boundary_nodes(&self, id: BoundaryId) -> Vec<usize> {
        match id {
            BoundaryId::Left => (0..=self.ny).map(|j| self.node_index(0, j)).collect(),
            BoundaryId::Right => (0..=self.ny).map(|j| self.node_index(self.nx, j)).collect(),
            BoundaryId::Bottom => (0..=self.nx).map(|i| self.node_index(i, 0)).collect(),
            BoundaryId::Top => (0..=self.nx).map(|i| self.node_index(i, self.ny)).collect(),
        }
    }

    /// Split every cell into four.
    pub fn refine_global(&mut self) {
        self.nx *= 2;
        self.ny *= 2;
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbering() {
        let mesh = StructuredQuadMesh::new([0.0, 0.0], [2.0, 1.0], 2, 1).unwrap();
        assert_eq!(mesh.n_nodes(), 6);
        assert_eq!(mesh.n_cells(), 2);
        assert_eq!(mesh.cell_nodes(1), [1, 2, 5, 4]);
        assert_eq!(mesh.node_coords(5), [2.0, 1.0]);
        assert_eq!(mesh.cell_origin(1), [1.0, 0.0]);
        assert_eq!(mesh.boundary_nodes(BoundaryId::Top), vec![3, 4, 5]);
        assert_eq!(mesh.boundary_nodes(BoundaryId::Right), vec![2, 5]);
    }

    #[test]
    fn test_refinement_bumps_version() {
        let mut mesh = StructuredQuadMesh::unit_square(2).unwrap();
        mesh.refine_global();
        assert_eq!(mesh.nx(), 4);
        assert_eq!(mesh.version(), 1);
        assert!((mesh.cell_diameter() - 0.25 * 2.0_f64.sqrt()).abs() < 1e-15);
    }

    #[test]
    fn test_invalid_mesh() {
        assert!(StructuredQuadMesh::unit_square(0).is_err());
        assert!(StructuredQuadMesh::new([0.0, 0.0], [1.0, -1.0], 1, 1).is_err());
    }
}
