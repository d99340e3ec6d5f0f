//! Essential boundary conditions and datum constraints.
//!
//! A [`Constraints`] set maps constrained dofs to prescribed values. It is
//! applied to an assembled system by symmetric elimination: constrained
//! columns are moved to the right-hand side and constrained rows are
//! replaced by a scaled identity, which keeps SPD systems SPD.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::sparse::CsrMatrix;

/// Dirichlet-type constraint set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constraints {
    values: BTreeMap<usize, f64>,
}

impl Constraints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prescribe `dof = value`. A later call for the same dof overrides.
    pub fn add_dirichlet(&mut self, dof: usize, value: f64) {
        self.values.insert(dof, value);
    }

    pub fn is_constrained(&self, dof: usize) -> bool {
        self.values.contains_key(&dof)
    }

    pub fn value(&self, dof: usize) -> Option<f64> {
        self.values.get(&dof).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.values.iter().map(|(&d, &v)| (d, v))
    }

    /// Same constrained dofs with all values set to zero.
    pub fn homogenized(&self) -> Self {
        Self {
            values: self.values.keys().map(|&d| (d, 0.0)).collect(),
        }
    }

    /// Merge another set; entries of `other` win on conflicts.
    pub fn merge(&mut self, other: &Constraints) {
        for (d, v) in other.iter() {
            self.values.insert(d, v);
        }
    }

    /// Check every constrained dof against a system size.
    pub fn check_range(&self, n_dofs: usize) -> Result<()> {
        match self.values.keys().next_back() {
            Some(&dof) if dof >= n_dofs => Err(Error::InvalidConstraint { dof, n_dofs }),
            _ => Ok(()),
        }
    }

    /// Write prescribed values into a vector.
    pub fn distribute(&self, x: &mut [f64]) {
        for (d, v) in self.iter() {
            x[d] = v;
        }
    }

    /// Zero the constrained entries of a vector.
    pub fn set_zero(&self, x: &mut [f64]) {
        for &d in self.values.keys() {
            x[d] = 0.0;
        }
    }

    /// Eliminate the constraints from `matrix * x = rhs`.
    ///
    /// Constrained rows keep their diagonal (or 1 when it vanishes), the
    /// right-hand side is set so the solution reproduces the prescribed
    /// value, and `x` is initialized with it.
    pub fn apply_to_system(
        &self,
        matrix: &mut CsrMatrix,
        rhs: &mut [f64],
        x: &mut [f64],
    ) -> Result<()> {
        let n = matrix.n_rows();
        if matrix.n_cols() != n {
            return Err(Error::DimensionMismatch {
                expected: n,
                actual: matrix.n_cols(),
            });
        }
        if rhs.len() != n || x.len() != n {
            return Err(Error::DimensionMismatch {
                expected: n,
                actual: rhs.len().min(x.len()),
            });
        }
        self.check_range(n)?;
        if self.is_empty() {
            return Ok(());
        }

        let mut prescribed: Vec<Option<f64>> = vec![None; n];
        for (d, v) in self.iter() {
            prescribed[d] = Some(v);
        }

        let pattern = matrix.pattern().clone();
        let row_ptr = pattern.row_ptr();
        let col_idx = pattern.col_idx();
        let values = matrix.values_mut();

        let mut diagonal = vec![1.0; n];
        for (d, _) in self.iter() {
            if let Some(k) = pattern.find(d, d) {
                let a = values[k].abs();
                if a > 0.0 {
                    diagonal[d] = a;
                }
            }
        }

        for i in 0..n {
            let row_constraint = prescribed[i];
            for k in row_ptr[i]..row_ptr[i + 1] {
                let j = col_idx[k];
                match (row_constraint, prescribed[j]) {
                    (Some(_), _) => {
                        values[k] = if i == j { diagonal[i] } else { 0.0 };
                    }
                    (None, Some(g)) => {
                        rhs[i] -= values[k] * g;
                        values[k] = 0.0;
                    }
                    (None, None) => {}
                }
            }
        }

        for (d, v) in self.iter() {
            rhs[d] = diagonal[d] * v;
            x[d] = v;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn laplace_1d(n: usize) -> CsrMatrix {
        let mut triplets = Vec::new();
        for i in 0..n {
            triplets.push((i, i, 2.0));
            if i > 0 {
                triplets.push((i, i - 1, -1.0));
            }
            if i + 1 < n {
                triplets.push((i, i + 1, -1.0));
            }
        }
        CsrMatrix::from_triplets(n, n, &triplets)
    }

    #[test]
    fn test_elimination_keeps_symmetry() {
        let mut a = laplace_1d(4);
        let mut rhs = vec![0.0; 4];
        let mut x = vec![0.0; 4];
        let mut c = Constraints::new();
        c.add_dirichlet(0, 1.0);
        c.add_dirichlet(3, 2.0);

        c.apply_to_system(&mut a, &mut rhs, &mut x).unwrap();

        assert!(a.is_symmetric(0.0));
        assert_eq!(a.get(0, 0), 2.0);
        assert_eq!(a.get(0, 1), 0.0);
        assert_eq!(a.get(1, 0), 0.0);
        assert_eq!(rhs, vec![2.0, 1.0, 2.0, 4.0]);
        assert_eq!(x[0], 1.0);
        assert_eq!(x[3], 2.0);
    }

    #[test]
    fn test_eliminated_system_reproduces_linear_profile() {
        // -u'' = 0 with u(0)=1, u(3)=2 is linear, so the interior rows of the
        // reduced system are solved by 4/3, 5/3.
        let mut a = laplace_1d(4);
        let mut rhs = vec![0.0; 4];
        let mut x = vec![0.0; 4];
        let mut c = Constraints::new();
        c.add_dirichlet(0, 1.0);
        c.add_dirichlet(3, 2.0);
        c.apply_to_system(&mut a, &mut rhs, &mut x).unwrap();

        let exact = [1.0, 4.0 / 3.0, 5.0 / 3.0, 2.0];
        let mut ax = vec![0.0; 4];
        a.mul_vec(&exact, &mut ax);
        for (l, r) in ax.iter().zip(&rhs) {
            assert!((l - r).abs() < 1e-14, "row residual {} vs {}", l, r);
        }
    }

    #[test]
    fn test_homogenized_and_distribute() {
        let mut c = Constraints::new();
        c.add_dirichlet(1, 5.0);
        let h = c.homogenized();
        assert_eq!(h.value(1), Some(0.0));

        let mut x = vec![9.0; 3];
        c.distribute(&mut x);
        assert_eq!(x, vec![9.0, 5.0, 9.0]);
        h.set_zero(&mut x);
        assert_eq!(x[1], 0.0);
    }

    #[test]
    fn test_out_of_range_constraint() {
        let mut a = laplace_1d(2);
        let mut c = Constraints::new();
        c.add_dirichlet(7, 0.0);
        let err = c
            .apply_to_system(&mut a, &mut vec![0.0; 2], &mut vec![0.0; 2])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConstraint { dof: 7, n_dofs: 2 }));
    }
}
