//! Error tables with observed convergence orders.

use std::fmt;

use log::info;

/// One refinement cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceRow {
    /// Step size or cell size of the cycle.
    pub h: f64,
    pub n_dofs: usize,
    pub errors: Vec<f64>,
}

/// Errors per cycle for a fixed set of named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConvergenceTable {
    title: String,
    columns: Vec<String>,
    rows: Vec<ConvergenceRow>,
}

impl ConvergenceTable {
    pub fn new(title: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            title: title.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[ConvergenceRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a cycle. Missing columns are filled with NaN and extra
    /// values are dropped.
    pub fn add_row(&mut self, h: f64, n_dofs: usize, errors: &[f64]) {
        let mut errors = errors.to_vec();
        errors.resize(self.columns.len(), f64::NAN);
        self.rows.push(ConvergenceRow { h, n_dofs, errors });
    }

    /// `log(e_{k-1}/e_k) / log(h_{k-1}/h_k)` per row and column; `None`
    /// for the first row or where the quotient is undefined.
    pub fn rates(&self) -> Vec<Vec<Option<f64>>> {
        self.rows
            .iter()
            .enumerate()
            .map(|(k, row)| {
                (0..self.columns.len())
                    .map(|c| {
                        let prev = self.rows.get(k.checked_sub(1)?)?;
                        observed_order(prev.h, row.h, prev.errors[c], row.errors[c])
                    })
                    .collect()
            })
            .collect()
    }

    /// Order of the last two rows in one column.
    pub fn last_rate(&self, column: usize) -> Option<f64> {
        self.rates().last()?.get(column).copied().flatten()
    }

    pub fn log(&self) {
        for line in self.to_string().lines() {
            info!("{}", line);
        }
    }
}

fn observed_order(h_prev: f64, h: f64, e_prev: f64, e: f64) -> Option<f64> {
    let rate = (e_prev / e).ln() / (h_prev / h).ln();
    rate.is_finite().then_some(rate)
}

impl fmt::Display for ConvergenceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        write!(f, "{:>12} {:>10}", "h", "dofs")?;
        for column in &self.columns {
            write!(f, " {:>12} {:>6}", column, "rate")?;
        }
        writeln!(f)?;

        for (row, rates) in self.rows.iter().zip(self.rates()) {
            write!(f, "{:>12.4e} {:>10}", row.h, row.n_dofs)?;
            for (error, rate) in row.errors.iter().zip(rates) {
                match rate {
                    Some(rate) => write!(f, " {:>12.4e} {:>6.2}", error, rate)?,
                    None => write!(f, " {:>12.4e} {:>6}", error, "-")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
