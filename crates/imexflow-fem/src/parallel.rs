//! Parallel cell-loop assembly.
//!
//! Cells are split into contiguous ranges, each range stamps into its own
//! buffer, and buffers are merged in range order. The merged sequence is
//! independent of the thread count, so assembled values are reproducible.

use rayon::prelude::*;

/// `(row, col, value)` contribution of a cell.
pub type Triplet = (usize, usize, f64);

/// Below this many cells the loop runs on the calling thread.
pub const PARALLEL_THRESHOLD: usize = 256;

/// Split `0..total` into at most `n_chunks` contiguous ranges.
pub fn parallel_ranges(total: usize, n_chunks: usize) -> Vec<(usize, usize)> {
    if n_chunks == 0 || total == 0 {
        return vec![];
    }
    let chunk_size = total.div_ceil(n_chunks);
    (0..n_chunks)
        .map(|i| {
            let start = i * chunk_size;
            let end = ((i + 1) * chunk_size).min(total);
            (start, end)
        })
        .filter(|(start, end)| start < end)
        .collect()
}

fn chunked<T, F>(n_cells: usize, stamp: F) -> Vec<Vec<T>>
where
    T: Send,
    F: Fn(usize, &mut Vec<T>) + Sync,
{
    let run = |(start, end): (usize, usize)| {
        let mut buffer = Vec::with_capacity((end - start) * 16);
        for cell in start..end {
            stamp(cell, &mut buffer);
        }
        buffer
    };

    if n_cells < PARALLEL_THRESHOLD {
        return vec![run((0, n_cells))];
    }
    let ranges = parallel_ranges(n_cells, 4 * rayon::current_num_threads());
    ranges.into_par_iter().map(run).collect()
}

/// Collect matrix triplets from every cell.
pub fn assemble_triplets<F>(n_cells: usize, stamp: F) -> Vec<Triplet>
where
    F: Fn(usize, &mut Vec<Triplet>) + Sync,
{
    let buffers = chunked(n_cells, stamp);
    let total: usize = buffers.iter().map(Vec::len).sum();
    let mut merged = Vec::with_capacity(total);
    for buffer in buffers {
        merged.extend(buffer);
    }
    merged
}

/// Sum `(dof, value)` contributions from every cell into a vector.
pub fn assemble_vector<F>(n_dofs: usize, n_cells: usize, stamp: F) -> Vec<f64>
where
    F: Fn(usize, &mut Vec<(usize, f64)>) + Sync,
{
    let mut result = vec![0.0; n_dofs];
    for buffer in chunked(n_cells, stamp) {
        for (dof, value) in buffer {
            result[dof] += value;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallel_ranges() {
        assert_eq!(parallel_ranges(10, 3), vec![(0, 4), (4, 8), (8, 10)]);
        assert_eq!(parallel_ranges(3, 10).len(), 3);
        assert!(parallel_ranges(0, 4).is_empty());
        assert!(parallel_ranges(10, 0).is_empty());
    }

    #[test]
    fn test_triplets_keep_cell_order() {
        let n = 3 * PARALLEL_THRESHOLD;
        let triplets = assemble_triplets(n, |cell, buf| buf.push((cell, cell, cell as f64)));
        assert_eq!(triplets.len(), n);
        assert!(triplets.iter().enumerate().all(|(i, t)| t.0 == i));
    }

    #[test]
    fn test_vector_sums_shared_dofs() {
        let n = 2 * PARALLEL_THRESHOLD;
        let v = assemble_vector(2, n, |cell, buf| buf.push((cell % 2, 1.0)));
        assert_eq!(v, vec![PARALLEL_THRESHOLD as f64; 2]);
    }
}
