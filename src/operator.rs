//! Dense operator storage (§3: `Operator`, `BlockOperator`).

/// A dense, row-major `n_rows x n_cols` real matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Operator {
    pub n_rows: usize,
    pub n_cols: usize,
    pub data: Vec<f64>,
}

impl Operator {
    /// A zero-filled operator of the given shape.
    pub fn zeros(n_rows: usize, n_cols: usize) -> Self {
        Operator {
            n_rows,
            n_cols,
            data: vec![0.0; n_rows * n_cols],
        }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.n_cols + col]
    }

    #[inline]
    pub fn get_mut(&mut self, row: usize, col: usize) -> &mut f64 {
        &mut self.data[row * self.n_cols + col]
    }

    /// Dense matrix-vector product.
    pub fn matvec(&self, x: &[f64]) -> Vec<f64> {
        assert_eq!(x.len(), self.n_cols);
        (0..self.n_rows)
            .map(|r| (0..self.n_cols).map(|c| self.get(r, c) * x[c]).sum())
            .collect()
    }
}

/// An `n_comp_rows x n_comp_cols` grid of [`Operator`]s, used when a kernel
/// returns an `R x C` tensor and each tensor component gets its own dense
/// block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockOperator {
    pub n_comp_rows: usize,
    pub n_comp_cols: usize,
    pub ops: Vec<Operator>,
}

impl BlockOperator {
    pub fn get(&self, comp_row: usize, comp_col: usize) -> &Operator {
        &self.ops[comp_row * self.n_comp_cols + comp_col]
    }

    pub fn get_mut(&mut self, comp_row: usize, comp_col: usize) -> &mut Operator {
        &mut self.ops[comp_row * self.n_comp_cols + comp_col]
    }
}
