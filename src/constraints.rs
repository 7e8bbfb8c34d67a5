//! Gaussian elimination of linear DOF constraints to echelon form, and the
//! condense/distribute operators that move between the full and reduced
//! DOF spaces (§4.E).

use std::collections::BTreeMap;

use tracing::trace;

use crate::error::{Error, Result};
use crate::operator::{BlockOperator, Operator};

/// Relative tolerance (of the largest weight in an equation) below which a
/// term is treated as eliminated during substitution.
const ZERO_TERM_REL_EPS: f64 = 1e-13;

/// One `weight * x_dof` term of a constraint equation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearTerm {
    pub dof: usize,
    pub weight: f64,
}

/// `sum_i w_i x_{d_i} = rhs`, with distinct DOFs across `terms`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintEQ {
    pub terms: Vec<LinearTerm>,
    pub rhs: f64,
}

impl ConstraintEQ {
    pub fn new(terms: Vec<LinearTerm>, rhs: f64) -> Self {
        ConstraintEQ { terms, rhs }
    }

    fn max_dof_index(&self) -> usize {
        self.terms
            .iter()
            .enumerate()
            .max_by_key(|(_, t)| t.dof)
            .map(|(i, _)| i)
            .expect("constraint equation has no terms")
    }
}

/// A constraint rewritten as `x_{constrained_dof} = rhs + sum_i w_i x_{d_i}`
/// with every `d_i < constrained_dof` (invariant I2).
#[derive(Debug, Clone, PartialEq)]
pub struct RearrangedConstraintEQ {
    pub constrained_dof: usize,
    pub terms: Vec<LinearTerm>,
    pub rhs: f64,
}

/// Echelon-form constraint system: a functional, lower-triangular map from
/// constrained DOF to its defining equation (§3 invariants I1–I3).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintMatrix {
    rows: BTreeMap<usize, RearrangedConstraintEQ>,
}

enum Elimination {
    Row(RearrangedConstraintEQ),
    Dropped,
}

fn filter_zero_terms(c: ConstraintEQ) -> ConstraintEQ {
    if c.terms.is_empty() {
        return c;
    }
    let max_weight = c.terms.iter().map(|t| t.weight.abs()).fold(0.0_f64, f64::max);
    let eps = ZERO_TERM_REL_EPS * max_weight;
    ConstraintEQ {
        terms: c.terms.into_iter().filter(|t| t.weight.abs() > eps).collect(),
        rhs: c.rhs,
    }
}

/// Substitute the stored echelon row for `c.terms[idx]` into `c`, merging
/// weights for any DOF that appears both in `c` and in the stored row.
fn substitute(c: &ConstraintEQ, idx: usize, stored: &RearrangedConstraintEQ) -> ConstraintEQ {
    let removed = c.terms[idx];
    let mut merged: BTreeMap<usize, f64> = BTreeMap::new();
    for (i, t) in c.terms.iter().enumerate() {
        if i == idx {
            continue;
        }
        *merged.entry(t.dof).or_insert(0.0) += t.weight;
    }
    for t in &stored.terms {
        *merged.entry(t.dof).or_insert(0.0) += removed.weight * t.weight;
    }
    let rhs = c.rhs - removed.weight * stored.rhs;
    ConstraintEQ {
        terms: merged.into_iter().map(|(dof, weight)| LinearTerm { dof, weight }).collect(),
        rhs,
    }
}

/// Isolate the term at `idx` on the left-hand side, dividing the rest by
/// `-weight`.
fn isolate(c: ConstraintEQ, idx: usize) -> RearrangedConstraintEQ {
    let pivot = c.terms[idx];
    let terms = c
        .terms
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != idx)
        .map(|(_, t)| LinearTerm { dof: t.dof, weight: -t.weight / pivot.weight })
        .collect();
    RearrangedConstraintEQ {
        constrained_dof: pivot.dof,
        terms,
        rhs: c.rhs / pivot.weight,
    }
}

fn make_lower_triangular(
    mut c: ConstraintEQ,
    rows: &BTreeMap<usize, RearrangedConstraintEQ>,
    max_depth: usize,
) -> Result<Elimination> {
    let mut depth = 0;
    loop {
        if c.terms.is_empty() {
            return Ok(Elimination::Dropped);
        }
        let idx = c.max_dof_index();
        let last_dof = c.terms[idx].dof;
        match rows.get(&last_dof) {
            Some(stored) => {
                if depth >= max_depth {
                    return Err(Error::ConstraintCycle { dof: last_dof, depth });
                }
                c = filter_zero_terms(substitute(&c, idx, stored));
                depth += 1;
            }
            None => return Ok(Elimination::Row(isolate(c, idx))),
        }
    }
}

impl ConstraintMatrix {
    /// Number of constrained DOFs (echelon rows).
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_constrained(&self, dof: usize) -> bool {
        self.rows.contains_key(&dof)
    }

    pub fn row(&self, dof: usize) -> Option<&RearrangedConstraintEQ> {
        self.rows.get(&dof)
    }

    /// Reduce an unordered, potentially redundant or cyclic set of
    /// constraints to echelon form. Constraints that reduce to the empty
    /// equation (redundant or contradictory-after-cancellation with prior
    /// constraints) are dropped and logged at `trace` level, per §4.E.
    pub fn from_constraints(constraints: &[ConstraintEQ]) -> Result<Self> {
        let mut rows: BTreeMap<usize, RearrangedConstraintEQ> = BTreeMap::new();
        let max_dof = constraints
            .iter()
            .flat_map(|c| c.terms.iter().map(|t| t.dof))
            .max()
            .map(|m| m + 1)
            .unwrap_or(0);

        for (i, c) in constraints.iter().enumerate() {
            match make_lower_triangular(c.clone(), &rows, max_dof)? {
                Elimination::Row(row) => {
                    rows.insert(row.constrained_dof, row);
                }
                Elimination::Dropped => {
                    trace!(constraint_index = i, "dropping redundant or contradictory constraint");
                }
            }
        }
        Ok(ConstraintMatrix { rows })
    }

    /// Project a full-sized vector onto the reduced (free-DOF) space; the
    /// adjoint of [`Self::distribute`] (§4.E, §8 invariant 2).
    pub fn condense(&self, all: &[f64]) -> Vec<f64> {
        let n = all.len();
        let mut acc = vec![0.0; n];
        let mut free_values = vec![0.0; n];
        for d in (0..n).rev() {
            let s = all[d] + acc[d];
            acc[d] = 0.0;
            match self.rows.get(&d) {
                Some(row) => {
                    for t in &row.terms {
                        acc[t.dof] += t.weight * s;
                    }
                }
                None => free_values[d] = s,
            }
        }
        (0..n).filter(|d| !self.is_constrained(*d)).map(|d| free_values[d]).collect()
    }

    /// Reconstruct a full-sized vector from its reduced representation
    /// (§4.E, §8 invariant 3: the result satisfies every input constraint).
    pub fn distribute(&self, reduced: &[f64], total_dofs: usize) -> Vec<f64> {
        let mut out = vec![0.0; total_dofs];
        let mut next = 0;
        for d in 0..total_dofs {
            if !self.is_constrained(d) {
                out[d] = reduced[next];
                next += 1;
            }
        }
        for d in 0..total_dofs {
            if let Some(row) = self.rows.get(&d) {
                let mut val = row.rhs;
                for t in &row.terms {
                    debug_assert!(t.dof < d, "echelon invariant I2 violated");
                    val += t.weight * out[t.dof];
                }
                out[d] = val;
            }
        }
        out
    }
}

/// Two-sided analog of [`ConstraintMatrix::condense`] for a dense operator
/// (§4.E): row axis is resolved before column axis when both indices of an
/// entry are constrained.
fn add_entry_with_constraints(
    row_cm: &ConstraintMatrix,
    col_cm: &ConstraintMatrix,
    data: &mut [f64],
    n_cols: usize,
    row: usize,
    col: usize,
    value: f64,
) {
    if !row_cm.is_constrained(row) {
        if !col_cm.is_constrained(col) {
            data[row * n_cols + col] += value;
            return;
        }
        let constraint = col_cm.row(col).unwrap();
        for t in &constraint.terms {
            debug_assert!(t.dof < col);
            data[row * n_cols + t.dof] += t.weight * value;
        }
        return;
    }
    let constraint = row_cm.row(row).unwrap();
    for t in &constraint.terms {
        debug_assert!(t.dof < row);
        data[t.dof * n_cols + col] += t.weight * value;
    }
}

fn remove_constrained(row_cm: &ConstraintMatrix, col_cm: &ConstraintMatrix, matrix: &Operator) -> Operator {
    let n_rows_out = matrix.n_rows - row_cm.len();
    let n_cols_out = matrix.n_cols - col_cm.len();
    let mut out = Operator::zeros(n_rows_out, n_cols_out);
    let mut out_row = 0;
    for row in 0..matrix.n_rows {
        if row_cm.is_constrained(row) {
            continue;
        }
        let mut out_col = 0;
        for col in 0..matrix.n_cols {
            if col_cm.is_constrained(col) {
                continue;
            }
            *out.get_mut(out_row, out_col) = matrix.get(row, col);
            out_col += 1;
        }
        out_row += 1;
    }
    out
}

/// Condense a full-sized dense operator through both axes' constraint
/// matrices, producing the reduced-sized operator (§4.E, §8 invariant 9).
pub fn condense_matrix(row_cm: &ConstraintMatrix, col_cm: &ConstraintMatrix, matrix: &Operator) -> Operator {
    let mut condensed = vec![0.0; matrix.n_rows * matrix.n_cols];
    for row in (0..matrix.n_rows).rev() {
        for col in (0..matrix.n_cols).rev() {
            let idx = row * matrix.n_cols + col;
            let value = condensed[idx] + matrix.data[idx];
            condensed[idx] = 0.0;
            add_entry_with_constraints(row_cm, col_cm, &mut condensed, matrix.n_cols, row, col, value);
        }
    }
    remove_constrained(
        row_cm,
        col_cm,
        &Operator { n_rows: matrix.n_rows, n_cols: matrix.n_cols, data: condensed },
    )
}

/// Condense each component block of a [`BlockOperator`] independently
/// against its row/column constraint matrices. Dropped from `spec.md`'s
/// single-`Operator` description but present in the original
/// (`condense_block_operator` in `constraint_matrix.cpp`) and needed
/// whenever a tensor kernel (R, C > 1) is in play.
pub fn condense_block_operator(
    row_cms: &[ConstraintMatrix],
    col_cms: &[ConstraintMatrix],
    op: &BlockOperator,
) -> BlockOperator {
    let mut ops = Vec::with_capacity(op.n_comp_rows * op.n_comp_cols);
    for d1 in 0..op.n_comp_rows {
        for d2 in 0..op.n_comp_cols {
            ops.push(condense_matrix(&row_cms[d1], &col_cms[d2], op.get(d1, d2)));
        }
    }
    BlockOperator { n_comp_rows: op.n_comp_rows, n_comp_cols: op.n_comp_cols, ops }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(dof: usize, weight: f64) -> LinearTerm {
        LinearTerm { dof, weight }
    }

    /// S1: `x0 = x1`, `x1 = x2 + 1`.
    #[test]
    fn echelon_scenario_s1() {
        let constraints = vec![
            ConstraintEQ::new(vec![term(0, 1.0), term(1, -1.0)], 0.0),
            ConstraintEQ::new(vec![term(1, 1.0), term(2, -1.0)], 1.0),
        ];
        let cm = ConstraintMatrix::from_constraints(&constraints).unwrap();
        assert_eq!(cm.len(), 2);
        assert!(cm.is_constrained(1));
        assert!(cm.is_constrained(2));

        let full = cm.distribute(&[4.0], 3);
        assert_eq!(full, vec![4.0, 4.0, 3.0]);

        let reduced = cm.condense(&[10.0, 20.0, 30.0]);
        assert_eq!(reduced, vec![60.0]);
    }

    /// S2: `x0 = x1`, `x1 = x0` — the second constraint is redundant and
    /// dropped after substitution empties it.
    #[test]
    fn cyclic_constraint_is_dropped() {
        let constraints = vec![
            ConstraintEQ::new(vec![term(0, 1.0), term(1, -1.0)], 0.0),
            ConstraintEQ::new(vec![term(1, 1.0), term(0, -1.0)], 0.0),
        ];
        let cm = ConstraintMatrix::from_constraints(&constraints).unwrap();
        assert_eq!(cm.len(), 1);
    }

    #[test]
    fn condense_distribute_are_adjoint() {
        let constraints = vec![ConstraintEQ::new(vec![term(3, 1.0), term(0, -2.0)], 5.0)];
        let cm = ConstraintMatrix::from_constraints(&constraints).unwrap();
        let reduced = vec![1.0, 2.0, 3.0];
        let full = cm.distribute(&reduced, 4);
        let round_trip = cm.condense(&full);
        for (a, b) in reduced.iter().zip(round_trip.iter()) {
            assert!((a - b).abs() < 1e-10);
        }
    }

    #[test]
    fn distribute_satisfies_input_constraints() {
        let constraints = vec![ConstraintEQ::new(vec![term(2, 1.0), term(1, -1.0), term(0, -1.0)], 3.0)];
        let cm = ConstraintMatrix::from_constraints(&constraints).unwrap();
        let full = cm.distribute(&[2.0, 4.0], 3);
        // x2 - x1 - x0 == 3
        assert!((full[2] - full[1] - full[0] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn condense_matrix_matches_vector_adjoint() {
        let constraints = vec![ConstraintEQ::new(vec![term(2, 1.0), term(0, -1.0)], 1.0)];
        let cm = ConstraintMatrix::from_constraints(&constraints).unwrap();

        let mut identity = Operator::zeros(3, 3);
        for i in 0..3 {
            *identity.get_mut(i, i) = 1.0;
        }
        let reduced_op = condense_matrix(&cm, &cm, &identity);

        let v_r = vec![2.0, 5.0];
        let lhs = reduced_op.matvec(&v_r);
        let full = cm.distribute(&v_r, 3);
        let rhs = cm.condense(&full);
        for (a, b) in lhs.iter().zip(rhs.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }
}
