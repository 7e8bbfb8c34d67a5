//! Solve harness (§4.J): wraps a condensed operator or an FMM evaluator
//! into the matvec closure an external iterative solver calls, handling
//! distribute/condense at the boundary so the solver only ever sees the
//! reduced (free-DOF) space.

use crate::constraints::ConstraintMatrix;
use crate::fmm::fmm_matvec;
use crate::kernel::Kernel;
use crate::operator::Operator;
use crate::config::EngineConfig;
use crate::tensor::Vector;

/// A reduced-space matvec: `x_reduced -> y_reduced`, the sole interface an
/// external iterative solver needs (§6 "Solver callback").
pub type MatVec<'a> = Box<dyn Fn(&[f64]) -> Vec<f64> + 'a>;

/// Builds a matvec closure around a dense operator: distribute the reduced
/// input to the full DOF space, apply the operator, condense the result.
pub fn dense_matvec<'a>(op: &'a Operator, cm: &'a ConstraintMatrix, total_dofs: usize) -> MatVec<'a> {
    Box::new(move |x_reduced: &[f64]| {
        let full = cm.distribute(x_reduced, total_dofs);
        let y_full = op.matvec(&full);
        cm.condense(&y_full)
    })
}

/// Builds a matvec closure around the FMM evaluator for a scalar kernel
/// over point charges (no constraint reduction: FMM here evaluates a raw
/// N-body sum, not a boundary operator row space).
pub fn fmm_point_matvec<'a, const DIM: usize, K: Kernel<DIM, 1, 1> + Sync>(
    points: &'a [Vector<DIM>],
    kernel: &'a K,
    config: &'a EngineConfig,
) -> MatVec<'a> {
    Box::new(move |charges: &[f64]| fmm_matvec(points, charges, points, kernel, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{ConstraintEQ, LinearTerm};

    #[test]
    fn dense_matvec_round_trips_through_distribute_condense() {
        let op = Operator { n_rows: 3, n_cols: 3, data: vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0] };
        let constraints = vec![ConstraintEQ::new(vec![LinearTerm { dof: 2, weight: 1.0 }, LinearTerm { dof: 0, weight: -1.0 }], 0.0)];
        let cm = ConstraintMatrix::from_constraints(&constraints).unwrap();
        let matvec = dense_matvec(&op, &cm, 3);
        // distribute([1,2]) = [1,2,1] (x2 = x0); identity matvec leaves it
        // unchanged; condense is distribute's adjoint, so the functional
        // [1,2,1] folds x2's weight back onto x0: [1+1, 2] = [2, 2].
        let y = matvec(&[1.0, 2.0]);
        assert_eq!(y, vec![2.0, 2.0]);
    }
}
