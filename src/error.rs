//! Crate-wide error taxonomy.

use thiserror::Error;

/// Failures that must surface to the caller rather than being recovered
/// locally. `InvalidConstraint` (an empty equation after substitution) is
/// deliberately absent here: it is dropped and logged at `trace` level by
/// [`crate::constraints::ConstraintMatrix::from_constraints`] rather than
/// propagated.
#[derive(Debug, Error)]
pub enum Error {
    /// Substitution recursion while building a [`crate::constraints::ConstraintMatrix`]
    /// exceeded the number of DOFs already present in the matrix, which can
    /// only happen if the input constraints contain a cycle.
    #[error("constraint substitution for dof {dof} did not terminate after {depth} steps")]
    ConstraintCycle {
        /// The DOF whose substitution chain failed to terminate.
        dof: usize,
        /// The recursion depth at which the guard tripped.
        depth: usize,
    },

    /// An operator or vector had a size inconsistent with the declared
    /// number of DOFs.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Expected length or extent.
        expected: usize,
        /// Actual length or extent.
        got: usize,
    },

    /// A facet's Jacobian was zero (or non-finite), so no orientation or
    /// quadrature can be built on it.
    #[error("facet {facet_index} is degenerate (zero jacobian)")]
    DegenerateFacet {
        /// Index of the offending facet within its mesh.
        facet_index: usize,
    },

    /// An adaptive quadrature recursion exhausted its depth cap without
    /// meeting `tolerance`. The dispatcher itself does not return this
    /// variant (it returns the best estimate with a `degraded` flag, per
    /// §7's "return best estimate and flag"); callers that need strict
    /// convergence can promote a degraded result into this error via
    /// [`crate::integration::require_converged`].
    #[error("adaptive quadrature did not reach tolerance {tolerance} within depth {depth}")]
    QuadratureNonconvergence {
        /// The tolerance that was not met.
        tolerance: f64,
        /// The recursion depth at which the integrator gave up.
        depth: usize,
    },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
