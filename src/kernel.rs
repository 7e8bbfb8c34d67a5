//! Kernel interface and the built-in analytic Laplace kernels (§6).
//!
//! A kernel is a pure function of the separation `delta = y - x` (and the
//! two facet normals) returning an `R x C` tensor; the original's
//! static-polymorphic kernel objects collapse here into a trait plus a
//! small tagged enum for the library-provided kernels, with the trait
//! itself the user-extensible hook.

use crate::tensor::{SmallMatrix, Vector};

/// A kernel `K(delta, n_src, n_obs) -> tensor[R][C]`, evaluated at a fixed
/// source/observation pair. `r2` is passed alongside `delta` since most
/// kernels need `|delta|^2` and recomputing it from `delta` at every call
/// site would be wasteful inside quadrature loops.
pub trait Kernel<const DIM: usize, const R: usize, const C: usize> {
    fn eval(&self, r2: f64, delta: Vector<DIM>, n_src: Vector<DIM>, n_obs: Vector<DIM>) -> SmallMatrix<R, C>;
}

/// The scalar Laplace single-layer kernel in 3D: `1 / (4*pi*sqrt(r2))`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LaplaceSingle3D;

impl Kernel<3, 1, 1> for LaplaceSingle3D {
    fn eval(&self, r2: f64, _delta: Vector<3>, _n_src: Vector<3>, _n_obs: Vector<3>) -> SmallMatrix<1, 1> {
        let mut m = SmallMatrix::zero();
        m[(0, 0)] = 1.0 / (4.0 * std::f64::consts::PI * r2.sqrt());
        m
    }
}

/// The scalar Laplace double-layer kernel in 3D:
/// `(n_src . delta) / (4*pi*r2*sqrt(r2))`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LaplaceDouble3D;

impl Kernel<3, 1, 1> for LaplaceDouble3D {
    fn eval(&self, r2: f64, delta: Vector<3>, n_src: Vector<3>, _n_obs: Vector<3>) -> SmallMatrix<1, 1> {
        let mut m = SmallMatrix::zero();
        m[(0, 0)] = n_src.dot(&delta) / (4.0 * std::f64::consts::PI * r2 * r2.sqrt());
        m
    }
}

/// The scalar Laplace single-layer kernel in 2D: `log(sqrt(r2)) / (2*pi)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LaplaceSingle2D;

impl Kernel<2, 1, 1> for LaplaceSingle2D {
    fn eval(&self, r2: f64, _delta: Vector<2>, _n_src: Vector<2>, _n_obs: Vector<2>) -> SmallMatrix<1, 1> {
        let mut m = SmallMatrix::zero();
        m[(0, 0)] = r2.sqrt().ln() / (2.0 * std::f64::consts::PI);
        m
    }
}

/// The scalar Laplace double-layer kernel in 2D: `(n_src . delta) / (2*pi*r2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LaplaceDouble2D;

impl Kernel<2, 1, 1> for LaplaceDouble2D {
    fn eval(&self, r2: f64, delta: Vector<2>, n_src: Vector<2>, _n_obs: Vector<2>) -> SmallMatrix<1, 1> {
        let mut m = SmallMatrix::zero();
        m[(0, 0)] = n_src.dot(&delta) / (2.0 * std::f64::consts::PI * r2);
        m
    }
}

/// The scalar Laplace hypersingular kernel in 2D:
/// `[-(n_obs.n_src)/r2 + 2(n_src.delta)(n_obs.delta)/r2^2] / (2*pi)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LaplaceHypersingular2D;

impl Kernel<2, 1, 1> for LaplaceHypersingular2D {
    fn eval(&self, r2: f64, delta: Vector<2>, n_src: Vector<2>, n_obs: Vector<2>) -> SmallMatrix<1, 1> {
        let mut m = SmallMatrix::zero();
        let term = -n_obs.dot(&n_src) / r2 + 2.0 * n_src.dot(&delta) * n_obs.dot(&delta) / (r2 * r2);
        m[(0, 0)] = term / (2.0 * std::f64::consts::PI);
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn laplace_single_3d_matches_formula() {
        let k = LaplaceSingle3D;
        let delta = Vector([1.0, 0.0, 0.0]);
        let m = k.eval(delta.norm2(), delta, Vector::zero(), Vector::zero());
        assert_relative_eq!(m[(0, 0)], 1.0 / (4.0 * std::f64::consts::PI));
    }

    #[test]
    fn laplace_double_2d_vanishes_for_orthogonal_normal() {
        let k = LaplaceDouble2D;
        let delta = Vector([1.0, 0.0]);
        let n_src = Vector([0.0, 1.0]);
        let m = k.eval(delta.norm2(), delta, n_src, Vector::zero());
        assert_relative_eq!(m[(0, 0)], 0.0, epsilon = 1e-14);
    }

    #[test]
    fn laplace_hypersingular_2d_matches_formula() {
        let k = LaplaceHypersingular2D;
        let delta = Vector([1.0, 0.0]);
        let n_src = Vector([1.0, 0.0]);
        let n_obs = Vector([1.0, 0.0]);
        let r2 = delta.norm2();
        let m = k.eval(r2, delta, n_src, n_obs);
        let expected = (-1.0 / r2 + 2.0 * 1.0 * 1.0 / (r2 * r2)) / (2.0 * std::f64::consts::PI);
        assert_relative_eq!(m[(0, 0)], expected);
    }
}
