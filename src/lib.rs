//! Numerical core of a boundary-element engine.
//!
//! Surface geometry is discretized into facets; the boundary integral
//! operators coupling them are built either as a dense matrix
//! ([`assembly::assemble_operator`]) or applied matrix-free through a
//! kernel-independent FMM ([`fmm::fmm_matvec`]). Coincident-vertex and
//! boundary-condition constraints ([`continuity`]) are reduced into a
//! free-DOF space by [`constraints::ConstraintMatrix`] before either path
//! hands its result to an external iterative solver ([`solve`]).

pub mod assembly;
pub mod config;
pub mod constraints;
pub mod continuity;
pub mod error;
pub mod fmm;
pub mod geometry;
pub mod integration;
pub mod kernel;
pub mod mesh;
pub mod octree;
pub mod operator;
pub mod quadrature;
pub mod shapes;
pub mod solve;
pub mod tensor;

pub use config::EngineConfig;
pub use error::{Error, Result};
