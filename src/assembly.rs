//! Dense operator assembly (§4.I): for every (observation facet, source
//! facet) pair, build the element-to-element influence block via the
//! integration dispatcher, then condense the full-sized operator through
//! the constraint system.

use rayon::prelude::*;

use crate::config::EngineConfig;
use crate::constraints::{condense_matrix, ConstraintMatrix};
use crate::integration::{integrate_term, IntegralTerm};
use crate::kernel::Kernel;
use crate::mesh::{DofMap, FacetInfo, FacetOps};
use crate::operator::Operator;
use crate::quadrature::gauss_rule;
use crate::tensor::Vector;

/// Builds the full (uncondensed) `N x N` scalar operator for `kernel` over
/// a single mesh: row `r` is DOF `r` of the observation space, column `c`
/// is DOF `c` of the source space, both laid out per [`DofMap`].
///
/// The outer loop over observation facets is parallel (§4.I, §5): each
/// facet writes only its own `DIM` rows of the dense operator, a disjoint
/// range per task.
pub fn assemble_operator<const DIM: usize, K: Kernel<DIM, 1, 1> + Sync>(
    facets: &[FacetInfo<DIM>],
    dofmap: &DofMap<DIM>,
    kernel: &K,
    config: &EngineConfig,
) -> Operator
where
    crate::mesh::Facet<DIM>: FacetOps<DIM>,
{
    let n = dofmap.global_size();
    let quad = gauss_rule::<DIM>(config.far_gauss_order);

    let rows: Vec<(usize, Vec<f64>)> = facets
        .par_iter()
        .enumerate()
        .map(|(obs_facet_idx, obs_facet)| {
            let mut local_rows = vec![vec![0.0; n]; DIM];
            for (xi, w) in &quad {
                let obs_loc = obs_facet.facet.ref_to_real(*xi);
                let obs_normal = obs_facet.normal;
                let obs_basis = <crate::mesh::Facet<DIM> as FacetOps<DIM>>::basis(*xi);

                for (src_facet_idx, src_facet) in facets.iter().enumerate() {
                    let term = IntegralTerm {
                        obs_loc,
                        obs_normal,
                        richardson_dir: obs_normal,
                        facet: src_facet,
                    };
                    let (tensor, _degraded) = integrate_term(&term, kernel, config);
                    for src_local in 0..DIM {
                        let col = dofmap.local_to_global(src_facet_idx, src_local);
                        let value = tensor[src_local][(0, 0)];
                        for obs_local in 0..DIM {
                            local_rows[obs_local][col] += w * obs_basis[obs_local] * value * obs_facet.jacobian;
                        }
                    }
                }
            }
            (obs_facet_idx, local_rows.concat())
        })
        .collect();

    let mut op = Operator::zeros(n, n);
    for (obs_facet_idx, packed) in rows {
        for obs_local in 0..DIM {
            let row = dofmap.local_to_global(obs_facet_idx, obs_local);
            let start = obs_local * n;
            op.data[row * n..(row + 1) * n].copy_from_slice(&packed[start..start + n]);
        }
    }
    op
}

/// Evaluates a single point's influence tensor against every facet,
/// useful for a handful of interior-point evaluations (e.g. scenarios S4,
/// S5) without assembling the full boundary operator.
pub fn assemble_point_row<const DIM: usize, K: Kernel<DIM, 1, 1>>(
    obs: Vector<DIM>,
    obs_normal: Vector<DIM>,
    facets: &[FacetInfo<DIM>],
    dofmap: &DofMap<DIM>,
    kernel: &K,
    config: &EngineConfig,
) -> Vec<f64>
where
    crate::mesh::Facet<DIM>: FacetOps<DIM>,
{
    let n = dofmap.global_size();
    let mut row = vec![0.0; n];
    for (src_facet_idx, src_facet) in facets.iter().enumerate() {
        let term = IntegralTerm { obs_loc: obs, obs_normal, richardson_dir: obs_normal, facet: src_facet };
        let (tensor, _degraded) = integrate_term(&term, kernel, config);
        for src_local in 0..DIM {
            let col = dofmap.local_to_global(src_facet_idx, src_local);
            row[col] += tensor[src_local][(0, 0)];
        }
    }
    row
}

/// Assembles the full operator and condenses it through the row/column
/// constraint matrices (§4.E `condense_matrix`).
pub fn assemble_condensed<const DIM: usize, K: Kernel<DIM, 1, 1> + Sync>(
    facets: &[FacetInfo<DIM>],
    dofmap: &DofMap<DIM>,
    kernel: &K,
    config: &EngineConfig,
    row_cm: &ConstraintMatrix,
    col_cm: &ConstraintMatrix,
) -> Operator
where
    crate::mesh::Facet<DIM>: FacetOps<DIM>,
{
    let full = assemble_operator(facets, dofmap, kernel, config);
    condense_matrix(row_cm, col_cm, &full)
}
