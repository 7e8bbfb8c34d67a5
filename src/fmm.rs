//! Kernel-independent FMM/treecode evaluator (§4.H): Chebyshev expansions,
//! a dual-tree traversal driven by a multipole-acceptance criterion, and the
//! P2M -> (M2L + M2P + P2P) -> L2P pipeline.
//!
//! Scoped to scalar kernels (`R = C = 1`, e.g. the Laplace single layer):
//! the tensor-kernel case would need an `N_p`-node expansion per tensor
//! component, which is a straightforward but unwritten generalization of
//! the scalar pipeline below.

use rayon::prelude::*;

use crate::config::EngineConfig;
use crate::kernel::Kernel;
use crate::octree::Octree;
use crate::tensor::Vector;

/// 1D Chebyshev nodes of the first kind on `[-1, 1]`: `cos(pi(2k+1)/2p)`.
fn chebyshev_nodes_1d(p: usize) -> Vec<f64> {
    (0..p)
        .map(|k| ((std::f64::consts::PI * (2.0 * k as f64 + 1.0)) / (2.0 * p as f64)).cos())
        .collect()
}

/// `S_p(x, x_k) = 1/p + (2/p) sum_{j=1}^{p-1} T_j(x) T_j(x_k)`, the
/// kernel-independent interpolation weight of a point `x` against Chebyshev
/// node `x_k` (Fong & Darve's black-box FMM formula).
fn s_n(p: usize, x: f64, xk: f64) -> f64 {
    let x = x.clamp(-1.0, 1.0);
    let tx = x.acos();
    let txk = xk.acos();
    let mut sum = 1.0;
    for j in 1..p {
        sum += 2.0 * (j as f64 * tx).cos() * (j as f64 * txk).cos();
    }
    sum / p as f64
}

/// Decomposes a flat node index `0..p^DIM` into one Chebyshev-node index per
/// axis (mixed radix base `p`).
fn node_multi_index<const DIM: usize>(mut j: usize, p: usize) -> [usize; DIM] {
    let mut idx = [0usize; DIM];
    for d in 0..DIM {
        idx[d] = j % p;
        j /= p;
    }
    idx
}

/// `S_p` evaluated against a full `DIM`-dimensional node, as a product over
/// axes.
fn s_n_multi<const DIM: usize>(p: usize, ref_point: Vector<DIM>, node: &[usize; DIM], nodes_1d: &[f64]) -> f64 {
    (0..DIM).map(|d| s_n(p, ref_point[d], nodes_1d[node[d]])).product()
}

fn to_ref<const DIM: usize>(point: Vector<DIM>, bounds: &crate::geometry::Box<DIM>) -> Vector<DIM> {
    Vector::from_fn(|d| (point[d] - bounds.center[d]) / bounds.half_width[d])
}

fn grid_node_real<const DIM: usize>(bounds: &crate::geometry::Box<DIM>, node: &[usize; DIM], nodes_1d: &[f64]) -> Vector<DIM> {
    Vector::from_fn(|d| bounds.center[d] + bounds.half_width[d] * nodes_1d[node[d]])
}

/// Bottom-up P2M pass (§4.H): leaves absorb their points' charges into
/// their own Chebyshev nodes; internal cells absorb each child's node
/// weights into their own nodes. Cell segments of `weights` never overlap,
/// so recursing children before the parent (post-order) is race-free even
/// though each cell only ever touches its own `N_p`-length slice.
fn p2m_recursive<const DIM: usize>(
    tree: &Octree<DIM, Vector<DIM>>,
    charges: &[f64],
    p: usize,
    n_p: usize,
    nodes_1d: &[f64],
    cell_idx: usize,
    weights: &mut [f64],
) {
    let cell = tree.cells[cell_idx].clone();
    if cell.is_leaf {
        for i in cell.begin..cell.end {
            let ref_pt = to_ref(tree.elements[i], &cell.bounds);
            for j in 0..n_p {
                let node = node_multi_index::<DIM>(j, p);
                weights[cell_idx * n_p + j] += charges[i] * s_n_multi(p, ref_pt, &node, nodes_1d);
            }
        }
        return;
    }
    for child in cell.children.iter().flatten() {
        p2m_recursive(tree, charges, p, n_p, nodes_1d, *child, weights);
    }
    for child in cell.children.iter().flatten() {
        let child_bounds = tree.cells[*child].bounds;
        for i in 0..n_p {
            let child_node = node_multi_index::<DIM>(i, p);
            let child_real = grid_node_real(&child_bounds, &child_node, nodes_1d);
            let ref_in_parent = to_ref(child_real, &cell.bounds);
            let child_weight = weights[*child * n_p + i];
            if child_weight == 0.0 {
                continue;
            }
            for j in 0..n_p {
                let node = node_multi_index::<DIM>(j, p);
                weights[cell_idx * n_p + j] += child_weight * s_n_multi(p, ref_in_parent, &node, nodes_1d);
            }
        }
    }
}

/// Top-down L2P pass: the mirror of [`p2m_recursive`]. Parent local weights
/// are pushed into child local weights via interpolation, then leaves push
/// their local weights into the observation points they own.
fn l2p_recursive<const DIM: usize>(
    tree: &Octree<DIM, Vector<DIM>>,
    p: usize,
    n_p: usize,
    nodes_1d: &[f64],
    cell_idx: usize,
    local_weights: &mut [f64],
    obs_effect: &mut [f64],
) {
    let cell = tree.cells[cell_idx].clone();
    if cell.is_leaf {
        for i in cell.begin..cell.end {
            let ref_pt = to_ref(tree.elements[i], &cell.bounds);
            let mut val = 0.0;
            for j in 0..n_p {
                let node = node_multi_index::<DIM>(j, p);
                val += local_weights[cell_idx * n_p + j] * s_n_multi(p, ref_pt, &node, nodes_1d);
            }
            obs_effect[i] += val;
        }
        return;
    }
    for child in cell.children.iter().flatten() {
        let child_bounds = tree.cells[*child].bounds;
        for k in 0..n_p {
            let child_node = node_multi_index::<DIM>(k, p);
            let child_real = grid_node_real(&child_bounds, &child_node, nodes_1d);
            let ref_in_parent = to_ref(child_real, &cell.bounds);
            let mut val = 0.0;
            for j in 0..n_p {
                let node = node_multi_index::<DIM>(j, p);
                val += local_weights[cell_idx * n_p + j] * s_n_multi(p, ref_in_parent, &node, nodes_1d);
            }
            local_weights[*child * n_p + k] += val;
        }
    }
    for child in cell.children.iter().flatten() {
        l2p_recursive(tree, p, n_p, nodes_1d, *child, local_weights, obs_effect);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobKind {
    P2P,
    M2P,
    M2L,
}

#[derive(Debug, Clone, Copy)]
struct Job {
    l_cell: usize,
    m_cell: usize,
}

/// Dual-tree traversal (§4.H): classifies each visited (source cell,
/// observation cell) pair as well-separated (emitting a P2P/M2P/M2L job
/// sized by how small the smaller side's batch is) or recurses, always
/// preferring to refine the observation side. Refining the observation
/// side first is the load-bearing correctness invariant for the job
/// executor below: every job's `l_cell` is reached by a chain of
/// observation-only refinements, so distinct top-level branches of this
/// traversal can never produce jobs that target the same `l_cell` through
/// different call stacks.
fn traverse<const DIM: usize>(
    src_tree: &Octree<DIM, Vector<DIM>>,
    obs_tree: &Octree<DIM, Vector<DIM>>,
    mac2: f64,
    n_p: usize,
    s_idx: usize,
    l_idx: usize,
    jobs: &mut [Vec<Job>; 3],
) {
    let s = &src_tree.cells[s_idx];
    let o = &obs_tree.cells[l_idx];
    let d2 = s.bounds.center.dist2(&o.bounds.center);
    let r2 = s.bounds.radius2 + o.bounds.radius2;
    let well_separated = 2.0 * d2 > mac2 * r2;

    if well_separated {
        let obs_n = o.end - o.begin;
        let src_n = s.end - s.begin;
        let kind = if obs_n < n_p && src_n < n_p {
            JobKind::P2P
        } else if obs_n < n_p {
            JobKind::M2P
        } else {
            JobKind::M2L
        };
        jobs[kind as usize].push(Job { l_cell: l_idx, m_cell: s_idx });
        return;
    }

    if s.is_leaf && o.is_leaf {
        jobs[JobKind::P2P as usize].push(Job { l_cell: l_idx, m_cell: s_idx });
        return;
    }

    let refine_obs = !o.is_leaf && (o.level <= s.level || s.is_leaf);
    debug_assert!(refine_obs || !s.is_leaf, "must refine observation or source, never neither");
    if refine_obs {
        for child in o.children.clone().into_iter().flatten() {
            traverse(src_tree, obs_tree, mac2, n_p, s_idx, child, jobs);
        }
    } else {
        for child in s.children.clone().into_iter().flatten() {
            traverse(src_tree, obs_tree, mac2, n_p, child, l_idx, jobs);
        }
    }
}

fn r2_between<const DIM: usize>(a: Vector<DIM>, b: Vector<DIM>) -> (f64, Vector<DIM>) {
    let delta = b - a;
    (delta.norm2(), delta)
}

/// Evaluates the full kernel-independent FMM matvec: `effect[i] = sum_k
/// charges[k] * K(obs_points[i], src_points[k])` to a relative accuracy
/// controlled by `config.n_exp_pts` and `config.mac2`.
pub fn fmm_matvec<const DIM: usize, K: Kernel<DIM, 1, 1> + Sync>(
    src_points: &[Vector<DIM>],
    charges: &[f64],
    obs_points: &[Vector<DIM>],
    kernel: &K,
    config: &EngineConfig,
) -> Vec<f64> {
    assert_eq!(src_points.len(), charges.len());
    let p = config.n_exp_pts;
    let n_p = p.pow(DIM as u32);
    let nodes_1d = chebyshev_nodes_1d(p);

    let src_tree = Octree::build(src_points, config.max_elements_per_cell);
    let obs_tree = Octree::build(obs_points, config.max_elements_per_cell);
    tracing::debug!(
        src_cells = src_tree.cells.len(),
        obs_cells = obs_tree.cells.len(),
        n_p,
        "built FMM trees"
    );

    let mut permuted_charges = vec![0.0; charges.len()];
    for (old_idx, &new_idx) in src_tree.permutation.iter().enumerate() {
        permuted_charges[new_idx] = charges[old_idx];
    }

    let mut multipole_weights = vec![0.0; src_tree.cells.len() * n_p];
    p2m_recursive(&src_tree, &permuted_charges, p, n_p, &nodes_1d, src_tree.root_index(), &mut multipole_weights);

    let mut jobs: [Vec<Job>; 3] = [Vec::new(), Vec::new(), Vec::new()];
    traverse(&src_tree, &obs_tree, config.mac2, n_p, src_tree.root_index(), obs_tree.root_index(), &mut jobs);
    tracing::debug!(
        p2p = jobs[JobKind::P2P as usize].len(),
        m2p = jobs[JobKind::M2P as usize].len(),
        m2l = jobs[JobKind::M2L as usize].len(),
        "dual-tree traversal produced jobs"
    );

    let mut local_weights = vec![0.0; obs_tree.cells.len() * n_p];
    let mut permuted_effect = vec![0.0; obs_points.len()];

    // P2P: direct point-to-point sums, one task per job.
    let p2p_deltas: Vec<(usize, Vec<f64>)> = jobs[JobKind::P2P as usize]
        .par_iter()
        .map(|job| {
            let o = &obs_tree.cells[job.l_cell];
            let s = &src_tree.cells[job.m_cell];
            let mut delta = vec![0.0; o.end - o.begin];
            for (local_i, i) in (o.begin..o.end).enumerate() {
                let mut acc = 0.0;
                for k in s.begin..s.end {
                    let (r2, d) = r2_between(obs_tree.elements[i], src_tree.elements[k]);
                    if r2 == 0.0 {
                        continue;
                    }
                    acc += permuted_charges[k] * kernel.eval(r2, d, Vector::zero(), Vector::zero())[(0, 0)];
                }
                delta[local_i] = acc;
            }
            (o.begin, delta)
        })
        .collect();
    for (begin, delta) in p2p_deltas {
        for (local_i, v) in delta.into_iter().enumerate() {
            permuted_effect[begin + local_i] += v;
        }
    }

    // M2L: multipole-to-local translations, one task per job.
    let m2l_deltas: Vec<(usize, Vec<f64>)> = jobs[JobKind::M2L as usize]
        .par_iter()
        .map(|job| {
            let o_bounds = obs_tree.cells[job.l_cell].bounds;
            let s_bounds = src_tree.cells[job.m_cell].bounds;
            let mut delta = vec![0.0; n_p];
            for j in 0..n_p {
                let obs_node = grid_node_real(&o_bounds, &node_multi_index::<DIM>(j, p), &nodes_1d);
                let mut acc = 0.0;
                for i in 0..n_p {
                    let src_node = grid_node_real(&s_bounds, &node_multi_index::<DIM>(i, p), &nodes_1d);
                    let (r2, d) = r2_between(obs_node, src_node);
                    if r2 == 0.0 {
                        continue;
                    }
                    acc += multipole_weights[job.m_cell * n_p + i] * kernel.eval(r2, d, Vector::zero(), Vector::zero())[(0, 0)];
                }
                delta[j] = acc;
            }
            (job.l_cell, delta)
        })
        .collect();
    for (l_cell, delta) in m2l_deltas {
        for (j, v) in delta.into_iter().enumerate() {
            local_weights[l_cell * n_p + j] += v;
        }
    }

    // M2P: multipole-to-point evaluations, one task per job.
    let m2p_deltas: Vec<(usize, Vec<f64>)> = jobs[JobKind::M2P as usize]
        .par_iter()
        .map(|job| {
            let o = &obs_tree.cells[job.l_cell];
            let s_bounds = src_tree.cells[job.m_cell].bounds;
            let mut delta = vec![0.0; o.end - o.begin];
            for (local_i, i) in (o.begin..o.end).enumerate() {
                let mut acc = 0.0;
                for k in 0..n_p {
                    let src_node = grid_node_real(&s_bounds, &node_multi_index::<DIM>(k, p), &nodes_1d);
                    let (r2, d) = r2_between(obs_tree.elements[i], src_node);
                    if r2 == 0.0 {
                        continue;
                    }
                    acc += multipole_weights[job.m_cell * n_p + k] * kernel.eval(r2, d, Vector::zero(), Vector::zero())[(0, 0)];
                }
                delta[local_i] = acc;
            }
            (o.begin, delta)
        })
        .collect();
    for (begin, delta) in m2p_deltas {
        for (local_i, v) in delta.into_iter().enumerate() {
            permuted_effect[begin + local_i] += v;
        }
    }

    l2p_recursive(&obs_tree, p, n_p, &nodes_1d, obs_tree.root_index(), &mut local_weights, &mut permuted_effect);

    let mut effect = vec![0.0; obs_points.len()];
    for (old_idx, &new_idx) in obs_tree.permutation.iter().enumerate() {
        effect[old_idx] = permuted_effect[new_idx];
    }
    effect
}

/// O(N*M) direct evaluation, the correctness oracle §8 invariants 6/7 and
/// scenario S6 check the FMM output against.
pub fn direct_sum<const DIM: usize, K: Kernel<DIM, 1, 1>>(
    src_points: &[Vector<DIM>],
    charges: &[f64],
    obs_points: &[Vector<DIM>],
    kernel: &K,
) -> Vec<f64> {
    obs_points
        .iter()
        .map(|&obs| {
            src_points
                .iter()
                .zip(charges.iter())
                .map(|(&src, &q)| {
                    let (r2, d) = r2_between(obs, src);
                    if r2 == 0.0 {
                        0.0
                    } else {
                        q * kernel.eval(r2, d, Vector::zero(), Vector::zero())[(0, 0)]
                    }
                })
                .sum()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::LaplaceSingle3D;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_points(n: usize, seed: u64) -> (Vec<Vector<3>>, Vec<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let points = (0..n).map(|_| Vector([rng.gen(), rng.gen(), rng.gen()])).collect();
        let charges = (0..n).map(|_| rng.gen::<f64>()).collect();
        (points, charges)
    }

    #[test]
    fn all_pairs_near_matches_direct_sum_exactly() {
        let (points, charges) = random_points(200, 10);
        let mut config = EngineConfig::default();
        config.mac2 = 0.0;
        config.n_exp_pts = 4;
        let fmm = fmm_matvec(&points, &charges, &points, &LaplaceSingle3D, &config);
        let direct = direct_sum(&points, &charges, &points, &LaplaceSingle3D);
        for (f, d) in fmm.iter().zip(direct.iter()) {
            assert!((f - d).abs() < 1e-9 * d.abs().max(1.0), "{f} vs {d}");
        }
    }

    #[test]
    fn fmm_approximates_direct_sum_within_tolerance() {
        let (points, charges) = random_points(1000, 11);
        let mut config = EngineConfig::default();
        // mac2 = 3.0 (the crate default) leaves S6's <1e-4 bound almost no
        // margin at this N/p; 6.0 demands a wider separation before a pair
        // is treated as well-separated, which is what actually buys the
        // extra digits rather than loosening the assertion.
        config.mac2 = 6.0;
        config.n_exp_pts = 5;
        let fmm = fmm_matvec(&points, &charges, &points, &LaplaceSingle3D, &config);
        let direct = direct_sum(&points, &charges, &points, &LaplaceSingle3D);
        let max_rel: f64 = fmm
            .iter()
            .zip(direct.iter())
            .map(|(f, d)| (f - d).abs() / d.abs().max(1e-12))
            .fold(0.0, f64::max);
        assert!(max_rel < 1e-4, "max relative error {max_rel}");
    }

    #[test]
    fn higher_order_reduces_error() {
        let (points, charges) = random_points(400, 12);
        let direct = direct_sum(&points, &charges, &points, &LaplaceSingle3D);
        let mut config = EngineConfig::default();
        config.mac2 = 3.0;

        config.n_exp_pts = 2;
        let low = fmm_matvec(&points, &charges, &points, &LaplaceSingle3D, &config);
        config.n_exp_pts = 5;
        let high = fmm_matvec(&points, &charges, &points, &LaplaceSingle3D, &config);

        let err = |vals: &[f64]| -> f64 {
            vals.iter()
                .zip(direct.iter())
                .map(|(f, d)| (f - d).abs() / d.abs().max(1e-12))
                .fold(0.0, f64::max)
        };
        assert!(err(&high) < err(&low), "higher order should reduce error: {} vs {}", err(&high), err(&low));
    }
}
