//! Derives equality constraints from vertex coincidence, externally
//! supplied boundary data, and prescribed normal components (§4 component
//! F: "derive equality constraints from vertex coincidence / user BCs /
//! normal constraints").
//!
//! The mesh here uses "double nodes": each facet owns its own copy of its
//! vertex DOFs (per the `dim * facet_index + vertex_index` layout of
//! [`crate::mesh::DofMap`]), so continuity across facets is never
//! implicit — it is exactly the set of constraints this module builds.

use crate::constraints::{ConstraintEQ, LinearTerm};
use crate::mesh::{DofMap, Facet, FacetOps};
use crate::tensor::Vector;

/// The default coincidence tolerance for matching mesh vertices by
/// Euclidean distance.
pub const COINCIDENCE_TOL: f64 = 1e-12;

/// One `(global dof, vertex coordinate)` entry per `(facet, local vertex)`
/// pair, the table every function in this module matches against.
pub fn vertex_table<const DIM: usize>(facets: &[Facet<DIM>], dofmap: &DofMap<DIM>) -> Vec<(usize, Vector<DIM>)> {
    let mut out = Vec::with_capacity(facets.len() * DIM);
    for (facet_index, facet) in facets.iter().enumerate() {
        for (local_vertex, vertex) in facet.vertices.iter().enumerate() {
            out.push((dofmap.local_to_global(facet_index, local_vertex), *vertex));
        }
    }
    out
}

/// Every `(dof_a, dof_b)` pair whose vertex coordinates coincide within
/// `tol`, matching entries of `a` against entries of `b`.
pub fn find_overlapping_vertices<const DIM: usize>(
    a: &[(usize, Vector<DIM>)],
    b: &[(usize, Vector<DIM>)],
    tol: f64,
) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    for &(dof_a, va) in a {
        for &(dof_b, vb) in b {
            if va.dist(&vb) <= tol {
                out.push((dof_a, dof_b));
            }
        }
    }
    out
}

/// Overlapping vertex pairs within a single mesh's own table, excluding the
/// trivial self-match of each entry against itself.
pub fn find_overlapping_vertices_same_mesh<const DIM: usize>(
    table: &[(usize, Vector<DIM>)],
    tol: f64,
) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    for i in 0..table.len() {
        for j in (i + 1)..table.len() {
            if table[i].1.dist(&table[j].1) <= tol {
                out.push((table[i].0, table[j].0));
            }
        }
    }
    out
}

/// Union-find over the DOF universe `0..n_dofs`, grouping DOFs whose
/// vertices coincide.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        UnionFind { parent: (0..n).collect() }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra.max(rb)] = ra.min(rb);
        }
    }
}

/// Groups DOFs into connected components under vertex coincidence: every
/// DOF in a group must take the same value.
pub fn mesh_continuity<const DIM: usize>(table: &[(usize, Vector<DIM>)], tol: f64) -> Vec<Vec<usize>> {
    let n_dofs = table.iter().map(|&(dof, _)| dof).max().map(|m| m + 1).unwrap_or(0);
    let mut uf = UnionFind::new(n_dofs);
    for (dof_a, dof_b) in find_overlapping_vertices_same_mesh(table, tol) {
        uf.union(dof_a, dof_b);
    }
    let mut groups: std::collections::BTreeMap<usize, Vec<usize>> = std::collections::BTreeMap::new();
    for &(dof, _) in table {
        let root = uf.find(dof);
        groups.entry(root).or_default().push(dof);
    }
    groups.into_values().map(|mut g| {
        g.sort_unstable();
        g.dedup();
        g
    }).collect()
}

/// Converts coincidence groups into constraints `x_i = x_{rep}` against
/// each group's smallest DOF.
pub fn convert_to_constraints(groups: &[Vec<usize>]) -> Vec<ConstraintEQ> {
    let mut out = Vec::new();
    for group in groups {
        if group.len() < 2 {
            continue;
        }
        let rep = group[0];
        for &dof in &group[1..] {
            out.push(ConstraintEQ::new(
                vec![LinearTerm { dof, weight: 1.0 }, LinearTerm { dof: rep, weight: -1.0 }],
                0.0,
            ));
        }
    }
    out
}

/// Imposes `self_bcs` as hard Dirichlet values, but only at DOFs whose
/// vertex coincides with a vertex of `other`: the boundary data belongs to
/// `self`, and this selects the subset of it that actually abuts the
/// neighboring mesh.
pub fn form_neighbor_bcs<const DIM: usize>(
    self_table: &[(usize, Vector<DIM>)],
    other_table: &[(usize, Vector<DIM>)],
    self_bcs: &[f64],
    tol: f64,
) -> Vec<ConstraintEQ> {
    find_overlapping_vertices(self_table, other_table, tol)
        .into_iter()
        .map(|(self_dof, _)| {
            ConstraintEQ::new(vec![LinearTerm { dof: self_dof, weight: 1.0 }], self_bcs[self_dof])
        })
        .collect()
}

/// Prescribes `x_dof = f(vertex)` for every DOF of the table: the
/// interpolated-boundary-condition constraint.
pub fn interpolate_bc_constraints<const DIM: usize>(
    table: &[(usize, Vector<DIM>)],
    f: impl Fn(Vector<DIM>) -> f64,
) -> Vec<ConstraintEQ> {
    table
        .iter()
        .map(|&(dof, v)| ConstraintEQ::new(vec![LinearTerm { dof, weight: 1.0 }], f(v)))
        .collect()
}

/// Prescribes the component of a `DIM`-component vector field along each
/// facet's own normal to match the normal component of `target`: for a
/// field whose component `c` is laid out as a separate scalar DOF space
/// `c * n_scalar_dofs + scalar_dof`, this produces one constraint per
/// `(facet, vertex)` pair, `sum_c normal[c] * x_{c, vertex} = target . normal`.
pub fn normal_constraints<const DIM: usize>(
    facets: &[Facet<DIM>],
    dofmap: &DofMap<DIM>,
    target: Vector<DIM>,
) -> Vec<ConstraintEQ>
where
    Facet<DIM>: FacetOps<DIM>,
{
    let n_scalar_dofs = dofmap.global_size();
    let mut out = Vec::with_capacity(facets.len() * DIM);
    for (facet_index, facet) in facets.iter().enumerate() {
        let normal = facet.normal();
        let rhs = target.dot(&normal);
        for local_vertex in 0..DIM {
            let scalar_dof = dofmap.local_to_global(facet_index, local_vertex);
            let terms = (0..DIM)
                .map(|c| LinearTerm { dof: c * n_scalar_dofs + scalar_dof, weight: normal[c] })
                .collect();
            out.push(ConstraintEQ::new(terms, rhs));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::ConstraintMatrix;

    fn disjoint_segments(n: usize) -> Vec<Facet<2>> {
        (0..n)
            .map(|i| {
                let val = 2.0 * i as f64;
                Facet { vertices: [Vector([val, -val]), Vector([val + 1.0, -val - 1.0])] }
            })
            .collect()
    }

    fn chained_line(n_segments: usize) -> Vec<Facet<2>> {
        (0..n_segments)
            .map(|i| Facet { vertices: [Vector([i as f64, 0.0]), Vector([(i + 1) as f64, 0.0])] })
            .collect()
    }

    #[test]
    fn same_mesh_overlap_finds_shared_endpoints() {
        let facets = chained_line(4);
        let dofmap = DofMap::<2>::new(facets.len());
        let table = vertex_table(&facets, &dofmap);
        let overlaps = find_overlapping_vertices_same_mesh(&table, COINCIDENCE_TOL);
        assert_eq!(overlaps.len(), facets.len() - 1);
    }

    #[test]
    fn disjoint_mesh_has_no_self_overlap() {
        let facets = disjoint_segments(10);
        let dofmap = DofMap::<2>::new(facets.len());
        let table = vertex_table(&facets, &dofmap);
        assert!(find_overlapping_vertices_same_mesh(&table, COINCIDENCE_TOL).is_empty());
    }

    #[test]
    fn continuity_constraints_enforce_equal_values() {
        let facets = chained_line(4);
        let dofmap = DofMap::<2>::new(facets.len());
        let table = vertex_table(&facets, &dofmap);
        let groups = mesh_continuity(&table, COINCIDENCE_TOL);
        let constraints = convert_to_constraints(&groups);
        assert_eq!(constraints.len(), facets.len() - 1);

        let all = vec![1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 4.0, 5.0];
        let cm = ConstraintMatrix::from_constraints(&constraints).unwrap();
        let reduced = cm.condense(&all);
        let back = cm.distribute(&reduced, all.len());
        for c in &constraints {
            let lhs: f64 = c.terms.iter().map(|t| t.weight * back[t.dof]).sum();
            assert!((lhs - c.rhs).abs() < 1e-10);
        }
    }

    #[test]
    fn neighbor_bcs_apply_only_at_shared_vertices() {
        let self_facets = chained_line(3);
        let other_facets = disjoint_segments(1);
        let self_dofmap = DofMap::<2>::new(self_facets.len());
        let self_table = vertex_table(&self_facets, &self_dofmap);
        let other_table = vertex_table(&other_facets, &DofMap::<2>::new(other_facets.len()));
        // Place one disjoint-mesh vertex exactly on the chained line's start.
        let other_table = vec![(other_table[0].0, Vector([0.0, 0.0]))];
        let bcs = vec![2.33; self_table.iter().map(|&(d, _)| d).max().unwrap() + 1];
        let constraints = form_neighbor_bcs(&self_table, &other_table, &bcs, COINCIDENCE_TOL);
        assert_eq!(constraints.len(), 1);
        assert_eq!(constraints[0].terms.len(), 1);
        assert_eq!(constraints[0].rhs, 2.33);
    }

    #[test]
    fn interpolated_bcs_match_the_function_at_each_vertex() {
        let facets = chained_line(2);
        let dofmap = DofMap::<2>::new(facets.len());
        let table = vertex_table(&facets, &dofmap);
        let constraints = interpolate_bc_constraints(&table, |v| v[0] + 1.0);
        for ((_, v), c) in table.iter().zip(constraints.iter()) {
            assert_eq!(c.rhs, v[0] + 1.0);
        }
    }

    #[test]
    fn normal_constraints_match_facet_normal_projection() {
        let facets = vec![Facet { vertices: [Vector([-1.0, -1.0]), Vector([1.0, 1.0])] }];
        let dofmap = DofMap::<2>::new(1);
        let constraints = normal_constraints(&facets, &dofmap, Vector([0.0, 1.0]));
        assert_eq!(constraints.len(), 2);
        let normal = facets[0].normal();
        assert!((constraints[0].rhs - normal[1]).abs() < 1e-12);
        for term in &constraints[0].terms {
            let comp = term.dof / dofmap.global_size();
            assert!((term.weight - normal[comp]).abs() < 1e-12);
        }
    }
}
