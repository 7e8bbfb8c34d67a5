//! Synthetic meshes for benchmarks and end-to-end tests (§8 scenarios S4,
//! S5 both need a closed surface with a known area/solid angle).
//!
//! There is no mesh-file reader in this crate (out of scope, §2
//! Non-goals): a generator is the only way to get a mesh to assemble
//! against, mirroring how the teacher's benchmark pulls a shape from
//! `bempp_grid::shapes::regular_sphere` rather than reading a file.

use crate::mesh::Facet;
use crate::tensor::Vector;
use std::collections::HashMap;

/// A triangulated sphere of radius `radius` centered at the origin,
/// obtained by `refinement_level` rounds of edge-midpoint subdivision of
/// a regular octahedron, each new vertex pushed back onto the sphere.
///
/// Mirrors the shape of `regular_sphere(level)` used by the assembly
/// benchmark: `refinement_level = 0` gives the 8-facet octahedron,
/// each further level quadruples the facet count.
pub fn regular_sphere(refinement_level: usize, radius: f64) -> Vec<Facet<3>> {
    let mut vertices = vec![
        Vector([1.0, 0.0, 0.0]),
        Vector([-1.0, 0.0, 0.0]),
        Vector([0.0, 1.0, 0.0]),
        Vector([0.0, -1.0, 0.0]),
        Vector([0.0, 0.0, 1.0]),
        Vector([0.0, 0.0, -1.0]),
    ];
    let mut faces: Vec<[usize; 3]> = vec![
        [0, 2, 4], [2, 1, 4], [1, 3, 4], [3, 0, 4],
        [2, 0, 5], [1, 2, 5], [3, 1, 5], [0, 3, 5],
    ];

    for _ in 0..refinement_level {
        let mut midpoint_cache: HashMap<(usize, usize), usize> = HashMap::new();
        let mut midpoint = |a: usize, b: usize, vertices: &mut Vec<Vector<3>>| -> usize {
            let key = if a < b { (a, b) } else { (b, a) };
            if let Some(&idx) = midpoint_cache.get(&key) {
                return idx;
            }
            let mid = ((vertices[a] + vertices[b]) * 0.5).normalized();
            let idx = vertices.len();
            vertices.push(mid);
            midpoint_cache.insert(key, idx);
            idx
        };

        let mut next_faces = Vec::with_capacity(faces.len() * 4);
        for f in &faces {
            let ab = midpoint(f[0], f[1], &mut vertices);
            let bc = midpoint(f[1], f[2], &mut vertices);
            let ca = midpoint(f[2], f[0], &mut vertices);
            next_faces.push([f[0], ab, ca]);
            next_faces.push([f[1], bc, ab]);
            next_faces.push([f[2], ca, bc]);
            next_faces.push([ab, bc, ca]);
        }
        faces = next_faces;
    }

    faces
        .into_iter()
        .map(|f| Facet {
            vertices: [vertices[f[0]] * radius, vertices[f[1]] * radius, vertices[f[2]] * radius],
        })
        .collect()
}
