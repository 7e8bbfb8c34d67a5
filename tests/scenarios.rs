//! End-to-end scenarios S4 and S5: closed-surface identities on a
//! refined sphere mesh, evaluated with the plain farfield Gauss rule
//! (the source facets are everywhere far from the interior observation
//! point relative to their own size once the mesh is reasonably fine, so
//! the near/singular branches of the dispatcher never trigger).
//!
//! The spec's scenario wording names a mesh "refinement level" from the
//! original triangle-bisection generator it was distilled from; this
//! crate's `regular_sphere` instead quadruples facet count per level
//! from an octahedron base, so the level numbers don't carry over
//! directly. Level 5 here (8192 facets) already clears both scenarios'
//! 1e-3 tolerance.

use bem_core::kernel::{Kernel, LaplaceDouble3D};
use bem_core::mesh::{facet_info_table, FacetOps};
use bem_core::quadrature::gauss_rule;
use bem_core::shapes::regular_sphere;
use bem_core::tensor::Vector;

const SPHERE_LEVEL: usize = 5;
const RADIUS: f64 = 1.0;

#[test]
fn s4_sphere_surface_area_via_farfield_rule() {
    let facets = regular_sphere(SPHERE_LEVEL, RADIUS);
    let infos = facet_info_table(&facets).unwrap();
    let quad = gauss_rule::<3>(4);

    let mut area = 0.0;
    for info in &infos {
        for (_xi, w) in &quad {
            area += w * info.jacobian;
        }
    }

    let expected = 4.0 * std::f64::consts::PI * RADIUS * RADIUS;
    assert!(
        (area - expected).abs() / expected < 1e-3,
        "area {area} vs expected {expected}"
    );
}

#[test]
fn s5_solid_angle_identity_for_constant_double_layer() {
    let facets = regular_sphere(SPHERE_LEVEL, RADIUS);
    let infos = facet_info_table(&facets).unwrap();
    let quad = gauss_rule::<3>(4);
    let obs = Vector([0.0, 0.0, 0.0]);
    let kernel = LaplaceDouble3D;

    let mut total = 0.0;
    for info in &infos {
        for (xi, w) in &quad {
            let y = info.facet.ref_to_real(*xi);
            let delta = y - obs;
            let r2 = delta.norm2();
            let k = kernel.eval(r2, delta, info.normal, Vector::zero());
            total += w * k[(0, 0)] * info.jacobian;
        }
    }

    assert!((total - 1.0).abs() < 1e-3, "solid angle integral {total}, expected 1.0");
}
