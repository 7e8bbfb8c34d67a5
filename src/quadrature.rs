//! Quadrature rules: Gauss–Legendre over the line and the collapsed-square
//! triangle rule, sinh/sinh-sigmoidal transforms for nearly singular
//! integrands, a recursive adaptive rule, and Richardson extrapolation for
//! the fully singular limit (§4.B, §4.G).

use crate::mesh::RefCoord;

/// 1D Gauss–Legendre nodes/weights on `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussRule1D {
    pub nodes: Vec<f64>,
    pub weights: Vec<f64>,
}

/// Legendre polynomial `P_n(x)` and its derivative, via the three-term
/// recurrence `(n+1) P_{n+1} = (2n+1) x P_n - n P_{n-1}`.
fn legendre(n: usize, x: f64) -> (f64, f64) {
    let mut p0 = 1.0;
    let mut p1 = x;
    if n == 0 {
        return (p0, 0.0);
    }
    for k in 2..=n {
        let k = k as f64;
        let p2 = ((2.0 * k - 1.0) * x * p1 - (k - 1.0) * p0) / k;
        p0 = p1;
        p1 = p2;
    }
    let n = n as f64;
    let deriv = n * (x * p1 - p0) / (x * x - 1.0);
    (p1, deriv)
}

/// Gauss–Legendre rule of `order` points on `[-1, 1]`, via Newton's method
/// on the roots of `P_n` starting from the standard asymptotic guess.
fn gauss_legendre_m1_1(order: usize) -> (Vec<f64>, Vec<f64>) {
    let n = order;
    let mut nodes = vec![0.0; n];
    let mut weights = vec![0.0; n];
    let m = (n + 1) / 2;
    for i in 0..m {
        let mut x = ((std::f64::consts::PI * (i as f64 + 0.75)) / (n as f64 + 0.5)).cos();
        for _ in 0..100 {
            let (p, dp) = legendre(n, x);
            let dx = p / dp;
            x -= dx;
            if dx.abs() < 1e-15 {
                break;
            }
        }
        let (_, dp) = legendre(n, x);
        let w = 2.0 / ((1.0 - x * x) * dp * dp);
        nodes[i] = -x;
        nodes[n - 1 - i] = x;
        weights[i] = w;
        weights[n - 1 - i] = w;
    }
    (nodes, weights)
}

impl GaussRule1D {
    /// Builds a rule with exactly `order` nodes, mapped from `[-1,1]` to
    /// `[0,1]`.
    pub fn new(order: usize) -> Self {
        assert!(order >= 1, "a Gauss rule needs at least one node");
        let (nodes, weights) = gauss_legendre_m1_1(order);
        GaussRule1D {
            nodes: nodes.iter().map(|&x| 0.5 * (x + 1.0)).collect(),
            weights: weights.iter().map(|&w| 0.5 * w).collect(),
        }
    }

    /// The same rule rescaled onto an arbitrary interval `[a, b]`.
    pub fn on_interval(&self, a: f64, b: f64) -> GaussRule1D {
        let scale = b - a;
        GaussRule1D {
            nodes: self.nodes.iter().map(|&x| a + scale * x).collect(),
            weights: self.weights.iter().map(|&w| w * scale).collect(),
        }
    }
}

/// A quadrature rule over a facet's reference element: points in
/// reference coordinates paired with weights that already include the
/// reference-element Jacobian (so the caller only multiplies by the
/// facet's own `jacobian`).
pub type RefRule = Vec<(RefCoord, f64)>;

/// The line rule (`DIM = 2`): `GaussRule1D` embedded as `[x, 0]`.
pub fn gauss_rule_line(order: usize) -> RefRule {
    let rule = GaussRule1D::new(order);
    rule.nodes
        .iter()
        .zip(rule.weights.iter())
        .map(|(&x, &w)| ([x, 0.0], w))
        .collect()
}

/// The unit right-triangle rule (`DIM = 3`), built by collapsing a square
/// Gauss product rule: `x = u(1-v)`, `y = v`, weight scaled by the
/// collapse Jacobian `(1-v)` (Lyness' construction).
pub fn gauss_rule_triangle(order: usize) -> RefRule {
    let rule = GaussRule1D::new(order);
    let mut out = Vec::with_capacity(order * order);
    for (&u, &wu) in rule.nodes.iter().zip(rule.weights.iter()) {
        for (&v, &wv) in rule.nodes.iter().zip(rule.weights.iter()) {
            let x = u * (1.0 - v);
            let y = v;
            out.push(([x, y], wu * wv * (1.0 - v)));
        }
    }
    out
}

/// The reference-element Gauss rule for a `DIM`-dimensional facet.
pub fn gauss_rule<const DIM: usize>(order: usize) -> RefRule {
    match DIM {
        2 => gauss_rule_line(order),
        3 => gauss_rule_triangle(order),
        _ => panic!("quadrature is only defined for DIM in {{2,3}}, got {DIM}"),
    }
}

/// sinh-transformed 1D rule on `[0,1]` clustering nodes near `center`, with
/// `d` controlling how tightly the cluster is drawn in (Johnston & Elliott's
/// sinh transformation for nearly singular kernels).
pub fn sinh_rule_1d(center: f64, d: f64, order: usize) -> (Vec<f64>, Vec<f64>) {
    let d = d.max(1e-14);
    let a = ((0.0 - center) / d).asinh();
    let b = ((1.0 - center) / d).asinh();
    let mu = 0.5 * (a + b);
    let eta = 0.5 * (b - a);
    let base = gauss_legendre_m1_1(order);
    let (base_nodes, base_weights) = base;
    let mut nodes = Vec::with_capacity(order);
    let mut weights = Vec::with_capacity(order);
    for (&t, &w) in base_nodes.iter().zip(base_weights.iter()) {
        let s = eta * t + mu;
        let x = center + d * s.sinh();
        if !(0.0..=1.0).contains(&x) {
            continue;
        }
        let dxdt = d * eta * s.cosh();
        nodes.push(x);
        weights.push(w * dxdt);
    }
    (nodes, weights)
}

/// Maps a point of the collapsed-square triangle parametrization back to
/// square coordinates `(u, v)` with `x = u(1-v)`, `y = v`.
fn triangle_to_square(xi: RefCoord) -> (f64, f64) {
    let v = xi[1];
    let u = if v < 1.0 { xi[0] / (1.0 - v) } else { 0.0 };
    (u, v)
}

/// The sinh/sinh-sigmoidal rule of §4.G.4(b): a sinh transform in each
/// collapsed-square axis, centered on the closest point `xi_star`, with
/// `d` the characteristic offset (typically `ell`, the observation-to-facet
/// distance) driving the cluster width.
pub fn sinh_rule<const DIM: usize>(xi_star: RefCoord, d: f64, order: usize) -> RefRule {
    match DIM {
        2 => {
            let (nodes, weights) = sinh_rule_1d(xi_star[0], d, order);
            nodes.into_iter().zip(weights).map(|(x, w)| ([x, 0.0], w)).collect()
        }
        3 => {
            let (u_star, v_star) = triangle_to_square(xi_star);
            let (un, uw) = sinh_rule_1d(u_star, d, order);
            let (vn, vw) = sinh_rule_1d(v_star, d, order);
            let mut out = Vec::with_capacity(un.len() * vn.len());
            for (&u, &wu) in un.iter().zip(uw.iter()) {
                for (&v, &wv) in vn.iter().zip(vw.iter()) {
                    out.push(([u * (1.0 - v), v], wu * wv * (1.0 - v)));
                }
            }
            out
        }
        _ => panic!("quadrature is only defined for DIM in {{2,3}}, got {DIM}"),
    }
}

/// The sinh rule's order, growing logarithmically as the observation point
/// approaches the facet: `n = n0 + k * (-ln(ell / length_scale))`
/// (§4.G.4(b)).
pub fn sinh_order(n0: usize, growth: f64, ell: f64, length_scale: f64) -> usize {
    let ratio = (ell / length_scale).max(1e-300);
    let extra = growth * (-ratio.ln());
    (n0 as f64 + extra.max(0.0)).round() as usize
}

fn max_abs_diff(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).fold(0.0, f64::max)
}

fn integrate(rule: &RefRule, f: &dyn Fn(RefCoord) -> Vec<f64>, len: usize) -> Vec<f64> {
    let mut acc = vec![0.0; len];
    for &(xi, w) in rule {
        let v = f(xi);
        for (a, vi) in acc.iter_mut().zip(v.iter()) {
            *a += w * vi;
        }
    }
    acc
}

fn midpoint(a: RefCoord, b: RefCoord) -> RefCoord {
    [0.5 * (a[0] + b[0]), 0.5 * (a[1] + b[1])]
}

fn affine_triangle(verts: [RefCoord; 3], local: RefCoord) -> RefCoord {
    let (x, y) = (local[0], local[1]);
    [
        verts[0][0] + x * (verts[1][0] - verts[0][0]) + y * (verts[2][0] - verts[0][0]),
        verts[0][1] + x * (verts[1][1] - verts[0][1]) + y * (verts[2][1] - verts[0][1]),
    ]
}

fn triangle_area(verts: [RefCoord; 3]) -> f64 {
    0.5 * ((verts[1][0] - verts[0][0]) * (verts[2][1] - verts[0][1])
        - (verts[2][0] - verts[0][0]) * (verts[1][1] - verts[0][1]))
        .abs()
}

fn rule_on_triangle(verts: [RefCoord; 3], order: usize) -> RefRule {
    let base = gauss_rule_triangle(order);
    let scale = triangle_area(verts) / 0.5;
    base.into_iter().map(|(xi, w)| (affine_triangle(verts, xi), w * scale)).collect()
}

/// Recursive adaptive quadrature over the unit line `[0, 1]` (`DIM = 2`):
/// bisect whenever the doubled-order estimate disagrees with the base
/// estimate by more than `tol`, to a maximum recursion `max_depth`. Returns
/// the refined estimate and whether the recursion cap was hit without
/// converging.
pub fn adaptive_line(
    f: &dyn Fn(RefCoord) -> Vec<f64>,
    len: usize,
    a: f64,
    b: f64,
    base_order: usize,
    tol: f64,
    max_depth: usize,
) -> (Vec<f64>, bool) {
    adaptive_line_rec(f, len, a, b, base_order, tol, 0, max_depth)
}

fn adaptive_line_rec(
    f: &dyn Fn(RefCoord) -> Vec<f64>,
    len: usize,
    a: f64,
    b: f64,
    base_order: usize,
    tol: f64,
    depth: usize,
    max_depth: usize,
) -> (Vec<f64>, bool) {
    let base = GaussRule1D::new(base_order).on_interval(a, b);
    let fine = GaussRule1D::new(2 * base_order).on_interval(a, b);
    let base_rule: RefRule = base.nodes.iter().zip(base.weights.iter()).map(|(&x, &w)| ([x, 0.0], w)).collect();
    let fine_rule: RefRule = fine.nodes.iter().zip(fine.weights.iter()).map(|(&x, &w)| ([x, 0.0], w)).collect();
    let coarse_val = integrate(&base_rule, f, len);
    let fine_val = integrate(&fine_rule, f, len);
    let diff = max_abs_diff(&coarse_val, &fine_val);
    if diff <= tol || depth >= max_depth {
        return (fine_val, diff > tol);
    }
    let mid = 0.5 * (a + b);
    let (left, dl) = adaptive_line_rec(f, len, a, mid, base_order, tol / 2.0, depth + 1, max_depth);
    let (right, dr) = adaptive_line_rec(f, len, mid, b, base_order, tol / 2.0, depth + 1, max_depth);
    let sum = left.iter().zip(right.iter()).map(|(x, y)| x + y).collect();
    (sum, dl || dr)
}

/// Recursive adaptive quadrature over the unit right triangle (`DIM = 3`):
/// subdivide into 4 congruent sub-triangles at the edge midpoints whenever
/// the doubled-order estimate disagrees by more than `tol`.
pub fn adaptive_triangle(
    f: &dyn Fn(RefCoord) -> Vec<f64>,
    len: usize,
    base_order: usize,
    tol: f64,
    max_depth: usize,
) -> (Vec<f64>, bool) {
    let verts = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
    adaptive_triangle_rec(f, len, verts, base_order, tol, 0, max_depth)
}

fn adaptive_triangle_rec(
    f: &dyn Fn(RefCoord) -> Vec<f64>,
    len: usize,
    verts: [RefCoord; 3],
    base_order: usize,
    tol: f64,
    depth: usize,
    max_depth: usize,
) -> (Vec<f64>, bool) {
    let coarse_val = integrate(&rule_on_triangle(verts, base_order), f, len);
    let fine_val = integrate(&rule_on_triangle(verts, 2 * base_order), f, len);
    let diff = max_abs_diff(&coarse_val, &fine_val);
    if diff <= tol || depth >= max_depth {
        return (fine_val, diff > tol);
    }
    let m01 = midpoint(verts[0], verts[1]);
    let m12 = midpoint(verts[1], verts[2]);
    let m20 = midpoint(verts[2], verts[0]);
    let children = [
        [verts[0], m01, m20],
        [m01, verts[1], m12],
        [m20, m12, verts[2]],
        [m01, m12, m20],
    ];
    let mut total = vec![0.0; len];
    let mut degraded = false;
    for child in children {
        let (v, d) = adaptive_triangle_rec(f, len, child, base_order, tol / 4.0, depth + 1, max_depth);
        for (t, vi) in total.iter_mut().zip(v.iter()) {
            *t += vi;
        }
        degraded |= d;
    }
    (total, degraded)
}

/// Dispatches to [`adaptive_line`] or [`adaptive_triangle`] by `DIM`.
pub fn adaptive_integrate<const DIM: usize>(
    f: &dyn Fn(RefCoord) -> Vec<f64>,
    len: usize,
    base_order: usize,
    tol: f64,
    max_depth: usize,
) -> (Vec<f64>, bool) {
    match DIM {
        2 => adaptive_line(f, len, 0.0, 1.0, base_order, tol, max_depth),
        3 => adaptive_triangle(f, len, base_order, tol, max_depth),
        _ => panic!("quadrature is only defined for DIM in {{2,3}}, got {DIM}"),
    }
}

/// Romberg-style Richardson extrapolation: `values[k]` is `f(h0 / factor^k)`
/// for `k = 0..values.len()`, ordered coarsest to finest. Returns the
/// extrapolated `h -> 0` limit, exact to round-off for any polynomial
/// `f(h) = a + b h + c h^2 + ...` of degree less than `values.len()`.
pub fn richardson_extrapolate(values: &[Vec<f64>], factor: f64) -> Vec<f64> {
    let n = values.len();
    assert!(n >= 1, "Richardson extrapolation needs at least one sample");
    let mut table: Vec<Vec<f64>> = values.to_vec();
    for m in 1..n {
        let scale = factor.powi(m as i32);
        for k in (m..n).rev() {
            table[k] = table[k]
                .iter()
                .zip(table[k - 1].iter())
                .map(|(hi, lo)| (scale * hi - lo) / (scale - 1.0))
                .collect();
        }
    }
    table[n - 1].clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn gauss_line_integrates_polynomials_exactly() {
        let rule = gauss_rule_line(4);
        // order-4 Gauss exactly integrates polynomials up to degree 7.
        let value: f64 = rule.iter().map(|&([x, _], w)| w * (3.0 * x.powi(3) - x + 2.0)).sum();
        let exact = 3.0 / 4.0 - 0.5 + 2.0;
        assert_relative_eq!(value, exact, epsilon = 1e-10);
    }

    #[test]
    fn gauss_triangle_reproduces_area() {
        let rule = gauss_rule_triangle(5);
        let area: f64 = rule.iter().map(|&(_, w)| w).sum();
        assert_relative_eq!(area, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn gauss_triangle_integrates_linear_exactly() {
        let rule = gauss_rule_triangle(4);
        let value: f64 = rule.iter().map(|&([x, y], w)| w * (2.0 * x + 3.0 * y + 1.0)).sum();
        // integral over the unit right triangle of (2x+3y+1).
        let exact = 2.0 * (1.0 / 6.0) + 3.0 * (1.0 / 6.0) + 0.5;
        assert_relative_eq!(value, exact, epsilon = 1e-10);
    }

    #[test]
    fn adaptive_line_matches_known_integral() {
        let f = |xi: RefCoord| vec![(xi[0] * std::f64::consts::PI).sin()];
        let (value, degraded) = adaptive_line(&f, 1, 0.0, 1.0, 4, 1e-10, 20);
        assert!(!degraded);
        assert_relative_eq!(value[0], 2.0 / std::f64::consts::PI, epsilon = 1e-8);
    }

    #[test]
    fn adaptive_triangle_matches_area() {
        let f = |_: RefCoord| vec![1.0];
        let (value, degraded) = adaptive_triangle(&f, 1, 3, 1e-12, 10);
        assert!(!degraded);
        assert_relative_eq!(value[0], 0.5, epsilon = 1e-10);
    }

    #[test]
    fn richardson_recovers_constant_term_exactly() {
        let a = 0.0269063_f64;
        let b = 1.7;
        let c = -0.4;
        let h0 = 0.1;
        let values: Vec<Vec<f64>> = (0..5)
            .map(|k| {
                let h = h0 / 2f64.powi(k as i32);
                vec![a + b * h + c * h * h]
            })
            .collect();
        let limit = richardson_extrapolate(&values, 2.0);
        assert_relative_eq!(limit[0], a, epsilon = 1e-8);
    }
}
