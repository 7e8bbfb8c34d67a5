//! A point/ball octree (quadtree for `DIM = 2`): balanced construction over
//! mixed element sizes, nearest-element queries with branch-and-bound
//! pruning, and bulk pre-order traversal (§4.D).

use crate::geometry::{box_intersects_ball, box_point_dist2, Ball, Box as AaBox};
use crate::mesh::{FacetInfo, FacetOps};
use crate::tensor::Vector;

/// The deepest possible level of subdivision: Morton codes are built with
/// this many bits per axis (§4.D step 2).
const MORTON_BITS: u32 = 21;

/// An element an [`Octree`] can index: something with a center and, for
/// balls, a radius used by the nearest-element query's pruning bound.
pub trait SpatialElement<const DIM: usize>: Copy {
    fn center(&self) -> Vector<DIM>;
    /// Bounding radius around `center`; zero for a bare point.
    fn radius(&self) -> f64 {
        0.0
    }
}

impl<const DIM: usize> SpatialElement<DIM> for Vector<DIM> {
    fn center(&self) -> Vector<DIM> {
        *self
    }
}

/// A facet's bounding ball, tagged with the facet's index in its mesh —
/// the element type used for nearest-facet queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FacetElement<const DIM: usize> {
    pub facet_index: usize,
    pub ball: Ball<DIM>,
}

impl<const DIM: usize> SpatialElement<DIM> for FacetElement<DIM> {
    fn center(&self) -> Vector<DIM> {
        self.ball.center
    }
    fn radius(&self) -> f64 {
        self.ball.radius
    }
}

/// One node of the octree. `children[i] = None` means no child occupies
/// that octant (§3).
#[derive(Debug, Clone)]
pub struct OctreeCell<const DIM: usize> {
    pub level: u32,
    pub bounds: AaBox<DIM>,
    pub begin: usize,
    pub end: usize,
    pub children: Vec<Option<usize>>,
    pub is_leaf: bool,
}

/// A hierarchical spatial index over an immutable set of elements.
pub struct Octree<const DIM: usize, E: SpatialElement<DIM>> {
    pub max_elements_per_cell: usize,
    /// Elements permuted into Morton order.
    pub elements: Vec<E>,
    pub morton_codes: Vec<u64>,
    /// `permutation[original_index] = sorted_position`.
    pub permutation: Vec<usize>,
    pub cells: Vec<OctreeCell<DIM>>,
    pub bounds: AaBox<DIM>,
}

fn n_children<const DIM: usize>() -> usize {
    1 << DIM
}

fn to_octree_space(x: f64, center: f64, half_width: f64) -> u32 {
    let leaves = (1u64 << MORTON_BITS) as f64;
    let v = ((x - center) / (2.0 * half_width) + 0.5) * leaves;
    v.floor().clamp(0.0, leaves - 1.0) as u32
}

fn morton_code<const DIM: usize>(p: &Vector<DIM>, bounds: &AaBox<DIM>) -> u64 {
    let coords: Vec<u32> = (0..DIM)
        .map(|d| to_octree_space(p[d], bounds.center[d], bounds.half_width[d]))
        .collect();
    let mut code: u64 = 0;
    for bit in 0..MORTON_BITS {
        for (axis, &c) in coords.iter().enumerate() {
            let b = (c >> bit) & 1;
            code |= (b as u64) << (bit as usize * DIM + axis);
        }
    }
    code
}

/// Octant digit (0..2^DIM) of `code` at tree `level`, where level 0 is the
/// most-significant `DIM`-bit group.
fn digit_at_level<const DIM: usize>(code: u64, level: u32) -> usize {
    let total_bits = MORTON_BITS as usize * DIM;
    let shift = total_bits - (level as usize + 1) * DIM;
    ((code >> shift) & ((1 << DIM) - 1) as u64) as usize
}

/// Child box for octant `digit` of `parent`: half the parent's half-width,
/// shifted toward the digit's corner along each axis.
fn child_box<const DIM: usize>(parent: &AaBox<DIM>, digit: usize) -> AaBox<DIM> {
    let half = Vector::from_fn(|d| parent.half_width[d] * 0.5);
    let center = Vector::from_fn(|d| {
        let sign = if (digit >> d) & 1 == 1 { 1.0 } else { -1.0 };
        parent.center[d] + sign * half[d]
    });
    AaBox::new(center, half)
}

impl<const DIM: usize, E: SpatialElement<DIM>> Octree<DIM, E> {
    /// Build an octree over `elements` with at most `max_elements_per_cell`
    /// elements per leaf (§4.D).
    pub fn build(elements: &[E], max_elements_per_cell: usize) -> Self {
        assert!(!elements.is_empty(), "cannot build an octree over zero elements");

        let centers: Vec<Vector<DIM>> = elements.iter().map(|e| e.center()).collect();
        let raw_bounds = AaBox::bounding(&centers);
        // Expand half-widths slightly so no point lies exactly on a
        // boundary (step 1).
        let bounds = AaBox::new(
            raw_bounds.center,
            Vector::from_fn(|d| raw_bounds.half_width[d] * (1.0 + 1e-10) + 1e-12),
        );

        let codes: Vec<u64> = centers.iter().map(|c| morton_code(c, &bounds)).collect();

        let mut order: Vec<usize> = (0..elements.len()).collect();
        order.sort_by_key(|&i| codes[i]);

        let permuted_elements: Vec<E> = order.iter().map(|&i| elements[i]).collect();
        let permuted_codes: Vec<u64> = order.iter().map(|&i| codes[i]).collect();
        let mut permutation = vec![0usize; elements.len()];
        for (new_idx, &old_idx) in order.iter().enumerate() {
            permutation[old_idx] = new_idx;
        }

        let mut cells = Vec::new();
        build_cell::<DIM>(&mut cells, bounds, 0, 0, permuted_codes.len(), &permuted_codes, max_elements_per_cell);

        Octree {
            max_elements_per_cell,
            elements: permuted_elements,
            morton_codes: permuted_codes,
            permutation,
            cells,
            bounds,
        }
    }

    pub fn root_index(&self) -> usize {
        0
    }

    pub fn root(&self) -> &OctreeCell<DIM> {
        &self.cells[0]
    }

    pub fn n_elements(&self) -> usize {
        self.elements.len()
    }

    /// Pre-order traversal over every cell, for algorithms (FMM passes,
    /// dual-tree traversal) that walk the whole tree.
    pub fn for_each_cell(&self, mut visit: impl FnMut(usize, &OctreeCell<DIM>)) {
        let mut stack = vec![self.root_index()];
        while let Some(idx) = stack.pop() {
            let cell = &self.cells[idx];
            visit(idx, cell);
            for child in cell.children.iter().flatten().rev() {
                stack.push(*child);
            }
        }
    }
}

fn build_cell<const DIM: usize>(
    cells: &mut Vec<OctreeCell<DIM>>,
    bounds: AaBox<DIM>,
    level: u32,
    begin: usize,
    end: usize,
    codes: &[u64],
    max_elements_per_cell: usize,
) -> usize {
    let cell_idx = cells.len();
    cells.push(OctreeCell {
        level,
        bounds,
        begin,
        end,
        children: vec![None; n_children::<DIM>()],
        is_leaf: true,
    });

    let too_deep = level >= MORTON_BITS;
    if end - begin <= max_elements_per_cell || too_deep {
        return cell_idx;
    }

    let mut children = vec![None; n_children::<DIM>()];
    let mut group_start = begin;
    let mut group_digit = digit_at_level::<DIM>(codes[begin], level);
    for i in begin..=end {
        let digit = if i < end { Some(digit_at_level::<DIM>(codes[i], level)) } else { None };
        if digit != Some(group_digit) {
            let child_idx = build_cell::<DIM>(
                cells,
                child_box(&bounds, group_digit),
                level + 1,
                group_start,
                i,
                codes,
                max_elements_per_cell,
            );
            children[group_digit] = Some(child_idx);
            if let Some(d) = digit {
                group_digit = d;
                group_start = i;
            }
        }
    }

    cells[cell_idx].is_leaf = false;
    cells[cell_idx].children = children;
    cell_idx
}

/// The result of a nearest-facet query: the facet's index, its
/// closest point to the query, and the distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestFacet<const DIM: usize> {
    pub facet_index: usize,
    pub point: Vector<DIM>,
    pub distance: f64,
}

/// Branch-and-bound nearest-facet query against an octree of
/// [`FacetElement`]s (§4.D).
pub fn nearest_facet<const DIM: usize>(
    octree: &Octree<DIM, FacetElement<DIM>>,
    facets: &[FacetInfo<DIM>],
    query: Vector<DIM>,
) -> NearestFacet<DIM>
where
    crate::mesh::Facet<DIM>: FacetOps<DIM>,
{
    let mut best: Option<NearestFacet<DIM>> = None;
    nearest_facet_recursive(octree, facets, octree.root_index(), &query, &mut best);
    best.expect("octree has at least one element")
}

fn nearest_facet_recursive<const DIM: usize>(
    octree: &Octree<DIM, FacetElement<DIM>>,
    facets: &[FacetInfo<DIM>],
    cell_idx: usize,
    query: &Vector<DIM>,
    best: &mut Option<NearestFacet<DIM>>,
) where
    crate::mesh::Facet<DIM>: FacetOps<DIM>,
{
    let cell = &octree.cells[cell_idx];
    if cell.is_leaf {
        for i in cell.begin..cell.end {
            let elem = &octree.elements[i];
            if let Some(b) = best {
                if elem.ball.center.dist(query) > b.distance + elem.ball.radius {
                    continue;
                }
            }
            let facet = &facets[elem.facet_index].facet;
            let (_, point, distance) = facet.closest_point(query);
            if best.map(|b| distance < b.distance).unwrap_or(true) {
                *best = Some(NearestFacet { facet_index: elem.facet_index, point, distance });
            }
        }
        return;
    }

    let mut present: Vec<usize> = cell.children.iter().flatten().copied().collect();
    present.sort_by(|&a, &b| {
        let da = box_point_dist2(&octree.cells[a].bounds, query);
        let db = box_point_dist2(&octree.cells[b].bounds, query);
        da.partial_cmp(&db).unwrap()
    });

    for (i, child_idx) in present.into_iter().enumerate() {
        if i > 0 {
            if let Some(b) = best {
                let search_ball = Ball::new(*query, b.distance);
                if !box_intersects_ball(&octree.cells[child_idx].bounds, &search_ball) {
                    continue;
                }
            }
        }
        nearest_facet_recursive(octree, facets, child_idx, query, best);
    }
}

/// Brute-force nearest facet: the correctness oracle §8 invariant 5 checks
/// the octree-accelerated query against (not a performance path).
pub fn nearest_facet_brute_force<const DIM: usize>(
    facets: &[FacetInfo<DIM>],
    query: Vector<DIM>,
) -> NearestFacet<DIM>
where
    crate::mesh::Facet<DIM>: FacetOps<DIM>,
{
    facets
        .iter()
        .enumerate()
        .map(|(i, f)| {
            let (_, point, distance) = f.facet.closest_point(&query);
            NearestFacet { facet_index: i, point, distance }
        })
        .min_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap())
        .expect("mesh has at least one facet")
}
