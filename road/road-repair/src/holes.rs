//! Hole detection and filling.
//!
//! A hole is a closed loop of boundary edges (edges with only one adjacent
//! face). Loops are traced against the winding of the faces around them,
//! so the patches inherit the orientation of the surrounding surface.
//!
//! On an open surface such as a road scan, the outer border is itself a
//! boundary loop. It is always the longest loop, and it is never filled.

use hashbrown::{HashMap, HashSet};
use nalgebra::{Point3, Vector3};
use road_types::Mesh;
use tracing::{debug, info};

use crate::adjacency::{face_edges, MeshAdjacency};
use crate::error::RepairResult;

/// A boundary loop representing a hole in the mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryLoop {
    /// Ordered vertex indices. Consecutive pairs run opposite to the
    /// winding of the adjacent faces.
    pub vertices: Vec<u32>,
}

impl BoundaryLoop {
    /// Number of edges (and vertices) in the loop.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.vertices.len()
    }
}

/// Detect all closed boundary loops of a face list.
///
/// Open chains (around non-manifold boundary vertices) are dropped.
///
/// # Example
///
/// ```
/// use road_repair::{detect_holes, MeshAdjacency};
///
/// let faces = vec![[0, 1, 2]];
/// let adjacency = MeshAdjacency::build(&faces);
/// let holes = detect_holes(&faces, &adjacency);
///
/// // A single triangle has one boundary loop, wound the other way
/// assert_eq!(holes.len(), 1);
/// assert_eq!(holes[0].vertices, vec![1, 0, 2]);
/// ```
#[must_use]
pub fn detect_holes(faces: &[[u32; 3]], adjacency: &MeshAdjacency) -> Vec<BoundaryLoop> {
    // Directed successors along the hole: face edge a->b becomes b->a
    let mut successors: HashMap<u32, Vec<u32>> = HashMap::new();
    let mut starts: Vec<u32> = Vec::new();
    for face in faces {
        for (a, b) in face_edges(*face) {
            if adjacency.faces_for_edge(a, b).map(<[usize]>::len) == Some(1) {
                successors.entry(b).or_default().push(a);
                starts.push(b);
            }
        }
    }

    if starts.is_empty() {
        return Vec::new();
    }
    debug!(boundary_edges = starts.len(), "Tracing boundary loops");

    let mut used: HashSet<(u32, u32)> = HashSet::new();
    let mut loops = Vec::new();

    for &start in &starts {
        let Some(next) = successors[&start].iter().copied().find(|&n| !used.contains(&(start, n))) else {
            continue;
        };

        let mut vertices = vec![start];
        let mut current = start;
        let mut step = next;
        let closed = loop {
            used.insert((current, step));
            if step == start {
                break true;
            }
            vertices.push(step);
            current = step;
            match successors
                .get(&current)
                .and_then(|s| s.iter().copied().find(|&n| !used.contains(&(current, n))))
            {
                Some(n) => step = n,
                None => break false,
            }
        };

        if closed && vertices.len() >= 3 {
            loops.push(BoundaryLoop { vertices });
        }
    }

    loops
}

/// Triangulate a hole by ear clipping.
///
/// Returns the new faces. A loop that runs out of ears is finished with a
/// fan from its first remaining vertex.
#[must_use]
pub fn fill_hole_ear_clipping(mesh: &Mesh, boundary: &BoundaryLoop) -> Vec<[u32; 3]> {
    let n = boundary.vertices.len();
    if n < 3 {
        return Vec::new();
    }

    let positions: Vec<Point3<f64>> = boundary
        .vertices
        .iter()
        .map(|&idx| mesh.positions[idx as usize])
        .collect();
    let hole_normal = loop_normal(&positions);

    let mut remaining: Vec<usize> = (0..n).collect();
    let mut triangles = Vec::with_capacity(n - 2);

    while remaining.len() > 3 {
        let len = remaining.len();
        let ear = (0..len).find(|&i| {
            let prev = remaining[(i + len - 1) % len];
            let next = remaining[(i + 1) % len];
            is_ear(&positions, &remaining, prev, remaining[i], next, &hole_normal)
        });
        let Some(i) = ear else {
            debug!(remaining = len, "Ear clipping stuck, finishing with a fan");
            break;
        };
        triangles.push([
            boundary.vertices[remaining[(i + len - 1) % len]],
            boundary.vertices[remaining[i]],
            boundary.vertices[remaining[(i + 1) % len]],
        ]);
        remaining.remove(i);
    }

    for i in 1..remaining.len() - 1 {
        triangles.push([
            boundary.vertices[remaining[0]],
            boundary.vertices[remaining[i]],
            boundary.vertices[remaining[i + 1]],
        ]);
    }

    triangles
}

/// Newell normal of a polygon, following its vertex order.
fn loop_normal(positions: &[Point3<f64>]) -> Vector3<f64> {
    let n = positions.len();
    let mut normal = Vector3::zeros();
    for i in 0..n {
        normal += positions[i].coords.cross(&positions[(i + 1) % n].coords);
    }
    normal.try_normalize(f64::EPSILON).unwrap_or_else(Vector3::y)
}

/// Check if vertex at index `curr` forms a valid ear.
fn is_ear(
    positions: &[Point3<f64>],
    remaining: &[usize],
    prev: usize,
    curr: usize,
    next: usize,
    hole_normal: &Vector3<f64>,
) -> bool {
    let (a, b, c) = (&positions[prev], &positions[curr], &positions[next]);
    let cross = (b - a).cross(&(c - a));
    if cross.norm() < f64::EPSILON || cross.dot(hole_normal) <= 0.0 {
        return false; // Degenerate or reflex
    }

    !remaining
        .iter()
        .filter(|&&idx| idx != prev && idx != curr && idx != next)
        .any(|&idx| point_in_triangle_projected(&positions[idx], a, b, c, hole_normal))
}

/// Check if a point is inside a triangle after projecting along `normal`.
fn point_in_triangle_projected(
    p: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
    normal: &Vector3<f64>,
) -> bool {
    let side = |u: &Point3<f64>, v: &Point3<f64>| (v - u).cross(&(p - u)).dot(normal);
    let (d1, d2, d3) = (side(a, b), side(b, c), side(c, a));

    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}

/// Outcome of [`fill_holes`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HoleFillSummary {
    /// Closed boundary loops found, including the outer border.
    pub loops_found: usize,
    /// Holes patched.
    pub holes_filled: usize,
    /// Holes left open because they exceed the edge limit.
    pub holes_skipped: usize,
    /// Triangles added.
    pub triangles_added: usize,
}

/// Fill every hole with at most `max_hole_edges` boundary edges.
///
/// The longest loop is treated as the outer border and left open.
/// Existing faces keep their indices; patches are appended.
///
/// # Errors
///
/// Returns an error if the mesh fails validation.
///
/// # Example
///
/// ```
/// use road_repair::fill_holes;
/// use road_types::grid_patch;
///
/// let mut mesh = grid_patch(4, 4, 1.0);
/// // Punch a hole: drop the two triangles of one interior cell
/// mesh.faces.retain(|f| !(f.contains(&7) && f.contains(&11)));
///
/// let summary = fill_holes(&mut mesh, 2500).unwrap();
/// assert_eq!(summary.holes_filled, 1);
/// assert_eq!(mesh.faces.len(), 32);
/// ```
pub fn fill_holes(mesh: &mut Mesh, max_hole_edges: usize) -> RepairResult<HoleFillSummary> {
    mesh.validate()?;
    let adjacency = MeshAdjacency::build(&mesh.faces);
    let mut holes = detect_holes(&mesh.faces, &adjacency);

    let mut summary = HoleFillSummary {
        loops_found: holes.len(),
        ..HoleFillSummary::default()
    };

    // Outer border of the open surface
    if let Some(border) = (0..holes.len()).max_by_key(|&i| (holes[i].edge_count(), usize::MAX - i)) {
        holes.swap_remove(border);
    }

    let mut added: Vec<[u32; 3]> = Vec::new();
    for hole in &holes {
        if hole.edge_count() > max_hole_edges {
            debug!(edges = hole.edge_count(), max_hole_edges, "Skipping large hole");
            summary.holes_skipped += 1;
            continue;
        }
        let patch = fill_hole_ear_clipping(mesh, hole);
        if !patch.is_empty() {
            summary.holes_filled += 1;
            added.extend(patch);
        }
    }

    // Loops through a pinch vertex can repeat an index
    added.retain(|f| {
        let [a, b, c] = *f;
        a != b && b != c && a != c
    });
    summary.triangles_added = added.len();
    mesh.faces.extend(added);

    if summary.holes_filled > 0 {
        info!(
            filled = summary.holes_filled,
            skipped = summary.holes_skipped,
            triangles = summary.triangles_added,
            "Filled holes"
        );
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use road_types::{grid_patch, MeshTopology};

    /// 4x4 grid with the interior cell between vertices 6, 7, 11, 12 removed.
    fn punched_grid() -> Mesh {
        let mut mesh = grid_patch(4, 4, 1.0);
        mesh.faces.retain(|f| !(f.contains(&7) && f.contains(&11)));
        mesh
    }

    #[test]
    fn closed_surface_has_no_loops() {
        // Tetrahedron
        let faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [0, 3, 2]];
        let adjacency = MeshAdjacency::build(&faces);
        assert!(detect_holes(&faces, &adjacency).is_empty());
    }

    #[test]
    fn punched_grid_has_border_and_hole() {
        let mesh = punched_grid();
        let adjacency = MeshAdjacency::build(&mesh.faces);
        let mut sizes: Vec<usize> = detect_holes(&mesh.faces, &adjacency)
            .iter()
            .map(BoundaryLoop::edge_count)
            .collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![4, 16]);
    }

    #[test]
    fn filled_hole_is_consistently_wound() {
        let mut mesh = punched_grid();
        let summary = fill_holes(&mut mesh, 100).expect("valid mesh");

        assert_eq!(summary.loops_found, 2);
        assert_eq!(summary.holes_filled, 1);
        assert_eq!(summary.triangles_added, 2);

        // Interior is closed again and every patch faces up like the grid
        let adjacency = MeshAdjacency::build(&mesh.faces);
        assert_eq!(adjacency.boundary_edge_count(), 16);
        assert!(adjacency.is_manifold());
        for face in &mesh.faces[mesh.faces.len() - 2..] {
            let normal = mesh.face_normal(*face).expect("non-degenerate patch");
            assert!(normal.y > 0.99, "patch normal {normal:?}");
        }
    }

    #[test]
    fn holes_over_limit_are_skipped() {
        let mut mesh = punched_grid();
        let before = mesh.face_count();
        let summary = fill_holes(&mut mesh, 3).expect("valid mesh");

        assert_eq!(summary.holes_skipped, 1);
        assert_eq!(summary.holes_filled, 0);
        assert_eq!(mesh.face_count(), before);
    }

    #[test]
    fn outer_border_stays_open() {
        let mut mesh = grid_patch(3, 3, 1.0);
        let summary = fill_holes(&mut mesh, 2500).expect("valid mesh");
        assert_eq!(summary.loops_found, 1);
        assert_eq!(summary.holes_filled, 0);
        assert_eq!(mesh.face_count(), 18);
    }

    #[test]
    fn concave_hole_gets_all_triangles() {
        // L-shaped hole: remove three cells around vertex 12 of a 4x4 grid
        let mut mesh = grid_patch(4, 4, 1.0);
        let cells = [(1usize, 1usize), (2, 1), (1, 2)];
        let cell_of = |f: &[u32; 3]| {
            let xs: Vec<usize> = f.iter().map(|&v| v as usize % 5).collect();
            let zs: Vec<usize> = f.iter().map(|&v| v as usize / 5).collect();
            (*xs.iter().min().unwrap_or(&0), *zs.iter().min().unwrap_or(&0))
        };
        mesh.faces.retain(|f| !cells.contains(&cell_of(f)));

        let summary = fill_holes(&mut mesh, 100).expect("valid mesh");
        assert_eq!(summary.holes_filled, 1);
        // An 8-gon needs 6 triangles, and the L has 8 boundary vertices
        assert_eq!(summary.triangles_added, 6);
        assert!(MeshAdjacency::build(&mesh.faces).is_manifold());
    }
}
