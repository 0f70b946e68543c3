//! Core mesh decimation algorithm.
//!
//! Implements edge collapse with quadric error metrics (QEM). Each vertex
//! keeps the list of faces around it, so a collapse only touches its own
//! neighbourhood. Queue entries carry the version stamps of both
//! endpoints and are skipped once either endpoint has changed.

// Mesh indices and counts don't overflow in practice
#![allow(clippy::cast_possible_truncation)]

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use hashbrown::HashMap;
use road_types::{Mesh, Point3, Vector3, VertexColor};
use tracing::{debug, info};

use crate::error::{DecimateError, DecimateResult};
use crate::params::DecimateParams;
use crate::quadric::Quadric;
use crate::result::DecimationResult;

/// An edge collapse candidate in the priority queue.
#[derive(Debug, Clone)]
struct EdgeCollapse {
    /// Vertex that survives the collapse.
    keep: u32,
    /// Vertex merged into `keep`.
    remove: u32,
    /// The error cost of this collapse.
    cost: f64,
    /// Where the surviving vertex ends up.
    target: Point3<f64>,
    /// Versions of `keep` and `remove` when the entry was computed.
    stamps: (u32, u32),
}

impl PartialEq for EdgeCollapse {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for EdgeCollapse {}

impl PartialOrd for EdgeCollapse {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EdgeCollapse {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap behaviour; index order breaks ties
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| (other.keep, other.remove).cmp(&(self.keep, self.remove)))
    }
}

/// Decimate a mesh using edge collapse with quadric error metrics.
///
/// Collapses run cheapest first until the face count reaches the target
/// or no valid collapse remains. When both endpoints carry a color the
/// surviving vertex takes a blend weighted by how far the merged
/// position lies from each endpoint, so colors never leave the range
/// spanned by the input. Normals, if present, are recomputed.
///
/// # Errors
///
/// Returns [`DecimateError::InvalidRatio`] for a ratio outside `[0, 1]`
/// and [`DecimateError::InvalidMesh`] when the mesh fails validation.
///
/// # Example
///
/// ```
/// use road_decimate::{decimate_mesh, DecimateParams};
/// use road_types::grid_patch;
///
/// let patch = grid_patch(8, 8, 0.5);
/// let result = decimate_mesh(&patch, &DecimateParams::with_target_ratio(0.5)).unwrap();
/// assert!(result.final_triangles <= 64);
/// println!("{result}");
/// ```
pub fn decimate_mesh(mesh: &Mesh, params: &DecimateParams) -> DecimateResult<DecimationResult> {
    if !(0.0..=1.0).contains(&params.target_ratio) {
        return Err(DecimateError::InvalidRatio(params.target_ratio));
    }
    mesh.validate()?;

    let original_triangles = mesh.faces.len();
    let target = params.target_for(original_triangles);

    // Don't decimate if already at or below target
    if original_triangles <= target {
        debug!(faces = original_triangles, target, "Mesh already within triangle budget");
        return Ok(DecimationResult::unchanged(mesh));
    }

    info!(original = original_triangles, target, "Starting mesh decimation");

    let mut state = CollapseState::new(mesh, params);
    let mut heap = state.initial_queue();

    let mut collapses_performed = 0;
    let mut collapses_rejected = 0;

    while state.active_faces > target {
        let Some(collapse) = heap.pop() else {
            break;
        };

        if !state.is_current(&collapse) {
            continue;
        }

        // Everything left in the queue costs at least this much
        if params.max_error.is_some_and(|max| collapse.cost > max) {
            collapses_rejected += 1;
            break;
        }

        if !state.can_collapse(&collapse) {
            collapses_rejected += 1;
            continue;
        }

        state.collapse(&collapse);
        collapses_performed += 1;
        state.requeue(collapse.keep, &mut heap);
    }

    let final_triangles = state.active_faces;
    let decimated = state.into_mesh(mesh.has_normals());

    info!(
        final_triangles,
        vertices = decimated.positions.len(),
        collapses = collapses_performed,
        rejected = collapses_rejected,
        "Decimation complete"
    );

    Ok(DecimationResult {
        mesh: decimated,
        original_triangles,
        final_triangles,
        collapses_performed,
        collapses_rejected,
    })
}

const fn normalize_edge(v1: u32, v2: u32) -> (u32, u32) {
    if v1 < v2 {
        (v1, v2)
    } else {
        (v2, v1)
    }
}

const fn is_degenerate(face: &[u32; 3]) -> bool {
    face[0] == face[1] || face[1] == face[2] || face[0] == face[2]
}

fn area_vector(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> Vector3<f64> {
    (b - a).cross(&(c - a))
}

/// Working copy of the mesh while collapses are applied.
struct CollapseState {
    positions: Vec<Point3<f64>>,
    colors: Option<Vec<VertexColor>>,
    faces: Vec<Option<[u32; 3]>>,
    vertex_faces: Vec<Vec<usize>>,
    edges: Vec<(u32, u32)>,
    quadrics: Vec<Quadric>,
    boundary: Vec<bool>,
    pinned: Vec<bool>,
    alive: Vec<bool>,
    versions: Vec<u32>,
    active_faces: usize,
    prevent_flips: bool,
}

impl CollapseState {
    fn new(mesh: &Mesh, params: &DecimateParams) -> Self {
        let n = mesh.positions.len();

        let mut vertex_faces = vec![Vec::new(); n];
        let mut edge_faces: HashMap<(u32, u32), Vec<usize>> = HashMap::new();
        let mut edges = Vec::with_capacity(mesh.faces.len() * 3 / 2);
        for (fi, face) in mesh.faces.iter().enumerate() {
            for k in 0..3 {
                vertex_faces[face[k] as usize].push(fi);
                let edge = normalize_edge(face[k], face[(k + 1) % 3]);
                let entry = edge_faces.entry(edge).or_default();
                if entry.is_empty() {
                    edges.push(edge);
                }
                entry.push(fi);
            }
        }
        // Fixed order keeps the floating point sums reproducible
        edges.sort_unstable();

        // Area-weighted face plane quadrics
        let mut quadrics = vec![Quadric::default(); n];
        let mut unit_normals = Vec::with_capacity(mesh.faces.len());
        for &face in &mesh.faces {
            let [a, b, c] = mesh.face_positions(face);
            let area_vec = area_vector(&a, &b, &c);
            let normal = area_vec.try_normalize(1e-12);
            if let Some(normal) = normal {
                let q = Quadric::from_plane(&a, &normal).scaled(area_vec.norm() * 0.5);
                for &vi in &face {
                    quadrics[vi as usize].add(&q);
                }
            }
            unit_normals.push(normal);
        }

        let mut boundary = vec![false; n];
        let mut sharp = vec![false; n];
        let mut non_manifold = vec![false; n];
        for &(v1, v2) in &edges {
            let faces = edge_faces.get(&(v1, v2)).map_or(&[][..], Vec::as_slice);
            let (i1, i2) = (v1 as usize, v2 as usize);
            match faces {
                [only] => {
                    boundary[i1] = true;
                    boundary[i2] = true;
                    // Constraint plane through the border, perpendicular to its face
                    let p1 = mesh.positions[i1];
                    let dir = mesh.positions[i2] - p1;
                    if let Some(face_normal) = unit_normals[*only] {
                        if let Some(normal) = dir.cross(&face_normal).try_normalize(1e-12) {
                            let q = Quadric::from_plane(&p1, &normal)
                                .scaled(params.boundary_penalty * dir.norm_squared());
                            quadrics[i1].add(&q);
                            quadrics[i2].add(&q);
                        }
                    }
                }
                [f1, f2] => {
                    if let (Some(n1), Some(n2)) = (unit_normals[*f1], unit_normals[*f2]) {
                        if n1.dot(&n2).clamp(-1.0, 1.0).acos() > params.sharp_angle_threshold {
                            sharp[i1] = true;
                            sharp[i2] = true;
                        }
                    }
                }
                _ => {
                    non_manifold[i1] = true;
                    non_manifold[i2] = true;
                }
            }
        }

        let pinned = (0..n)
            .map(|i| {
                non_manifold[i]
                    || (params.preserve_boundary && boundary[i])
                    || (params.preserve_sharp_features && sharp[i])
            })
            .collect();

        debug!(
            vertices = n,
            edges = edges.len(),
            boundary_vertices = boundary.iter().filter(|&&b| b).count(),
            "Built collapse state"
        );

        Self {
            positions: mesh.positions.clone(),
            colors: mesh.colors.clone(),
            faces: mesh.faces.iter().copied().map(Some).collect(),
            vertex_faces,
            edges,
            quadrics,
            boundary,
            pinned,
            alive: vec![true; n],
            versions: vec![0; n],
            active_faces: mesh.faces.len(),
            prevent_flips: params.prevent_flips,
        }
    }

    fn initial_queue(&mut self) -> BinaryHeap<EdgeCollapse> {
        let edges = std::mem::take(&mut self.edges);
        edges
            .into_iter()
            .filter_map(|(v1, v2)| self.candidate(v1, v2))
            .collect()
    }

    /// Cost and target of collapsing the edge `a`-`b`, or `None` when both
    /// ends are pinned.
    fn candidate(&self, a: u32, b: u32) -> Option<EdgeCollapse> {
        let (keep, remove) = match (self.pinned[a as usize], self.pinned[b as usize]) {
            (true, true) => return None,
            (false, true) => (b, a),
            _ => (a, b),
        };
        let (k, r) = (keep as usize, remove as usize);
        let quadric = self.quadrics[k].combined(&self.quadrics[r]);

        let target = if self.pinned[k] {
            self.positions[k]
        } else {
            self.best_position(&quadric, k, r)
        };

        Some(EdgeCollapse {
            keep,
            remove,
            cost: quadric.evaluate(&target),
            target,
            stamps: (self.versions[k], self.versions[r]),
        })
    }

    fn best_position(&self, quadric: &Quadric, k: usize, r: usize) -> Point3<f64> {
        let (pk, pr) = (self.positions[k], self.positions[r]);
        let midpoint = nalgebra::center(&pk, &pr);

        // Near-singular systems can put the optimum far from the edge
        let reach = (pr - pk).norm() * 2.0;
        if let Some(optimal) = quadric.optimal_point() {
            if (optimal - midpoint).norm() <= reach {
                return optimal;
            }
        }

        let mut best = pk;
        let mut best_cost = quadric.evaluate(&pk);
        for candidate in [pr, midpoint] {
            let cost = quadric.evaluate(&candidate);
            if cost < best_cost {
                best = candidate;
                best_cost = cost;
            }
        }
        best
    }

    fn is_current(&self, collapse: &EdgeCollapse) -> bool {
        let (k, r) = (collapse.keep as usize, collapse.remove as usize);
        self.alive[k] && self.alive[r] && (self.versions[k], self.versions[r]) == collapse.stamps
    }

    fn live_faces(&self, v: usize) -> impl Iterator<Item = (usize, [u32; 3])> + '_ {
        self.vertex_faces[v]
            .iter()
            .filter_map(|&fi| self.faces[fi].map(|face| (fi, face)))
    }

    fn neighbors(&self, v: u32) -> Vec<u32> {
        let mut out: Vec<u32> = self
            .live_faces(v as usize)
            .flat_map(|(_, face)| face)
            .filter(|&u| u != v)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Link condition plus the optional normal-flip test.
    fn can_collapse(&self, collapse: &EdgeCollapse) -> bool {
        let (keep, remove) = (collapse.keep, collapse.remove);
        let edge_faces = self
            .live_faces(keep as usize)
            .filter(|(_, face)| face.contains(&remove))
            .count();
        if edge_faces == 0 || edge_faces > 2 {
            return false;
        }

        let keep_ring = self.neighbors(keep);
        let shared = self
            .neighbors(remove)
            .into_iter()
            .filter(|v| *v != keep && keep_ring.binary_search(v).is_ok())
            .count();
        if shared != edge_faces {
            return false;
        }

        // An interior edge joining two border vertices would pinch the surface
        if edge_faces == 2 && self.boundary[keep as usize] && self.boundary[remove as usize] {
            return false;
        }

        !self.prevent_flips || !self.flips_any_face(collapse)
    }

    fn flips_any_face(&self, collapse: &EdgeCollapse) -> bool {
        for moved in [collapse.keep, collapse.remove] {
            for (_, face) in self.live_faces(moved as usize) {
                if face.contains(&collapse.keep) && face.contains(&collapse.remove) {
                    continue;
                }
                let corners = face.map(|i| self.positions[i as usize]);
                let before = area_vector(&corners[0], &corners[1], &corners[2]);

                let mut after_corners = corners;
                for (slot, &i) in after_corners.iter_mut().zip(face.iter()) {
                    if i == moved {
                        *slot = collapse.target;
                    }
                }
                let after = area_vector(&after_corners[0], &after_corners[1], &after_corners[2]);

                if after.norm_squared() < 1e-24 || before.dot(&after) <= 0.0 {
                    return true;
                }
            }
        }
        false
    }

    fn collapse(&mut self, collapse: &EdgeCollapse) {
        let (k, r) = (collapse.keep as usize, collapse.remove as usize);

        if let Some(colors) = &mut self.colors {
            let to_keep = (collapse.target - self.positions[k]).norm();
            let to_remove = (collapse.target - self.positions[r]).norm();
            let total = to_keep + to_remove;
            let t = if total > f64::EPSILON { to_keep / total } else { 0.5 };
            colors[k] = colors[k].lerp(colors[r], t);
        }

        self.positions[k] = collapse.target;
        let absorbed = self.quadrics[r];
        self.quadrics[k].add(&absorbed);
        self.boundary[k] |= self.boundary[r];
        self.pinned[k] |= self.pinned[r];

        for fi in std::mem::take(&mut self.vertex_faces[r]) {
            let Some(face) = &mut self.faces[fi] else {
                continue;
            };
            for idx in face.iter_mut() {
                if *idx == collapse.remove {
                    *idx = collapse.keep;
                }
            }
            if is_degenerate(face) {
                self.faces[fi] = None;
                self.active_faces -= 1;
            } else {
                self.vertex_faces[k].push(fi);
            }
        }

        let faces = &self.faces;
        self.vertex_faces[k].retain(|&fi| faces[fi].is_some());

        self.alive[r] = false;
        self.versions[k] = self.versions[k].wrapping_add(1);
        self.versions[r] = self.versions[r].wrapping_add(1);
    }

    fn requeue(&self, keep: u32, heap: &mut BinaryHeap<EdgeCollapse>) {
        for neighbor in self.neighbors(keep) {
            if let Some(collapse) = self.candidate(keep, neighbor) {
                heap.push(collapse);
            }
        }
    }

    fn into_mesh(self, with_normals: bool) -> Mesh {
        let faces: Vec<[u32; 3]> = self.faces.into_iter().flatten().collect();
        let mut mesh = Mesh::from_parts(self.positions, faces);
        mesh.colors = self.colors;
        let dropped = mesh.remove_unreferenced_vertices();
        if with_normals {
            mesh.compute_vertex_normals();
        }
        debug!(vertices = mesh.positions.len(), dropped, "Built final decimated mesh");
        mesh
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use road_types::{grid_patch, MeshError};

    fn wavy_patch(n: usize, seed: u64) -> Mesh {
        let mut mesh = grid_patch(n, n, 0.5);
        let mut rng = StdRng::seed_from_u64(seed);
        for p in &mut mesh.positions {
            p.y = (p.x * 0.7).sin() * 0.4 + (p.z * 0.5).cos() * 0.3 + rng.gen_range(-0.01..0.01);
        }
        mesh
    }

    #[test]
    fn empty_mesh_is_unchanged() {
        let result = decimate_mesh(&Mesh::new(), &DecimateParams::default()).unwrap();
        assert_eq!(result.original_triangles, 0);
        assert_eq!(result.final_triangles, 0);
        assert_eq!(result.collapses_performed, 0);
    }

    #[test]
    fn below_target_is_unchanged() {
        let patch = grid_patch(2, 2, 1.0);
        let result = decimate_mesh(&patch, &DecimateParams::with_target_triangles(100)).unwrap();
        assert!(!result.was_decimated());
        assert_eq!(result.mesh, patch);
    }

    #[test]
    fn flat_patch_keeps_area_and_plane() {
        let patch = grid_patch(10, 10, 1.0);
        let result = decimate_mesh(&patch, &DecimateParams::with_target_triangles(100)).unwrap();

        assert!(result.final_triangles <= 100);
        assert_eq!(result.final_triangles, result.mesh.faces.len());
        assert!(result.mesh.validate().is_ok());
        assert_relative_eq!(result.mesh.surface_area(), 100.0, epsilon = 1e-6);
        assert!(result.mesh.positions.iter().all(|p| p.y.abs() < 1e-9));
    }

    #[test]
    fn wavy_patch_reaches_target() {
        let patch = wavy_patch(20, 1);
        let result = decimate_mesh(&patch, &DecimateParams::with_target_ratio(0.4)).unwrap();

        assert_eq!(result.original_triangles, 800);
        assert!(result.final_triangles <= 320);
        assert!(result.final_triangles > 0);
        assert!(result.mesh.validate().is_ok());
    }

    #[test]
    fn colors_stay_in_input_range() {
        let mut patch = grid_patch(8, 8, 1.0);
        let colors = patch
            .positions
            .iter()
            .map(|p| VertexColor::new((p.x * 20.0) as u8, (p.z * 30.0) as u8, 7))
            .collect();
        patch.colors = Some(colors);

        let result = decimate_mesh(&patch, &DecimateParams::with_target_ratio(0.3)).unwrap();
        let out = result.mesh.colors.as_ref().unwrap();
        assert_eq!(out.len(), result.mesh.positions.len());
        for c in out {
            assert!(c.r <= 160);
            assert!(c.g <= 240);
            assert_eq!(c.b, 7);
        }
    }

    #[test]
    fn preserve_boundary_pins_border() {
        let patch = grid_patch(8, 8, 1.0);
        let border: Vec<Point3<f64>> = patch
            .positions
            .iter()
            .filter(|p| p.x == 0.0 || p.x == 8.0 || p.z == 0.0 || p.z == 8.0)
            .copied()
            .collect();
        assert_eq!(border.len(), 32);

        let params = DecimateParams::with_target_ratio(0.3).with_preserve_boundary(true);
        let result = decimate_mesh(&patch, &params).unwrap();

        assert!(result.was_decimated());
        for p in &border {
            assert!(result.mesh.positions.contains(p), "border vertex {p} moved");
        }
    }

    #[test]
    fn normals_are_recomputed() {
        let mut patch = grid_patch(6, 6, 1.0);
        patch.compute_vertex_normals();

        let result = decimate_mesh(&patch, &DecimateParams::with_target_ratio(0.5)).unwrap();
        let normals = result.mesh.normals.as_ref().unwrap();
        assert_eq!(normals.len(), result.mesh.positions.len());
        for n in normals {
            assert_relative_eq!(n.y, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn max_error_stops_early() {
        let patch = wavy_patch(12, 3);
        let free = decimate_mesh(&patch, &DecimateParams::with_target_ratio(0.3)).unwrap();
        let bounded = decimate_mesh(&patch, &DecimateParams::with_target_ratio(0.3).with_max_error(1e-9)).unwrap();
        assert!(bounded.final_triangles >= free.final_triangles);
        assert!(bounded.collapses_performed <= free.collapses_performed);
    }

    #[test]
    fn rejects_bad_input() {
        let params = DecimateParams {
            target_ratio: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            decimate_mesh(&grid_patch(1, 1, 1.0), &params),
            Err(DecimateError::InvalidRatio(_))
        ));

        let mut broken = grid_patch(1, 1, 1.0);
        broken.faces.push([0, 1, 9]);
        assert!(matches!(
            decimate_mesh(&broken, &DecimateParams::default()),
            Err(DecimateError::InvalidMesh(MeshError::IndexOutOfRange { .. }))
        ));
    }

    #[test]
    fn normalize_edge_orders_indices() {
        assert_eq!(normalize_edge(5, 3), (3, 5));
        assert_eq!(normalize_edge(3, 5), (3, 5));
    }
}
