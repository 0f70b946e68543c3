//! Property-based tests for mesh bookkeeping.
//!
//! Run with: cargo test -p road-types -- proptest

use proptest::prelude::*;
use road_types::{Aabb, Mesh, MeshTopology, Point3, VertexColor};

// =============================================================================
// Strategies
// =============================================================================

fn arb_point() -> impl Strategy<Value = Point3<f64>> {
    prop::array::uniform3(-50.0..50.0f64).prop_map(|[x, y, z]| Point3::new(x, y, z))
}

/// A valid mesh, optionally colored, with in-range face indices.
fn arb_mesh(max_vertices: usize, max_faces: usize) -> impl Strategy<Value = Mesh> {
    (3..=max_vertices).prop_flat_map(move |n| {
        let positions = prop::collection::vec(arb_point(), n);
        let faces = prop::collection::vec(prop::array::uniform3(0..n as u32), 0..=max_faces);
        let colored = any::<bool>();
        (positions, faces, colored).prop_map(|(positions, faces, colored)| {
            let count = positions.len();
            let mesh = Mesh::from_parts(positions, faces);
            if colored {
                mesh.with_colors(vec![VertexColor::new(10, 20, 30); count])
            } else {
                mesh
            }
        })
    })
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    /// Concatenation adds vertex and face counts and offsets indices.
    #[test]
    fn append_is_additive(a in arb_mesh(20, 30), b in arb_mesh(20, 30)) {
        let mut merged = a.clone();
        merged.append(&b);

        prop_assert_eq!(merged.vertex_count(), a.vertex_count() + b.vertex_count());
        prop_assert_eq!(merged.face_count(), a.face_count() + b.face_count());
        let offset = a.vertex_count() as u32;
        for (got, want) in merged.faces[a.face_count()..].iter().zip(&b.faces) {
            prop_assert_eq!(*got, [want[0] + offset, want[1] + offset, want[2] + offset]);
        }
        prop_assert!(merged.validate().is_ok());
    }

    /// Vertex selection always yields a valid mesh holding exactly the kept vertices.
    #[test]
    fn select_vertices_stays_valid(
        mesh in arb_mesh(30, 40),
        mask in prop::collection::vec(any::<bool>(), 30),
    ) {
        let keep: Vec<bool> = mask.into_iter().take(mesh.vertex_count()).collect();
        let selected = mesh.select_vertices(&keep);

        prop_assert!(selected.validate().is_ok());
        prop_assert_eq!(selected.vertex_count(), keep.iter().filter(|&&k| k).count());
        prop_assert!(selected.face_count() <= mesh.face_count());
    }

    /// Cropping never leaves a vertex outside the region.
    #[test]
    fn crop_stays_inside(mesh in arb_mesh(30, 40), lo in arb_point(), hi in arb_point()) {
        let region = Aabb::new(lo, hi);
        let cropped = mesh.crop(&region);

        prop_assert!(cropped.validate().is_ok());
        prop_assert!(cropped.positions.iter().all(|p| region.contains(p)));
    }

    /// After dropping unreferenced vertices, every vertex is used by a face.
    #[test]
    fn unreferenced_removal_is_complete(mut mesh in arb_mesh(30, 40)) {
        mesh.remove_unreferenced_vertices();
        let mut used = vec![false; mesh.vertex_count()];
        for f in &mesh.faces {
            for &i in f {
                used[i as usize] = true;
            }
        }
        prop_assert!(used.into_iter().all(|u| u));
        prop_assert!(mesh.validate().is_ok());
    }
}
