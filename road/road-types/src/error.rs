//! Invariant violations.

use thiserror::Error;

/// A mesh that breaks its structural invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeshError {
    /// A face refers to a vertex that does not exist.
    #[error("face {face} references vertex {index}, but the mesh has {vertex_count} vertices")]
    IndexOutOfRange {
        /// Offending face.
        face: usize,
        /// Offending index.
        index: u32,
        /// Number of vertices.
        vertex_count: usize,
    },

    /// A per-vertex attribute array has the wrong length.
    #[error("{attribute} has {actual} entries, expected {expected}")]
    AttributeLength {
        /// Attribute name.
        attribute: &'static str,
        /// Vertex count.
        expected: usize,
        /// Actual array length.
        actual: usize,
    },

    /// A vertex position has a NaN or infinite coordinate.
    #[error("vertex {vertex} has a non-finite position")]
    NonFinitePosition {
        /// Offending vertex.
        vertex: usize,
    },

    /// More vertices than `u32` face indices can address.
    #[error("{count} vertices exceed the u32 index range")]
    TooManyVertices {
        /// Vertex count.
        count: usize,
    },
}
