//! Chunk manifests: which mesh goes with which truth mask.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// One chunk of a capture session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSpec {
    /// Identifier used in logs, reports and intermediate file names.
    pub id: String,
    /// Dense mesh file.
    pub mesh: PathBuf,
    /// Sparse reference cloud bounding the trusted region.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truth_mask: Option<PathBuf>,
}

impl ChunkSpec {
    /// A chunk without a truth mask.
    #[must_use]
    pub fn new(id: impl Into<String>, mesh: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            mesh: mesh.into(),
            truth_mask: None,
        }
    }

    /// Sets the truth mask.
    #[must_use]
    pub fn with_truth_mask(mut self, mask: impl Into<PathBuf>) -> Self {
        self.truth_mask = Some(mask.into());
        self
    }

    /// A chunk whose id is the mesh file stem.
    #[must_use]
    pub fn from_mesh_path(mesh: impl Into<PathBuf>) -> Self {
        let mesh = mesh.into();
        let id = mesh
            .file_stem()
            .map_or_else(|| "chunk".to_string(), |s| s.to_string_lossy().into_owned());
        Self::new(id, mesh)
    }

    fn resolve_against(&mut self, base: &Path) {
        if self.mesh.is_relative() {
            self.mesh = base.join(&self.mesh);
        }
        if let Some(mask) = &mut self.truth_mask {
            if mask.is_relative() {
                *mask = base.join(&*mask);
            }
        }
    }
}

/// An ordered list of chunks.
///
/// Order matters: chunks are stitched left to right.
///
/// ```
/// use road_pipeline::ChunkManifest;
///
/// let manifest = ChunkManifest::from_json_str(
///     r#"{ "chunks": [
///         { "id": "chunk1", "mesh": "chunk01_mesh.ply", "truth_mask": "chunk1_points3D.ply" },
///         { "id": "chunk2", "mesh": "chunk02_mesh.ply" }
///     ] }"#,
///     "data/uploads",
/// )
/// .unwrap();
/// assert_eq!(manifest.chunks[0].mesh, std::path::Path::new("data/uploads/chunk01_mesh.ply"));
/// assert!(manifest.chunks[1].truth_mask.is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkManifest {
    /// Chunks in stitching order.
    pub chunks: Vec<ChunkSpec>,
}

impl ChunkManifest {
    /// Parses a manifest, resolving relative paths against `base`.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed, a chunk id is empty, or
    /// two chunks share an id.
    pub fn from_json_str(json: &str, base: impl AsRef<Path>) -> PipelineResult<Self> {
        let mut manifest: Self = serde_json::from_str(json)?;
        for chunk in &mut manifest.chunks {
            chunk.resolve_against(base.as_ref());
        }
        manifest.validate()?;
        Ok(manifest)
    }

    /// Loads a manifest file. Relative paths resolve against the file's
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn from_json_file(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::config(format!("cannot read {}: {e}", path.display())))?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Self::from_json_str(&json, base)
    }

    /// Checks that ids are non-empty and unique.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] naming the offending id.
    pub fn validate(&self) -> PipelineResult<()> {
        let mut seen = std::collections::HashSet::new();
        for chunk in &self.chunks {
            if chunk.id.trim().is_empty() {
                return Err(PipelineError::config("chunk id must not be empty"));
            }
            if !seen.insert(chunk.id.as_str()) {
                return Err(PipelineError::config(format!("duplicate chunk id {}", chunk.id)));
            }
        }
        Ok(())
    }

    /// Number of chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the manifest lists no chunks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn absolute_paths_are_kept() {
        let json = r#"{ "chunks": [ { "id": "a", "mesh": "/data/a.ply", "truth_mask": "/data/a_pts.ply" } ] }"#;
        let manifest = ChunkManifest::from_json_str(json, "/elsewhere").unwrap();
        assert_eq!(manifest.chunks[0].mesh, PathBuf::from("/data/a.ply"));
        assert_eq!(manifest.chunks[0].truth_mask, Some(PathBuf::from("/data/a_pts.ply")));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let json = r#"{ "chunks": [ { "id": "a", "mesh": "1.ply" }, { "id": "a", "mesh": "2.ply" } ] }"#;
        let result = ChunkManifest::from_json_str(json, ".");
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn empty_id_is_rejected() {
        let json = r#"{ "chunks": [ { "id": " ", "mesh": "1.ply" } ] }"#;
        assert!(ChunkManifest::from_json_str(json, ".").is_err());
    }

    #[test]
    fn file_paths_resolve_against_manifest_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, r#"{ "chunks": [ { "id": "c1", "mesh": "meshes/c1.ply" } ] }"#).unwrap();

        let manifest = ChunkManifest::from_json_file(&path).unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.chunks[0].mesh, dir.path().join("meshes/c1.ply"));
    }

    #[test]
    fn id_defaults_to_file_stem() {
        let chunk = ChunkSpec::from_mesh_path("uploads/chunk02_with_overlap.ply");
        assert_eq!(chunk.id, "chunk02_with_overlap");
        assert!(chunk.truth_mask.is_none());
    }
}
