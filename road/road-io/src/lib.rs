//! Mesh file I/O for road-scan fusion.
//!
//! This crate provides loading and saving of scan meshes and truth masks:
//!
//! - **PLY** (Polygon File Format) - Binary and ASCII, with vertex color and
//!   normals. Used for chunk inputs, truth masks, and intermediates.
//! - **OBJ** (Wavefront) - ASCII, with the `v x y z r g b` color extension.
//!   Used for the final environment hand-off.
//!
//! # Format Detection
//!
//! ```no_run
//! use road_io::{load_mesh, save_mesh};
//!
//! // Format detected from .ply extension
//! let mesh = load_mesh("stitch_1.ply").unwrap();
//!
//! // Save to a different format
//! save_mesh(&mesh, "final_environment.obj").unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod error;
mod obj;
mod ply;

pub use error::{IoError, IoResult};
pub use obj::{load_obj, read_obj, save_obj, write_obj};
pub use ply::{load_ply, load_ply_points, read_ply, save_ply, write_ply, PlyEncoding};

use std::path::Path;

use road_types::{Mesh, PointCloud};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Supported mesh file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MeshFormat {
    /// PLY (Polygon File Format), written as binary.
    #[default]
    Ply,
    /// OBJ (Wavefront), ASCII only.
    Obj,
}

impl MeshFormat {
    /// Detect format from file extension.
    ///
    /// Returns `None` if the extension is not recognized.
    #[must_use]
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_lowercase();
        Self::from_extension(&ext)
    }

    /// Parse an extension such as `"ply"` or `"OBJ"`.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "ply" => Some(Self::Ply),
            "obj" => Some(Self::Obj),
            _ => None,
        }
    }

    /// Get the canonical file extension for this format.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Ply => "ply",
            Self::Obj => "obj",
        }
    }
}

fn detect(path: &Path) -> IoResult<MeshFormat> {
    MeshFormat::from_path(path).ok_or_else(|| IoError::UnknownFormat {
        extension: path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("(none)")
            .to_string(),
    })
}

/// Load a mesh from a file, detecting format from extension.
///
/// # Errors
///
/// Returns an error if:
/// - The file format cannot be determined from the extension
/// - The file cannot be read
/// - The file content is invalid for the detected format
pub fn load_mesh<P: AsRef<Path>>(path: P) -> IoResult<Mesh> {
    let path = path.as_ref();
    match detect(path)? {
        MeshFormat::Ply => load_ply(path),
        MeshFormat::Obj => load_obj(path),
    }
}

/// Load a truth-mask point cloud, detecting format from extension.
///
/// OBJ files are accepted too; their faces are ignored.
///
/// # Errors
///
/// Returns an error if the format is unknown or the file cannot be read.
pub fn load_point_cloud<P: AsRef<Path>>(path: P) -> IoResult<PointCloud> {
    let path = path.as_ref();
    match detect(path)? {
        MeshFormat::Ply => load_ply_points(path),
        MeshFormat::Obj => load_obj(path).map(|m| PointCloud::from_mesh(&m)),
    }
}

/// Save a mesh to a file, detecting format from extension.
///
/// PLY output is binary little-endian.
///
/// # Errors
///
/// Returns an error if the format is unknown or the file cannot be written.
pub fn save_mesh<P: AsRef<Path>>(mesh: &Mesh, path: P) -> IoResult<()> {
    let path = path.as_ref();
    match detect(path)? {
        MeshFormat::Ply => save_ply(mesh, path, PlyEncoding::BinaryLittleEndian),
        MeshFormat::Obj => save_obj(mesh, path),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use road_types::{grid_patch, MeshTopology, VertexColor};

    #[test]
    fn format_from_path() {
        assert_eq!(MeshFormat::from_path("chunk.ply"), Some(MeshFormat::Ply));
        assert_eq!(MeshFormat::from_path("chunk.PLY"), Some(MeshFormat::Ply));
        assert_eq!(MeshFormat::from_path("/data/final.obj"), Some(MeshFormat::Obj));
        assert_eq!(MeshFormat::from_path("model.stl"), None);
        assert_eq!(MeshFormat::from_path("model"), None);
    }

    #[test]
    fn format_extension() {
        assert_eq!(MeshFormat::Ply.extension(), "ply");
        assert_eq!(MeshFormat::Obj.extension(), "obj");
    }

    #[test]
    fn unknown_extension_is_reported() {
        let result = load_mesh("model.xyz");
        assert!(matches!(result, Err(IoError::UnknownFormat { extension }) if extension == "xyz"));
    }

    #[test]
    fn convert_ply_to_obj_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let ply = dir.path().join("clean_chunk1.ply");
        let obj = dir.path().join("final_environment.obj");
        let mesh = grid_patch(4, 4, 0.25).with_colors(vec![VertexColor::new(90, 90, 90); 25]);

        save_mesh(&mesh, &ply).unwrap();
        let loaded = load_mesh(&ply).unwrap();
        save_mesh(&loaded, &obj).unwrap();
        let converted = load_mesh(&obj).unwrap();

        assert_eq!(converted.face_count(), mesh.face_count());
        assert_eq!(converted.colors, mesh.colors);
        assert_eq!(load_point_cloud(&ply).unwrap().len(), 25);
    }
}
