//! PLY (Polygon File Format) support.
//!
//! PLY is the interchange format of the scan front end. Meshes carry
//! per-vertex RGB color, and truth masks are point-only PLY files.
//!
//! # Supported Properties
//!
//! - Vertex positions (`x`, `y`, `z`) - required
//! - Vertex normals (`nx`, `ny`, `nz`) - optional
//! - Vertex colors (`red`, `green`, `blue`, as `uchar` or `float`) - optional
//! - Face vertex indices (`vertex_indices` or `vertex_index`) - optional;
//!   polygons are fan-triangulated
//!
//! # Example
//!
//! ```no_run
//! use road_io::{load_ply, save_ply, PlyEncoding};
//!
//! let mesh = load_ply("chunk1.ply").unwrap();
//! save_ply(&mesh, "chunk1_clean.ply", PlyEncoding::BinaryLittleEndian).unwrap();
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use ply_rs::parser::Parser;
use ply_rs::ply::{
    Addable, DefaultElement, ElementDef, Encoding, Ply, Property, PropertyDef, PropertyType,
    ScalarType,
};
use ply_rs::writer::Writer;
use road_types::{Mesh, Point3, PointCloud, Vector3, VertexColor};
use tracing::debug;

use crate::error::{IoError, IoResult};

/// How a PLY file is encoded on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlyEncoding {
    /// Human-readable text.
    Ascii,
    /// Compact little-endian binary with double-precision positions.
    #[default]
    BinaryLittleEndian,
}

/// Load a triangle mesh from a PLY file.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read
/// - The file is not valid PLY
/// - The vertex element is missing or a face index is out of range
pub fn load_ply<P: AsRef<Path>>(path: P) -> IoResult<Mesh> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| IoError::from_open(e, path))?;
    let mesh = read_ply(&mut BufReader::new(file))?;
    debug!(
        path = %path.display(),
        vertices = mesh.positions.len(),
        faces = mesh.faces.len(),
        colored = mesh.has_colors(),
        "Loaded PLY mesh"
    );
    Ok(mesh)
}

/// Load a point cloud from a PLY file, ignoring any faces.
///
/// # Errors
///
/// Returns an error if the file cannot be read or has no vertex element.
pub fn load_ply_points<P: AsRef<Path>>(path: P) -> IoResult<PointCloud> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| IoError::from_open(e, path))?;
    let mesh = read_ply(&mut BufReader::new(file))?;
    Ok(PointCloud {
        points: mesh.positions,
        normals: mesh.normals,
        colors: mesh.colors,
    })
}

/// Parse a PLY stream into a mesh.
///
/// # Errors
///
/// Returns an error if the stream is not valid PLY or describes a broken mesh.
pub fn read_ply<R: BufRead>(reader: &mut R) -> IoResult<Mesh> {
    let parser = Parser::<DefaultElement>::new();
    let ply = parser
        .read_ply(reader)
        .map_err(|e| IoError::invalid_content(format!("failed to parse PLY: {e}")))?;

    let vertex_elements = ply
        .payload
        .get("vertex")
        .ok_or_else(|| IoError::invalid_content("PLY has no vertex element"))?;

    let mut mesh = Mesh::with_capacity(vertex_elements.len(), 0);
    let mut normals = Vec::with_capacity(vertex_elements.len());
    let mut colors = Vec::with_capacity(vertex_elements.len());
    for element in vertex_elements {
        let coord = |key: &str| {
            get_scalar(element, key)
                .ok_or_else(|| IoError::invalid_content(format!("vertex is missing '{key}'")))
        };
        mesh.positions
            .push(Point3::new(coord("x")?, coord("y")?, coord("z")?));

        if let (Some(nx), Some(ny), Some(nz)) = (
            get_scalar(element, "nx"),
            get_scalar(element, "ny"),
            get_scalar(element, "nz"),
        ) {
            normals.push(Vector3::new(nx, ny, nz));
        }
        if let Some(color) = get_color(element) {
            colors.push(color);
        }
    }
    // Attributes only count when every vertex has them
    if normals.len() == mesh.positions.len() && !normals.is_empty() {
        mesh.normals = Some(normals);
    }
    if colors.len() == mesh.positions.len() && !colors.is_empty() {
        mesh.colors = Some(colors);
    }

    if let Some(face_elements) = ply.payload.get("face") {
        mesh.faces.reserve(face_elements.len());
        for element in face_elements {
            let indices = get_index_list(element);
            if indices.len() >= 3 {
                for i in 1..indices.len() - 1 {
                    mesh.faces.push([indices[0], indices[i], indices[i + 1]]);
                }
            }
        }
    }

    mesh.validate()?;
    Ok(mesh)
}

/// Extract a numeric scalar property as `f64`.
fn get_scalar(element: &DefaultElement, key: &str) -> Option<f64> {
    match element.get(key)? {
        Property::Float(v) => Some(f64::from(*v)),
        Property::Double(v) => Some(*v),
        Property::Char(v) => Some(f64::from(*v)),
        Property::UChar(v) => Some(f64::from(*v)),
        Property::Short(v) => Some(f64::from(*v)),
        Property::UShort(v) => Some(f64::from(*v)),
        Property::Int(v) => Some(f64::from(*v)),
        Property::UInt(v) => Some(f64::from(*v)),
        _ => None,
    }
}

/// Read an RGB color stored either as bytes or as floats in [0, 1].
fn get_color(element: &DefaultElement) -> Option<VertexColor> {
    let channel = |keys: [&str; 2]| -> Option<Property> {
        keys.iter().find_map(|k| element.get(*k).cloned())
    };
    let r = channel(["red", "diffuse_red"])?;
    let g = channel(["green", "diffuse_green"])?;
    let b = channel(["blue", "diffuse_blue"])?;
    match (r, g, b) {
        (Property::UChar(r), Property::UChar(g), Property::UChar(b)) => {
            Some(VertexColor::new(r, g, b))
        }
        (Property::Float(r), Property::Float(g), Property::Float(b)) => Some(
            VertexColor::from_float(f64::from(r), f64::from(g), f64::from(b)),
        ),
        (Property::Double(r), Property::Double(g), Property::Double(b)) => {
            Some(VertexColor::from_float(r, g, b))
        }
        _ => None,
    }
}

/// Extract the vertex index list from a face element.
#[allow(clippy::cast_sign_loss)]
fn get_index_list(element: &DefaultElement) -> Vec<u32> {
    for key in &["vertex_indices", "vertex_index"] {
        if let Some(prop) = element.get(*key) {
            return match prop {
                Property::ListInt(v) => v.iter().map(|&i| i as u32).collect(),
                Property::ListUInt(v) => v.clone(),
                Property::ListUChar(v) => v.iter().map(|&i| u32::from(i)).collect(),
                Property::ListChar(v) => v.iter().map(|&i| i as u32).collect(),
                Property::ListShort(v) => v.iter().map(|&i| i as u32).collect(),
                Property::ListUShort(v) => v.iter().map(|&i| u32::from(i)).collect(),
                _ => continue,
            };
        }
    }
    Vec::new()
}

/// Save a mesh to a PLY file, including normals and colors when present.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save_ply<P: AsRef<Path>>(mesh: &Mesh, path: P, encoding: PlyEncoding) -> IoResult<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_ply(mesh, &mut writer, encoding)?;
    writer.flush()?;
    debug!(path = %path.display(), ?encoding, "Saved PLY mesh");
    Ok(())
}

/// Write a mesh as PLY to any byte sink.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_ply<W: Write>(mesh: &Mesh, writer: &mut W, encoding: PlyEncoding) -> IoResult<()> {
    match encoding {
        PlyEncoding::BinaryLittleEndian => write_ply_binary(mesh, writer),
        PlyEncoding::Ascii => write_ply_ascii(mesh, writer),
    }
}

/// Binary little-endian writer.
///
/// Written by hand because ply-rs writes the element count instead of the
/// list length for binary list properties.
#[allow(clippy::cast_possible_wrap)]
fn write_ply_binary<W: Write>(mesh: &Mesh, writer: &mut W) -> IoResult<()> {
    writeln!(writer, "ply")?;
    writeln!(writer, "format binary_little_endian 1.0")?;
    writeln!(writer, "comment Generated by road-io")?;
    writeln!(writer, "element vertex {}", mesh.positions.len())?;
    for axis in ["x", "y", "z"] {
        writeln!(writer, "property double {axis}")?;
    }
    if mesh.normals.is_some() {
        for axis in ["nx", "ny", "nz"] {
            writeln!(writer, "property double {axis}")?;
        }
    }
    if mesh.colors.is_some() {
        for channel in ["red", "green", "blue"] {
            writeln!(writer, "property uchar {channel}")?;
        }
    }
    writeln!(writer, "element face {}", mesh.faces.len())?;
    writeln!(writer, "property list uchar int vertex_indices")?;
    writeln!(writer, "end_header")?;

    for (i, p) in mesh.positions.iter().enumerate() {
        for v in [p.x, p.y, p.z] {
            writer.write_all(&v.to_le_bytes())?;
        }
        if let Some(normals) = &mesh.normals {
            let n = normals[i];
            for v in [n.x, n.y, n.z] {
                writer.write_all(&v.to_le_bytes())?;
            }
        }
        if let Some(colors) = &mesh.colors {
            let c = colors[i];
            writer.write_all(&[c.r, c.g, c.b])?;
        }
    }

    for &[i0, i1, i2] in &mesh.faces {
        writer.write_all(&[3u8])?;
        for i in [i0, i1, i2] {
            writer.write_all(&(i as i32).to_le_bytes())?;
        }
    }

    Ok(())
}

/// ASCII writer using ply-rs.
fn write_ply_ascii<W: Write>(mesh: &Mesh, writer: &mut W) -> IoResult<()> {
    let mut ply = Ply::<DefaultElement>::new();
    ply.header.encoding = Encoding::Ascii;
    ply.header.comments.push("Generated by road-io".to_string());

    let scalar = |name: &str, ty: ScalarType| PropertyDef::new(name.to_string(), PropertyType::Scalar(ty));

    let mut vertex_def = ElementDef::new("vertex".to_string());
    for axis in ["x", "y", "z"] {
        vertex_def.properties.add(scalar(axis, ScalarType::Double));
    }
    if mesh.normals.is_some() {
        for axis in ["nx", "ny", "nz"] {
            vertex_def.properties.add(scalar(axis, ScalarType::Double));
        }
    }
    if mesh.colors.is_some() {
        for channel in ["red", "green", "blue"] {
            vertex_def.properties.add(scalar(channel, ScalarType::UChar));
        }
    }
    vertex_def.count = mesh.positions.len();
    ply.header.elements.add(vertex_def);

    let mut face_def = ElementDef::new("face".to_string());
    face_def.properties.add(PropertyDef::new(
        "vertex_indices".to_string(),
        PropertyType::List(ScalarType::UChar, ScalarType::Int),
    ));
    face_def.count = mesh.faces.len();
    ply.header.elements.add(face_def);

    let mut vertex_elements = Vec::with_capacity(mesh.positions.len());
    for (i, p) in mesh.positions.iter().enumerate() {
        let mut element = DefaultElement::new();
        element.insert("x".to_string(), Property::Double(p.x));
        element.insert("y".to_string(), Property::Double(p.y));
        element.insert("z".to_string(), Property::Double(p.z));
        if let Some(normals) = &mesh.normals {
            element.insert("nx".to_string(), Property::Double(normals[i].x));
            element.insert("ny".to_string(), Property::Double(normals[i].y));
            element.insert("nz".to_string(), Property::Double(normals[i].z));
        }
        if let Some(colors) = &mesh.colors {
            element.insert("red".to_string(), Property::UChar(colors[i].r));
            element.insert("green".to_string(), Property::UChar(colors[i].g));
            element.insert("blue".to_string(), Property::UChar(colors[i].b));
        }
        vertex_elements.push(element);
    }
    ply.payload.insert("vertex".to_string(), vertex_elements);

    let mut face_elements = Vec::with_capacity(mesh.faces.len());
    for &[i0, i1, i2] in &mesh.faces {
        let mut element = DefaultElement::new();
        #[allow(clippy::cast_possible_wrap)]
        let indices = vec![i0 as i32, i1 as i32, i2 as i32];
        element.insert("vertex_indices".to_string(), Property::ListInt(indices));
        face_elements.push(element);
    }
    ply.payload.insert("face".to_string(), face_elements);

    Writer::new()
        .write_ply(writer, &mut ply)
        .map_err(|e| IoError::invalid_content(format!("failed to write PLY: {e}")))?;

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use road_types::{grid_patch, MeshTopology};
    use std::io::Cursor;

    fn colored_patch() -> Mesh {
        let mut mesh = grid_patch(3, 2, 0.5);
        let colors = (0..mesh.vertex_count())
            .map(|i| VertexColor::new(i as u8 * 10, 200, 7))
            .collect();
        mesh = mesh.with_colors(colors);
        mesh.translate(Vector3::new(1_234_567.125, 3.5, -42.0));
        mesh.compute_vertex_normals();
        mesh
    }

    fn roundtrip(mesh: &Mesh, encoding: PlyEncoding) -> Mesh {
        let mut bytes = Vec::new();
        write_ply(mesh, &mut bytes, encoding).unwrap();
        read_ply(&mut Cursor::new(bytes)).unwrap()
    }

    #[test]
    fn binary_roundtrip_keeps_everything() {
        let original = colored_patch();
        let loaded = roundtrip(&original, PlyEncoding::BinaryLittleEndian);

        assert_eq!(loaded.face_count(), original.face_count());
        assert_eq!(loaded.faces, original.faces);
        assert_eq!(loaded.colors, original.colors);
        for (a, b) in original.positions.iter().zip(&loaded.positions) {
            // Double precision survives large georeferenced offsets
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }
        assert!(loaded.has_normals());
    }

    #[test]
    fn ascii_roundtrip_keeps_colors() {
        let original = colored_patch();
        let loaded = roundtrip(&original, PlyEncoding::Ascii);

        assert_eq!(loaded.vertex_count(), original.vertex_count());
        assert_eq!(loaded.colors, original.colors);
    }

    #[test]
    fn quads_are_fan_triangulated() {
        let text = "ply\nformat ascii 1.0\nelement vertex 4\nproperty float x\nproperty float y\n\
                    property float z\nelement face 1\nproperty list uchar int vertex_indices\n\
                    end_header\n0 0 0\n1 0 0\n1 0 1\n0 0 1\n4 0 1 2 3\n";
        let mesh = read_ply(&mut Cursor::new(text.as_bytes())).unwrap();
        assert_eq!(mesh.faces, vec![[0, 1, 2], [0, 2, 3]]);
        assert!(!mesh.has_colors());
    }

    #[test]
    fn point_only_file_loads_as_cloud() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points3D.ply");
        let text = "ply\nformat ascii 1.0\nelement vertex 2\nproperty float x\nproperty float y\n\
                    property float z\nproperty uchar red\nproperty uchar green\nproperty uchar blue\n\
                    end_header\n0 0 0 255 0 0\n1 2 3 0 255 0\n";
        std::fs::write(&path, text).unwrap();

        let cloud = load_ply_points(&path).unwrap();
        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.colors.unwrap()[1], VertexColor::new(0, 255, 0));
    }

    #[test]
    fn out_of_range_face_is_rejected() {
        let text = "ply\nformat ascii 1.0\nelement vertex 3\nproperty float x\nproperty float y\n\
                    property float z\nelement face 1\nproperty list uchar int vertex_indices\n\
                    end_header\n0 0 0\n1 0 0\n1 0 1\n3 0 1 9\n";
        let result = read_ply(&mut Cursor::new(text.as_bytes()));
        assert!(matches!(result, Err(IoError::InvalidMesh(_))));
    }

    #[test]
    fn load_nonexistent_file() {
        let result = load_ply("nonexistent_chunk_12345.ply");
        assert!(matches!(result, Err(IoError::FileNotFound { .. })));
    }
}
