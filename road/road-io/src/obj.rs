//! Wavefront OBJ support.
//!
//! OBJ is the hand-off format for game-engine consumers of the final
//! environment. Vertex colors use the common `v x y z r g b` extension with
//! components in [0, 1].

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use road_types::{Mesh, Point3, Vector3, VertexColor};
use tracing::debug;

use crate::error::{IoError, IoResult};

/// Load a mesh from an OBJ file.
///
/// Reads `v` (with optional color), `vn` and `f` records. Polygons are
/// fan-triangulated; negative (relative) indices are supported. Normals are
/// kept only when each vertex index is paired with the same normal index.
///
/// # Errors
///
/// Returns an error if the file cannot be read or a record is malformed.
pub fn load_obj<P: AsRef<Path>>(path: P) -> IoResult<Mesh> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| IoError::from_open(e, path))?;
    let mesh = read_obj(BufReader::new(file))?;
    debug!(path = %path.display(), vertices = mesh.positions.len(), faces = mesh.faces.len(), "Loaded OBJ mesh");
    Ok(mesh)
}

/// Parse an OBJ stream.
///
/// # Errors
///
/// Returns an error if a record is malformed or an index is out of range.
pub fn read_obj<R: BufRead>(reader: R) -> IoResult<Mesh> {
    let mut mesh = Mesh::new();
    let mut colors: Vec<VertexColor> = Vec::new();
    let mut normals: Vec<Vector3<f64>> = Vec::new();
    let mut normals_aligned = true;

    for line in reader.lines() {
        let line = line?;
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("v") => {
                let values = tokens.map(str::parse::<f64>).collect::<Result<Vec<_>, _>>()?;
                if values.len() < 3 {
                    return Err(IoError::invalid_content(format!("vertex record too short: {line}")));
                }
                mesh.positions.push(Point3::new(values[0], values[1], values[2]));
                if values.len() >= 6 {
                    colors.push(VertexColor::from_float(values[3], values[4], values[5]));
                }
            }
            Some("vn") => {
                let values = tokens.map(str::parse::<f64>).collect::<Result<Vec<_>, _>>()?;
                if values.len() < 3 {
                    return Err(IoError::invalid_content(format!("normal record too short: {line}")));
                }
                normals.push(Vector3::new(values[0], values[1], values[2]));
            }
            Some("f") => {
                let count = mesh.positions.len();
                let mut corners = Vec::with_capacity(4);
                for token in tokens {
                    let mut parts = token.split('/');
                    let v = resolve_index(parts.next().unwrap_or(""), count)?;
                    let n = parts.nth(1).filter(|s| !s.is_empty());
                    if n.map(|n| resolve_index(n, normals.len())).transpose()? != Some(v) {
                        normals_aligned = false;
                    }
                    corners.push(v);
                }
                if corners.len() >= 3 {
                    for i in 1..corners.len() - 1 {
                        mesh.faces.push([corners[0], corners[i], corners[i + 1]]);
                    }
                }
            }
            _ => {}
        }
    }

    if !colors.is_empty() && colors.len() == mesh.positions.len() {
        mesh.colors = Some(colors);
    }
    if normals_aligned && !normals.is_empty() && normals.len() == mesh.positions.len() {
        mesh.normals = Some(normals);
    }
    mesh.validate()?;
    Ok(mesh)
}

/// Turn a 1-based (or negative, relative) OBJ index into a 0-based one.
fn resolve_index(token: &str, count: usize) -> IoResult<u32> {
    let raw: i64 = token.parse()?;
    let count = i64::try_from(count).map_err(|_| IoError::invalid_content("too many vertices"))?;
    let resolved = if raw < 0 { count + raw } else { raw - 1 };
    u32::try_from(resolved)
        .ok()
        .filter(|&i| i64::from(i) < count)
        .ok_or_else(|| IoError::invalid_content(format!("index {raw} out of range")))
}

/// Save a mesh as OBJ, with vertex colors and normals when present.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save_obj<P: AsRef<Path>>(mesh: &Mesh, path: P) -> IoResult<()> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    write_obj(mesh, &mut writer)?;
    writer.flush()?;
    debug!(path = %path.display(), "Saved OBJ mesh");
    Ok(())
}

/// Write a mesh as OBJ to any byte sink.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_obj<W: Write>(mesh: &Mesh, writer: &mut W) -> IoResult<()> {
    writeln!(writer, "# Generated by road-io")?;
    writeln!(writer, "# {} vertices, {} faces", mesh.positions.len(), mesh.faces.len())?;

    for (i, p) in mesh.positions.iter().enumerate() {
        match &mesh.colors {
            Some(colors) => {
                let [r, g, b] = colors[i].to_float();
                writeln!(writer, "v {} {} {} {r:.6} {g:.6} {b:.6}", p.x, p.y, p.z)?;
            }
            None => writeln!(writer, "v {} {} {}", p.x, p.y, p.z)?,
        }
    }
    if let Some(normals) = &mesh.normals {
        for n in normals {
            writeln!(writer, "vn {} {} {}", n.x, n.y, n.z)?;
        }
    }
    for f in &mesh.faces {
        let [a, b, c] = [f[0] + 1, f[1] + 1, f[2] + 1];
        if mesh.normals.is_some() {
            writeln!(writer, "f {a}//{a} {b}//{b} {c}//{c}")?;
        } else {
            writeln!(writer, "f {a} {b} {c}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use road_types::{grid_patch, MeshError, MeshTopology};
    use std::io::Cursor;

    #[test]
    fn roundtrip_with_colors_and_normals() {
        let mut mesh = grid_patch(2, 2, 1.0);
        mesh = mesh.with_colors(vec![VertexColor::new(255, 0, 128); 9]);
        mesh.compute_vertex_normals();

        let mut bytes = Vec::new();
        write_obj(&mesh, &mut bytes).unwrap();
        let loaded = read_obj(Cursor::new(bytes)).unwrap();

        assert_eq!(loaded.faces, mesh.faces);
        assert_eq!(loaded.colors, mesh.colors);
        assert!(loaded.has_normals());
        assert_relative_eq!(loaded.positions[4].x, 1.0);
    }

    #[test]
    fn negative_indices_and_polygons() {
        let text = "v 0 0 0\nv 1 0 0\nv 1 0 1\nv 0 0 1\nf -4 -3 -2 -1\n";
        let mesh = read_obj(Cursor::new(text)).unwrap();
        assert_eq!(mesh.face_count(), 2);
        assert_eq!(mesh.faces[1], [0, 2, 3]);
    }

    #[test]
    fn out_of_range_index_fails() {
        let text = "v 0 0 0\nv 1 0 0\nv 1 0 1\nf 1 2 4\n";
        assert!(read_obj(Cursor::new(text)).is_err());
    }

    #[test]
    fn non_finite_vertex_is_rejected() {
        let text = "v 0 0 0\nv nan 0 0\nv 1 0 1\nf 1 2 3\n";
        assert!(matches!(
            read_obj(Cursor::new(text)),
            Err(IoError::InvalidMesh(MeshError::NonFinitePosition { vertex: 1 }))
        ));
    }
}
