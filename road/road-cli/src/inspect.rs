//! `inspect`: a quick look inside mesh files.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use road_io::load_mesh;
use road_types::{Aabb, Mesh, MeshBounds};
use tracing::warn;

/// What a mesh file contains.
#[derive(Debug)]
struct Summary {
    path: PathBuf,
    vertices: usize,
    faces: usize,
    bounds: Option<Aabb>,
    colors: bool,
    normals: bool,
}

impl Summary {
    fn of(path: &Path, mesh: &Mesh) -> Self {
        Self {
            path: path.to_path_buf(),
            vertices: mesh.positions.len(),
            faces: mesh.faces.len(),
            bounds: mesh.bounds_opt(),
            colors: mesh.has_colors(),
            normals: mesh.has_normals(),
        }
    }

    const fn is_empty(&self) -> bool {
        self.vertices == 0 || self.faces == 0
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.path.display())?;
        writeln!(f, "  vertices: {}", self.vertices)?;
        writeln!(f, "  faces:    {}", self.faces)?;
        match &self.bounds {
            Some(b) => {
                let size = b.size();
                writeln!(
                    f,
                    "  bounds:   [{:.3}, {:.3}, {:.3}] .. [{:.3}, {:.3}, {:.3}]",
                    b.min.x, b.min.y, b.min.z, b.max.x, b.max.y, b.max.z
                )?;
                writeln!(f, "  size:     {:.3} x {:.3} x {:.3}", size.x, size.y, size.z)?;
            }
            None => writeln!(f, "  bounds:   (none)")?,
        }
        writeln!(f, "  colors:   {}", if self.colors { "yes" } else { "no" })?;
        write!(f, "  normals:  {}", if self.normals { "yes" } else { "no" })
    }
}

pub fn run(files: &[PathBuf]) -> Result<()> {
    for path in files {
        let mesh = load_mesh(path).with_context(|| format!("Failed to load {}", path.display()))?;
        let summary = Summary::of(path, &mesh);
        if summary.is_empty() {
            warn!(path = %path.display(), "Mesh is empty");
        }
        println!("{summary}");
    }
    Ok(())
}
