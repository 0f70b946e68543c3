//! Strategies for pairing chunk meshes with truth masks.
//!
//! Pairing is kept behind [`PairingStrategy`] so callers can swap the
//! filename heuristic for an explicit table.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::manifest::{ChunkManifest, ChunkSpec};

/// Turns uploaded files into an ordered chunk list.
pub trait PairingStrategy {
    /// Pair `meshes` with `masks`. The result follows the strategy's
    /// chunk order; meshes without a mask get `truth_mask: None`.
    fn pair(&self, meshes: &[PathBuf], masks: &[PathBuf]) -> Vec<ChunkSpec>;
}

fn file_name(path: &Path) -> Option<&std::ffi::OsStr> {
    path.file_name()
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Pairs files through an explicit manifest.
///
/// Entries are matched to the given files by file name. Entries whose
/// mesh was not supplied are dropped. A declared mask that was not
/// supplied keeps its manifest path, so the missing file is reported
/// when the chunk is cleaned.
#[derive(Debug, Clone, Default)]
pub struct ManifestPairing {
    manifest: ChunkManifest,
}

impl ManifestPairing {
    /// Create a pairing from a manifest.
    #[must_use]
    pub const fn new(manifest: ChunkManifest) -> Self {
        Self { manifest }
    }

    /// The manifest's chunks unchanged.
    #[must_use]
    pub fn chunks(&self) -> &[ChunkSpec] {
        &self.manifest.chunks
    }
}

impl PairingStrategy for ManifestPairing {
    fn pair(&self, meshes: &[PathBuf], masks: &[PathBuf]) -> Vec<ChunkSpec> {
        let lookup = |files: &[PathBuf], wanted: &Path| -> Option<PathBuf> {
            let name = file_name(wanted)?;
            files.iter().find(|f| file_name(f) == Some(name)).cloned()
        };

        let mut pairs = Vec::with_capacity(self.manifest.len());
        for entry in &self.manifest.chunks {
            let Some(mesh) = lookup(meshes, &entry.mesh) else {
                warn!(chunk = %entry.id, mesh = %entry.mesh.display(), "Manifest mesh not supplied, skipping");
                continue;
            };
            let truth_mask = entry
                .truth_mask
                .as_deref()
                .map(|declared| lookup(masks, declared).unwrap_or_else(|| declared.to_path_buf()));
            pairs.push(ChunkSpec {
                id: entry.id.clone(),
                mesh,
                truth_mask,
            });
        }

        for mesh in meshes {
            let listed = pairs.iter().any(|p| file_name(&p.mesh) == file_name(mesh));
            if !listed {
                warn!(mesh = %mesh.display(), "Mesh not in manifest, ignoring");
            }
        }
        pairs
    }
}

/// Pairs by file name: the mesh stem up to its first `_` must occur in
/// the mask stem.
///
/// Meshes keep their input order. This guesses wrong whenever one
/// prefix is contained in another mask's name (`chunk1` matches
/// `chunk10_points`), so ambiguous matches are logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrefixPairing;

impl PrefixPairing {
    fn prefix(mesh: &Path) -> String {
        let stem = stem(mesh);
        stem.split('_').next().unwrap_or_default().to_string()
    }
}

impl PairingStrategy for PrefixPairing {
    fn pair(&self, meshes: &[PathBuf], masks: &[PathBuf]) -> Vec<ChunkSpec> {
        meshes
            .iter()
            .map(|mesh| {
                let prefix = Self::prefix(mesh);
                let candidates: Vec<&PathBuf> = if prefix.is_empty() {
                    Vec::new()
                } else {
                    masks.iter().filter(|m| stem(m).contains(&prefix)).collect()
                };
                if candidates.len() > 1 {
                    warn!(
                        mesh = %mesh.display(),
                        prefix = %prefix,
                        candidates = candidates.len(),
                        chosen = %candidates[0].display(),
                        "Ambiguous truth mask match"
                    );
                }
                let chunk = ChunkSpec::from_mesh_path(mesh);
                match candidates.first() {
                    Some(mask) => {
                        debug!(mesh = %mesh.display(), mask = %mask.display(), "Paired by prefix");
                        chunk.with_truth_mask((*mask).clone())
                    }
                    None => {
                        debug!(mesh = %mesh.display(), prefix = %prefix, "No truth mask matched");
                        chunk
                    }
                }
            })
            .collect()
    }
}
