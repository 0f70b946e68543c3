//! Pipeline configuration.

use std::path::{Path, PathBuf};

use road_clean::CleanParams;
use road_io::MeshFormat;
use road_registration::StitchParams;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Settings shared by every job an [`Orchestrator`](crate::Orchestrator) runs.
///
/// Every field has a default, so a configuration file only needs the
/// values it changes:
///
/// ```
/// use road_io::MeshFormat;
/// use road_pipeline::PipelineConfig;
///
/// let config = PipelineConfig::from_json_str(r#"{ "output_format": "ply" }"#).unwrap();
/// assert_eq!(config.output_format, MeshFormat::Ply);
/// assert!(!config.keep_intermediates);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Per-chunk cleaning.
    pub clean: CleanParams,
    /// Pairwise stitching.
    pub stitch: StitchParams,
    /// Format of the final artifact.
    pub output_format: MeshFormat,
    /// Directory under which each job gets its own subdirectory.
    pub output_dir: PathBuf,
    /// Keep each job's work directory after it finishes.
    pub keep_intermediates: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            clean: CleanParams::default(),
            stitch: StitchParams::default(),
            output_format: MeshFormat::Obj,
            output_dir: PathBuf::from("data/processed"),
            keep_intermediates: false,
        }
    }
}

impl PipelineConfig {
    /// Default settings writing under `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    /// Sets the cleaning settings.
    #[must_use]
    pub fn with_clean(mut self, clean: CleanParams) -> Self {
        self.clean = clean;
        self
    }

    /// Sets the stitching settings.
    #[must_use]
    pub const fn with_stitch(mut self, stitch: StitchParams) -> Self {
        self.stitch = stitch;
        self
    }

    /// Sets the final artifact format.
    #[must_use]
    pub const fn with_output_format(mut self, format: MeshFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Keeps work directories after jobs finish.
    #[must_use]
    pub const fn keeping_intermediates(mut self) -> Self {
        self.keep_intermediates = true;
        self
    }

    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or names an unknown
    /// variant.
    pub fn from_json_str(json: &str) -> PipelineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Serializes the configuration as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> PipelineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use road_clean::SurfaceMode;
    use road_registration::StitchMode;

    #[test]
    fn empty_object_gives_defaults() {
        let config = PipelineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.output_format, MeshFormat::Obj);
        assert_eq!(config.stitch.mode, StitchMode::TrustPose);
    }

    #[test]
    fn nested_overrides_keep_sibling_defaults() {
        let json = r#"{
            "stitch": { "mode": "full" },
            "clean": { "level_floor": true, "surface": { "mode": { "mode": "close_holes", "max_hole_edges": 100 } } }
        }"#;
        let config = PipelineConfig::from_json_str(json).unwrap();
        assert_eq!(config.stitch.mode, StitchMode::Full);
        assert!(config.clean.level_floor);
        assert_eq!(config.clean.surface.mode, SurfaceMode::CloseHoles { max_hole_edges: 100 });
        assert_eq!(config.clean.density, CleanParams::default().density);
    }

    #[test]
    fn json_round_trip() {
        let config = PipelineConfig::new("/tmp/out")
            .with_stitch(StitchParams::full())
            .with_output_format(MeshFormat::Ply)
            .keeping_intermediates();
        let back = PipelineConfig::from_json_str(&config.to_json().unwrap()).unwrap();
        assert_eq!(back.stitch.mode, StitchMode::Full);
        assert_eq!(back.output_format, MeshFormat::Ply);
        assert_eq!(back.output_dir, PathBuf::from("/tmp/out"));
        assert!(back.keep_intermediates);
        assert_eq!(back.clean.prune, config.clean.prune);
    }

    #[test]
    fn unknown_format_is_rejected() {
        let result = PipelineConfig::from_json_str(r#"{ "output_format": "stl" }"#);
        assert!(matches!(result, Err(PipelineError::Json(_))));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let result = PipelineConfig::from_json_file("/nonexistent/roadtwin.json");
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }
}
