//! Per-job working state.
//!
//! Each job owns a [`JobContext`]: a directory `<output_dir>/<job-id>/`
//! holding the final artifact, and a private temporary work directory
//! inside it for intermediates. The work directory is removed when the
//! context is dropped, whatever path the job took to get there.
//!
//! A job directory is claimed for the lifetime of its context. A second
//! job whose id maps to the same directory ("job/1" and "job_1") is
//! refused until the first one ends.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock, PoisonError};

use road_io::MeshFormat;
use tempfile::TempDir;
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};

/// File stem of the final artifact.
pub const FINAL_STEM: &str = "final_environment";

/// Replace anything but ASCII alphanumerics, `-`, `_` and `.` with `_`.
pub(crate) fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect()
}

fn claimed_dirs() -> &'static Mutex<HashSet<PathBuf>> {
    static CLAIMED: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    CLAIMED.get_or_init(Mutex::default)
}

/// Process-wide claim on a job directory, released on drop.
#[derive(Debug)]
struct DirClaim(PathBuf);

impl DirClaim {
    fn acquire(dir: PathBuf) -> Option<Self> {
        let mut claimed = claimed_dirs().lock().unwrap_or_else(PoisonError::into_inner);
        claimed.insert(dir.clone()).then(|| Self(dir))
    }
}

impl Drop for DirClaim {
    fn drop(&mut self) {
        claimed_dirs()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.0);
    }
}

/// Directories owned by one running job.
#[derive(Debug)]
pub struct JobContext {
    job_id: String,
    job_dir: PathBuf,
    work: TempDir,
    // Declared last: released after the work directory is gone
    _claim: DirClaim,
}

impl JobContext {
    /// Create the job directory and a fresh work directory inside it.
    ///
    /// With `keep_intermediates` the work directory survives the context.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if `job_id` cannot name a
    /// directory, [`PipelineError::JobActive`] if a live context already
    /// owns the directory, or [`PipelineError::Workspace`] if a directory
    /// cannot be created.
    pub fn create(output_dir: impl AsRef<Path>, job_id: &str, keep_intermediates: bool) -> PipelineResult<Self> {
        let safe = file_safe(job_id);
        if safe.trim_matches('.').is_empty() {
            return Err(PipelineError::config(format!("job id {job_id:?} cannot name a directory")));
        }

        let job_dir = output_dir.as_ref().join(safe);
        std::fs::create_dir_all(&job_dir).map_err(|e| PipelineError::workspace(&job_dir, e))?;
        let canonical = std::fs::canonicalize(&job_dir).map_err(|e| PipelineError::workspace(&job_dir, e))?;
        let claim = DirClaim::acquire(canonical).ok_or_else(|| PipelineError::JobActive {
            job: job_id.to_string(),
            path: job_dir.clone(),
        })?;

        let work = tempfile::Builder::new()
            .prefix("work-")
            .keep(keep_intermediates)
            .tempdir_in(&job_dir)
            .map_err(|e| PipelineError::workspace(&job_dir, e))?;
        debug!(job = job_id, work_dir = %work.path().display(), "Created job context");

        Ok(Self {
            job_id: job_id.to_string(),
            job_dir,
            work,
            _claim: claim,
        })
    }

    /// The job id.
    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Directory holding the final artifact.
    #[must_use]
    pub fn job_dir(&self) -> &Path {
        &self.job_dir
    }

    /// Private directory for intermediates.
    #[must_use]
    pub fn work_dir(&self) -> &Path {
        self.work.path()
    }

    /// Path of an intermediate file named `name` in the work directory.
    #[must_use]
    pub fn work_path(&self, name: &str) -> PathBuf {
        self.work.path().join(file_safe(name))
    }

    /// Path of the final artifact in `format`.
    #[must_use]
    pub fn final_path(&self, format: MeshFormat) -> PathBuf {
        self.job_dir.join(format!("{FINAL_STEM}.{}", format.extension()))
    }

    /// Delete a final artifact left by an earlier run of the same job id,
    /// so a failed run never leaves an old result looking current.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Workspace`] if the file exists but cannot
    /// be removed.
    pub fn remove_stale_final(&self, format: MeshFormat) -> PipelineResult<()> {
        let path = self.final_path(format);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "Removed stale final artifact");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::workspace(path, e)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn work_dir_is_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let work = {
            let context = JobContext::create(root.path(), "job_001", false).unwrap();
            assert!(context.work_dir().starts_with(root.path().join("job_001")));
            std::fs::write(context.work_path("clean_a.ply"), b"x").unwrap();
            context.work_dir().to_path_buf()
        };
        assert!(!work.exists());
        assert!(root.path().join("job_001").exists());
    }

    #[test]
    fn kept_work_dir_survives() {
        let root = tempfile::tempdir().unwrap();
        let work = {
            let context = JobContext::create(root.path(), "job", true).unwrap();
            context.work_dir().to_path_buf()
        };
        assert!(work.exists());
    }

    #[test]
    fn job_dir_is_claimed_while_context_lives() {
        let root = tempfile::tempdir().unwrap();
        let first = JobContext::create(root.path(), "job/1", false).unwrap();
        std::fs::write(first.final_path(MeshFormat::Obj), b"result").unwrap();

        for id in ["job/1", "job_1"] {
            let err = JobContext::create(root.path(), id, false).unwrap_err();
            assert!(matches!(err, PipelineError::JobActive { .. }), "{err}");
        }
        // The refused job touched nothing
        assert!(first.final_path(MeshFormat::Obj).exists());

        let other = JobContext::create(root.path(), "job_2", false).unwrap();
        assert_ne!(other.job_dir(), first.job_dir());

        drop(first);
        let again = JobContext::create(root.path(), "job_1", false).unwrap();
        assert_eq!(again.job_dir(), root.path().join("job_1"));
    }

    #[test]
    fn final_path_uses_format_extension() {
        let root = tempfile::tempdir().unwrap();
        let context = JobContext::create(root.path(), "job", false).unwrap();
        assert_eq!(
            context.final_path(MeshFormat::Obj),
            root.path().join("job").join("final_environment.obj")
        );
        assert_eq!(context.final_path(MeshFormat::Ply).extension().unwrap(), "ply");
    }

    #[test]
    fn unsafe_names_are_rewritten() {
        assert_eq!(file_safe("../chunk 1"), ".._chunk_1");
        let root = tempfile::tempdir().unwrap();
        let context = JobContext::create(root.path(), "a/b", false).unwrap();
        assert_eq!(context.job_dir(), root.path().join("a_b"));
        assert!(JobContext::create(root.path(), "..", false).is_err());
    }

    #[test]
    fn stale_final_is_removed() {
        let root = tempfile::tempdir().unwrap();
        let context = JobContext::create(root.path(), "job", false).unwrap();
        let stale = context.final_path(MeshFormat::Obj);
        std::fs::write(&stale, b"old").unwrap();
        context.remove_stale_final(MeshFormat::Obj).unwrap();
        assert!(!stale.exists());
        context.remove_stale_final(MeshFormat::Obj).unwrap();
    }
}
