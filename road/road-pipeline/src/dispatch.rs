//! Background job dispatch.
//!
//! [`JobDispatcher::submit`] starts a job on its own worker thread and
//! returns at once. The caller polls [`JobHandle::status`] or blocks on
//! [`JobHandle::wait`]. A worker that panics still leaves a terminal
//! status behind.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, error};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::job::{JobReport, JobState, PipelineJob};
use crate::orchestrator::Orchestrator;

/// Starts jobs in the background.
///
/// Jobs run concurrently with each other; stages within a job stay
/// sequential on that job's worker.
#[derive(Debug, Clone)]
pub struct JobDispatcher {
    orchestrator: Arc<Orchestrator>,
}

impl JobDispatcher {
    /// Create a dispatcher whose jobs share `config`.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            orchestrator: Arc::new(Orchestrator::new(config)),
        }
    }

    /// Start `job` on a new worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Spawn`] if the thread cannot be started.
    pub fn submit(&self, job: PipelineJob) -> PipelineResult<JobHandle> {
        let job_id = job.id.clone();
        let orchestrator = Arc::clone(&self.orchestrator);
        spawn_job(job_id, move |publish| orchestrator.run_with_observer(job, publish))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Run `work` on a named worker thread, publishing every state it
/// reports to the returned handle.
fn spawn_job<F>(job_id: String, work: F) -> PipelineResult<JobHandle>
where
    F: FnOnce(&mut dyn FnMut(&JobState)) -> JobReport + Send + 'static,
{
    let status = Arc::new(Mutex::new(JobState::Pending));
    let shared = Arc::clone(&status);
    let name = job_id.clone();
    let worker = thread::Builder::new()
        .name(format!("job-{job_id}"))
        .spawn(move || {
            let mut publish = |state: &JobState| {
                *shared.lock().unwrap_or_else(PoisonError::into_inner) = state.clone();
            };
            match panic::catch_unwind(AssertUnwindSafe(|| work(&mut publish))) {
                Ok(report) => report,
                Err(payload) => {
                    let reason = format!("worker panicked: {}", panic_message(payload.as_ref()));
                    error!(job = %name, %reason, "Job worker panicked");
                    publish(&JobState::Failed { reason });
                    panic::resume_unwind(payload)
                }
            }
        })
        .map_err(|source| PipelineError::Spawn {
            job: job_id.clone(),
            source,
        })?;
    debug!(job = %job_id, "Job submitted");

    Ok(JobHandle { job_id, status, worker })
}

/// A running or finished background job.
#[derive(Debug)]
pub struct JobHandle {
    job_id: String,
    status: Arc<Mutex<JobState>>,
    worker: JoinHandle<JobReport>,
}

impl JobHandle {
    /// The job id.
    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Latest state the job reported.
    #[must_use]
    pub fn status(&self) -> JobState {
        self.status.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Whether the worker has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Block until the job ends and return its report.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::WorkerPanicked`] if the worker panicked.
    pub fn wait(self) -> PipelineResult<JobReport> {
        self.worker
            .join()
            .map_err(|_| PipelineError::WorkerPanicked { job: self.job_id })
    }
}
