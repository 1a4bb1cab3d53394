//! Drives one separation job from upload to located stems
//!
//! `SessionManager::create_job` → engine → `OutputResolver::resolve`, with the
//! job's input artifact held by an [`InputGuard`](super::InputGuard) for the
//! whole run. Optional hardening: a bound on concurrently running engines and
//! a per-job deadline. When the deadline fires the engine future is dropped;
//! [`ProcessEngine`](super::ProcessEngine) then kills the engine's whole
//! process group, so encoder children it spawned stop before the partial
//! output directory is removed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::sync::Semaphore;

use super::engine::{EngineRequest, SeparationEngine};
use super::output_resolver::OutputResolver;
use super::session_manager::SessionManager;
use crate::error::JobError;
use crate::models::{Job, JobStatus, StemResult};

/// Separation job runner
pub struct SeparationService {
    sessions: SessionManager,
    engine: Arc<dyn SeparationEngine>,
    resolver: OutputResolver,
    admission: Option<Arc<Semaphore>>,
    max_concurrent_jobs: Option<usize>,
    deadline: Option<Duration>,
    active: Arc<AtomicUsize>,
}

/// Counts a job as active for as long as it lives
struct ActiveJob(Arc<AtomicUsize>);

impl ActiveJob {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for ActiveJob {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SeparationService {
    pub fn new(
        sessions: SessionManager,
        engine: Arc<dyn SeparationEngine>,
        resolver: OutputResolver,
    ) -> Self {
        Self {
            sessions,
            engine,
            resolver,
            admission: None,
            max_concurrent_jobs: None,
            deadline: None,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Run at most `limit` engines at once; further jobs wait their turn
    pub fn with_max_concurrent_jobs(mut self, limit: usize) -> Self {
        self.admission = Some(Arc::new(Semaphore::new(limit)));
        self.max_concurrent_jobs = Some(limit);
        self
    }

    /// Kill the engine and fail the job after `deadline`
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn max_concurrent_jobs(&self) -> Option<usize> {
        self.max_concurrent_jobs
    }

    /// Jobs between upload and completion, including those waiting for admission
    pub fn active_jobs(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Free engine slots, if admission control is enabled
    pub fn available_slots(&self) -> Option<usize> {
        self.admission.as_ref().map(|s| s.available_permits())
    }

    /// Persist the upload, separate it and locate the stems
    ///
    /// Returns the job in `Succeeded` state. On any failure the job is marked
    /// `Failed` and the error returned; either way the input artifact is gone
    /// when this returns.
    pub async fn run<R>(&self, upload: R, filename: &str, model: &str) -> Result<Job, JobError>
    where
        R: AsyncRead + Unpin,
    {
        let _active = ActiveJob::enter(&self.active);
        let mut job = self.sessions.create_job(upload, filename, model).await?;
        let guard = self.sessions.guard(&job);

        let outcome = self.execute(&mut job).await;
        guard.release();

        match outcome {
            Ok(stems) => {
                job.stems = stems;
                job.transition_to(JobStatus::Succeeded);
                tracing::info!(
                    session_id = %job.session_id,
                    stems = job.stems.len(),
                    "Separation job succeeded"
                );
                Ok(job)
            }
            Err(e) => {
                job.transition_to(JobStatus::Failed);
                tracing::error!(
                    session_id = %job.session_id,
                    code = e.code(),
                    error = %e,
                    "Separation job failed"
                );
                Err(e)
            }
        }
    }

    async fn execute(&self, job: &mut Job) -> Result<Vec<StemResult>, JobError> {
        let _permit = match &self.admission {
            Some(semaphore) => Some(
                semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|e| JobError::Io(std::io::Error::other(e)))?,
            ),
            None => None,
        };

        job.transition_to(JobStatus::Running);
        let request = EngineRequest::from(&*job);

        match self.deadline {
            Some(deadline) => {
                match tokio::time::timeout(deadline, self.engine.separate(&request)).await {
                    Ok(result) => {
                        result?;
                    }
                    Err(_) => {
                        // Dropping the engine future killed the child; discard partial output
                        if let Err(e) = tokio::fs::remove_dir_all(&job.output_dir).await {
                            tracing::warn!(
                                session_id = %job.session_id,
                                error = %e,
                                "Failed to remove partial output"
                            );
                        }
                        return Err(JobError::Cancellation(deadline));
                    }
                }
            }
            None => {
                self.engine.separate(&request).await?;
            }
        }

        self.resolver.resolve(job).await
    }
}
