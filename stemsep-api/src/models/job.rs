//! Separation job state machine
//!
//! A job progresses Pending → Running → Succeeded | Failed. It is created when
//! the upload has been persisted and dropped once the response is sent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    /// Upload persisted, engine not started
    Pending,
    /// Engine running
    Running,
    /// Stems located
    Succeeded,
    /// Any fatal job error
    Failed,
}

/// State transition event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub session_id: Uuid,
    pub old_state: JobStatus,
    pub new_state: JobStatus,
    pub transitioned_at: DateTime<Utc>,
}

/// One produced stem file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StemResult {
    /// Stem name: file name without extension (e.g. "vocals")
    pub name: String,
    /// Location on disk, always under the job's output directory
    pub path: PathBuf,
    /// Retrieval URL: `/output/{session_id}/{model}/{result_dir}/{file}`,
    /// each segment percent-encoded
    pub url: String,
}

/// One separation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique token; namespaces both the input file and the output directory
    pub session_id: Uuid,

    /// Uploaded file name, reduced to its final path component
    pub filename: String,

    /// Separation model identifier
    pub model: String,

    /// Transient upload: `<upload_root>/<session_id>_<filename>`
    pub input_path: PathBuf,

    /// Persistent output: `<output_root>/<session_id>`
    pub output_dir: PathBuf,

    /// Current lifecycle state
    pub status: JobStatus,

    /// Located stems (empty until Succeeded)
    pub stems: Vec<StemResult>,

    pub created_at: DateTime<Utc>,

    /// Set on entering Succeeded or Failed
    pub ended_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a pending job
    pub fn new(
        session_id: Uuid,
        filename: String,
        model: String,
        input_path: PathBuf,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            session_id,
            filename,
            model,
            input_path,
            output_dir,
            status: JobStatus::Pending,
            stems: Vec::new(),
            created_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Transition to new state
    pub fn transition_to(&mut self, new_state: JobStatus) -> StateTransition {
        let transition = StateTransition {
            session_id: self.session_id,
            old_state: self.status,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.status = new_state;

        if self.is_terminal() {
            self.ended_at = Some(transition.transitioned_at);
        }

        tracing::debug!(
            session_id = %self.session_id,
            from = ?transition.old_state,
            to = ?transition.new_state,
            "Job state transition"
        );

        transition
    }

    /// Check if job is terminal (finished)
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobStatus::Succeeded | JobStatus::Failed)
    }

    /// Directory the engine writes model results into: `<output_dir>/<model>`
    pub fn model_dir(&self) -> PathBuf {
        self.output_dir.join(&self.model)
    }

    /// Result directory names to look for, most likely first
    ///
    /// The engine names its result directory after the file it was given
    /// (`<session_id>_<filename>` minus extension); some engine builds use the
    /// original upload name instead.
    pub fn result_name_candidates(&self) -> Vec<String> {
        let mut candidates = Vec::with_capacity(2);
        for path in [self.input_path.as_path(), Path::new(&self.filename)] {
            if let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().to_string()) {
                if !stem.is_empty() && !candidates.contains(&stem) {
                    candidates.push(stem);
                }
            }
        }
        candidates
    }
}
