//! Separation engine invocation
//!
//! The engine is an opaque collaborator that fills
//! `<output_dir>/<model>/<name>/*.<ext>` and reports success via its exit
//! status. Two implementations are provided:
//!
//! - [`ProcessEngine`]: runs an external engine process with the argument
//!   contract `<interpreter> <script> -n <model> -o <output_dir> <input>`.
//!   The process gets the configured extra environment plus
//!   [`ENCODER_ENV`], the encoder binary the engine should write stems with.
//!   On Unix the engine leads its own process group; if the
//!   run is abandoned (deadline, dropped request) the whole group is killed,
//!   encoder children included.
//! - [`NativeEngine`]: drives an in-process [`StemSeparator`] and writes each
//!   produced [`SampleBuffer`] through an injected [`SampleWriter`]. It is
//!   for embedding a Rust separator as a library; the binary runs
//!   `ProcessEngine`.
//!
//! Neither interprets the output directory; that is the output resolver's job.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use stemsep_common::{SampleBuffer, SampleWriter};
use tokio::process::Command;

use crate::error::JobError;
use crate::models::Job;

/// What the engine is asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineRequest {
    pub session_id: uuid::Uuid,
    pub model: String,
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
}

impl From<&Job> for EngineRequest {
    fn from(job: &Job) -> Self {
        Self {
            session_id: job.session_id,
            model: job.model.clone(),
            input_path: job.input_path.clone(),
            output_dir: job.output_dir.clone(),
        }
    }
}

/// Captured outcome of a successful engine run
#[derive(Debug, Clone, Default)]
pub struct ExitResult {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Stem separation engine
#[async_trait]
pub trait SeparationEngine: Send + Sync {
    /// Run the engine to completion
    ///
    /// # Errors
    /// * `Launch` if the engine cannot be started
    /// * `Engine` if it exits nonzero (diagnostics carried verbatim)
    /// * `Encode` if an in-process engine fails to write a stem
    async fn separate(&self, request: &EngineRequest) -> Result<ExitResult, JobError>;
}

// ============================================================================
// External process engine
// ============================================================================

/// Environment variable naming the encoder binary for external engines
pub const ENCODER_ENV: &str = "STEMSEP_ENCODER";

/// Engine run as an external process
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    interpreter: PathBuf,
    script: Option<PathBuf>,
    env: HashMap<String, String>,
}

impl ProcessEngine {
    /// `interpreter` runs `script`; with no script, `interpreter` is the
    /// engine executable itself
    pub fn new(interpreter: impl Into<PathBuf>, script: Option<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            script,
            env: HashMap::new(),
        }
    }

    /// Extra environment variables for the engine process
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    /// Tell the engine which encoder to use, unless the extra environment
    /// already names one
    pub fn with_encoder(mut self, encoder: &Path) -> Self {
        self.env
            .entry(ENCODER_ENV.to_string())
            .or_insert_with(|| encoder.display().to_string());
        self
    }

    /// Arguments after the program name
    pub fn args(&self, request: &EngineRequest) -> Vec<OsString> {
        let mut args = Vec::with_capacity(6);
        if let Some(script) = &self.script {
            args.push(script.as_os_str().to_os_string());
        }
        args.push("-n".into());
        args.push(request.model.clone().into());
        args.push("-o".into());
        args.push(request.output_dir.as_os_str().to_os_string());
        args.push(request.input_path.as_os_str().to_os_string());
        args
    }

    fn build_command(&self, request: &EngineRequest) -> Command {
        let mut cmd = Command::new(&self.interpreter);
        cmd.args(self.args(request))
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}

/// Kills an engine's process group unless the engine finished normally
#[cfg(unix)]
struct ProcessGroup {
    pgid: i32,
    armed: bool,
}

#[cfg(unix)]
impl ProcessGroup {
    fn new(leader_pid: u32) -> Option<Self> {
        i32::try_from(leader_pid).ok().map(|pgid| Self { pgid, armed: true })
    }
}

#[cfg(unix)]
impl Drop for ProcessGroup {
    fn drop(&mut self) {
        if self.armed {
            // SAFETY: kill(2) only signals; a negative pid addresses the group
            // created by process_group(0) for this engine.
            unsafe {
                libc::kill(-self.pgid, libc::SIGKILL);
            }
        }
    }
}

#[async_trait]
impl SeparationEngine for ProcessEngine {
    async fn separate(&self, request: &EngineRequest) -> Result<ExitResult, JobError> {
        let mut cmd = self.build_command(request);

        tracing::info!(
            session_id = %request.session_id,
            command = ?cmd.as_std(),
            "Running separation engine"
        );

        let child = cmd.spawn().map_err(|source| JobError::Launch {
            program: self.interpreter.display().to_string(),
            source,
        })?;
        #[cfg(unix)]
        let mut group = child.id().and_then(ProcessGroup::new);

        let output = child.wait_with_output().await?;
        #[cfg(unix)]
        if let Some(group) = group.as_mut() {
            group.armed = false;
        }

        let result = ExitResult {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if !output.status.success() {
            tracing::error!(
                session_id = %request.session_id,
                code = ?result.code,
                stderr = %result.stderr,
                "Separation engine failed"
            );
            return Err(JobError::Engine {
                code: result.code,
                stderr: result.stderr,
            });
        }

        tracing::info!(session_id = %request.session_id, "Separation engine finished");
        Ok(result)
    }
}

// ============================================================================
// In-process engine with injected sample writer
// ============================================================================

/// One stem produced by an in-process separator
#[derive(Debug, Clone)]
pub struct SeparatedStem {
    /// Stem name, used as the output file name (e.g. "vocals")
    pub name: String,
    pub buffer: SampleBuffer,
}

/// In-process separation model
#[async_trait]
pub trait StemSeparator: Send + Sync {
    async fn separate(&self, input: &Path, model: &str) -> anyhow::Result<Vec<SeparatedStem>>;
}

/// Engine that separates in-process and writes stems through a [`SampleWriter`]
///
/// The writer is fixed at construction, so the separator never needs to know
/// how (or whether) audio files get encoded.
pub struct NativeEngine {
    separator: Arc<dyn StemSeparator>,
    writer: Arc<dyn SampleWriter>,
    extension: String,
}

impl NativeEngine {
    pub fn new(
        separator: Arc<dyn StemSeparator>,
        writer: Arc<dyn SampleWriter>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            separator,
            writer,
            extension: extension.into(),
        }
    }

    /// `<output_dir>/<model>/<input file stem>`
    fn result_dir(request: &EngineRequest) -> PathBuf {
        let name = request
            .input_path
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_else(|| OsString::from("result"));
        request.output_dir.join(&request.model).join(name)
    }
}

fn engine_error(message: String) -> JobError {
    JobError::Engine {
        code: None,
        stderr: message,
    }
}

/// Stem names become file names in one shared directory
fn validate_stem_names(stems: &[SeparatedStem]) -> Result<(), JobError> {
    let mut seen = HashSet::new();
    for stem in stems {
        let valid = !stem.name.is_empty()
            && !stem.name.starts_with('.')
            && !stem.name.contains(|c: char| c == '/' || c == '\\');
        if !valid {
            return Err(engine_error(format!("Invalid stem name: {:?}", stem.name)));
        }
        if !seen.insert(stem.name.as_str()) {
            return Err(engine_error(format!("Duplicate stem name: {:?}", stem.name)));
        }
    }
    Ok(())
}

#[async_trait]
impl SeparationEngine for NativeEngine {
    async fn separate(&self, request: &EngineRequest) -> Result<ExitResult, JobError> {
        let stems = self
            .separator
            .separate(&request.input_path, &request.model)
            .await
            .map_err(|e| engine_error(format!("{:#}", e)))?;

        // Reject the whole set before writing anything
        validate_stem_names(&stems)?;

        let dir = Self::result_dir(request);
        tokio::fs::create_dir_all(&dir).await?;

        let count = stems.len();
        for stem in stems {
            let dest = dir.join(format!("{}.{}", stem.name, self.extension));
            tracing::debug!(
                session_id = %request.session_id,
                stem = %stem.name,
                dest = %dest.display(),
                "Writing stem"
            );
            self.writer.write(stem.buffer, &dest).await?;
        }

        tracing::info!(session_id = %request.session_id, stems = count, "In-process separation finished");

        Ok(ExitResult {
            code: Some(0),
            stdout: format!("wrote {} stems to {}", count, dir.display()),
            stderr: String::new(),
        })
    }
}
