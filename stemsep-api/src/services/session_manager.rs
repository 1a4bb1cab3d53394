//! Per-job input/output allocation
//!
//! Each job gets a fresh v4 UUID. The upload is written to
//! `<upload_root>/<session_id>_<filename>` and the engine writes into
//! `<output_root>/<session_id>/`. Both are opened exclusively (`create_new`,
//! `create_dir`), so two jobs can never share a path even with identical
//! filenames.
//!
//! Input files are transient: [`InputGuard`] removes them when the job ends,
//! whichever way it ends. Output directories are left in place for retrieval.

use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncWriteExt};
use uuid::Uuid;

use crate::error::JobError;
use crate::models::Job;

/// Allocates isolated job locations
#[derive(Debug, Clone)]
pub struct SessionManager {
    upload_root: PathBuf,
    output_root: PathBuf,
}

impl SessionManager {
    pub fn new(upload_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            upload_root: upload_root.into(),
            output_root: output_root.into(),
        }
    }

    pub fn upload_root(&self) -> &Path {
        &self.upload_root
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Create upload and output roots if missing
    pub async fn ensure_directories(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.upload_root).await?;
        tokio::fs::create_dir_all(&self.output_root).await
    }

    /// Persist an upload and allocate a pending job for it
    ///
    /// # Errors
    /// * `InvalidInput` for unusable filenames or model identifiers
    /// * `UploadWrite` if the output directory or upload file cannot be
    ///   written; a partially written upload is removed first
    pub async fn create_job<R>(
        &self,
        mut upload: R,
        filename: &str,
        model: &str,
    ) -> Result<Job, JobError>
    where
        R: AsyncRead + Unpin,
    {
        let filename = sanitize_filename(filename)?;
        validate_model(model)?;

        let session_id = Uuid::new_v4();
        let output_dir = self.output_root.join(session_id.to_string());
        let input_path = self
            .upload_root
            .join(format!("{}_{}", session_id, filename));

        tokio::fs::create_dir(&output_dir)
            .await
            .map_err(|source| JobError::UploadWrite {
                path: output_dir.clone(),
                source,
            })?;

        // Armed before the file exists: a cancelled copy still removes it
        let mut pending = InputGuard::new(session_id, input_path.clone());

        let written = async {
            let mut file = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&input_path)
                .await?;
            let bytes = tokio::io::copy(&mut upload, &mut file).await?;
            file.flush().await?;
            Ok::<u64, std::io::Error>(bytes)
        }
        .await;

        let bytes = match written {
            Ok(bytes) => {
                pending.disarm();
                bytes
            }
            Err(source) => {
                if source.kind() == std::io::ErrorKind::AlreadyExists {
                    pending.disarm();
                }
                drop(pending);
                // Still empty: nothing was handed to the engine yet
                let _ = tokio::fs::remove_dir(&output_dir).await;
                return Err(JobError::UploadWrite {
                    path: input_path,
                    source,
                });
            }
        };

        tracing::info!(
            session_id = %session_id,
            filename = %filename,
            model = %model,
            bytes = bytes,
            "Upload persisted"
        );

        Ok(Job::new(
            session_id,
            filename,
            model.to_string(),
            input_path,
            output_dir,
        ))
    }

    /// Remove the job's input artifact
    ///
    /// Returns `true` if a file was removed; calling it again is a no-op. The
    /// output directory is never touched.
    pub fn finalize(&self, job: &Job) -> bool {
        remove_input(&job.input_path)
    }

    /// Scoped cleanup for the job's input artifact
    pub fn guard(&self, job: &Job) -> InputGuard {
        InputGuard::new(job.session_id, job.input_path.clone())
    }

    /// Hidden scratch file in the upload root, removed when the guard drops
    ///
    /// Used to hold a request body on disk until the job parameters that
    /// follow it are known.
    pub fn spool(&self) -> InputGuard {
        let id = Uuid::new_v4();
        InputGuard::new(id, self.upload_root.join(format!(".spool-{}", id)))
    }
}

/// Removes a job's input file when released or dropped
///
/// Holding the guard across the engine run makes cleanup run on success,
/// on error returns, and on panic unwinding alike.
#[derive(Debug)]
pub struct InputGuard {
    session_id: Uuid,
    path: PathBuf,
    armed: bool,
}

impl InputGuard {
    fn new(session_id: Uuid, path: PathBuf) -> Self {
        Self {
            session_id,
            path,
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the file; dropping the guard no longer removes it
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// Remove the input now; returns `true` if a file was removed
    pub fn release(mut self) -> bool {
        self.cleanup()
    }

    fn cleanup(&mut self) -> bool {
        if !std::mem::take(&mut self.armed) {
            return false;
        }
        let removed = remove_input(&self.path);
        tracing::debug!(session_id = %self.session_id, removed, "Input artifact released");
        removed
    }
}

impl Drop for InputGuard {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn remove_input(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove input artifact");
            false
        }
    }
}

/// Reduce a client-supplied filename to a safe final path component
///
/// Both `/` and `\` are treated as separators so Windows client paths are
/// handled on any host.
pub fn sanitize_filename(raw: &str) -> Result<String, JobError> {
    let name = raw
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();

    if name.is_empty() || name == "." || name == ".." {
        return Err(JobError::InvalidInput(format!(
            "Unusable upload filename: {:?}",
            raw
        )));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(JobError::InvalidInput(format!(
            "Upload filename contains control characters: {:?}",
            raw
        )));
    }

    Ok(name.to_string())
}

/// Model identifiers become a path component and an engine argument
pub fn validate_model(model: &str) -> Result<(), JobError> {
    let valid = !model.is_empty()
        && model.len() <= 64
        && !model.starts_with('.')
        && !model.starts_with('-')
        && model
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));

    if valid {
        Ok(())
    } else {
        Err(JobError::InvalidInput(format!("Invalid model identifier: {:?}", model)))
    }
}
