//! Locates an engine's result directory and enumerates its stems
//!
//! The expected layout is `<output_dir>/<model>/<name>/<stem>.<ext>`, but the
//! engine may rewrite `<name>` (dropping characters it considers unsafe). The
//! result directory is therefore found in two explicit steps:
//!
//! 1. Exact match: try each candidate name in order.
//! 2. Unique sibling: if no candidate exists, the single subdirectory of
//!    `<output_dir>/<model>` is taken. Several subdirectories have no reliable
//!    tie-break and fail as `ResultsAmbiguous`.
//!
//! Hidden entries (leading `.`) are ignored in both steps.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::path::{Path, PathBuf};

use crate::error::JobError;
use crate::models::{Job, StemResult};

/// Characters left unescaped in a URL path segment (RFC 3986 unreserved)
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// `/output/{session_id}/{model}/{dir}/{file}` with each segment escaped
fn stem_url(session_id: &uuid::Uuid, model: &str, dir: &str, file: &str) -> String {
    format!(
        "/output/{}/{}/{}/{}",
        session_id,
        utf8_percent_encode(model, SEGMENT),
        utf8_percent_encode(dir, SEGMENT),
        utf8_percent_encode(file, SEGMENT)
    )
}

/// Output resolver
#[derive(Debug, Clone)]
pub struct OutputResolver {
    extension: String,
}

impl OutputResolver {
    /// Resolver for stem files with the given extension (without dot)
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Locate and enumerate the job's stems
    ///
    /// Results are sorted by name so responses are stable; the engine's own
    /// production order carries no meaning.
    ///
    /// # Errors
    /// * `ResultsNotFound` if no result directory exists or it holds no stems
    /// * `ResultsAmbiguous` if several sibling directories compete
    pub async fn resolve(&self, job: &Job) -> Result<Vec<StemResult>, JobError> {
        let model_dir = job.model_dir();
        let result_dir = self
            .locate_result_dir(&model_dir, &job.result_name_candidates())
            .await?;
        let dir_name = result_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let mut stems = Vec::new();
        let mut entries = tokio::fs::read_dir(&result_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() || !self.matches_extension(&path) {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().to_string();
            if file_name.starts_with('.') {
                continue;
            }
            let name = match path.file_stem() {
                Some(stem) => stem.to_string_lossy().to_string(),
                None => continue,
            };

            stems.push(StemResult {
                url: stem_url(&job.session_id, &job.model, &dir_name, &file_name),
                name,
                path,
            });
        }

        if stems.is_empty() {
            tracing::warn!(
                session_id = %job.session_id,
                dir = %result_dir.display(),
                extension = %self.extension,
                "Result directory holds no stems"
            );
            return Err(JobError::ResultsNotFound(result_dir));
        }

        stems.sort_by(|a, b| a.name.cmp(&b.name));

        tracing::info!(
            session_id = %job.session_id,
            dir = %result_dir.display(),
            stems = stems.len(),
            "Stems located"
        );

        Ok(stems)
    }

    /// Two-step result directory lookup under `model_dir`
    pub async fn locate_result_dir(
        &self,
        model_dir: &Path,
        candidates: &[String],
    ) -> Result<PathBuf, JobError> {
        // Step 1: exact match
        for candidate in candidates {
            let path = model_dir.join(candidate);
            if tokio::fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false) {
                return Ok(path);
            }
        }

        // Step 2: unique sibling
        let mut entries = match tokio::fs::read_dir(model_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(JobError::ResultsNotFound(model_dir.to_path_buf()));
            }
            Err(e) => return Err(JobError::Io(e)),
        };

        let mut subdirs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with('.') && entry.file_type().await?.is_dir() {
                subdirs.push(name);
            }
        }

        match subdirs.len() {
            0 => Err(JobError::ResultsNotFound(model_dir.to_path_buf())),
            1 => {
                let found = model_dir.join(&subdirs[0]);
                tracing::info!(
                    expected = ?candidates,
                    found = %found.display(),
                    "Result directory renamed by engine; using only sibling"
                );
                Ok(found)
            }
            _ => {
                subdirs.sort();
                Err(JobError::ResultsAmbiguous {
                    dir: model_dir.to_path_buf(),
                    candidates: subdirs,
                })
            }
        }
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_match_is_case_insensitive() {
        let resolver = OutputResolver::new("wav");
        assert!(resolver.matches_extension(Path::new("vocals.wav")));
        assert!(resolver.matches_extension(Path::new("Vocals.WAV")));
        assert!(!resolver.matches_extension(Path::new("vocals.mp3")));
        assert!(!resolver.matches_extension(Path::new("vocals")));
        assert!(!resolver.matches_extension(Path::new(".vocals.wav.partial")));
    }

    #[test]
    fn test_stem_url_escapes_segments() {
        let id = uuid::Uuid::nil();
        assert_eq!(
            stem_url(&id, "htdemucs_6s", "My Song #2", "vocals.wav"),
            format!("/output/{}/htdemucs_6s/My%20Song%20%232/vocals.wav", id)
        );
        assert_eq!(
            stem_url(&id, "htdemucs", "Café", "no_vocals.wav"),
            format!("/output/{}/htdemucs/Caf%C3%A9/no_vocals.wav", id)
        );
    }

    #[tokio::test]
    async fn test_missing_model_dir_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = OutputResolver::new("wav")
            .locate_result_dir(&dir.path().join("htdemucs"), &["song".to_string()])
            .await;
        assert!(matches!(result, Err(JobError::ResultsNotFound(_))));
    }

    #[tokio::test]
    async fn test_exact_match_wins_over_siblings() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("song")).unwrap();
        std::fs::create_dir_all(dir.path().join("other")).unwrap();

        let found = OutputResolver::new("wav")
            .locate_result_dir(dir.path(), &["song".to_string()])
            .await
            .unwrap();
        assert_eq!(found, dir.path().join("song"));
    }

    #[tokio::test]
    async fn test_hidden_dirs_are_not_siblings() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".cache")).unwrap();
        std::fs::create_dir_all(dir.path().join("song_clean")).unwrap();

        let found = OutputResolver::new("wav")
            .locate_result_dir(dir.path(), &["song (1)".to_string()])
            .await
            .unwrap();
        assert_eq!(found, dir.path().join("song_clean"));
    }
}
