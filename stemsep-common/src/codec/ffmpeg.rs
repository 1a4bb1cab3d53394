//! FFmpeg-backed sample writer
//!
//! Spawns `ffmpeg` reading raw interleaved little-endian f32 PCM from stdin:
//!
//! ```text
//! ffmpeg -hide_banner -loglevel error -f f32le -ac <channels> -ar <rate> -i pipe:0 -f <container> -y <tmp>
//! ```
//!
//! The encoder writes to a hidden sibling `.<name>.partial` file which is
//! renamed over the destination only after a clean exit. A failing encoder
//! therefore never replaces an existing file or leaves a truncated one behind.

use super::{CodecError, SampleWriter};
use crate::audio::SampleBuffer;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Encoded container, chosen from the destination extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    Wav,
    Flac,
    Mp3,
    Ogg,
    Aiff,
}

impl ContainerFormat {
    /// Map a file extension (case-insensitive) to a container
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "wav" => Some(ContainerFormat::Wav),
            "flac" => Some(ContainerFormat::Flac),
            "mp3" => Some(ContainerFormat::Mp3),
            "ogg" => Some(ContainerFormat::Ogg),
            "aif" | "aiff" => Some(ContainerFormat::Aiff),
            _ => None,
        }
    }

    /// Name passed to ffmpeg's `-f` output option
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            ContainerFormat::Wav => "wav",
            ContainerFormat::Flac => "flac",
            ContainerFormat::Mp3 => "mp3",
            ContainerFormat::Ogg => "ogg",
            ContainerFormat::Aiff => "aiff",
        }
    }

    fn from_path(path: &Path) -> Result<Self, CodecError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        Self::from_extension(ext).ok_or_else(|| CodecError::UnsupportedFormat(path.display().to_string()))
    }
}

/// Sample writer that pipes raw PCM into an ffmpeg subprocess
#[derive(Debug, Clone)]
pub struct FfmpegWriter {
    binary: PathBuf,
}

impl FfmpegWriter {
    /// Writer using `ffmpeg` from PATH
    pub fn new() -> Self {
        Self::with_binary("ffmpeg")
    }

    /// Writer using a specific encoder binary
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Check that the encoder binary runs (`ffmpeg -version` exits cleanly)
    pub async fn verify(&self) -> Result<(), CodecError> {
        let output = Command::new(&self.binary)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| CodecError::Launch {
                binary: self.binary.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(CodecError::EncodeFailure {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    fn build_command(&self, buffer: &SampleBuffer, format: ContainerFormat, out: &Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-hide_banner")
            .args(["-loglevel", "error"])
            .args(["-f", "f32le"])
            .arg("-ac")
            .arg(buffer.channels().to_string())
            .arg("-ar")
            .arg(buffer.sample_rate().to_string())
            .args(["-i", "pipe:0"])
            .args(["-f", format.ffmpeg_name()])
            .arg("-y")
            .arg(out)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for FfmpegWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Hidden sibling path the encoder writes to before the final rename
fn partial_path(dest: &Path) -> Result<PathBuf, CodecError> {
    let name = dest
        .file_name()
        .ok_or_else(|| CodecError::UnsupportedFormat(dest.display().to_string()))?;
    let mut partial = std::ffi::OsString::from(".");
    partial.push(name);
    partial.push(".partial");
    Ok(dest.with_file_name(partial))
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial encoder output");
        }
    }
}

#[async_trait]
impl SampleWriter for FfmpegWriter {
    async fn write(&self, buffer: SampleBuffer, dest: &Path) -> Result<(), CodecError> {
        let format = ContainerFormat::from_path(dest)?;
        if buffer.frames() == 0 {
            return Err(CodecError::InvalidBuffer("buffer holds no frames".to_string()));
        }

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = partial_path(dest)?;

        tracing::debug!(
            dest = %dest.display(),
            channels = buffer.channels(),
            sample_rate = buffer.sample_rate(),
            frames = buffer.frames(),
            "Encoding stem"
        );

        let mut child = self
            .build_command(&buffer, format, &partial)
            .spawn()
            .map_err(|source| CodecError::Launch {
                binary: self.binary.display().to_string(),
                source,
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| CodecError::Io(std::io::Error::other("encoder stdin not captured")))?;

        let bytes = buffer.to_f32le_bytes();
        drop(buffer);

        // Feed stdin on its own task so stderr is drained concurrently
        let feeder = tokio::spawn(async move {
            stdin.write_all(&bytes).await?;
            stdin.shutdown().await
        });

        let output = child.wait_with_output().await;
        let fed = feeder
            .await
            .unwrap_or_else(|e| Err(std::io::Error::other(e)));

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                discard(&partial).await;
                return Err(CodecError::Io(e));
            }
        };
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            discard(&partial).await;
            return Err(CodecError::EncodeFailure {
                code: output.status.code(),
                stderr,
            });
        }

        if let Err(source) = fed {
            discard(&partial).await;
            return Err(CodecError::PipeWrite { source, stderr });
        }

        if let Err(e) = tokio::fs::rename(&partial, dest).await {
            discard(&partial).await;
            return Err(CodecError::Io(e));
        }

        tracing::debug!(dest = %dest.display(), "Stem encoded");
        Ok(())
    }
}
