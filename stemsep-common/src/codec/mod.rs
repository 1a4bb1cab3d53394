//! Sample codec bridge
//!
//! Engines hand decoded stems to a [`SampleWriter`] instead of writing audio
//! files themselves. The production writer streams raw `f32le` PCM into an
//! external encoder process ([`FfmpegWriter`]), which owns every container
//! format concern.

mod ffmpeg;

pub use ffmpeg::{ContainerFormat, FfmpegWriter};

use crate::audio::SampleBuffer;
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Sample writer errors
#[derive(Debug, Error)]
pub enum CodecError {
    /// Encoder binary could not be started
    #[error("Failed to launch encoder '{binary}': {source}")]
    Launch {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// Encoder exited with a nonzero status
    #[error("Encoder exited with code {code:?}: {stderr}")]
    EncodeFailure { code: Option<i32>, stderr: String },

    /// Writing PCM into the encoder's stdin failed (usually a broken pipe)
    #[error("Failed to stream samples to encoder: {source}; encoder said: {stderr}")]
    PipeWrite {
        #[source]
        source: std::io::Error,
        stderr: String,
    },

    /// Destination extension has no known container format
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    /// Buffer cannot be encoded (e.g. empty)
    #[error("Invalid sample buffer: {0}")]
    InvalidBuffer(String),

    /// I/O error around the encoder (temp file, rename)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// Diagnostic text captured from the encoder, if any
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            CodecError::EncodeFailure { stderr, .. } | CodecError::PipeWrite { stderr, .. } => {
                Some(stderr.as_str())
            }
            _ => None,
        }
    }
}

/// Pluggable "write these samples to this path" capability
///
/// Injected into in-process engines at construction. Implementations must
/// report every failure: a silently missing stem file would corrupt the
/// later output enumeration.
#[async_trait]
pub trait SampleWriter: Send + Sync {
    /// Encode `buffer` to `dest`, replacing any existing file on success
    async fn write(&self, buffer: SampleBuffer, dest: &Path) -> Result<(), CodecError>;
}
