//! # stemsep Common Library
//!
//! Shared code for the stemsep service crates:
//! - Configuration loading (TOML bootstrap file, default directories)
//! - In-memory sample buffers handed over by separation engines
//! - Sample codec bridge (raw PCM piped into an external encoder)

pub mod audio;
pub mod codec;
pub mod config;
pub mod error;

pub use audio::{SampleBuffer, SampleData, SampleLayout};
pub use codec::{CodecError, FfmpegWriter, SampleWriter};
pub use error::{Error, Result};
