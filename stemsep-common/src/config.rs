//! Bootstrap configuration file and default folder resolution
//!
//! Settings are resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! Tiers 1 and 2 are handled by each binary's argument parser; this module
//! provides tiers 3 and 4.

use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Bootstrap configuration loaded from TOML
///
/// Every field is optional; missing fields fall through to compiled defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Interface to bind (e.g. "0.0.0.0")
    pub host: Option<String>,
    /// HTTP server port
    pub port: Option<u16>,
    /// Folder holding `uploads/` and `separated/` unless overridden below
    pub data_folder: Option<PathBuf>,
    /// Transient per-job upload files
    pub upload_root: Option<PathBuf>,
    /// Persistent per-job output folders
    pub output_root: Option<PathBuf>,
    pub engine: EngineSection,
    pub encoder: EncoderSection,
    pub limits: LimitsSection,
    pub logging: LoggingConfig,
}

/// `[engine]` table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Interpreter or executable that runs the separation engine
    pub interpreter: Option<PathBuf>,
    /// Engine script passed as the interpreter's first argument
    pub script: Option<PathBuf>,
    /// Model used when a request does not select one
    pub default_model: Option<String>,
    /// Extension of the stem files the engine produces (without dot)
    pub output_extension: Option<String>,
    /// Extra environment variables for the engine process
    pub env: HashMap<String, String>,
}

/// `[encoder]` table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EncoderSection {
    /// Encoder binary used by the sample codec bridge
    pub binary: Option<PathBuf>,
}

/// `[limits]` table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LimitsSection {
    pub max_upload_bytes: Option<usize>,
    pub max_concurrent_jobs: Option<usize>,
    pub job_timeout_secs: Option<u64>,
}

/// `[logging]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load the TOML config, degrading to defaults when it is absent
///
/// An explicitly given path must exist. Without one, the per-user default
/// location is tried and a missing file only produces a log line.
pub fn load_or_default(explicit: Option<&Path>, module_name: &str) -> Result<TomlConfig> {
    if let Some(path) = explicit {
        info!("Loading config from {}", path.display());
        return load_toml_config(path);
    }

    match default_config_path(module_name) {
        Some(path) if path.exists() => {
            info!("Loading config from {}", path.display());
            load_toml_config(&path)
        }
        Some(path) => {
            info!("No config file at {}, using defaults", path.display());
            Ok(TomlConfig::default())
        }
        None => {
            warn!("Could not determine config directory, using defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Per-user config file: `<config dir>/stemsep/<module>.toml`
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("stemsep").join(format!("{}.toml", module_name)))
}

/// OS-dependent default data folder
pub fn default_data_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/stemsep
        dirs::data_local_dir()
            .map(|d| d.join("stemsep"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/stemsep"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("stemsep"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/stemsep"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("stemsep"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\stemsep"))
    } else {
        PathBuf::from("./stemsep_data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_is_all_defaults() {
        let config: TomlConfig = toml::from_str("").unwrap();
        assert!(config.port.is_none());
        assert!(config.engine.env.is_empty());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_full_toml_parses() {
        let config: TomlConfig = toml::from_str(
            r#"
            host = "0.0.0.0"
            port = 9000
            data_folder = "/srv/stemsep"

            [engine]
            interpreter = "/opt/venv/bin/python"
            script = "/opt/stemsep/run_engine.py"
            default_model = "htdemucs"
            output_extension = "flac"
            env = { CUDA_VISIBLE_DEVICES = "0" }

            [encoder]
            binary = "/usr/local/bin/ffmpeg"

            [limits]
            max_concurrent_jobs = 2
            job_timeout_secs = 600

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.port, Some(9000));
        assert_eq!(config.engine.default_model.as_deref(), Some("htdemucs"));
        assert_eq!(config.engine.env.get("CUDA_VISIBLE_DEVICES").map(String::as_str), Some("0"));
        assert_eq!(config.limits.max_concurrent_jobs, Some(2));
        assert!(config.limits.max_upload_bytes.is_none());
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let result = load_or_default(Some(Path::new("/nonexistent/stemsep.toml")), "stemsep-api");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_default_data_folder_is_named_for_stemsep() {
        let folder = default_data_folder();
        assert!(folder.to_string_lossy().contains("stemsep"));
    }
}
