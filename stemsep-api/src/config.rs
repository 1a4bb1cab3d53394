//! Configuration resolution for stemsep-api
//!
//! **Priority:** command line → environment (`STEMSEP_*`) → TOML → compiled
//! default. Clap covers the first two tiers; [`ServiceConfig::resolve`] merges
//! the rest.

use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use stemsep_common::config::{default_data_folder, TomlConfig};
use stemsep_common::{Error, Result};

use crate::services::validate_model;

/// Default port (the original front end talks to this port)
pub const DEFAULT_PORT: u16 = 8001;
/// Six-stem model: vocals, drums, bass, guitar, piano, other
pub const DEFAULT_MODEL: &str = "htdemucs_6s";
pub const DEFAULT_OUTPUT_EXTENSION: &str = "wav";
/// Engine script looked up in the data folder when none is configured
pub const DEFAULT_ENGINE_SCRIPT: &str = "run_engine.py";

/// Command-line arguments for stemsep-api
#[derive(Parser, Debug, Default)]
#[command(name = "stemsep-api")]
#[command(about = "Stem separation service")]
#[command(version)]
pub struct Args {
    /// TOML config file (default: <config dir>/stemsep/stemsep-api.toml)
    #[arg(short, long, env = "STEMSEP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Interface to bind
    #[arg(long, env = "STEMSEP_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "STEMSEP_PORT")]
    pub port: Option<u16>,

    /// Folder holding uploads/ and separated/
    #[arg(long, env = "STEMSEP_DATA_FOLDER")]
    pub data_folder: Option<PathBuf>,

    /// Transient upload folder (overrides <data folder>/uploads)
    #[arg(long, env = "STEMSEP_UPLOAD_ROOT")]
    pub upload_root: Option<PathBuf>,

    /// Persistent output folder (overrides <data folder>/separated)
    #[arg(long, env = "STEMSEP_OUTPUT_ROOT")]
    pub output_root: Option<PathBuf>,

    /// Interpreter or executable running the separation engine
    #[arg(long, env = "STEMSEP_ENGINE_INTERPRETER")]
    pub engine_interpreter: Option<PathBuf>,

    /// Engine script passed to the interpreter (default: <data folder>/run_engine.py;
    /// empty to run the interpreter directly)
    #[arg(long, env = "STEMSEP_ENGINE_SCRIPT")]
    pub engine_script: Option<PathBuf>,

    /// Model used when a request selects none
    #[arg(long, env = "STEMSEP_DEFAULT_MODEL")]
    pub default_model: Option<String>,

    /// Extension of produced stem files
    #[arg(long, env = "STEMSEP_OUTPUT_EXTENSION")]
    pub output_extension: Option<String>,

    /// Encoder binary used by the sample codec bridge
    #[arg(long, env = "STEMSEP_ENCODER")]
    pub encoder: Option<PathBuf>,

    /// Request body limit in bytes
    #[arg(long, env = "STEMSEP_MAX_UPLOAD_BYTES")]
    pub max_upload_bytes: Option<usize>,

    /// Maximum engines running at once (unbounded if unset)
    #[arg(long, env = "STEMSEP_MAX_CONCURRENT_JOBS")]
    pub max_concurrent_jobs: Option<usize>,

    /// Per-job deadline in seconds (none if unset)
    #[arg(long, env = "STEMSEP_JOB_TIMEOUT_SECS")]
    pub job_timeout_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "STEMSEP_LOG_LEVEL")]
    pub log_level: Option<String>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub upload_root: PathBuf,
    pub output_root: PathBuf,
    pub engine_interpreter: PathBuf,
    pub engine_script: Option<PathBuf>,
    pub engine_env: HashMap<String, String>,
    pub default_model: String,
    pub output_extension: String,
    pub encoder: PathBuf,
    pub max_upload_bytes: usize,
    pub max_concurrent_jobs: Option<usize>,
    pub job_timeout: Option<Duration>,
    pub log_level: String,
}

impl ServiceConfig {
    /// Merge arguments over TOML over compiled defaults, then validate
    pub fn resolve(args: &Args, toml: &TomlConfig) -> Result<Self> {
        let data_folder = args
            .data_folder
            .clone()
            .or_else(|| toml.data_folder.clone())
            .unwrap_or_else(default_data_folder);

        let engine_script = match args.engine_script.clone().or_else(|| toml.engine.script.clone()) {
            // An empty script means the interpreter is the engine itself
            Some(script) if script.as_os_str().is_empty() => None,
            Some(script) => Some(script),
            None => Some(data_folder.join(DEFAULT_ENGINE_SCRIPT)),
        };

        let config = Self {
            host: args
                .host
                .clone()
                .or_else(|| toml.host.clone())
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            port: args.port.or(toml.port).unwrap_or(DEFAULT_PORT),
            upload_root: args
                .upload_root
                .clone()
                .or_else(|| toml.upload_root.clone())
                .unwrap_or_else(|| data_folder.join("uploads")),
            output_root: args
                .output_root
                .clone()
                .or_else(|| toml.output_root.clone())
                .unwrap_or_else(|| data_folder.join("separated")),
            engine_interpreter: args
                .engine_interpreter
                .clone()
                .or_else(|| toml.engine.interpreter.clone())
                .unwrap_or_else(|| PathBuf::from("python3")),
            engine_script,
            engine_env: toml.engine.env.clone(),
            default_model: args
                .default_model
                .clone()
                .or_else(|| toml.engine.default_model.clone())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            output_extension: args
                .output_extension
                .clone()
                .or_else(|| toml.engine.output_extension.clone())
                .unwrap_or_else(|| DEFAULT_OUTPUT_EXTENSION.to_string())
                .trim_start_matches('.')
                .to_string(),
            encoder: args
                .encoder
                .clone()
                .or_else(|| toml.encoder.binary.clone())
                .unwrap_or_else(|| PathBuf::from("ffmpeg")),
            max_upload_bytes: args
                .max_upload_bytes
                .or(toml.limits.max_upload_bytes)
                .unwrap_or(crate::DEFAULT_MAX_UPLOAD_BYTES),
            max_concurrent_jobs: args.max_concurrent_jobs.or(toml.limits.max_concurrent_jobs),
            job_timeout: args
                .job_timeout_secs
                .or(toml.limits.job_timeout_secs)
                .map(Duration::from_secs),
            log_level: args
                .log_level
                .clone()
                .unwrap_or_else(|| toml.logging.level.clone()),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        validate_model(&self.default_model)
            .map_err(|e| Error::Config(format!("default model: {}", e)))?;

        if self.output_extension.is_empty()
            || !self.output_extension.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(Error::Config(format!(
                "Invalid output extension: {:?}",
                self.output_extension
            )));
        }
        if self.max_concurrent_jobs == Some(0) {
            return Err(Error::Config("max_concurrent_jobs must be at least 1".to_string()));
        }
        if self.job_timeout == Some(Duration::ZERO) {
            return Err(Error::Config("job_timeout_secs must be at least 1".to_string()));
        }
        if self.max_upload_bytes == 0 {
            return Err(Error::Config("max_upload_bytes must be nonzero".to_string()));
        }
        Ok(())
    }

    /// `host:port` for the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::resolve(&Args::default(), &TomlConfig::default()).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.default_model, "htdemucs_6s");
        assert_eq!(config.output_extension, "wav");
        assert_eq!(config.engine_interpreter, PathBuf::from("python3"));
        assert_eq!(
            config.engine_script,
            Some(default_data_folder().join("run_engine.py"))
        );
        assert!(config.upload_root.ends_with("uploads"));
        assert!(config.output_root.ends_with("separated"));
        assert!(config.max_concurrent_jobs.is_none());
        assert!(config.job_timeout.is_none());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_args_override_toml() {
        let toml: TomlConfig = toml::from_str(
            r#"
            port = 9000
            data_folder = "/srv/stemsep"

            [engine]
            default_model = "htdemucs"
            output_extension = ".flac"
            "#,
        )
        .unwrap();
        let args = Args {
            port: Some(9100),
            ..Default::default()
        };

        let config = ServiceConfig::resolve(&args, &toml).unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.default_model, "htdemucs");
        assert_eq!(config.output_extension, "flac");
        assert_eq!(config.upload_root, PathBuf::from("/srv/stemsep/uploads"));
        assert_eq!(config.output_root, PathBuf::from("/srv/stemsep/separated"));
        assert_eq!(
            config.engine_script,
            Some(PathBuf::from("/srv/stemsep/run_engine.py"))
        );
    }

    #[test]
    fn test_empty_script_means_direct_executable() {
        let args = Args {
            engine_interpreter: Some(PathBuf::from("/usr/local/bin/separate")),
            engine_script: Some(PathBuf::new()),
            ..Default::default()
        };
        let config = ServiceConfig::resolve(&args, &TomlConfig::default()).unwrap();
        assert!(config.engine_script.is_none());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let cases = [
            Args {
                default_model: Some("../x".to_string()),
                ..Default::default()
            },
            Args {
                max_concurrent_jobs: Some(0),
                ..Default::default()
            },
            Args {
                job_timeout_secs: Some(0),
                ..Default::default()
            },
            Args {
                output_extension: Some("w/v".to_string()),
                ..Default::default()
            },
        ];
        for args in cases {
            assert!(
                ServiceConfig::resolve(&args, &TomlConfig::default()).is_err(),
                "{:?} should be rejected",
                args
            );
        }
    }
}
