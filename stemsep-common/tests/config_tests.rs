//! Configuration file loading tests
//!
//! Tests that point the per-user config directory elsewhere via
//! `XDG_CONFIG_HOME` are marked `#[serial]` so they never race each other.

use serial_test::serial;
use std::path::Path;
use stemsep_common::config::{default_config_path, load_or_default, load_toml_config};
use stemsep_common::Error;

fn write_config(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_explicit_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        "stemsep-api.toml",
        r#"
        port = 8100
        upload_root = "/tmp/stemsep/in"

        [engine]
        interpreter = "demucs"
        script = ""
        "#,
    );

    let config = load_or_default(Some(&path), "stemsep-api").unwrap();

    assert_eq!(config.port, Some(8100));
    assert_eq!(config.upload_root.as_deref(), Some(Path::new("/tmp/stemsep/in")));
    assert_eq!(config.engine.interpreter.as_deref(), Some(Path::new("demucs")));
    assert_eq!(config.engine.script.as_deref(), Some(Path::new("")));
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_malformed_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "broken.toml", "port = \"not a number\"\n");

    let err = load_toml_config(&path).unwrap_err();

    match err {
        Error::Config(msg) => assert!(msg.contains("broken.toml"), "message: {}", msg),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_unknown_keys_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        "extra.toml",
        "port = 9001\nfrontend_url = \"http://localhost:3000\"\n",
    );

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config.port, Some(9001));
}

#[cfg(target_os = "linux")]
#[test]
#[serial]
fn test_default_location_is_used_when_present() {
    let dir = tempfile::tempdir().unwrap();
    let previous = std::env::var_os("XDG_CONFIG_HOME");
    std::env::set_var("XDG_CONFIG_HOME", dir.path());

    let expected = dir.path().join("stemsep").join("stemsep-api.toml");
    assert_eq!(default_config_path("stemsep-api"), Some(expected.clone()));

    std::fs::create_dir_all(expected.parent().unwrap()).unwrap();
    std::fs::write(&expected, "[logging]\nlevel = \"debug\"\n").unwrap();
    let config = load_or_default(None, "stemsep-api");

    match previous {
        Some(value) => std::env::set_var("XDG_CONFIG_HOME", value),
        None => std::env::remove_var("XDG_CONFIG_HOME"),
    }
    assert_eq!(config.unwrap().logging.level, "debug");
}

#[cfg(target_os = "linux")]
#[test]
#[serial]
fn test_missing_default_file_degrades_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let previous = std::env::var_os("XDG_CONFIG_HOME");
    std::env::set_var("XDG_CONFIG_HOME", dir.path());

    let config = load_or_default(None, "stemsep-api");

    match previous {
        Some(value) => std::env::set_var("XDG_CONFIG_HOME", value),
        None => std::env::remove_var("XDG_CONFIG_HOME"),
    }
    let config = config.unwrap();
    assert!(config.port.is_none());
    assert_eq!(config.logging.level, "info");
}
