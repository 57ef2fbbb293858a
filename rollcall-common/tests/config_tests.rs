//! Tests for configuration loading and graceful degradation
//!
//! Tests that touch ROLLCALL_ROOT_FOLDER or ROLLCALL_CONFIG are marked
//! #[serial] so they never run in parallel with each other.

use rollcall_common::config::{
    load_toml_config, parse_toml_config, CompiledDefaults, ConfigSource, RootFolderInitializer,
    RootFolderResolver, StorageBackend, TomlConfig, VerificationMode, CONFIG_ENV,
    DEFAULT_PORT, ROOT_FOLDER_ENV,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_compiled_defaults_for_current_platform() {
    let defaults = CompiledDefaults::for_current_platform();

    assert!(!defaults.root_folder.as_os_str().is_empty());
    assert!(
        defaults.root_folder.ends_with("rollcall")
            || defaults.root_folder.ends_with("rollcall_data")
    );
    assert_eq!(defaults.log_level, "info");
    assert_eq!(defaults.port, DEFAULT_PORT);
}

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    env::remove_var(ROOT_FOLDER_ENV);

    let root_folder = RootFolderResolver::new().resolve();

    let defaults = CompiledDefaults::for_current_platform();
    assert_eq!(root_folder, defaults.root_folder);
}

#[test]
#[serial]
fn test_resolver_priority_order() {
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/rollcall-from-toml")),
        ..Default::default()
    };

    env::remove_var(ROOT_FOLDER_ENV);
    let from_toml = RootFolderResolver::new().with_config(&config).resolve();
    assert_eq!(from_toml, PathBuf::from("/tmp/rollcall-from-toml"));

    env::set_var(ROOT_FOLDER_ENV, "/tmp/rollcall-from-env");
    let from_env = RootFolderResolver::new().with_config(&config).resolve();
    assert_eq!(from_env, PathBuf::from("/tmp/rollcall-from-env"));

    let from_cli = RootFolderResolver::new()
        .with_config(&config)
        .with_cli_arg(Some(PathBuf::from("/tmp/rollcall-from-cli")))
        .resolve();
    assert_eq!(from_cli, PathBuf::from("/tmp/rollcall-from-cli"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
fn test_initializer_creates_nested_directory() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("level1").join("level2");

    let initializer = RootFolderInitializer::new(root.clone());
    assert!(initializer.ensure_directory_exists().is_ok());
    // Idempotent
    assert!(initializer.ensure_directory_exists().is_ok());

    assert!(root.is_dir());
    assert_eq!(initializer.database_path(), root.join("rollcall.db"));
    assert!(!initializer.database_exists());
}

#[test]
fn test_partial_toml_fills_defaults() {
    let toml_str = r#"
        root_folder = "/srv/rollcall"

        [server]
        port = 8080

        [verification]
        mode = "descriptor_threshold"
    "#;

    let config: TomlConfig = toml::from_str(toml_str).unwrap();
    assert_eq!(config.root_folder, Some(PathBuf::from("/srv/rollcall")));
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.database.backend, StorageBackend::Sqlite);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.sessions.ttl_hours, 24);
    assert_eq!(config.verification.mode, VerificationMode::DescriptorThreshold);
    assert!((config.verification.threshold - 0.6).abs() < f32::EPSILON);
    assert_eq!(config.uploads.max_bytes, 10 * 1024 * 1024);
    assert!(!config.seed_demo_data);
}

#[test]
fn test_invalid_values_are_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[sessions]\nttl_hours = 0\n").unwrap();

    assert!(parse_toml_config(&path).is_err());
}

#[test]
fn test_malformed_toml_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[server\nport = ").unwrap();

    assert!(load_toml_config(Some(&path)).is_err());
}

#[test]
#[serial]
fn test_missing_config_file_degrades_to_defaults() {
    env::remove_var(CONFIG_ENV);
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("does-not-exist.toml");

    let config = load_toml_config(Some(&missing)).unwrap();
    assert_eq!(config.server.port, DEFAULT_PORT);
    assert_eq!(config.database.backend, StorageBackend::Sqlite);
}

#[test]
#[serial]
fn test_config_env_var_is_used() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rollcall.toml");
    std::fs::write(&path, "[database]\nbackend = \"memory\"\n").unwrap();

    env::set_var(CONFIG_ENV, &path);
    let config = load_toml_config(None).unwrap();
    env::remove_var(CONFIG_ENV);

    assert_eq!(config.database.backend, StorageBackend::Memory);
}

#[test]
fn test_config_source_locates_without_loading() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.toml");
    let source = ConfigSource::locate(Some(&missing));
    assert_eq!(source, ConfigSource::Missing(missing));
    assert_eq!(source.load().unwrap().server.port, DEFAULT_PORT);

    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[server]\nport = 5055\n").unwrap();
    let source = ConfigSource::locate(Some(&path));
    assert_eq!(source, ConfigSource::File(path));
    assert_eq!(source.load().unwrap().server.port, 5055);
}
