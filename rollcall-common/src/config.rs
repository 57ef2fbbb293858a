//! Bootstrap configuration and root folder resolution
//!
//! Settings come from an optional TOML file; every field has a built-in
//! default so a missing or partial file never prevents startup.
//!
//! Root folder priority:
//! 1. Command-line argument (highest priority)
//! 2. `ROLLCALL_ROOT_FOLDER` environment variable
//! 3. `root_folder` in the TOML config file
//! 4. OS-dependent compiled default

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::{Error, Result};

pub const ROOT_FOLDER_ENV: &str = "ROLLCALL_ROOT_FOLDER";
pub const CONFIG_ENV: &str = "ROLLCALL_CONFIG";
pub const DATABASE_FILE: &str = "rollcall.db";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_UPLOAD_LIMIT: usize = 10 * 1024 * 1024;
pub const DEFAULT_SESSION_TTL_HOURS: u64 = 24;
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// TOML bootstrap file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub sessions: SessionConfig,

    #[serde(default)]
    pub verification: VerificationConfig,

    #[serde(default)]
    pub uploads: UploadConfig,

    /// Load the demo dataset into an empty store at startup
    #[serde(default)]
    pub seed_demo_data: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: StorageBackend,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_ttl")]
    pub ttl_hours: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_session_ttl(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMode {
    /// Every capture is accepted as present
    #[default]
    AcceptAll,
    /// Compare the submitted descriptor against the enrolled one
    DescriptorThreshold,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    #[serde(default)]
    pub mode: VerificationMode,
    /// Maximum Euclidean distance accepted as a match
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            mode: VerificationMode::default(),
            threshold: default_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Largest accepted face image, in bytes
    #[serde(default = "default_upload_limit")]
    pub max_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_upload_limit(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_session_ttl() -> u64 {
    DEFAULT_SESSION_TTL_HOURS
}

fn default_threshold() -> f32 {
    DEFAULT_MATCH_THRESHOLD
}

fn default_upload_limit() -> usize {
    DEFAULT_UPLOAD_LIMIT
}

impl TomlConfig {
    /// Reject values that parse but cannot work
    pub fn validate(&self) -> Result<()> {
        if self.sessions.ttl_hours == 0 {
            return Err(Error::Config("sessions.ttl_hours must be positive".to_string()));
        }
        if !(self.verification.threshold.is_finite() && self.verification.threshold >= 0.0) {
            return Err(Error::Config(
                "verification.threshold must be a non-negative number".to_string(),
            ));
        }
        if self.uploads.max_bytes == 0 {
            return Err(Error::Config("uploads.max_bytes must be positive".to_string()));
        }
        Ok(())
    }
}

/// Parse a TOML config file
pub fn parse_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    config.validate()?;
    Ok(config)
}

/// Where the config file was looked for, and what was there
///
/// Locating and parsing log nothing, so a binary can read its log level
/// from the file before installing a subscriber and call
/// [`ConfigSource::log`] afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Missing(PathBuf),
    NoConfigDir,
}

impl ConfigSource {
    /// Explicit path, then `ROLLCALL_CONFIG`, then the platform config dir
    pub fn locate(explicit: Option<&Path>) -> Self {
        let candidate = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
            .or_else(default_config_path);
        match candidate {
            Some(path) if path.exists() => ConfigSource::File(path),
            Some(path) => ConfigSource::Missing(path),
            None => ConfigSource::NoConfigDir,
        }
    }

    /// A missing file degrades to defaults; a file that fails to parse is an error
    pub fn load(&self) -> Result<TomlConfig> {
        match self {
            ConfigSource::File(path) => parse_toml_config(path),
            ConfigSource::Missing(_) | ConfigSource::NoConfigDir => Ok(TomlConfig::default()),
        }
    }

    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => {
                info!("Loaded configuration from {}", path.display())
            }
            ConfigSource::Missing(path) => warn!(
                "Config file {} not found, using built-in defaults",
                path.display()
            ),
            ConfigSource::NoConfigDir => {
                warn!("No config directory available, using built-in defaults")
            }
        }
    }
}

/// Locate, log and load the config file in one step
pub fn load_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let source = ConfigSource::locate(explicit);
    source.log();
    source.load()
}

/// `<config dir>/rollcall/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("rollcall").join("config.toml"))
}

/// Built-in fallbacks for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
    pub port: u16,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        let root_folder = dirs::data_local_dir()
            .map(|d| d.join("rollcall"))
            .unwrap_or_else(|| PathBuf::from("./rollcall_data"));
        Self {
            root_folder,
            log_level: default_log_level(),
            port: DEFAULT_PORT,
        }
    }
}

/// Resolves the data folder from the four configuration tiers
#[derive(Debug, Clone, Default)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_value: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    pub fn with_config(mut self, config: &TomlConfig) -> Self {
        self.toml_value = config.root_folder.clone();
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_value {
            return path.clone();
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the data folder and locates the database inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    /// Create the folder (and parents) if needed; safe to call repeatedly
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            info!("Creating root folder {}", self.root_folder.display());
        }
        std::fs::create_dir_all(&self.root_folder)?;
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE)
    }

    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }
}
