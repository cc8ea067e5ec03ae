//! Configuration for the nchat client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`<confdir>/app.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the config file inside the application directory.
pub const CONFIG_FILE_NAME: &str = "app.toml";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// No `--confdir` was given and the home directory is unknown.
    #[error("could not determine application directory (no --confdir and no HOME)")]
    NoConfDir,
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    cache: CacheFileConfig,
    dummy: DummyFileConfig,
    ui: UiFileConfig,
}

/// `[cache]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct CacheFileConfig {
    enabled: Option<bool>,
    history_limit: Option<usize>,
    flush_interval_ms: Option<u64>,
}

/// `[dummy]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct DummyFileConfig {
    latency_ms: Option<u64>,
}

/// `[ui]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct UiFileConfig {
    timestamp_format: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Application directory holding profiles, cache, config and log.
    pub confdir: PathBuf,
    /// Whether notifications are persisted by the message cache.
    pub cache_enabled: bool,
    /// Number of messages requested when a chat's history is missing.
    pub history_limit: usize,
    /// How often changed cache profiles are written to disk.
    pub cache_flush_interval: Duration,
    /// Simulated per-request latency of the dummy backend.
    pub dummy_latency: Duration,
    /// Timestamp display format string (chrono).
    pub timestamp_format: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            confdir: PathBuf::from(".nchat"),
            cache_enabled: true,
            history_limit: 50,
            cache_flush_interval: Duration::from_secs(1),
            dummy_latency: Duration::ZERO,
            timestamp_format: "%H:%M".to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// The application directory comes from `--confdir`, falling back to
    /// `~/.nchat`. The config file is `--config` if given, otherwise
    /// `<confdir>/app.toml` (silently ignored if missing).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the application directory cannot be
    /// determined, or the config file cannot be read or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let confdir = resolve_confdir(cli)?;
        let file = load_config_file(cli.config.as_deref(), &confdir.join(CONFIG_FILE_NAME))?;
        Ok(Self::resolve(cli, confdir, &file))
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &CliArgs, confdir: PathBuf, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            confdir,
            cache_enabled: file.cache.enabled.unwrap_or(defaults.cache_enabled),
            history_limit: file
                .cache
                .history_limit
                .unwrap_or(defaults.history_limit),
            cache_flush_interval: file
                .cache
                .flush_interval_ms
                .filter(|ms| *ms > 0)
                .map_or(defaults.cache_flush_interval, Duration::from_millis),
            dummy_latency: file
                .dummy
                .latency_ms
                .map_or(defaults.dummy_latency, Duration::from_millis),
            timestamp_format: cli
                .timestamp_format
                .clone()
                .or_else(|| file.ui.timestamp_format.clone())
                .unwrap_or(defaults.timestamp_format),
        }
    }

    /// Build a configuration for the given application directory with all
    /// other settings at their defaults.
    #[must_use]
    pub fn with_confdir(confdir: impl Into<PathBuf>) -> Self {
        Self {
            confdir: confdir.into(),
            ..Self::default()
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Terminal chat client with pluggable messaging backends")]
pub struct CliArgs {
    /// Application directory (default: `~/.nchat`).
    #[arg(short = 'd', long, env = "NCHAT_CONFDIR")]
    pub confdir: Option<PathBuf>,

    /// Set up a new profile, then start.
    #[arg(short, long)]
    pub setup: bool,

    /// Backend to use for `--setup` (prompted for if omitted).
    #[arg(long, requires = "setup")]
    pub protocol: Option<String>,

    /// Remove the given profile and exit.
    #[arg(short, long, value_name = "PROFILE_ID")]
    pub remove: Option<String>,

    /// Export the message cache to a directory and exit.
    #[arg(short = 'x', long, value_name = "DIR")]
    pub export: Option<PathBuf>,

    /// Path to config file (default: `<confdir>/app.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Timestamp display format (chrono format string).
    #[arg(long)]
    pub timestamp_format: Option<String>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "NCHAT_LOG")]
    pub log_level: String,

    /// Path to log file (default: `<confdir>/log.txt`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Application directory from `--confdir`, falling back to `~/.nchat`.
///
/// # Errors
///
/// Returns [`ConfigError::NoConfDir`] if no home directory is known.
pub fn resolve_confdir(cli: &CliArgs) -> Result<PathBuf, ConfigError> {
    if let Some(dir) = &cli.confdir {
        return Ok(dir.clone());
    }
    dirs::home_dir()
        .map(|home| home.join(".nchat"))
        .ok_or(ConfigError::NoConfDir)
}

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// Otherwise `default_path` is tried and a missing file is treated as
/// empty config.
fn load_config_file(
    explicit_path: Option<&Path>,
    default_path: &Path,
) -> Result<ConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    match std::fs::read_to_string(default_path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile {
            path: default_path.to_path_buf(),
            source: e,
        }),
    }
}
