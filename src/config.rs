//! Configuration management for the WildWings service.
//!
//! Configuration is read once at boot from the `[wildwings]` table of a TOML
//! file. The file is located as follows:
//! - `WILDWINGS_CONFIG` - Optional. Explicit path to the config file.
//! - `/app/config.toml` - Used when present (container deployments).
//! - `./config.toml` - Fallback for local runs.
//!
//! Required keys: `logfile_path`, `cors_origin`, `host`, `port`, `debug`.
//! Optional keys: `app_dir`, `mission_dir`, `script_path`, `stop_grace_secs`,
//! `stop_join_secs`, `shutdown_join_secs`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default container location of the config file.
pub const DEFAULT_CONFIG_PATH: &str = "/app/config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Failed to parse config file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Paths and timings used by the mission supervisor.
#[derive(Debug, Clone)]
pub struct MissionConfig {
    /// Working directory of the launch script
    pub app_dir: PathBuf,

    /// Directory the mission writes into (created on every start)
    pub mission_dir: PathBuf,

    /// The launch script executed with `bash`
    pub script_path: PathBuf,

    /// How long a terminated mission gets before it is killed
    pub stop_grace: Duration,

    /// How long `stop` waits for the worker after signalling the process
    pub stop_join: Duration,

    /// How long shutdown waits for the worker
    pub shutdown_join: Duration,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            app_dir: PathBuf::from("/app"),
            mission_dir: PathBuf::from("/app/mission"),
            script_path: PathBuf::from("/app/launch.sh"),
            stop_grace: Duration::from_secs(5),
            stop_join: Duration::from_secs(10),
            shutdown_join: Duration::from_secs(5),
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// The single origin allowed by CORS (`*` mirrors the caller)
    pub cors_origin: String,

    /// Verbose logging
    pub debug: bool,

    /// Append-only service log, also served by `/logs`
    pub logfile_path: PathBuf,

    pub mission: MissionConfig,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    wildwings: WildwingsSection,
}

#[derive(Debug, Deserialize)]
struct WildwingsSection {
    logfile_path: PathBuf,
    cors_origin: String,
    host: String,
    port: u16,
    debug: bool,
    #[serde(default)]
    app_dir: Option<PathBuf>,
    #[serde(default)]
    mission_dir: Option<PathBuf>,
    #[serde(default)]
    script_path: Option<PathBuf>,
    #[serde(default)]
    stop_grace_secs: Option<f64>,
    #[serde(default)]
    stop_join_secs: Option<f64>,
    #[serde(default)]
    shutdown_join_secs: Option<f64>,
}

impl Config {
    /// Locate and load the config file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Read` if the file cannot be read and
    /// `ConfigError::Parse` if it is not valid TOML or misses a required key.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_path(&resolve_config_path())
    }

    /// Load configuration from an explicit path.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        Self::from_toml(&contents).map_err(|e| match e {
            ConfigError::Parse(_, err) => ConfigError::Parse(path.to_path_buf(), err),
            other => other,
        })
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::from("<inline>"), e))?;
        let section = file.wildwings;

        if section.cors_origin.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "cors_origin".to_string(),
                "must not be empty".to_string(),
            ));
        }

        let defaults = MissionConfig::default();
        let mission = MissionConfig {
            app_dir: section.app_dir.unwrap_or(defaults.app_dir),
            mission_dir: section.mission_dir.unwrap_or(defaults.mission_dir),
            script_path: section.script_path.unwrap_or(defaults.script_path),
            stop_grace: parse_secs("stop_grace_secs", section.stop_grace_secs)?
                .unwrap_or(defaults.stop_grace),
            stop_join: parse_secs("stop_join_secs", section.stop_join_secs)?
                .unwrap_or(defaults.stop_join),
            shutdown_join: parse_secs("shutdown_join_secs", section.shutdown_join_secs)?
                .unwrap_or(defaults.shutdown_join),
        };

        Ok(Self {
            host: section.host,
            port: section.port,
            cors_origin: section.cors_origin,
            debug: section.debug,
            logfile_path: section.logfile_path,
            mission,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(logfile_path: PathBuf, mission: MissionConfig) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origin: "*".to_string(),
            debug: false,
            logfile_path,
            mission,
        }
    }

    /// Socket address string the server binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn resolve_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("WILDWINGS_CONFIG") {
        return PathBuf::from(path);
    }
    let container = PathBuf::from(DEFAULT_CONFIG_PATH);
    if container.exists() {
        container
    } else {
        PathBuf::from("config.toml")
    }
}

fn parse_secs(key: &str, value: Option<f64>) -> Result<Option<Duration>, ConfigError> {
    match value {
        None => Ok(None),
        Some(secs) if secs.is_finite() && secs >= 0.0 => Ok(Some(Duration::from_secs_f64(secs))),
        Some(secs) => Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("expected a non-negative number of seconds, got: {}", secs),
        )),
    }
}
