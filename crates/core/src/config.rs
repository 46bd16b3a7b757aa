//! Configuration file handling
//!
//! `settle.toml` is read once at startup. Missing sections fall back to
//! defaults; the downstream address and credential have no defaults and are
//! only required when an engine is actually built (`engine_config`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default config file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "settle.toml";

/// Environment variable overriding `downstream.base_url`
pub const ENV_DOWNSTREAM_URL: &str = "SETTLE_DOWNSTREAM_URL";

/// Environment variable overriding `downstream.credential`
pub const ENV_CREDENTIAL: &str = "SETTLE_CREDENTIAL";

/// Configuration problems; all of them are fatal
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("downstream address is not configured (set downstream.base_url or SETTLE_DOWNSTREAM_URL)")]
    MissingDownstreamAddress,

    #[error("downstream credential is not configured (set downstream.credential or SETTLE_CREDENTIAL)")]
    MissingCredential,

    #[error("{key} = {value} is out of range ({range})")]
    OutOfRange {
        key: &'static str,
        value: u64,
        range: &'static str,
    },

    #[error(
        "reconcile.stale_after_secs = {stale_after_secs} must exceed engine.quiet_period_ms + downstream.timeout_ms ({window_ms} ms)"
    )]
    StaleWindowTooShort { stale_after_secs: u64, window_ms: u64 },

    #[error("invalid listen address '{0}'")]
    InvalidListen(String),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Whole configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SettleConfig {
    pub engine: EngineSection,
    pub downstream: DownstreamConfig,
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub reconcile: ReconcileConfig,
}

/// `[engine]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineSection {
    /// Quiet period D in milliseconds
    pub quiet_period_ms: u64,
    /// Hold trigger responses until the evaluation finishes
    pub wait_for_evaluation: bool,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            quiet_period_ms: 5_000,
            wait_for_evaluation: false,
        }
    }
}

/// `[downstream]` section: where winning batches are dispatched
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DownstreamConfig {
    /// Base address of the processor, e.g. `http://127.0.0.1:8000`
    pub base_url: Option<String>,
    /// Path appended to `base_url`
    pub path: String,
    /// Shared secret sent as a bearer token
    pub credential: Option<String>,
    /// Upper bound for one dispatch call
    pub timeout_ms: u64,
}

impl Default for DownstreamConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            path: "/api/process".to_string(),
            credential: None,
            timeout_ms: 30_000,
        }
    }
}

// Keep the credential out of logs
impl std::fmt::Debug for DownstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownstreamConfig")
            .field("base_url", &self.base_url)
            .field("path", &self.path)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl DownstreamConfig {
    /// Full dispatch URL (`base_url` + `path`)
    pub fn endpoint(&self) -> Result<String, ConfigError> {
        let base = non_blank(self.base_url.as_deref()).ok_or(ConfigError::MissingDownstreamAddress)?;
        let base = base.trim_end_matches('/');
        if self.path.is_empty() {
            Ok(base.to_string())
        } else if self.path.starts_with('/') {
            Ok(format!("{}{}", base, self.path))
        } else {
            Ok(format!("{}/{}", base, self.path))
        }
    }

    /// Shared secret for the bearer header
    pub fn credential(&self) -> Result<&str, ConfigError> {
        non_blank(self.credential.as_deref()).ok_or(ConfigError::MissingCredential)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// `[server]` section
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
    /// When set, `/trigger` and `/enqueue` require this bearer token
    pub credential: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:7420".to_string(),
            credential: None,
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("listen", &self.listen)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ServerConfig {
    /// Intake secret, if intake auth is enabled
    pub fn credential(&self) -> Option<&str> {
        non_blank(self.credential.as_deref())
    }
}

/// `[store]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the sled database
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".settle/state"),
        }
    }
}

/// `[reconcile]` section: stuck-lock reporting
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReconcileConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Locked records idle longer than this are reported
    pub stale_after_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
            stale_after_secs: 600,
        }
    }
}

/// Validated settings handed to the coordination engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Debounce window D
    pub quiet_period: Duration,
    pub downstream: DownstreamConfig,
}

impl EngineConfig {
    /// Build an engine config, failing fast on missing downstream settings
    pub fn new(quiet_period: Duration, downstream: DownstreamConfig) -> Result<Self, ConfigError> {
        downstream.endpoint()?;
        downstream.credential()?;
        Ok(Self {
            quiet_period,
            downstream,
        })
    }
}

impl SettleConfig {
    /// Load configuration
    ///
    /// An explicit `path` must exist. Without one, `settle.toml` in the working
    /// directory is used when present, defaults otherwise. Environment
    /// overrides are applied last, then ranges are validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::read_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::read_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file without overrides or validation
    pub fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Write the config back out as TOML
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply environment-style overrides; blank values are ignored
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_DOWNSTREAM_URL).filter(|v| !v.trim().is_empty()) {
            self.downstream.base_url = Some(url);
        }
        if let Some(secret) = lookup(ENV_CREDENTIAL).filter(|v| !v.trim().is_empty()) {
            self.downstream.credential = Some(secret);
        }
    }

    /// Check value ranges
    ///
    /// Downstream presence is not checked here so that operator commands
    /// (`status`, `release`) work without dispatch settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("engine.quiet_period_ms", self.engine.quiet_period_ms, 1, 3_600_000, "1-3600000")?;
        check_range("downstream.timeout_ms", self.downstream.timeout_ms, 100, 300_000, "100-300000")?;
        if self.reconcile.enabled {
            check_range("reconcile.interval_secs", self.reconcile.interval_secs, 1, 86_400, "1-86400")?;
            check_range(
                "reconcile.stale_after_secs",
                self.reconcile.stale_after_secs,
                1,
                604_800,
                "1-604800",
            )?;
            // A dispatch may legitimately hold the lock for up to D + timeout
            let window_ms = self.engine.quiet_period_ms.saturating_add(self.downstream.timeout_ms);
            if self.reconcile.stale_after_secs.saturating_mul(1_000) <= window_ms {
                return Err(ConfigError::StaleWindowTooShort {
                    stale_after_secs: self.reconcile.stale_after_secs,
                    window_ms,
                });
            }
        }
        self.listen_addr()?;
        Ok(())
    }

    /// Parsed `server.listen`
    pub fn listen_addr(&self) -> Result<std::net::SocketAddr, ConfigError> {
        self.server
            .listen
            .parse()
            .map_err(|_| ConfigError::InvalidListen(self.server.listen.clone()))
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.engine.quiet_period_ms)
    }

    /// Settings for the coordination engine; requires downstream address and credential
    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        EngineConfig::new(self.quiet_period(), self.downstream.clone())
    }
}

/// Annotated example configuration
pub fn example_config() -> &'static str {
    r#"# settle.toml

[engine]
# Quiet period D: a batch is dispatched once no trigger arrived for this long
quiet_period_ms = 5000
# Respond to /trigger only after the scheduled evaluation has finished
wait_for_evaluation = false

[downstream]
base_url = "http://127.0.0.1:8000"
path = "/api/process"
# Prefer SETTLE_CREDENTIAL in the environment
credential = "change-me"
timeout_ms = 30000

[server]
listen = "127.0.0.1:7420"
# Uncomment to require a bearer token on /trigger and /enqueue
# credential = "intake-secret"

[store]
path = ".settle/state"

[reconcile]
enabled = true
interval_secs = 60
stale_after_secs = 600
"#
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn check_range(key: &'static str, value: u64, min: u64, max: u64, range: &'static str) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange { key, value, range });
    }
    Ok(())
}
