//! Configuration loading for physnet.
//!
//! The file lives at `~/.physnet/config.toml` unless a path is given explicitly. Every key is
//! optional:
//!
//! ```toml
//! [route_cache]
//! throw_route_priority = 100000
//!
//! [sock_diag]
//! exclude_loopback = true
//!
//! [log]
//! filter = "physnet_core=debug"
//! ```
//!
//! The raw structs below mirror the file and never leave this crate; [`Config`] carries the
//! resolved, validated values.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use physnet_types::{
    DEFAULT_THROW_ROUTE_PRIORITY, LogFilter, LoopbackSockets, ManagerSettings, SettingsError,
};

const fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    route_cache: Option<RouteCacheConfig>,
    sock_diag: Option<SockDiagConfig>,
    log: Option<LogConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct RouteCacheConfig {
    throw_route_priority: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SockDiagConfig {
    #[serde(default = "default_true")]
    exclude_loopback: bool,
}

#[derive(Debug, Default, Deserialize)]
struct LogConfig {
    filter: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config at {}: {source}", path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: SettingsError,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. }
            | ConfigError::Parse { path, .. }
            | ConfigError::Invalid { path, .. } => path,
        }
    }
}

/// Resolved configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    settings: ManagerSettings,
    log_filter: Option<LogFilter>,
    source: Option<PathBuf>,
}

impl Config {
    /// Load from `explicit` when given, otherwise from the default location.
    ///
    /// An explicit path must exist. A missing default file yields built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        let Some(path) = config_path() else {
            tracing::debug!("No home directory; using built-in defaults");
            return Ok(Self::default());
        };
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file; using built-in defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| {
            tracing::warn!("Failed to read config at {:?}: {}", path, source);
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let raw: RawConfig = toml::from_str(&content).map_err(|source| {
            tracing::warn!("Failed to parse config at {:?}: {}", path, source);
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let mut config = resolve(raw).map_err(|source| ConfigError::Invalid {
            path: path.to_path_buf(),
            source,
        })?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    #[must_use]
    pub fn settings(&self) -> ManagerSettings {
        self.settings
    }

    /// The filter directive from `[log]`, if one was configured.
    #[must_use]
    pub fn log_filter(&self) -> Option<&LogFilter> {
        self.log_filter.as_ref()
    }

    /// The file this configuration came from; `None` for built-in defaults.
    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

fn resolve(raw: RawConfig) -> Result<Config, SettingsError> {
    let throw_route_priority = raw
        .route_cache
        .and_then(|section| section.throw_route_priority)
        .unwrap_or(DEFAULT_THROW_ROUTE_PRIORITY);
    let loopback = match raw.sock_diag {
        Some(SockDiagConfig {
            exclude_loopback: false,
        }) => LoopbackSockets::Destroy,
        _ => LoopbackSockets::Spare,
    };
    let settings = ManagerSettings::new(throw_route_priority, loopback)?;
    let log_filter = raw
        .log
        .and_then(|section| section.filter)
        .map(LogFilter::new)
        .transpose()?;
    Ok(Config {
        settings,
        log_filter,
        source: None,
    })
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".physnet").join("config.toml"))
}
