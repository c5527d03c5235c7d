//! TOML client configuration and config-file discovery.
//!
//! ```toml
//! [backend]
//! type = "filestore"
//! path = "./db/filestore.json"
//!
//! [control_layer]
//! shims = ["loc"]
//!
//! [session]
//! allow_existing_writes = true
//! meta_pvs = []
//! ```
//!
//! Every section is optional. A missing `[backend]` gives an empty test
//! backend and a missing `shims` list loads every available shim.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::backend::BackendKind;

/// Environment variable holding the full path of a config file.
pub const CONFIG_ENV: &str = "SUPERSCORE_CFG";

const CONFIG_NAMES: [&str; 2] = ["superscore.toml", ".superscore.toml"];

/// Errors raised while locating or reading a config file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("No superscore configuration file found (searched: {})", display_paths(.searched))]
    NotFound { searched: Vec<PathBuf> },

    #[error("Failed to read configuration file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ConfigError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConfigError::NotFound { .. })
    }

    pub fn is_parse_error(&self) -> bool {
        matches!(self, ConfigError::Parse { .. })
    }
}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        crate::Error::Config(err)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(rename = "type", with = "kind_name")]
    pub kind: BackendKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Test,
            path: None,
        }
    }
}

mod kind_name {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    use crate::backend::BackendKind;

    pub fn serialize<S: Serializer>(kind: &BackendKind, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(kind.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BackendKind, D::Error> {
        let name = String::deserialize(d)?;
        name.parse().map_err(D::Error::custom)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlLayerConfig {
    /// Shim names to load. `None` loads all available shims.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shims: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Allow writes to entries that existed before this session.
    #[serde(default = "default_allow_existing_writes")]
    pub allow_existing_writes: bool,
    /// PVs captured into every snapshot alongside the collection's own.
    #[serde(default)]
    pub meta_pvs: Vec<String>,
}

fn default_allow_existing_writes() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            allow_existing_writes: default_allow_existing_writes(),
            meta_pvs: Vec::new(),
        }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub control_layer: ControlLayerConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl ClientConfig {
    /// Parses a config document. Relative backend paths are resolved
    /// against `base_dir`.
    pub fn parse(text: &str, base_dir: &Path) -> Result<Self, toml::de::Error> {
        let mut config: ClientConfig = toml::from_str(text)?;
        if let Some(path) = config.backend.path.as_mut()
            && path.is_relative()
        {
            *path = base_dir.join(&*path);
        }
        Ok(config)
    }

    /// Reads and parses the config file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "Loading configuration file");
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&text, base_dir).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Locates a config file from the process environment.
///
/// Searched in order: `$SUPERSCORE_CFG`, then `superscore.toml` or
/// `.superscore.toml` in `$XDG_CONFIG_HOME` (default `.`) and `~/.config`.
pub fn find_config() -> Result<PathBuf, ConfigError> {
    find_config_with(|key| std::env::var_os(key))
}

pub(crate) fn find_config_with(
    var: impl Fn(&str) -> Option<OsString>,
) -> Result<PathBuf, ConfigError> {
    if let Some(path) = var(CONFIG_ENV).filter(|p| !p.is_empty()) {
        debug!(path = ?path, "Using config file from environment");
        return Ok(PathBuf::from(path));
    }

    let mut dirs = vec![var("XDG_CONFIG_HOME").map_or_else(|| PathBuf::from("."), PathBuf::from)];
    if let Some(home) = var("HOME") {
        dirs.push(PathBuf::from(home).join(".config"));
    }

    let mut searched = Vec::new();
    for dir in dirs {
        for name in CONFIG_NAMES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                debug!(path = %candidate.display(), "Found configuration file");
                return Ok(candidate);
            }
            searched.push(candidate);
        }
    }
    Err(ConfigError::NotFound { searched })
}
