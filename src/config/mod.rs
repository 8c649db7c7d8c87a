// ABOUTME: Configuration for tether: YAML settings, ssh config parsing, and target parsing.
// ABOUTME: Also owns the default paths under ~/.ssh and home-directory expansion.

mod hosts;
mod ssh_config;
mod target;

pub use hosts::{SshHostEntry, list_hosts, parse_hosts};
pub use ssh_config::{HostBlock, HostParams, SshConfigFile};
pub use target::Target;

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SETTINGS_DIR: &str = "tether";
pub const SETTINGS_FILENAME: &str = "config.yml";

/// User settings, read from `~/.config/tether/config.yml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Limit for the TCP connect phase of a dial.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// How long a cancelled streamed command may take to exit after SIGINT.
    #[serde(with = "humantime_serde")]
    pub interrupt_grace: Duration,

    /// ssh client config; defaults to ~/.ssh/config.
    pub ssh_config: Option<String>,

    /// Known hosts file; defaults to ~/.ssh/known_hosts.
    pub known_hosts: Option<String>,

    pub strict_host_key_checking: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            interrupt_grace: Duration::from_secs(2),
            ssh_config: None,
            known_hosts: None,
            strict_host_key_checking: true,
        }
    }
}

impl Settings {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty file deserializes as unit, not as an empty map.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    /// Load settings from `path`, or from the default location when `None`.
    ///
    /// An explicitly given path must exist; a missing default file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match Self::default_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };

        match std::fs::read_to_string(&path) {
            Ok(content) => Self::from_yaml(&content).map_err(|e| match e {
                Error::Yaml(source) => Error::InvalidSettings { path, source },
                other => other,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {
                Ok(Self::default())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::SettingsNotFound(path))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(SETTINGS_DIR).join(SETTINGS_FILENAME))
    }

    pub fn ssh_config_path(&self) -> PathBuf {
        self.ssh_config
            .as_deref()
            .map(expand_path)
            .unwrap_or_else(|| ssh_dir().join("config"))
    }

    pub fn known_hosts_path(&self) -> PathBuf {
        self.known_hosts
            .as_deref()
            .map(expand_path)
            .unwrap_or_else(|| ssh_dir().join("known_hosts"))
    }
}

/// The user's ~/.ssh directory.
pub fn ssh_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".ssh"))
        .unwrap_or_else(|| PathBuf::from(".ssh"))
}

/// Expand a leading `~/` to the home directory. Anything else is returned as is.
pub fn expand_path(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
