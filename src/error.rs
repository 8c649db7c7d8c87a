// ABOUTME: Application-wide error types for tether.
// ABOUTME: Uses thiserror for ergonomic error handling.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("settings file not found: {}", .0.display())]
    SettingsNotFound(PathBuf),

    #[error("invalid settings in {}: {source}", path.display())]
    InvalidSettings {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error(transparent)]
    Ssh(#[from] crate::ssh::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::SettingsNotFound(_) => "SETTINGS_NOT_FOUND",
            Error::InvalidSettings { .. } | Error::Yaml(_) => "SETTINGS_INVALID",
            Error::Ssh(e) => e.code(),
            Error::Io(_) => "IO",
        }
    }

    pub fn suggestion(&self) -> String {
        match self {
            Error::SettingsNotFound(path) => {
                format!("Create {} or drop the --config flag", path.display())
            }
            Error::InvalidSettings { path, .. } => format!(
                "Fix {}; known keys are connect_timeout, interrupt_grace, ssh_config, known_hosts, strict_host_key_checking",
                path.display()
            ),
            Error::Yaml(_) => "Check the YAML syntax of the settings file".to_string(),
            Error::Ssh(e) => e.suggestion(),
            Error::Io(_) => "Check that the local file exists and is readable".to_string(),
        }
    }
}
