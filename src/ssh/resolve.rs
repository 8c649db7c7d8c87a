// ABOUTME: Turns a target string into concrete connection settings.
// ABOUTME: Explicit target fields win over ssh config values, which win over defaults.

use super::client::DialOptions;
use super::error::Result;
use crate::config::{SshConfigFile, Target, expand_path};
use crate::diagnostics::{Diagnostics, Warning};
use std::path::PathBuf;

/// Everything needed to dial one host. Built fresh for every dial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSettings {
    /// Host part of the target as typed (an alias or a hostname).
    pub alias: String,
    pub hostname: String,
    pub port: u16,
    pub user: String,
    pub identity_file: Option<PathBuf>,
}

impl ResolvedSettings {
    /// `host:port`, with brackets around IPv6 literals.
    pub fn address(&self) -> String {
        if self.hostname.contains(':') {
            format!("[{}]:{}", self.hostname, self.port)
        } else {
            format!("{}:{}", self.hostname, self.port)
        }
    }
}

/// Resolve `spec` against the ssh config named in `options`.
///
/// The config is re-read on every call. Unreadable config falls back to
/// defaults with a one-time warning.
pub fn resolve(
    spec: &str,
    options: &DialOptions,
    diagnostics: &Diagnostics,
) -> Result<ResolvedSettings> {
    let target = Target::parse(spec)?;

    let config = match SshConfigFile::load(&options.ssh_config) {
        Ok(config) => config,
        Err(e) => {
            diagnostics.warn_once(
                format!("ssh-config-unreadable:{}", options.ssh_config.display()),
                Warning::config_unreadable(format!("{e}; using defaults")),
            );
            None
        }
    };

    let params = match &config {
        Some(config) => {
            if let Some(line) = config.match_line() {
                if !config.has_host(&target.host) {
                    diagnostics.warn_once(
                        format!("ssh-config-match:{}", options.ssh_config.display()),
                        Warning::match_truncated(line, &target.host),
                    );
                }
            }
            config.lookup(&target.host)
        }
        None => Default::default(),
    };

    let user = target
        .user
        .or(params.user)
        .or_else(|| options.user_override.clone())
        .unwrap_or_else(current_user);

    let settings = ResolvedSettings {
        hostname: params.hostname.unwrap_or_else(|| target.host.clone()),
        port: target.port.or(params.port).unwrap_or(22),
        user,
        identity_file: params.identity_file.as_deref().map(expand_path),
        alias: target.host,
    };
    tracing::debug!(
        "resolved {} to {}@{}",
        spec,
        settings.user,
        settings.address()
    );
    Ok(settings)
}

/// Login name of the local user.
fn current_user() -> String {
    ["USER", "USERNAME", "LOGNAME"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|u| !u.is_empty())
        .unwrap_or_else(|| "root".to_string())
}
