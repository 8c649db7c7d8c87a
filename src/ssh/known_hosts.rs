// ABOUTME: Server identity verification against a known_hosts file.
// ABOUTME: Builds an actionable diagnostic instead of a bare rejection on mismatch.

use super::error::{Error, HostKeyMismatch, Result};
use russh::keys::known_hosts::known_host_keys_path;
use russh::keys::ssh_key::PublicKey;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// Whether server keys are checked at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostKeyChecking {
    /// Only keys already in known_hosts are accepted.
    #[default]
    Strict,
    /// Any key is accepted. For throwaway hosts whose keys change every run.
    Disabled,
}

/// Checks presented server keys against a known_hosts file.
#[derive(Debug, Clone)]
pub struct HostKeyVerifier {
    mode: HostKeyChecking,
    path: PathBuf,
}

impl HostKeyVerifier {
    pub fn new(mode: HostKeyChecking, path: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            path: path.into(),
        }
    }

    pub fn mode(&self) -> HostKeyChecking {
        self.mode
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create an empty, owner-only known_hosts file if there is none yet.
    ///
    /// Never writes to an existing file.
    pub fn ensure_store(&self) -> Result<()> {
        if self.mode == HostKeyChecking::Disabled || self.path.exists() {
            return Ok(());
        }
        let io_err = |source: std::io::Error| Error::KnownHosts {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
                set_mode(parent, 0o700).map_err(io_err)?;
            }
        }

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        match options.open(&self.path) {
            Ok(_) => {
                tracing::debug!("created empty known hosts file {}", self.path.display());
                Ok(())
            }
            // Lost a race with another dial; the file is there now.
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(io_err(e)),
        }
    }

    /// Accept `key` for `hostname:port`, or explain why not.
    pub fn verify(&self, hostname: &str, port: u16, key: &PublicKey) -> Result<()> {
        if self.mode == HostKeyChecking::Disabled {
            tracing::debug!("host key checking disabled; accepting key for {hostname}");
            return Ok(());
        }

        let host = bare_host(hostname);
        let known = known_host_keys_path(host, port, &self.path).map_err(|e| {
            Error::KnownHostsRead {
                path: self.path.clone(),
                reason: e.to_string(),
            }
        })?;

        if known
            .iter()
            .any(|(_, known_key)| known_key.key_data() == key.key_data())
        {
            tracing::debug!("host key for {host}:{port} matches known_hosts");
            return Ok(());
        }

        let received_key_type = key.algorithm().as_str().to_string();
        if known.is_empty() {
            return Err(Error::HostKeyUnknown {
                hostname: host.to_string(),
                port,
                received_key_type,
                known_hosts_path: self.path.clone(),
            });
        }

        let mut wanted_key_types: Vec<String> = Vec::new();
        for (line, known_key) in &known {
            tracing::debug!("known_hosts line {line} has a different key for {host}");
            let key_type = known_key.algorithm().as_str().to_string();
            if !wanted_key_types.contains(&key_type) {
                wanted_key_types.push(key_type);
            }
        }

        tracing::warn!("host key for {host}:{port} does not match {}", self.path.display());
        Err(Error::HostKeyMismatch(Box::new(HostKeyMismatch {
            hostname: host.to_string(),
            port,
            received_key_type,
            known_hosts_path: self.path.clone(),
            wanted_key_types,
        })))
    }
}

/// Strip brackets and a trailing `:port` from a host for display and lookup.
fn bare_host(hostname: &str) -> &str {
    if let Some(inner) = hostname.strip_prefix('[') {
        return inner.split_once(']').map(|(h, _)| h).unwrap_or(inner);
    }
    match hostname.rsplit_once(':') {
        // A second colon means an IPv6 literal, not a port.
        Some((host, port))
            if !host.contains(':') && !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) =>
        {
            host
        }
        _ => hostname,
    }
}

fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
        Ok(())
    }
}
