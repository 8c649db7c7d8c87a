// ABOUTME: SSH-specific error taxonomy.
// ABOUTME: Every variant carries a stable code and a human-actionable suggestion.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid target {spec:?}: {reason}")]
    InvalidTarget { spec: String, reason: String },

    #[error("failed to read {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no usable SSH credentials for {user}@{host}")]
    NoAuthMethods {
        user: String,
        host: String,
        encrypted_keys: Vec<PathBuf>,
    },

    #[error("connection refused by {address}")]
    ConnectionRefused {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("host {address} is unreachable")]
    HostUnreachable {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection to {address} timed out after {timeout:?}")]
    DialTimeout { address: String, timeout: Duration },

    #[error("failed to connect to {address}: {source}")]
    Dial {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    HostKeyMismatch(Box<HostKeyMismatch>),

    #[error("host key for {hostname} ({received_key_type}) is not in {}", known_hosts_path.display())]
    HostKeyUnknown {
        hostname: String,
        port: u16,
        received_key_type: String,
        known_hosts_path: PathBuf,
    },

    #[error("failed to prepare known hosts file {}: {source}", path.display())]
    KnownHosts {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read known hosts file {}: {reason}", path.display())]
    KnownHostsRead { path: PathBuf, reason: String },

    #[error("authentication failed for {user}@{address}: server rejected all credentials")]
    AuthRejected {
        user: String,
        address: String,
        encrypted_keys: Vec<PathBuf>,
    },

    #[error("SSH handshake with {address} failed during host key negotiation: {reason}")]
    HandshakeHostKey { address: String, reason: String },

    #[error("SSH handshake with {address} failed: {reason}")]
    Handshake { address: String, reason: String },

    #[error("not connected")]
    NotConnected,

    #[error("failed to open session: {0}")]
    Session(String),

    #[error("failed to start command: {0}")]
    CommandStart(String),

    #[error("channel closed unexpectedly without exit status")]
    ChannelClosed,

    #[error("remote command {command:?} exited with status {status}: {stderr}")]
    RemoteCommand {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),

    #[error("SSH key error: {0}")]
    Key(#[from] russh::keys::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable machine-readable code for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidTarget { .. } => "SSH_INVALID_TARGET",
            Error::ConfigRead { .. } => "SSH_CONFIG_READ",
            Error::NoAuthMethods { .. } => "SSH_NO_AUTH",
            Error::ConnectionRefused { .. } => "SSH_DIAL_REFUSED",
            Error::HostUnreachable { .. } => "SSH_DIAL_UNREACHABLE",
            Error::DialTimeout { .. } => "SSH_DIAL_TIMEOUT",
            Error::Dial { .. } => "SSH_DIAL_FAILED",
            Error::HostKeyMismatch(_) => "SSH_HOST_KEY_MISMATCH",
            Error::HostKeyUnknown { .. } => "SSH_HOST_KEY_UNKNOWN",
            Error::KnownHosts { .. } | Error::KnownHostsRead { .. } => "SSH_KNOWN_HOSTS",
            Error::AuthRejected { .. } => "SSH_AUTH_REJECTED",
            Error::HandshakeHostKey { .. } => "SSH_HANDSHAKE_HOST_KEY",
            Error::Handshake { .. } => "SSH_HANDSHAKE_FAILED",
            Error::NotConnected => "SSH_NOT_CONNECTED",
            Error::Session(_) => "SSH_SESSION_FAILED",
            Error::CommandStart(_) => "SSH_EXEC_START_FAILED",
            Error::ChannelClosed => "SSH_CHANNEL_CLOSED",
            Error::RemoteCommand { .. } => "REMOTE_COMMAND_FAILED",
            Error::Io(_) => "SSH_IO",
            Error::Protocol(_) => "SSH_PROTOCOL",
            Error::Key(_) => "SSH_KEY",
        }
    }

    /// What the user should try next.
    pub fn suggestion(&self) -> String {
        match self {
            Error::InvalidTarget { .. } => {
                "Use one of: host, user@host, host:port, user@host:port, or an alias from ~/.ssh/config"
                    .to_string()
            }
            Error::ConfigRead { path, .. } => {
                format!("Check that {} exists and is readable", path.display())
            }
            Error::NoAuthMethods { encrypted_keys, .. } if !encrypted_keys.is_empty() => format!(
                "Your keys are passphrase-protected. Load them into the SSH agent:\n  {}",
                ssh_add_commands(encrypted_keys)
            ),
            Error::NoAuthMethods { .. } => {
                "Start an SSH agent with a key loaded (ssh-add), or create a key with ssh-keygen -t ed25519"
                    .to_string()
            }
            Error::ConnectionRefused { address, .. } => format!(
                "Nothing is accepting connections on {address}. Check that sshd is running and the port is correct"
            ),
            Error::HostUnreachable { address, .. } => format!(
                "No route to {address}. Check the hostname, your network connection, and any VPN"
            ),
            Error::DialTimeout { address, .. } => format!(
                "{address} did not answer. Check that the host is up and that a firewall is not dropping SSH traffic"
            ),
            Error::Dial { address, .. } => {
                format!("Check that {address} resolves and accepts SSH connections")
            }
            Error::HostKeyMismatch(mismatch) => mismatch.remediation(),
            Error::HostKeyUnknown {
                hostname,
                port,
                received_key_type,
                known_hosts_path,
            } => format!(
                "Verify the server fingerprint out of band, then trust it with:\n  {}",
                keyscan_command(hostname, *port, Some(received_key_type), known_hosts_path)
            ),
            Error::KnownHosts { path, .. } | Error::KnownHostsRead { path, .. } => format!(
                "Check the permissions of {} and its parent directory",
                path.display()
            ),
            Error::AuthRejected { encrypted_keys, .. } if !encrypted_keys.is_empty() => format!(
                "The server rejected the keys that could be used. These keys are passphrase-protected and were skipped:\n  {}",
                ssh_add_commands(encrypted_keys)
            ),
            Error::AuthRejected { user, .. } => format!(
                "Check that a key authorized for {user} is loaded (ssh-add -l) and present in the server's authorized_keys"
            ),
            Error::HandshakeHostKey { address, .. } => format!(
                "The server's host key could not be negotiated. Try `ssh {address}` manually to inspect the host key"
            ),
            Error::Handshake { address, .. } => {
                format!("Try connecting manually with `ssh -v {address}` to see what fails")
            }
            Error::NotConnected => "Connect before running commands".to_string(),
            Error::Session(_) | Error::ChannelClosed | Error::Protocol(_) => {
                "The connection may have dropped. Retry the command".to_string()
            }
            Error::CommandStart(_) => {
                "Check that the remote account has a working login shell".to_string()
            }
            Error::RemoteCommand { .. } => {
                "Run the command by hand on the host to see its full output".to_string()
            }
            Error::Io(_) => "Check local file permissions and retry".to_string(),
            Error::Key(_) => "Check that the SSH agent is running and holds valid keys".to_string(),
        }
    }
}

/// Diagnostic for a server key that differs from the known-hosts entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostKeyMismatch {
    /// Hostname without port.
    pub hostname: String,
    pub port: u16,
    pub received_key_type: String,
    pub known_hosts_path: PathBuf,
    pub wanted_key_types: Vec<String>,
}

impl HostKeyMismatch {
    /// Both ways out: append the new key, or drop the stale entry.
    pub fn remediation(&self) -> String {
        format!(
            "If the host key was rotated on purpose, either append the new key:\n  {}\nor remove the stale entry and reconnect:\n  ssh-keygen -R {} -f {}",
            keyscan_command(
                &self.hostname,
                self.port,
                Some(&self.received_key_type),
                &self.known_hosts_path
            ),
            self.hostname,
            self.known_hosts_path.display()
        )
    }
}

impl fmt::Display for HostKeyMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "host key mismatch for {}: server presented {}, {} has {}. \
             This can mean someone is intercepting the connection, or the host key was rotated",
            self.hostname,
            self.received_key_type,
            self.known_hosts_path.display(),
            self.wanted_key_types.join(", ")
        )
    }
}

fn keyscan_command(hostname: &str, port: u16, key_type: Option<&str>, path: &Path) -> String {
    let mut cmd = String::from("ssh-keyscan");
    if let Some(key_type) = key_type {
        cmd.push_str(" -t ");
        cmd.push_str(keyscan_type(key_type));
    }
    if port != 22 {
        cmd.push_str(&format!(" -p {port}"));
    }
    format!("{cmd} {hostname} >> {}", path.display())
}

// ssh-keyscan -t wants the short family name, not the wire algorithm.
fn keyscan_type(key_type: &str) -> &str {
    match key_type {
        "ssh-ed25519" => "ed25519",
        "ssh-rsa" | "rsa-sha2-256" | "rsa-sha2-512" => "rsa",
        t if t.starts_with("ecdsa-sha2-") => "ecdsa",
        t => t,
    }
}

fn ssh_add_commands(keys: &[PathBuf]) -> String {
    let flag = if cfg!(target_os = "macos") {
        " --apple-use-keychain"
    } else {
        ""
    };
    keys.iter()
        .map(|k| format!("ssh-add{flag} {}", k.display()))
        .collect::<Vec<_>>()
        .join("\n  ")
}
