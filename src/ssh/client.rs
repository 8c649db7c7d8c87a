// ABOUTME: SSH connection management using russh.
// ABOUTME: Dials a target, verifies the host key, authenticates, and owns the live connection.

use super::agent::{SharedAgent, shared_agent};
use super::auth::{AuthChain, AuthMethod, build_auth};
use super::error::{Error, Result};
use super::known_hosts::{HostKeyChecking, HostKeyVerifier};
use super::resolve::{ResolvedSettings, resolve};
use crate::config::{Settings, ssh_dir};
use crate::diagnostics::Diagnostics;
use russh::Disconnect;
use russh::client::{self, Config, Handle};
use russh::keys::PrivateKeyWithHashAlg;
use russh::keys::ssh_key;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;

/// Forces a specific private key. Meant for CI.
pub const ENV_SSH_KEY: &str = "TETHER_SSH_KEY";
/// Replaces the local login name as the default remote user.
pub const ENV_SSH_USER: &str = "TETHER_SSH_USER";
/// `1` or `true` disables host key checking, for hosts whose keys change every run.
pub const ENV_INSECURE_IGNORE_HOST_KEY: &str = "TETHER_INSECURE_IGNORE_HOST_KEY";

/// Options for establishing a connection.
#[derive(Debug, Clone)]
pub struct DialOptions {
    /// Directory holding the default keys (id_ed25519, id_rsa, id_ecdsa).
    pub ssh_dir: PathBuf,
    /// ssh client config consulted for aliases.
    pub ssh_config: PathBuf,
    pub known_hosts: PathBuf,
    pub host_key_checking: HostKeyChecking,
    /// Limit for the TCP connect.
    pub connect_timeout: Duration,
    /// Grace period between SIGINT and force-close when a stream is cancelled.
    pub interrupt_grace: Duration,
    /// Key tried right after the agent.
    pub key_override: Option<PathBuf>,
    /// Default remote user when neither the target nor the config names one.
    pub user_override: Option<String>,
    /// Whether to consult the SSH agent.
    pub use_agent: bool,
    /// Agent to use instead of the process-wide one from `SSH_AUTH_SOCK`.
    pub agent: Option<Arc<SharedAgent>>,
}

impl Default for DialOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl DialOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            ssh_dir: ssh_dir(),
            ssh_config: settings.ssh_config_path(),
            known_hosts: settings.known_hosts_path(),
            host_key_checking: if settings.strict_host_key_checking {
                HostKeyChecking::Strict
            } else {
                HostKeyChecking::Disabled
            },
            connect_timeout: settings.connect_timeout,
            interrupt_grace: settings.interrupt_grace,
            key_override: None,
            user_override: None,
            use_agent: true,
            agent: None,
        }
    }

    /// Apply the `TETHER_*` environment overrides.
    pub fn with_env(mut self) -> Self {
        if let Some(key) = non_empty_env(ENV_SSH_KEY) {
            self.key_override = Some(crate::config::expand_path(&key));
        }
        if let Some(user) = non_empty_env(ENV_SSH_USER) {
            self.user_override = Some(user);
        }
        if let Some(value) = non_empty_env(ENV_INSECURE_IGNORE_HOST_KEY) {
            if matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes") {
                tracing::warn!("host key checking disabled by {}", ENV_INSECURE_IGNORE_HOST_KEY);
                self.host_key_checking = HostKeyChecking::Disabled;
            }
        }
        self
    }

    pub fn ssh_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.ssh_dir = dir.into();
        self
    }

    pub fn ssh_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.ssh_config = path.into();
        self
    }

    pub fn known_hosts(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts = path.into();
        self
    }

    pub fn host_key_checking(mut self, mode: HostKeyChecking) -> Self {
        self.host_key_checking = mode;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn interrupt_grace(mut self, grace: Duration) -> Self {
        self.interrupt_grace = grace;
        self
    }

    pub fn key_override(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_override = Some(path.into());
        self
    }

    pub fn user_override(mut self, user: impl Into<String>) -> Self {
        self.user_override = Some(user.into());
        self
    }

    pub fn use_agent(mut self, use_agent: bool) -> Self {
        self.use_agent = use_agent;
        self
    }

    /// Authenticate through `agent` rather than the shared one.
    pub fn agent(mut self, agent: Arc<SharedAgent>) -> Self {
        self.agent = Some(agent);
        self.use_agent = true;
        self
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// SSH client handler for russh.
pub(crate) struct ClientHandler {
    host: String,
    port: u16,
    verifier: Arc<HostKeyVerifier>,
}

impl client::Handler for ClientHandler {
    type Error = Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        self.verifier
            .verify(&self.host, self.port, server_public_key)
            .map(|()| true)
    }
}

/// A live SSH connection.
///
/// `Client::default()` is a closed client: exec calls fail with
/// [`Error::NotConnected`] and `close` is a no-op.
#[derive(Default)]
pub struct Client {
    host: String,
    address: String,
    interrupt_grace: Duration,
    handle: Option<Handle<ClientHandler>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("host", &self.host)
            .field("address", &self.address)
            .field("connected", &self.handle.is_some())
            .finish()
    }
}

impl Client {
    /// Connect to `spec` (`host`, `user@host:port`, or an ssh config alias).
    pub async fn dial(spec: &str, options: &DialOptions) -> Result<Self> {
        Self::dial_with(spec, options, Diagnostics::global()).await
    }

    /// Like [`Client::dial`], reporting one-time warnings to `diagnostics`.
    pub async fn dial_with(
        spec: &str,
        options: &DialOptions,
        diagnostics: &Diagnostics,
    ) -> Result<Self> {
        let settings = resolve(spec, options, diagnostics)?;

        let agent = match (&options.agent, options.use_agent) {
            (_, false) => None,
            (Some(agent), true) => Some(Arc::clone(agent)),
            (None, true) => shared_agent().await,
        };
        // No credentials means no dial: fail before any socket is opened.
        let chain = build_auth(&settings, options, agent).await?;

        let verifier = HostKeyVerifier::new(options.host_key_checking, &options.known_hosts);
        verifier.ensure_store()?;

        let address = settings.address();
        let stream = dial_tcp(&settings, &address, options.connect_timeout).await?;

        let russh_config = Config {
            // Long idle shells are normal; rely on keepalives instead.
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(15)),
            keepalive_max: 4,
            ..Default::default()
        };
        let handler = ClientHandler {
            host: settings.hostname.clone(),
            port: settings.port,
            verifier: Arc::new(verifier),
        };

        tracing::debug!("starting SSH handshake with {}", address);
        let mut handle = client::connect_stream(Arc::new(russh_config), stream, handler)
            .await
            .map_err(|e| classify_handshake(e, &settings, &address, &chain))?;

        let authenticated = authenticate(&mut handle, &settings.user, &chain)
            .await
            .map_err(|e| classify_handshake(e, &settings, &address, &chain))?;
        if !authenticated {
            return Err(Error::AuthRejected {
                user: settings.user.clone(),
                address,
                encrypted_keys: chain.encrypted_keys,
            });
        }

        tracing::debug!("connected to {} as {}", address, settings.user);
        Ok(Self {
            host: spec.to_string(),
            address,
            interrupt_grace: options.interrupt_grace,
            handle: Some(handle),
        })
    }

    /// The target string this client was dialed with.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The resolved `host:port`.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_connected(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_closed())
    }

    pub(crate) fn interrupt_grace(&self) -> Duration {
        self.interrupt_grace
    }

    pub(crate) fn handle(&self) -> Result<&Handle<ClientHandler>> {
        self.handle.as_ref().ok_or(Error::NotConnected)
    }

    /// Disconnect. Safe to call more than once.
    pub async fn close(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        if handle.is_closed() {
            return Ok(());
        }
        handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(Error::Protocol)
    }
}

async fn dial_tcp(
    settings: &ResolvedSettings,
    address: &str,
    timeout: Duration,
) -> Result<TcpStream> {
    let connect = TcpStream::connect((settings.hostname.as_str(), settings.port));
    match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(stream)) => {
            stream.set_nodelay(true).ok();
            Ok(stream)
        }
        Ok(Err(e)) => Err(classify_dial(address, e, timeout)),
        Err(_) => Err(Error::DialTimeout {
            address: address.to_string(),
            timeout,
        }),
    }
}

/// Map a TCP connect failure onto the dial taxonomy.
///
/// `timeout` is the configured connect limit, reported when the OS gives up first.
pub(crate) fn classify_dial(address: &str, source: std::io::Error, timeout: Duration) -> Error {
    use std::io::ErrorKind;

    let address = address.to_string();
    let text = source.to_string().to_lowercase();
    match source.kind() {
        ErrorKind::ConnectionRefused => Error::ConnectionRefused { address, source },
        ErrorKind::HostUnreachable | ErrorKind::NetworkUnreachable => {
            Error::HostUnreachable { address, source }
        }
        ErrorKind::TimedOut => Error::DialTimeout { address, timeout },
        _ if text.contains("connection refused") => Error::ConnectionRefused { address, source },
        _ if text.contains("no route to host") || text.contains("unreachable") => {
            Error::HostUnreachable { address, source }
        }
        _ if text.contains("timed out") => Error::DialTimeout { address, timeout },
        _ => Error::Dial { address, source },
    }
}

/// Which part of the handshake a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeStage {
    Auth,
    HostKey,
    Other,
}

/// Map a handshake or authentication failure onto the handshake taxonomy.
///
/// Host key verdicts pass through untouched. Protocol errors are sorted by
/// variant; anything else falls back to its message.
fn classify_handshake(
    err: Error,
    settings: &ResolvedSettings,
    address: &str,
    chain: &AuthChain,
) -> Error {
    if matches!(
        err,
        Error::HostKeyMismatch(_)
            | Error::HostKeyUnknown { .. }
            | Error::KnownHosts { .. }
            | Error::KnownHostsRead { .. }
    ) {
        return err;
    }

    let (stage, reason) = match &err {
        Error::Protocol(inner) => (protocol_stage(inner), inner.to_string()),
        other => (HandshakeStage::Other, other.to_string()),
    };
    let stage = match stage {
        HandshakeStage::Other => stage_from_text(&reason),
        known => known,
    };
    let address = address.to_string();

    match stage {
        HandshakeStage::Auth => Error::AuthRejected {
            user: settings.user.clone(),
            address,
            encrypted_keys: chain.encrypted_keys.clone(),
        },
        HandshakeStage::HostKey => Error::HandshakeHostKey { address, reason },
        HandshakeStage::Other => Error::Handshake { address, reason },
    }
}

fn protocol_stage(err: &russh::Error) -> HandshakeStage {
    use russh::AlgorithmKind;

    match err {
        russh::Error::NoCommonAlgo {
            kind: AlgorithmKind::Key | AlgorithmKind::Kex,
            ..
        }
        | russh::Error::KexInit
        | russh::Error::Kex
        | russh::Error::UnknownKey
        | russh::Error::WrongServerSig
        | russh::Error::KeyChanged { .. } => HandshakeStage::HostKey,
        russh::Error::NotAuthenticated
        | russh::Error::NoAuthMethod
        | russh::Error::UnsupportedAuthMethod => HandshakeStage::Auth,
        _ => HandshakeStage::Other,
    }
}

fn stage_from_text(reason: &str) -> HandshakeStage {
    let text = reason.to_lowercase();
    if ["unable to authenticate", "authenticat", "permission denied", "no supported methods"]
        .iter()
        .any(|needle| text.contains(needle))
        && !text.contains("packet authentication")
    {
        HandshakeStage::Auth
    } else if ["host key", "hostkey", "server key", "server signature", "key exchange", "kex"]
        .iter()
        .any(|needle| text.contains(needle))
    {
        HandshakeStage::HostKey
    } else {
        HandshakeStage::Other
    }
}

/// Offer each credential in order until the server accepts one.
async fn authenticate(
    handle: &mut Handle<ClientHandler>,
    user: &str,
    chain: &AuthChain,
) -> Result<bool> {
    let hash_alg = handle
        .best_supported_rsa_hash()
        .await
        .map_err(Error::Protocol)?
        .flatten();

    for method in &chain.methods {
        match method {
            AuthMethod::Agent { agent, keys } => {
                for key in keys {
                    if agent.authenticate(handle, user, key, hash_alg).await {
                        tracing::debug!("authenticated with agent key");
                        return Ok(true);
                    }
                }
            }
            AuthMethod::Key { path, key } => {
                let result = handle
                    .authenticate_publickey(
                        user,
                        PrivateKeyWithHashAlg::new(Arc::clone(key), hash_alg),
                    )
                    .await
                    .map_err(Error::Protocol)?;
                if result.success() {
                    tracing::debug!("authenticated with {}", path.display());
                    return Ok(true);
                }
                tracing::debug!("server rejected {}", path.display());
            }
        }
    }
    Ok(false)
}
