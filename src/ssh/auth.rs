// ABOUTME: Assembles the ordered list of credentials to offer a server.
// ABOUTME: Agent keys first, then override, config, and default key files; encrypted keys are reported.

use super::agent::SharedAgent;
use super::client::DialOptions;
use super::error::{Error, Result};
use super::resolve::ResolvedSettings;
use russh::keys::decode_secret_key;
use russh::keys::ssh_key::{PrivateKey, PublicKey};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default key files under ~/.ssh, in order of preference.
pub const DEFAULT_KEY_NAMES: [&str; 3] = ["id_ed25519", "id_rsa", "id_ecdsa"];

/// A credential source that can be offered to the server.
pub enum AuthMethod {
    /// Keys held by the SSH agent.
    Agent {
        agent: Arc<SharedAgent>,
        keys: Vec<PublicKey>,
    },
    /// An unencrypted private key read from disk.
    Key { path: PathBuf, key: Arc<PrivateKey> },
}

impl std::fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMethod::Agent { keys, .. } => f
                .debug_struct("Agent")
                .field("keys", &keys.len())
                .finish(),
            AuthMethod::Key { path, .. } => f.debug_struct("Key").field("path", path).finish(),
        }
    }
}

/// Credentials to try, in order, plus keys that were skipped for being encrypted.
#[derive(Debug, Default)]
pub struct AuthChain {
    pub methods: Vec<AuthMethod>,
    pub encrypted_keys: Vec<PathBuf>,
}

impl AuthChain {
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Outcome of reading one key file.
enum KeyLoad {
    Missing,
    Loaded(PrivateKey),
    Encrypted,
    Unusable(String),
}

/// Build the credential chain for `settings`.
///
/// Fails with [`Error::NoAuthMethods`] when nothing usable was found, so the
/// caller can stop before touching the network.
pub async fn build_auth(
    settings: &ResolvedSettings,
    options: &DialOptions,
    agent: Option<Arc<SharedAgent>>,
) -> Result<AuthChain> {
    let mut chain = AuthChain::default();

    // An agent with no keys would be tried first and fail the whole login.
    if let Some(agent) = agent {
        match agent.identities().await {
            Ok(keys) if !keys.is_empty() => {
                tracing::debug!("SSH agent offers {} key(s)", keys.len());
                chain.methods.push(AuthMethod::Agent { agent, keys });
            }
            Ok(_) => tracing::debug!("SSH agent has no keys; skipping"),
            Err(e) => tracing::debug!("failed to list agent keys: {}", e),
        }
    }

    let mut candidates: Vec<PathBuf> = Vec::new();
    candidates.extend(options.key_override.clone());
    candidates.extend(settings.identity_file.clone());
    candidates.extend(DEFAULT_KEY_NAMES.iter().map(|name| options.ssh_dir.join(name)));

    let mut tried: Vec<PathBuf> = Vec::new();
    for path in candidates {
        if tried.contains(&path) {
            continue;
        }
        match load_key(&path) {
            KeyLoad::Missing => {}
            KeyLoad::Loaded(key) => {
                tracing::debug!("using key {}", path.display());
                chain.methods.push(AuthMethod::Key {
                    path: path.clone(),
                    key: Arc::new(key),
                });
            }
            KeyLoad::Encrypted => {
                tracing::debug!("key {} is passphrase-protected; skipping", path.display());
                chain.encrypted_keys.push(path.clone());
            }
            KeyLoad::Unusable(reason) => {
                tracing::debug!("ignoring key {}: {}", path.display(), reason);
            }
        }
        tried.push(path);
    }

    if chain.is_empty() {
        return Err(Error::NoAuthMethods {
            user: settings.user.clone(),
            host: settings.alias.clone(),
            encrypted_keys: chain.encrypted_keys,
        });
    }
    Ok(chain)
}

fn load_key(path: &Path) -> KeyLoad {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return KeyLoad::Missing,
        Err(e) => return KeyLoad::Unusable(e.to_string()),
    };

    // Checked on the raw material too, so detection does not hinge on error wording.
    if is_encrypted(&raw) {
        return KeyLoad::Encrypted;
    }

    match decode_secret_key(&raw, None) {
        Ok(key) => KeyLoad::Loaded(key),
        Err(e) if mentions_encryption(&e.to_string()) => KeyLoad::Encrypted,
        Err(e) => KeyLoad::Unusable(e.to_string()),
    }
}

/// Whether raw key material is passphrase-protected.
fn is_encrypted(raw: &str) -> bool {
    // Legacy PEM keys carry "Proc-Type: 4,ENCRYPTED"; PKCS#8 uses "ENCRYPTED PRIVATE KEY".
    if raw.contains("ENCRYPTED") {
        return true;
    }
    PrivateKey::from_openssh(raw)
        .map(|key| key.is_encrypted())
        .unwrap_or(false)
}

fn mentions_encryption(message: &str) -> bool {
    let message = message.to_lowercase();
    ["encrypted", "passphrase", "password", "decrypt"]
        .iter()
        .any(|needle| message.contains(needle))
}
