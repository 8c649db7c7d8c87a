// ABOUTME: Process-wide SSH agent connection.
// ABOUTME: Opened lazily once per process and shared by every dial.

use super::client::ClientHandler;
use super::error::Result;
use russh::client::Handle;
use russh::keys::agent::client::AgentClient;
use russh::keys::ssh_key::{HashAlg, PublicKey};
use std::sync::Arc;
use tokio::net::UnixStream;
use tokio::sync::{Mutex, OnceCell};

static AGENT: OnceCell<Option<Arc<SharedAgent>>> = OnceCell::const_new();

/// The agent reachable through `SSH_AUTH_SOCK`, if any.
///
/// The first call connects; later calls reuse the result, including a failed
/// attempt, until the process exits.
pub async fn shared_agent() -> Option<Arc<SharedAgent>> {
    AGENT
        .get_or_init(|| async { SharedAgent::connect_env().await.map(Arc::new) })
        .await
        .clone()
}

/// An open agent connection. Signing needs exclusive access to the socket.
pub struct SharedAgent {
    client: Mutex<AgentClient<UnixStream>>,
}

impl std::fmt::Debug for SharedAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedAgent").finish_non_exhaustive()
    }
}

impl SharedAgent {
    /// Wrap an already connected agent client.
    pub fn new(client: AgentClient<UnixStream>) -> Self {
        Self {
            client: Mutex::new(client),
        }
    }

    /// Connect to an agent listening on `path`.
    pub async fn connect_uds(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let client = AgentClient::connect_uds(path).await?;
        Ok(Self::new(client))
    }

    /// Connect to the agent named by `SSH_AUTH_SOCK`. Unset or unreachable is `None`.
    pub async fn connect_env() -> Option<Self> {
        match AgentClient::connect_env().await {
            Ok(client) => {
                tracing::debug!("connected to SSH agent");
                Some(Self::new(client))
            }
            Err(e) => {
                tracing::debug!("SSH agent not available: {}", e);
                None
            }
        }
    }

    /// Keys the agent currently holds.
    pub async fn identities(&self) -> Result<Vec<PublicKey>> {
        let keys = self.client.lock().await.request_identities().await?;
        Ok(keys)
    }

    /// Try to authenticate `user` with one agent-held key.
    pub(crate) async fn authenticate(
        &self,
        session: &mut Handle<ClientHandler>,
        user: &str,
        key: &PublicKey,
        hash_alg: Option<HashAlg>,
    ) -> bool {
        let mut agent = self.client.lock().await;
        match session
            .authenticate_publickey_with(user, key.clone(), hash_alg, &mut *agent)
            .await
        {
            Ok(result) => result.success(),
            Err(e) => {
                tracing::debug!("agent signing failed for {}: {:?}", key.algorithm().as_str(), e);
                false
            }
        }
    }
}
