// ABOUTME: In-process SSH agent for integration tests.
// ABOUTME: Serves russh's agent protocol on a Unix socket inside a temp directory.

use super::ssh_server::fixture;
use futures::stream;
use russh::keys::agent::client::AgentClient;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tether::ssh::SharedAgent;
use tokio::net::UnixListener;
use tokio::task::JoinHandle;

/// A running agent. The socket lives until the value is dropped.
pub struct TestAgent {
    pub socket: PathBuf,
    task: JoinHandle<()>,
}

impl TestAgent {
    /// Start an agent under `dir` holding the given fixture keys.
    pub async fn start(dir: &Path, keys: &[&str]) -> Self {
        let socket = dir.join("agent.sock");
        let listener = UnixListener::bind(&socket).expect("bind agent socket");
        let incoming = Box::pin(stream::unfold(listener, |listener| async move {
            let conn = listener.accept().await.map(|(stream, _)| stream);
            Some((conn, listener))
        }));
        let task = tokio::spawn(async move {
            let _ = russh::keys::agent::server::serve(incoming, ()).await;
        });

        if !keys.is_empty() {
            let mut client = AgentClient::connect_uds(&socket)
                .await
                .expect("connect to test agent");
            for name in keys {
                let key = russh::keys::load_secret_key(fixture(name), None).expect("load key");
                client.add_identity(&key, &[]).await.expect("add key to agent");
            }
        }

        Self { socket, task }
    }

    /// A fresh client connection wrapped for dialing.
    pub async fn shared(&self) -> Arc<SharedAgent> {
        Arc::new(
            SharedAgent::connect_uds(&self.socket)
                .await
                .expect("connect to test agent"),
        )
    }
}

impl Drop for TestAgent {
    fn drop(&mut self) {
        self.task.abort();
    }
}
