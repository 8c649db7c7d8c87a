// ABOUTME: In-process SSH server for integration tests.
// ABOUTME: Understands a handful of scripted commands and reacts to signals, PTYs, and shells.

use russh::keys::{Algorithm, PrivateKey, PublicKey};
use russh::server::{Auth, Msg, Server as _, Session};
use russh::{Channel, ChannelId, Pty, Sig};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tether::ssh::{DialOptions, HostKeyChecking};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const TEST_USER: &str = "tester";

/// Path of a key under tests/fixtures.
pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// A running server bound to 127.0.0.1 on a random port.
pub struct TestServer {
    pub port: u16,
    host_key: PublicKey,
    task: JoinHandle<()>,
}

impl TestServer {
    /// Start a server that accepts the public half of `fixtures/<client_key>`.
    pub async fn start(client_key: &str) -> Self {
        let allowed = russh::keys::load_secret_key(fixture(client_key), None)
            .expect("load client key")
            .public_key()
            .clone();

        let mut rng = russh::keys::ssh_key::rand_core::OsRng;
        let host_key = PrivateKey::random(&mut rng, Algorithm::Ed25519).expect("host key");
        let host_public = host_key.public_key().clone();

        let config = Arc::new(russh::server::Config {
            auth_rejection_time: Duration::from_millis(0),
            auth_rejection_time_initial: Some(Duration::from_millis(0)),
            inactivity_timeout: Some(Duration::from_secs(30)),
            keys: vec![host_key],
            ..Default::default()
        });

        let listener = TcpListener::bind(("127.0.0.1", 0)).await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();

        let mut server = ScriptedServer {
            allowed,
            channels: HashMap::new(),
        };
        let task = tokio::spawn(async move {
            let _ = server.run_on_socket(config, &listener).await;
        });

        Self {
            port,
            host_key: host_public,
            task,
        }
    }

    /// `tester@127.0.0.1:<port>`.
    pub fn target(&self) -> String {
        format!("{TEST_USER}@127.0.0.1:{}", self.port)
    }

    /// A known_hosts line trusting this server.
    pub fn known_hosts_line(&self) -> String {
        let key = self.host_key.to_openssh().expect("encode host key");
        format!("[127.0.0.1]:{} {}\n", self.port, key)
    }

    /// Options that trust this server and offer `fixtures/<client_key>` as the only key.
    ///
    /// Everything lives under `dir`; the agent is not consulted.
    pub fn options(&self, dir: &TempDir, client_key: &str) -> DialOptions {
        let ssh_dir = dir.path().join("ssh");
        std::fs::create_dir_all(&ssh_dir).expect("create ssh dir");
        install_key(&ssh_dir, client_key, "id_ed25519");

        let known_hosts = ssh_dir.join("known_hosts");
        std::fs::write(&known_hosts, self.known_hosts_line()).expect("write known_hosts");

        DialOptions::default()
            .ssh_dir(&ssh_dir)
            .ssh_config(ssh_dir.join("config"))
            .known_hosts(known_hosts)
            .host_key_checking(HostKeyChecking::Strict)
            .connect_timeout(Duration::from_secs(5))
            .interrupt_grace(Duration::from_millis(300))
            .use_agent(false)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Copy a fixture key into `ssh_dir` under `name`, with private permissions.
pub fn install_key(ssh_dir: &Path, fixture_name: &str, name: &str) -> PathBuf {
    let dest = ssh_dir.join(name);
    std::fs::copy(fixture(fixture_name), &dest).expect("copy key");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&dest, std::fs::Permissions::from_mode(0o600))
            .expect("chmod key");
    }
    dest
}

/// A random key that is not the server's, encoded for known_hosts.
pub fn unrelated_host_key() -> String {
    let mut rng = russh::keys::ssh_key::rand_core::OsRng;
    let key = PrivateKey::random(&mut rng, Algorithm::Ed25519).expect("random key");
    key.public_key().to_openssh().expect("encode key")
}

/// What a channel is doing, as far as the server is concerned.
#[derive(Clone, Default)]
struct ChannelState {
    pty: Option<(String, u32, u32, u32)>,
    shell: bool,
    /// Running a command that only ends when interrupted.
    waiting: Option<Waiting>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Waiting {
    /// Exits 130 on SIGINT.
    Interruptible,
    /// Ignores SIGINT entirely.
    Stubborn,
}

#[derive(Clone)]
struct ScriptedServer {
    allowed: PublicKey,
    channels: HashMap<ChannelId, ChannelState>,
}

impl russh::server::Server for ScriptedServer {
    type Handler = Self;

    fn new_client(&mut self, _: Option<std::net::SocketAddr>) -> Self::Handler {
        ScriptedServer {
            allowed: self.allowed.clone(),
            channels: HashMap::new(),
        }
    }
}

fn finish(session: &mut Session, channel: ChannelId, status: u32) {
    let _ = session.exit_status_request(channel, status);
    let _ = session.eof(channel);
    let _ = session.close(channel);
}

fn send_stdout(session: &mut Session, channel: ChannelId, bytes: &[u8]) {
    let _ = session.data(channel, bytes.to_vec().into());
}

fn send_stderr(session: &mut Session, channel: ChannelId, bytes: &[u8]) {
    let _ = session.extended_data(channel, 1, bytes.to_vec().into());
}

impl ScriptedServer {
    fn run(&mut self, channel: ChannelId, command: &str, session: &mut Session) {
        let state = self.channels.entry(channel).or_default();

        if let Some(code) = command.strip_prefix("exit ") {
            finish(session, channel, code.trim().parse().unwrap_or(1));
        } else if let Some(text) = command.strip_prefix("echo ") {
            match text.strip_suffix(" >&2") {
                Some(err) => send_stderr(session, channel, format!("{err}\n").as_bytes()),
                None => send_stdout(session, channel, format!("{text}\n").as_bytes()),
            }
            finish(session, channel, 0);
        } else if command == "tty" {
            let line = match &state.pty {
                Some((term, cols, rows, echo)) => {
                    format!("{term} {cols}x{rows} echo={echo}\r\n")
                }
                None => "not a tty\n".to_string(),
            };
            let status = if state.pty.is_some() { 0 } else { 1 };
            send_stdout(session, channel, line.as_bytes());
            finish(session, channel, status);
        } else if command == "sleep" {
            send_stdout(session, channel, b"started\n");
            state.waiting = Some(Waiting::Interruptible);
        } else if command == "sleep-ignore-int" {
            send_stdout(session, channel, b"started\n");
            state.waiting = Some(Waiting::Stubborn);
        } else if command == "vanish" {
            let _ = session.close(channel);
        } else {
            send_stderr(session, channel, format!("{command}: not found\n").as_bytes());
            finish(session, channel, 127);
        }
    }
}

impl russh::server::Handler for ScriptedServer {
    type Error = russh::Error;

    fn auth_publickey(
        &mut self,
        user: &str,
        key: &PublicKey,
    ) -> impl Future<Output = Result<Auth, Self::Error>> + Send {
        let accepted = user == TEST_USER && key.key_data() == self.allowed.key_data();
        async move {
            if accepted {
                Ok(Auth::Accept)
            } else {
                Ok(Auth::reject())
            }
        }
    }

    fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        self.channels.insert(channel.id(), ChannelState::default());
        async { Ok(true) }
    }

    fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        let echo = modes
            .iter()
            .find(|(mode, _)| *mode == Pty::ECHO)
            .map(|(_, value)| *value)
            .unwrap_or(1);
        self.channels.entry(channel).or_default().pty =
            Some((term.to_string(), col_width, row_height, echo));
        let _ = session.channel_success(channel);
        async { Ok(()) }
    }

    fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        let command = String::from_utf8_lossy(data).into_owned();
        let _ = session.channel_success(channel);
        self.run(channel, &command, session);
        async { Ok(()) }
    }

    fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        self.channels.entry(channel).or_default().shell = true;
        let _ = session.channel_success(channel);
        send_stdout(session, channel, b"$ ");
        async { Ok(()) }
    }

    fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        let shell = self.channels.get(&channel).is_some_and(|s| s.shell);
        if shell {
            // Echo every line back, the way a terminal with echo on would.
            send_stdout(session, channel, data);
            if data.windows(4).any(|w| w == b"exit") {
                finish(session, channel, 0);
            }
        }
        async { Ok(()) }
    }

    fn channel_eof(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        let shell = self.channels.get(&channel).is_some_and(|s| s.shell);
        if shell {
            finish(session, channel, 0);
        }
        async { Ok(()) }
    }

    fn signal(
        &mut self,
        channel: ChannelId,
        signal: Sig,
        session: &mut Session,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        let waiting = self.channels.get(&channel).and_then(|s| s.waiting);
        if matches!(signal, Sig::INT) && waiting == Some(Waiting::Interruptible) {
            send_stdout(session, channel, b"interrupted\n");
            finish(session, channel, 130);
        }
        async { Ok(()) }
    }
}
