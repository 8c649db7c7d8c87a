// ABOUTME: Remote command execution over a live client.
// ABOUTME: Batched, streamed with cancellation, pseudo-terminal, and interactive shell modes.

use super::client::Client;
use super::error::{Error, Result};
use russh::client::Msg;
use russh::{Channel, ChannelMsg, Pty, Sig};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Reported when a cancelled command exits after SIGINT without a status of its own.
pub const EXIT_INTERRUPTED: i32 = 130;
/// Reported when a cancelled command ignored SIGINT and the session was force-closed.
///
/// Same value as a remote process killed by SIGKILL (128 + 9). It is only
/// distinct from [`EXIT_INTERRUPTED`] and from the command's own status; a
/// caller that needs to know whether tether closed the session should check
/// whether it cancelled the stream.
pub const EXIT_FORCE_CLOSED: i32 = 137;

/// Fixed terminal size for [`Client::exec_pty`].
pub const PTY_COLS: u32 = 80;
pub const PTY_ROWS: u32 = 40;

const PTY_TERM: &str = "xterm-256color";

/// Output of a command that ran to completion.
///
/// A non-zero `exit_code` is a normal result, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Remote exit status, or 128 + signal number if the command was killed.
    pub exit_code: i32,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

impl Client {
    /// Run `command` and buffer its output.
    pub async fn exec(&self, command: &str) -> Result<ExecOutput> {
        let mut channel = self.open_session().await?;
        start(&channel, command).await?;
        collect(&mut channel).await
    }

    /// Run `command`, writing output to the given sinks as it arrives.
    ///
    /// When `cancel` fires the remote process gets SIGINT. If it has not
    /// exited once the grace period passes, the session is closed and
    /// [`EXIT_FORCE_CLOSED`] is returned.
    pub async fn exec_stream(
        &self,
        command: &str,
        stdout: &mut (dyn AsyncWrite + Unpin + Send),
        stderr: &mut (dyn AsyncWrite + Unpin + Send),
        cancel: &CancellationToken,
    ) -> Result<i32> {
        let mut channel = self.open_session().await?;
        start(&channel, command).await?;

        let grace = self.interrupt_grace();
        let mut status: Option<i32> = None;
        let mut got_eof = false;
        let mut force_at: Option<Instant> = None;

        loop {
            // Disabled select branches still build their futures.
            let deadline = force_at.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                msg = channel.wait() => match msg {
                    Some(ChannelMsg::Data { data }) => {
                        stdout.write_all(&data).await?;
                    }
                    Some(ChannelMsg::ExtendedData { data, ext: 1 }) => {
                        stderr.write_all(&data).await?;
                    }
                    Some(ChannelMsg::ExitStatus { exit_status }) => {
                        status = Some(exit_status as i32);
                        if got_eof {
                            break;
                        }
                    }
                    Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
                        status = Some(signal_exit_code(&signal_name));
                        if got_eof {
                            break;
                        }
                    }
                    Some(ChannelMsg::Eof) => {
                        got_eof = true;
                        if status.is_some() {
                            break;
                        }
                    }
                    Some(ChannelMsg::Close) | None => break,
                    Some(_) => {}
                },
                _ = cancel.cancelled(), if force_at.is_none() => {
                    tracing::debug!("interrupting remote command, grace {:?}", grace);
                    if let Err(e) = channel.signal(Sig::INT).await {
                        tracing::debug!("failed to send SIGINT: {}", e);
                    }
                    force_at = Some(Instant::now() + grace);
                }
                _ = tokio::time::sleep_until(deadline), if force_at.is_some() => {
                    tracing::debug!("remote command ignored SIGINT; closing session");
                    channel.close().await.ok();
                    stdout.flush().await?;
                    stderr.flush().await?;
                    return Ok(EXIT_FORCE_CLOSED);
                }
            }
        }

        stdout.flush().await?;
        stderr.flush().await?;

        match (status, force_at) {
            (Some(code), _) => Ok(code),
            (None, Some(_)) => Ok(EXIT_INTERRUPTED),
            (None, None) => Err(Error::ChannelClosed),
        }
    }

    /// Run `command` under a pseudo-terminal with echo disabled.
    ///
    /// The terminal merges stderr into stdout, so `stderr` is usually empty.
    pub async fn exec_pty(&self, command: &str) -> Result<ExecOutput> {
        let mut channel = self.open_session().await?;
        channel
            .request_pty(true, PTY_TERM, PTY_COLS, PTY_ROWS, 0, 0, &[(Pty::ECHO, 0)])
            .await
            .map_err(|e| Error::Session(format!("failed to request PTY: {e}")))?;
        start(&channel, command).await?;
        collect(&mut channel).await
    }

    /// Open an interactive shell wired to the given streams.
    ///
    /// Blocks until the remote shell exits. End of `stdin` is forwarded as EOF.
    pub async fn shell(
        &self,
        stdin: &mut (dyn AsyncRead + Unpin + Send),
        stdout: &mut (dyn AsyncWrite + Unpin + Send),
        stderr: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<i32> {
        let mut channel = self.open_session().await?;
        let (cols, rows) = terminal_size();
        channel
            .request_pty(true, PTY_TERM, cols, rows, 0, 0, &[(Pty::ECHO, 1)])
            .await
            .map_err(|e| Error::Session(format!("failed to request PTY: {e}")))?;
        channel
            .request_shell(true)
            .await
            .map_err(|e| Error::CommandStart(format!("failed to start shell: {e}")))?;

        let mut input = [0u8; 1024];
        let mut stdin_open = true;
        let mut status: Option<i32> = None;

        loop {
            tokio::select! {
                read = stdin.read(&mut input), if stdin_open => match read {
                    Ok(0) => {
                        stdin_open = false;
                        send_eof(&channel).await;
                    }
                    Ok(n) => {
                        channel.data(&input[..n]).await.map_err(Error::Protocol)?;
                    }
                    Err(e) => {
                        tracing::warn!("stdin read error: {}", e);
                        stdin_open = false;
                        send_eof(&channel).await;
                    }
                },
                msg = channel.wait() => match msg {
                    Some(ChannelMsg::Data { data }) => {
                        stdout.write_all(&data).await?;
                        stdout.flush().await?;
                    }
                    Some(ChannelMsg::ExtendedData { data, ext: 1 }) => {
                        stderr.write_all(&data).await?;
                        stderr.flush().await?;
                    }
                    Some(ChannelMsg::ExitStatus { exit_status }) => {
                        status = Some(exit_status as i32);
                    }
                    Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
                        status = Some(signal_exit_code(&signal_name));
                    }
                    Some(ChannelMsg::Eof) if status.is_some() => break,
                    Some(ChannelMsg::Close) | None => break,
                    Some(_) => {}
                },
            }
        }

        status.ok_or(Error::ChannelClosed)
    }

    async fn open_session(&self) -> Result<Channel<Msg>> {
        let handle = self.handle()?;
        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| Error::Session(e.to_string()))?;
        tracing::debug!("opened session {:?} on {}", channel.id(), self.address());
        Ok(channel)
    }
}

async fn start(channel: &Channel<Msg>, command: &str) -> Result<()> {
    tracing::debug!("exec: {}", command);
    channel
        .exec(true, command)
        .await
        .map_err(|e| Error::CommandStart(e.to_string()))
}

// The remote side may already have closed the channel.
async fn send_eof(channel: &Channel<Msg>) {
    if let Err(e) = channel.eof().await {
        tracing::debug!("failed to send EOF: {}", e);
    }
}

/// Drain a channel into memory until the command finishes.
async fn collect(channel: &mut Channel<Msg>) -> Result<ExecOutput> {
    let mut output = ExecOutput::default();
    let mut status: Option<i32> = None;
    let mut got_eof = false;

    loop {
        match channel.wait().await {
            Some(ChannelMsg::Data { data }) => output.stdout.extend_from_slice(&data),
            Some(ChannelMsg::ExtendedData { data, ext: 1 }) => {
                output.stderr.extend_from_slice(&data)
            }
            Some(ChannelMsg::ExitStatus { exit_status }) => {
                status = Some(exit_status as i32);
                if got_eof {
                    break;
                }
            }
            Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
                status = Some(signal_exit_code(&signal_name));
                if got_eof {
                    break;
                }
            }
            Some(ChannelMsg::Eof) => {
                got_eof = true;
                if status.is_some() {
                    break;
                }
            }
            Some(ChannelMsg::Close) | None => break,
            Some(_) => {}
        }
    }

    // A channel that closes without a status means the transport went away.
    output.exit_code = status.ok_or(Error::ChannelClosed)?;
    Ok(output)
}

/// Shell convention for a process killed by a signal: 128 + signal number.
pub(crate) fn signal_exit_code(signal: &Sig) -> i32 {
    let number = match signal {
        Sig::HUP => 1,
        Sig::INT => 2,
        Sig::QUIT => 3,
        Sig::ILL => 4,
        Sig::ABRT => 6,
        Sig::FPE => 8,
        Sig::KILL => 9,
        Sig::USR1 => 10,
        Sig::SEGV => 11,
        Sig::PIPE => 13,
        Sig::ALRM => 14,
        Sig::TERM => 15,
        Sig::Custom(_) => 127,
    };
    128 + number
}

fn terminal_size() -> (u32, u32) {
    crossterm::terminal::size()
        .map(|(cols, rows)| (u32::from(cols), u32::from(rows)))
        .unwrap_or((PTY_COLS, PTY_ROWS))
}
