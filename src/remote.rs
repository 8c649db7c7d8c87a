// ABOUTME: Transport-neutral view of a remote host plus file and query helpers.
// ABOUTME: Helpers only use `exec`, so they run the same against a live client or a test double.

use crate::ssh::{Client, Error, ExecOutput, Result};
use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

/// A host that can run commands.
#[async_trait]
pub trait Remote: Send + Sync {
    /// Target string the connection was opened with.
    fn host(&self) -> &str;

    /// Resolved `host:port`.
    fn address(&self) -> &str;

    async fn exec(&self, command: &str) -> Result<ExecOutput>;

    async fn exec_stream(
        &self,
        command: &str,
        stdout: &mut (dyn AsyncWrite + Unpin + Send),
        stderr: &mut (dyn AsyncWrite + Unpin + Send),
        cancel: &CancellationToken,
    ) -> Result<i32>;

    async fn exec_pty(&self, command: &str) -> Result<ExecOutput>;

    async fn shell(
        &self,
        stdin: &mut (dyn AsyncRead + Unpin + Send),
        stdout: &mut (dyn AsyncWrite + Unpin + Send),
        stderr: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<i32>;

    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
impl Remote for Client {
    fn host(&self) -> &str {
        Client::host(self)
    }

    fn address(&self) -> &str {
        Client::address(self)
    }

    async fn exec(&self, command: &str) -> Result<ExecOutput> {
        Client::exec(self, command).await
    }

    async fn exec_stream(
        &self,
        command: &str,
        stdout: &mut (dyn AsyncWrite + Unpin + Send),
        stderr: &mut (dyn AsyncWrite + Unpin + Send),
        cancel: &CancellationToken,
    ) -> Result<i32> {
        Client::exec_stream(self, command, stdout, stderr, cancel).await
    }

    async fn exec_pty(&self, command: &str) -> Result<ExecOutput> {
        Client::exec_pty(self, command).await
    }

    async fn shell(
        &self,
        stdin: &mut (dyn AsyncRead + Unpin + Send),
        stdout: &mut (dyn AsyncWrite + Unpin + Send),
        stderr: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<i32> {
        Client::shell(self, stdin, stdout, stderr).await
    }

    async fn close(&mut self) -> Result<()> {
        Client::close(self).await
    }
}

/// Operating system and machine type of a remote host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Platform {
    /// `uname -s`, e.g. `Linux`.
    pub os: String,
    /// `uname -m`, e.g. `x86_64`.
    pub arch: String,
}

/// Quote `value` for a POSIX shell.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Run `command` and fail unless it exits zero.
pub async fn run_checked(remote: &dyn Remote, command: &str) -> Result<ExecOutput> {
    let output = remote.exec(command).await?;
    if !output.success() {
        return Err(Error::RemoteCommand {
            command: command.to_string(),
            status: output.exit_code,
            stderr: output.stderr_str().trim().to_string(),
        });
    }
    Ok(output)
}

async fn test_path(remote: &dyn Remote, flag: &str, path: &str) -> Result<bool> {
    let output = remote.exec(&format!("test {flag} {}", quote(path))).await?;
    Ok(output.success())
}

pub async fn path_exists(remote: &dyn Remote, path: &str) -> Result<bool> {
    test_path(remote, "-e", path).await
}

pub async fn dir_exists(remote: &dyn Remote, path: &str) -> Result<bool> {
    test_path(remote, "-d", path).await
}

pub async fn file_exists(remote: &dyn Remote, path: &str) -> Result<bool> {
    test_path(remote, "-f", path).await
}

/// `mkdir -p`.
pub async fn ensure_dir(remote: &dyn Remote, path: &str) -> Result<()> {
    run_checked(remote, &format!("mkdir -p {}", quote(path))).await?;
    Ok(())
}

/// Write text to `path` with a quoted heredoc, so nothing in `content` is expanded.
pub async fn write_file(remote: &dyn Remote, path: &str, content: &str) -> Result<()> {
    let marker = heredoc_marker(content);
    let body = if content.ends_with('\n') || content.is_empty() {
        content.to_string()
    } else {
        format!("{content}\n")
    };
    let command = format!("cat > {} << '{marker}'\n{body}{marker}", quote(path));
    run_checked(remote, &command).await?;
    tracing::debug!("wrote {} bytes to {}", content.len(), path);
    Ok(())
}

pub async fn read_file(remote: &dyn Remote, path: &str) -> Result<String> {
    let output = run_checked(remote, &format!("cat {}", quote(path))).await?;
    Ok(output.stdout_str())
}

/// `rm -rf`.
pub async fn remove_all(remote: &dyn Remote, path: &str) -> Result<()> {
    run_checked(remote, &format!("rm -rf {}", quote(path))).await?;
    Ok(())
}

pub async fn command_exists(remote: &dyn Remote, name: &str) -> Result<bool> {
    let output = remote.exec(&format!("which {}", quote(name))).await?;
    Ok(output.success() && !output.stdout.is_empty())
}

pub async fn platform(remote: &dyn Remote) -> Result<Platform> {
    let os = run_checked(remote, "uname -s").await?.stdout_str();
    let arch = run_checked(remote, "uname -m").await?.stdout_str();
    Ok(Platform {
        os: os.trim().to_string(),
        arch: arch.trim().to_string(),
    })
}

/// A terminator line that does not appear in `content`.
fn heredoc_marker(content: &str) -> String {
    let mut marker = String::from("TETHER_EOF");
    let mut n = 0;
    while content.lines().any(|line| line == marker) {
        n += 1;
        marker = format!("TETHER_EOF_{n}");
    }
    marker
}
