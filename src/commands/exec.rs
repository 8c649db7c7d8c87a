// ABOUTME: exec, run, and pty command implementations.
// ABOUTME: Batched, streamed (Ctrl-C interrupts the remote command), and terminal execution.

use super::{command_line, connect, disconnect};
use std::io::Write;
use tether::error::Result;
use tether::output::Output;
use tether::ssh::DialOptions;
use tokio_util::sync::CancellationToken;

/// Run a command, then print everything it wrote.
pub async fn exec(
    target: &str,
    command: &[String],
    options: &DialOptions,
    output: &Output,
) -> Result<i32> {
    let mut client = connect(target, options, output).await?;
    let result = client.exec(&command_line(command)).await;
    disconnect(&mut client).await;
    let result = result?;

    std::io::stdout().write_all(&result.stdout)?;
    std::io::stderr().write_all(&result.stderr)?;
    Ok(result.exit_code)
}

/// Run a command with live output. Ctrl-C interrupts the remote process.
pub async fn run(
    target: &str,
    command: &[String],
    options: &DialOptions,
    output: &Output,
) -> Result<i32> {
    let mut client = connect(target, options, output).await?;

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("Ctrl-C received; interrupting remote command");
            on_ctrl_c.cancel();
        }
    });

    let mut stdout = tokio::io::stdout();
    let mut stderr = tokio::io::stderr();
    let result = client
        .exec_stream(&command_line(command), &mut stdout, &mut stderr, &cancel)
        .await;
    watcher.abort();
    disconnect(&mut client).await;

    let code = result?;
    if cancel.is_cancelled() {
        output.warning(&format!("remote command interrupted (exit {code})"));
    }
    Ok(code)
}

/// Run a command under a pseudo-terminal.
pub async fn pty(
    target: &str,
    command: &[String],
    options: &DialOptions,
    output: &Output,
) -> Result<i32> {
    let mut client = connect(target, options, output).await?;
    let result = client.exec_pty(&command_line(command)).await;
    disconnect(&mut client).await;
    let result = result?;

    std::io::stdout().write_all(&result.stdout)?;
    Ok(result.exit_code)
}
