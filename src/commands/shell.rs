// ABOUTME: Interactive shell command.
// ABOUTME: Puts the local terminal in raw mode while the remote shell runs.

use super::{connect, disconnect};
use std::io::IsTerminal;
use tether::error::Result;
use tether::output::Output;
use tether::ssh::DialOptions;

pub async fn shell(target: &str, options: &DialOptions, output: &Output) -> Result<i32> {
    let mut client = connect(target, options, output).await?;

    let _raw_guard = if std::io::stdin().is_terminal() {
        Some(RawModeGuard::enable()?)
    } else {
        None
    };

    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut stderr = tokio::io::stderr();
    let result = client.shell(&mut stdin, &mut stdout, &mut stderr).await;
    disconnect(&mut client).await;
    Ok(result?)
}

/// Restores cooked mode on drop.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self> {
        crossterm::terminal::enable_raw_mode()?;
        Ok(RawModeGuard)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = crossterm::terminal::disable_raw_mode();
    }
}
