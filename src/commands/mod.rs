// ABOUTME: Command handlers for the tether CLI.
// ABOUTME: Each handler returns the process exit code on success.

mod exec;
mod files;
mod hosts;
mod shell;

pub use exec::{exec, pty, run};
pub use files::{info, push};
pub use hosts::hosts;
pub use shell::shell;

use tether::diagnostics::{Diagnostics, Warning};
use tether::error::Result;
use tether::output::Output;
use tether::ssh::{Client, DialOptions};

/// Dial `target`, reporting progress.
async fn connect(target: &str, options: &DialOptions, output: &Output) -> Result<Client> {
    output.progress(&format!("Connecting to {target}..."));
    let client = Client::dial(target, options).await?;
    tracing::debug!("connected to {}", client.address());
    Ok(client)
}

/// Close the connection; a failure is only worth a warning.
async fn disconnect(client: &mut Client) {
    if let Err(e) = client.close().await {
        Diagnostics::global().warn_once(
            format!("ssh-disconnect:{}", client.address()),
            Warning::ssh_disconnect(format!("failed to disconnect from {}: {e}", client.address())),
        );
    }
}

/// Join argv words into one remote command line.
fn command_line(words: &[String]) -> String {
    words.join(" ")
}
