// ABOUTME: push and info command implementations.
// ABOUTME: Built on the remote helpers so they only need plain exec.

use super::{connect, disconnect};
use std::path::Path;
use tether::error::Result;
use tether::output::{Output, OutputMode};
use tether::remote::{self, Remote};
use tether::ssh::DialOptions;

/// Copy a local text file to `remote_path`, creating its parent directory.
pub async fn push(
    target: &str,
    local: &Path,
    remote_path: &str,
    options: &DialOptions,
    output: &Output,
) -> Result<i32> {
    let content = std::fs::read_to_string(local)?;
    let mut client = connect(target, options, output).await?;
    let result = upload(&client, &content, remote_path).await;
    disconnect(&mut client).await;
    result?;

    output.success(&format!(
        "Copied {} to {}:{}",
        local.display(),
        target,
        remote_path
    ));
    Ok(0)
}

async fn upload(remote: &dyn Remote, content: &str, path: &str) -> Result<()> {
    if let Some(parent) = Path::new(path).parent().and_then(Path::to_str) {
        if !parent.is_empty() && !remote::dir_exists(remote, parent).await? {
            remote::ensure_dir(remote, parent).await?;
        }
    }
    remote::write_file(remote, path, content).await?;
    Ok(())
}

/// Print the remote OS and architecture.
pub async fn info(target: &str, options: &DialOptions, output: &Output) -> Result<i32> {
    let mut client = connect(target, options, output).await?;
    let result = remote::platform(&client).await;
    disconnect(&mut client).await;
    let platform = result?;

    if output.mode() == OutputMode::Json {
        println!("{}", serde_json::to_string(&platform).map_err(std::io::Error::other)?);
    } else {
        println!("{} {} ({})", client.address(), platform.os, platform.arch);
    }
    Ok(0)
}
