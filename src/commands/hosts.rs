// ABOUTME: hosts command implementation.
// ABOUTME: Lists concrete aliases from the ssh config for picking a target.

use tether::config::{Settings, list_hosts};
use tether::error::Result;
use tether::output::Output;

pub fn hosts(settings: &Settings, output: &Output) -> Result<i32> {
    let hosts = list_hosts(&settings.ssh_config_path())?;
    output.hosts(&hosts);
    Ok(0)
}
