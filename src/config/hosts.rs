// ABOUTME: Lists concrete host aliases from an ssh config for interactive selection.
// ABOUTME: Skips wildcard patterns, keeps the first of duplicate aliases, and sorts by alias.

use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

use super::ssh_config::{directives, is_pattern};
use crate::ssh::Error;

/// A host alias that can be offered to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SshHostEntry {
    pub alias: String,
    /// `HostName`, or the alias itself when unset.
    pub hostname: String,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub identity_file: Option<String>,
}

impl SshHostEntry {
    fn new(alias: &str) -> Self {
        Self {
            alias: alias.to_string(),
            hostname: alias.to_string(),
            user: None,
            port: None,
            identity_file: None,
        }
    }

    /// One-line summary such as `deploy@10.0.0.5:2222 (key: id_ed25519)`.
    pub fn description(&self) -> String {
        let mut desc = String::new();
        if let Some(user) = &self.user {
            desc.push_str(user);
            desc.push('@');
        }
        desc.push_str(&self.hostname);
        if let Some(port) = self.port.filter(|p| *p != 22) {
            desc.push_str(&format!(":{port}"));
        }
        if let Some(key) = &self.identity_file {
            let name = Path::new(key)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| key.clone());
            desc.push_str(&format!(" (key: {name})"));
        }
        desc
    }
}

/// Read the ssh config at `path` and list its concrete hosts. A missing file is an empty list.
pub fn list_hosts(path: &Path) -> Result<Vec<SshHostEntry>, Error> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(parse_hosts(&content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(source) => Err(Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// List the concrete hosts defined in ssh config `content`.
pub fn parse_hosts(content: &str) -> Vec<SshHostEntry> {
    let mut entries: Vec<SshHostEntry> = Vec::new();
    let mut seen = HashSet::new();
    // Indices into `entries` that the directives being read apply to.
    let mut current: Vec<usize> = Vec::new();

    for (_, keyword, value) in directives(content) {
        match keyword.as_str() {
            "host" => {
                current.clear();
                for alias in value.split_whitespace() {
                    if is_pattern(alias) || !seen.insert(alias.to_string()) {
                        continue;
                    }
                    current.push(entries.len());
                    entries.push(SshHostEntry::new(alias));
                }
            }
            "match" => current.clear(),
            "hostname" => each(&mut entries, &current, |e| e.hostname = value.clone()),
            "user" => each(&mut entries, &current, |e| e.user = Some(value.clone())),
            "port" => {
                if let Ok(port) = value.parse::<u16>() {
                    each(&mut entries, &current, |e| e.port = Some(port));
                }
            }
            "identityfile" => each(&mut entries, &current, |e| {
                // Like ssh, the first IdentityFile in a block is the preferred one.
                if e.identity_file.is_none() {
                    e.identity_file = Some(value.clone());
                }
            }),
            _ => {}
        }
    }

    entries.sort_by(|a, b| a.alias.cmp(&b.alias));
    entries
}

fn each(entries: &mut [SshHostEntry], indices: &[usize], mut f: impl FnMut(&mut SshHostEntry)) {
    for &i in indices {
        f(&mut entries[i]);
    }
}
