// ABOUTME: Parser for the subset of OpenSSH client config that tether understands.
// ABOUTME: Reads Host blocks and stops at the first Match directive, which it cannot evaluate.

use std::path::Path;

use crate::ssh::Error;

/// A `Host` block and the directives under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostBlock {
    /// Patterns from the `Host` line (`Host a b c` gives three).
    pub patterns: Vec<String>,
    /// Directives as (lowercased keyword, value), in file order.
    pub directives: Vec<(String, String)>,
}

impl HostBlock {
    fn matches(&self, alias: &str) -> bool {
        let mut matched = false;
        for pattern in &self.patterns {
            if let Some(negated) = pattern.strip_prefix('!') {
                if glob_match(negated, alias) {
                    return false;
                }
            } else if glob_match(pattern, alias) {
                matched = true;
            }
        }
        matched
    }

    fn get(&self, keyword: &str) -> Option<&str> {
        self.directives
            .iter()
            .find(|(k, _)| k == keyword)
            .map(|(_, v)| v.as_str())
    }
}

/// Settings an ssh config provides for one alias.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostParams {
    pub hostname: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub identity_file: Option<String>,
}

/// The parsed, `Match`-truncated content of an ssh config file.
#[derive(Debug, Clone, Default)]
pub struct SshConfigFile {
    blocks: Vec<HostBlock>,
    match_line: Option<usize>,
}

impl SshConfigFile {
    /// Parse `content`, ignoring everything from the first `Match` line on.
    pub fn parse(content: &str) -> Self {
        let mut blocks: Vec<HostBlock> = Vec::new();
        let mut match_line = None;

        for (line_no, keyword, value) in directives(content) {
            match keyword.as_str() {
                "match" => {
                    match_line = Some(line_no);
                    break;
                }
                "host" => blocks.push(HostBlock {
                    patterns: value.split_whitespace().map(str::to_string).collect(),
                    directives: Vec::new(),
                }),
                _ => {
                    if blocks.is_empty() {
                        // Directives before any Host line apply to every host.
                        blocks.push(HostBlock {
                            patterns: vec!["*".to_string()],
                            directives: Vec::new(),
                        });
                    }
                    if let Some(block) = blocks.last_mut() {
                        block.directives.push((keyword, value));
                    }
                }
            }
        }

        Self { blocks, match_line }
    }

    /// Load and parse a config file. A missing file is `Ok(None)`.
    pub fn load(path: &Path) -> Result<Option<Self>, Error> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Some(Self::parse(&content))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(Error::ConfigRead {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// 1-based line number of the first `Match` directive, if any.
    pub fn match_line(&self) -> Option<usize> {
        self.match_line
    }

    /// Whether a `Host` line names `alias` literally (not via a wildcard).
    pub fn has_host(&self, alias: &str) -> bool {
        self.blocks
            .iter()
            .any(|b| b.patterns.iter().any(|p| p == alias))
    }

    /// Collect settings for `alias`; the first value found for a keyword wins.
    pub fn lookup(&self, alias: &str) -> HostParams {
        let mut params = HostParams::default();
        for block in self.blocks.iter().filter(|b| b.matches(alias)) {
            if params.hostname.is_none() {
                params.hostname = block.get("hostname").map(str::to_string);
            }
            if params.user.is_none() {
                params.user = block.get("user").map(str::to_string);
            }
            if params.port.is_none() {
                params.port = block.get("port").and_then(|p| match p.parse::<u16>() {
                    Ok(port) if port != 0 => Some(port),
                    _ => {
                        tracing::debug!("ignoring invalid Port {:?} for {}", p, alias);
                        None
                    }
                });
            }
            if params.identity_file.is_none() {
                params.identity_file = block.get("identityfile").map(str::to_string);
            }
        }
        params
    }
}

/// Iterate `(line number, lowercased keyword, value)` over the meaningful lines of a config.
pub(crate) fn directives(content: &str) -> impl Iterator<Item = (usize, String, String)> + '_ {
    content.lines().enumerate().filter_map(|(idx, raw)| {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let split_at = line.find(|c: char| c.is_whitespace() || c == '=')?;
        let (keyword, rest) = line.split_at(split_at);
        let value = rest
            .trim_start_matches(|c: char| c.is_whitespace() || c == '=')
            .trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        Some((idx + 1, keyword.to_ascii_lowercase(), value.to_string()))
    })
}

/// Whether `alias` contains ssh config pattern syntax.
pub(crate) fn is_pattern(alias: &str) -> bool {
    alias.contains(['*', '?', '!'])
}

/// ssh_config(5) glob: `*` matches any run, `?` exactly one character.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}
