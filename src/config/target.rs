// ABOUTME: Connection target parsing.
// ABOUTME: Parses formats like "host", "user@host", "host:port", "user@host:port", "[v6]:port".

use crate::ssh::Error;

/// A target as typed by the user, before any ssh config lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Explicit user from a `user@` prefix.
    pub user: Option<String>,
    /// Hostname, address, or ssh config alias.
    pub host: String,
    /// Explicit port from a `:port` suffix.
    pub port: Option<u16>,
}

impl Target {
    pub fn parse(spec: &str) -> Result<Self, Error> {
        let invalid = |reason: &str| Error::InvalidTarget {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };

        let s = spec.trim();
        if s.is_empty() {
            return Err(invalid("target cannot be empty"));
        }

        let (user, rest) = match s.split_once('@') {
            Some((user, rest)) if !user.is_empty() => (Some(user.to_string()), rest),
            Some((_, rest)) => (None, rest),
            None => (None, s),
        };

        let (host, port) = if let Some(inner) = rest.strip_prefix('[') {
            // Bracketed address: [host] or [host]:port
            let (host, tail) = inner
                .split_once(']')
                .ok_or_else(|| invalid("unclosed '[' in address"))?;
            let port = match tail.strip_prefix(':') {
                Some(p) if is_port_suffix(p) => {
                    Some(parse_port(p).ok_or_else(|| invalid("port out of range"))?)
                }
                _ if tail.is_empty() => None,
                _ => return Err(invalid("unexpected text after ']'")),
            };
            (host, port)
        } else {
            match rest.rsplit_once(':') {
                // Only an all-digit suffix is a port; anything else stays in the host.
                Some((host, p)) if is_port_suffix(p) => {
                    (host, Some(parse_port(p).ok_or_else(|| invalid("port out of range"))?))
                }
                _ => (rest, None),
            }
        };

        if host.is_empty() {
            return Err(invalid("hostname cannot be empty"));
        }

        Ok(Target {
            user,
            host: host.to_string(),
            port,
        })
    }
}

fn is_port_suffix(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn parse_port(s: &str) -> Option<u16> {
    s.parse::<u16>().ok().filter(|p| *p != 0)
}
