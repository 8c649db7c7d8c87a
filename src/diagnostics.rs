// ABOUTME: Process-wide registry for non-fatal warnings.
// ABOUTME: Each warning key is logged and recorded at most once per process.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::LazyLock;

static GLOBAL: LazyLock<Diagnostics> = LazyLock::new(Diagnostics::default);

/// Collects non-fatal warnings, emitting each distinct key only once.
#[derive(Default)]
pub struct Diagnostics {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    seen: HashSet<String>,
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// The registry shared by the whole process.
    pub fn global() -> &'static Diagnostics {
        &GLOBAL
    }

    /// Record a warning unless `key` was already seen, auto-logging it via tracing.
    ///
    /// Returns `true` if the warning was emitted by this call.
    pub fn warn_once(&self, key: impl Into<String>, warning: Warning) -> bool {
        let mut inner = self.inner.lock();
        if !inner.seen.insert(key.into()) {
            return false;
        }
        tracing::warn!("{}", warning.message);
        inner.warnings.push(warning);
        true
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> Vec<Warning> {
        self.inner.lock().warnings.clone()
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.inner.lock().warnings.is_empty()
    }
}

/// A non-fatal warning.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// The ssh config was cut at a `Match` line and the alias was not found before it.
    pub fn match_truncated(line: usize, alias: &str) -> Self {
        Self {
            kind: WarningKind::MatchTruncated,
            message: format!(
                "ssh config has a Match block at line {line}; directives after it are ignored. \
                 If \"{alias}\" is defined below that line, move its Host block above the Match block"
            ),
        }
    }

    /// The ssh config exists but could not be read.
    pub fn config_unreadable(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::ConfigUnreadable,
            message: message.into(),
        }
    }

    /// Create an SSH disconnect warning.
    pub fn ssh_disconnect(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::SshDisconnect,
            message: message.into(),
        }
    }
}

/// Categories of warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// ssh config parsing stopped at an unsupported `Match` directive.
    MatchTruncated,
    /// ssh config could not be read; defaults were used.
    ConfigUnreadable,
    /// Failed to cleanly disconnect SSH session.
    SshDisconnect,
}
