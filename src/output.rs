// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports normal, quiet (CI), and JSON output modes.

use crate::config::SshHostEntry;
use serde::Serialize;
use std::time::Instant;

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    Normal,
    /// Minimal output for CI (only final result)
    Quiet,
    /// JSON lines for scripting
    Json,
}

impl OutputMode {
    pub fn from_flags(quiet: bool, json: bool) -> Self {
        if json {
            OutputMode::Json
        } else if quiet {
            OutputMode::Quiet
        } else {
            OutputMode::Normal
        }
    }
}

/// Handles CLI output based on the configured mode.
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Get elapsed time since timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn duration(&self) -> Option<f64> {
        self.start_time.map(|_| self.elapsed_secs())
    }

    /// `message` with the elapsed time appended once a timer is running.
    fn timed(&self, message: &str) -> String {
        match self.duration() {
            Some(elapsed) => format!("{message} ({elapsed:.1}s)"),
            None => message.to_string(),
        }
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            eprintln!("{message}");
        }
    }

    /// Print a success message with optional timing.
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => println!("{}", self.timed(message)),
            OutputMode::Quiet => println!("{message}"),
            OutputMode::Json => self.event("success", message, None, None),
        }
    }

    /// Print a warning. Shown in every mode.
    pub fn warning(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Warning: {message}"),
            OutputMode::Json => self.event("warning", message, None, None),
        }
    }

    /// Print an error and what to do about it.
    pub fn error(&self, message: &str, code: &str, suggestion: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => {
                eprintln!("Error: {message}");
                if !suggestion.is_empty() {
                    eprintln!("  Suggestion: {suggestion}");
                }
            }
            OutputMode::Json => self.event("error", message, Some(code), Some(suggestion)),
        }
    }

    /// Print discovered ssh config hosts as a table or JSON lines.
    pub fn hosts(&self, hosts: &[SshHostEntry]) {
        match self.mode {
            OutputMode::Json => {
                for host in hosts {
                    if let Ok(json) = serde_json::to_string(host) {
                        println!("{json}");
                    }
                }
            }
            OutputMode::Quiet => {
                for host in hosts {
                    println!("{}", host.alias);
                }
            }
            OutputMode::Normal => {
                if hosts.is_empty() {
                    eprintln!("No hosts found in ssh config");
                    return;
                }
                let width = hosts.iter().map(|h| h.alias.len()).max().unwrap_or(0);
                for host in hosts {
                    println!("{:<width$}  {}", host.alias, host.description());
                }
            }
        }
    }

    fn event(&self, event: &str, message: &str, code: Option<&str>, suggestion: Option<&str>) {
        let event = JsonEvent {
            event,
            message,
            code,
            suggestion,
            duration_secs: self.duration(),
        };
        if let Ok(json) = serde_json::to_string(&event) {
            if event.event == "error" {
                eprintln!("{json}");
            } else {
                println!("{json}");
            }
        }
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestion: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}
