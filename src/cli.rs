// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Run commands and sync files on remote hosts over SSH")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Settings file (default: ~/.config/tether/config.yml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Only print results
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Print JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a command and print its output when it finishes
    Exec {
        /// host, user@host, host:port, user@host:port, or an ssh config alias
        target: String,
        /// Command to run
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Run a command and stream its output; Ctrl-C interrupts it
    Run {
        target: String,
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Run a command under a pseudo-terminal
    Pty {
        target: String,
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Open an interactive shell
    Shell { target: String },

    /// List hosts defined in the ssh config
    Hosts,

    /// Copy a text file to the remote host
    Push {
        target: String,
        /// Local file to copy
        local: PathBuf,
        /// Destination path on the remote host
        remote: String,
    },

    /// Show the remote operating system and architecture
    Info { target: String },
}
