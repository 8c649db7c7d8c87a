// ABOUTME: SSH client module for remote hosts.
// ABOUTME: Resolves targets, builds the auth chain, verifies host keys, and runs commands.

mod agent;
mod auth;
mod client;
mod error;
mod exec;
mod known_hosts;
mod resolve;

pub use agent::{SharedAgent, shared_agent};
pub use auth::{AuthChain, AuthMethod, DEFAULT_KEY_NAMES, build_auth};
pub use client::{
    Client, DialOptions, ENV_INSECURE_IGNORE_HOST_KEY, ENV_SSH_KEY, ENV_SSH_USER,
};
pub use error::{Error, HostKeyMismatch, Result};
pub use exec::{EXIT_FORCE_CLOSED, EXIT_INTERRUPTED, ExecOutput, PTY_COLS, PTY_ROWS};
pub use known_hosts::{HostKeyChecking, HostKeyVerifier};
pub use resolve::{ResolvedSettings, resolve};
