//! # sshprobe SSH Transport
//!
//! SSH transport layer for sshprobe: endpoints, direct and bastion-relayed
//! connections, and single-command execution.

#![warn(missing_docs)]

/// SSH-specific error types
pub mod error;

/// Remote endpoints and credentials
pub mod endpoint;

/// russh client callbacks
pub mod handler;

/// Live connection lifetime
pub mod connection;

/// Transport abstraction and implementations
pub mod transport;

/// Remote command execution
pub mod exec;

pub use connection::{Connection, LiveConnection};
pub use endpoint::{AuthConfig, Endpoint, HostAddr, DEFAULT_PORT, DEFAULT_USER};
pub use error::{ConfigError, ResolveError, Stage, TransportError};
pub use exec::{
    command_line, render_command_line, ExecOutput, ExitStatus, OutputCollector, UNKNOWN_EXIT_CODE,
};
pub use handler::ClientHandler;
pub use transport::{Linger, Route, SshTransport, Transport};

pub use tokio_util::sync::CancellationToken;
