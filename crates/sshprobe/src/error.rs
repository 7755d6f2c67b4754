//! Error types for the sshprobe library

use sshprobe_ssh::{ConfigError, ResolveError, TransportError};
use thiserror::Error;

/// Main error type for probe configuration and invocation
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Probe can never run with this configuration
    #[error("[{kind} / {name}] configuration error: {source}")]
    Config {
        /// Probe kind
        kind: String,
        /// Probe name
        name: String,
        /// Cause
        #[source]
        source: ConfigError,
    },

    /// Target host could not be turned into an address
    #[error("[{kind} / {name}] cannot resolve [{host}]: {source}")]
    Resolve {
        /// Probe kind
        kind: String,
        /// Probe name
        name: String,
        /// The configured host string
        host: String,
        /// Cause
        #[source]
        source: ResolveError,
    },

    /// Dial, handshake, tunnel or channel failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Probe was invoked before `configure` succeeded
    #[error("[{kind} / {name}] probe is not configured")]
    NotConfigured {
        /// Probe kind
        kind: String,
        /// Probe name
        name: String,
    },
}
