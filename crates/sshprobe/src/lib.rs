//! # sshprobe
//!
//! SSH command probes: connect to a host directly or through a bastion, run
//! one command and turn the exit status and output into a pass/fail result.
//!
//! Probes are configured against an explicit [`BastionRegistry`] and invoked
//! through the [`Probeable`] trait. Invocation is cancellable with a
//! [`CancellationToken`](ssh::CancellationToken).

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use sshprobe_ssh as ssh;

/// Error types for the sshprobe library
pub mod error;

/// Named bastion hosts
pub mod bastion;

/// Probe lifecycle and settings
pub mod base;

/// Result classification
pub mod classify;

/// Metrics reporting
pub mod metrics;

/// The SSH command probe
pub mod probe;

pub use base::{Configurable, ProbeBase, ProbeResult, ProbeSettings, ProbeStatus, Probeable};
pub use bastion::BastionRegistry;
pub use classify::{classify, ProbeOutcome, Verdict};
pub use error::ProbeError;
pub use metrics::{MetricsFacade, MetricsSink, NoopMetrics};
pub use probe::{SshProbe, SshProbeConfig};

/// Result type alias for sshprobe operations
pub type Result<T> = std::result::Result<T, ProbeError>;
