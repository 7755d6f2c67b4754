//! # sshprobe CLI
//!
//! Loads a JSON configuration, configures every server probe and runs each
//! of them once.

#![warn(missing_docs)]

/// Configuration file
pub mod config;

/// Probe construction and concurrent execution
pub mod runner;

pub use config::{AppConfig, DEFAULT_CONFIG_PATH};
pub use runner::{build_probes, run_all, summary_line};
