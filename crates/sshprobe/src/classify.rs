//! Turning an execution result into a pass/fail verdict

use sshprobe_ssh::{ExecOutput, ExitStatus, Stage, TransportError, UNKNOWN_EXIT_CODE};
use std::fmt;

/// Message reported when the command ran and the output rules passed
pub const SUCCESS_MESSAGE: &str = "SSH Command has been Run Successfully!";

/// How an invocation ended, decided once at the execution boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Remote process reported a status (or died from a signal)
    ExitedWithCode(u32),
    /// Session closed without an exit status
    ExitStatusUnavailable,
    /// Connection, tunnel or channel failed before a status could arrive
    TransportFailure(Stage, String),
}

impl ProbeOutcome {
    /// Classify the raw result of one invocation
    pub fn from_result(result: &Result<ExecOutput, TransportError>) -> Self {
        match result {
            Ok(output) => match output.status {
                ExitStatus::Missing => ProbeOutcome::ExitStatusUnavailable,
                ref status => ProbeOutcome::ExitedWithCode(status.code()),
            },
            Err(e) => ProbeOutcome::TransportFailure(e.stage(), e.to_string()),
        }
    }

    /// Normalized exit code; `None` when the remote process was never reached
    pub fn exit_code(&self) -> Option<u32> {
        match self {
            ProbeOutcome::ExitedWithCode(code) => Some(*code),
            ProbeOutcome::ExitStatusUnavailable => Some(UNKNOWN_EXIT_CODE),
            ProbeOutcome::TransportFailure(..) => None,
        }
    }
}

/// Output rule that failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentMismatch {
    /// Required substring is absent
    Missing(String),
    /// Forbidden substring is present
    Forbidden(String),
}

impl fmt::Display for ContentMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentMismatch::Missing(s) => write!(f, "the output does not contain [{}]", s),
            ContentMismatch::Forbidden(s) => write!(f, "the output contains [{}]", s),
        }
    }
}

impl std::error::Error for ContentMismatch {}

/// Check `output` against the required and forbidden substrings.
///
/// Empty rules are ignored.
pub fn check_output(contain: &str, not_contain: &str, output: &str) -> Result<(), ContentMismatch> {
    if !contain.is_empty() && !output.contains(contain) {
        return Err(ContentMismatch::Missing(contain.to_string()));
    }
    if !not_contain.is_empty() && output.contains(not_contain) {
        return Err(ContentMismatch::Forbidden(not_contain.to_string()));
    }
    Ok(())
}

/// Output for log lines, with a marker in place of blank output
pub fn check_empty(output: &str) -> &str {
    if output.trim().is_empty() {
        "Empty!"
    } else {
        output
    }
}

/// Result of classifying one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Whether the probe passed
    pub success: bool,
    /// Human-readable explanation
    pub message: String,
    /// Normalized exit code; `None` for transport failures
    pub exit_code: Option<u32>,
}

/// Classify the result of one invocation against the output rules.
///
/// The exit code is always the one observed in this invocation: a content
/// mismatch after a clean exit reports 0.
pub fn classify(
    result: &Result<ExecOutput, TransportError>,
    contain: &str,
    not_contain: &str,
) -> Verdict {
    let outcome = ProbeOutcome::from_result(result);
    let exit_code = outcome.exit_code();

    let output = match result {
        Ok(output) => output,
        Err(e) => {
            return Verdict {
                success: false,
                message: e.to_string(),
                exit_code,
            }
        }
    };

    if !output.status.success() {
        return Verdict {
            success: false,
            message: format!("{} - {}", output.status, output.stderr_lossy()),
            exit_code,
        };
    }

    match check_output(contain, not_contain, &output.stdout_lossy()) {
        Ok(()) => Verdict {
            success: true,
            message: SUCCESS_MESSAGE.to_string(),
            exit_code,
        },
        Err(mismatch) => Verdict {
            success: false,
            message: format!("Error: {}", mismatch),
            exit_code,
        },
    }
}
