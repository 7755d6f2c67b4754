//! Remote command execution over a session channel

use crate::error::{Stage, TransportError};
use crate::handler::ClientHandler;
use bytes::{Bytes, BytesMut};
use russh::client::Handle;
use russh::ChannelMsg;
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Exit code reported when the remote side never sent an exit status
pub const UNKNOWN_EXIT_CODE: u32 = 255;

/// Base added to a signal number when a process dies from a signal
const SIGNAL_EXIT_BASE: u32 = 128;

/// How the remote process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    /// Process reported an `exit-status`
    Code(u32),
    /// Process was killed by a signal and reported `exit-signal` only
    Signal {
        /// Signal name without the `SIG` prefix
        name: String,
        /// `128 + signal number`
        code: u32,
    },
    /// Channel closed without `exit-status` or `exit-signal`
    Missing,
}

impl ExitStatus {
    /// Normalized numeric exit code
    pub fn code(&self) -> u32 {
        match self {
            ExitStatus::Code(code) => *code,
            ExitStatus::Signal { code, .. } => *code,
            ExitStatus::Missing => UNKNOWN_EXIT_CODE,
        }
    }

    /// Whether the process exited with status 0
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Code(0))
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Code(code) => write!(f, "Process exited with status {}", code),
            ExitStatus::Signal { name, code } => {
                write!(f, "Process exited with status {} from signal {}", code, name)
            }
            ExitStatus::Missing => {
                f.write_str("wait: remote command exited without exit status or exit signal")
            }
        }
    }
}

/// Everything a finished command produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// Captured standard output
    pub stdout: Bytes,
    /// Captured standard error
    pub stderr: Bytes,
    /// Exit status
    pub status: ExitStatus,
}

impl ExecOutput {
    /// Standard output as text
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Standard error as text
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Combined byte length of stdout and stderr
    pub fn output_len(&self) -> usize {
        self.stdout.len() + self.stderr.len()
    }
}

/// Join a command and its arguments into one shell line
pub fn command_line(command: &str, args: &[String]) -> String {
    let mut line = command.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// Build the line sent to the server.
///
/// Environment assignments become `export` statements in front of the
/// command, so they reach the process even where the server refuses
/// `env` channel requests.
pub fn render_command_line(env: &[String], command: &str, args: &[String]) -> String {
    let mut line = String::new();
    for assignment in env {
        line.push_str("export ");
        line.push_str(assignment);
        line.push(';');
    }
    line.push_str(&command_line(command, args));
    line
}

/// Exit code for a process killed by `signal`
pub fn signal_exit_code(signal: &str) -> u32 {
    let number = match signal.trim_start_matches("SIG") {
        "HUP" => 1,
        "INT" => 2,
        "QUIT" => 3,
        "ILL" => 4,
        "ABRT" => 6,
        "FPE" => 8,
        "KILL" => 9,
        "USR1" => 10,
        "SEGV" => 11,
        "USR2" => 12,
        "PIPE" => 13,
        "ALRM" => 14,
        "TERM" => 15,
        _ => 0,
    };
    SIGNAL_EXIT_BASE + number
}

/// Accumulates channel messages until the channel closes
#[derive(Debug, Default)]
pub struct OutputCollector {
    stdout: BytesMut,
    stderr: BytesMut,
    exit_code: Option<u32>,
    signal: Option<String>,
}

impl OutputCollector {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Append standard output
    pub fn push_stdout(&mut self, data: &[u8]) {
        self.stdout.extend_from_slice(data);
    }

    /// Append standard error
    pub fn push_stderr(&mut self, data: &[u8]) {
        self.stderr.extend_from_slice(data);
    }

    /// Record an `exit-status` message
    pub fn set_exit_status(&mut self, code: u32) {
        self.exit_code = Some(code);
    }

    /// Record an `exit-signal` message
    pub fn set_exit_signal(&mut self, name: impl Into<String>) {
        self.signal = Some(name.into());
    }

    /// Feed one channel message
    pub fn handle(&mut self, msg: ChannelMsg) {
        match msg {
            ChannelMsg::Data { ref data } => self.push_stdout(data),
            ChannelMsg::ExtendedData { ref data, ext } => {
                if ext == 1 {
                    self.push_stderr(data);
                }
            }
            // exit-status may arrive before the remaining data, keep reading
            ChannelMsg::ExitStatus { exit_status } => self.set_exit_status(exit_status),
            ChannelMsg::ExitSignal { signal_name, .. } => {
                self.set_exit_signal(signal_label(&signal_name))
            }
            other => trace!("Ignoring channel message: {:?}", other),
        }
    }

    /// Finish collection and decide the exit status
    pub fn finish(self) -> ExecOutput {
        let status = match (self.exit_code, self.signal) {
            (Some(code), _) => ExitStatus::Code(code),
            (None, Some(name)) => {
                let code = signal_exit_code(&name);
                ExitStatus::Signal { name, code }
            }
            (None, None) => ExitStatus::Missing,
        };

        ExecOutput {
            stdout: self.stdout.freeze(),
            stderr: self.stderr.freeze(),
            status,
        }
    }
}

fn signal_label(signal: &russh::Sig) -> String {
    match signal {
        russh::Sig::Custom(name) => name.clone(),
        other => format!("{:?}", other),
    }
}

/// Run `line` on a fresh session channel of `handle`.
///
/// Opens exactly one channel and closes it before returning. There is no
/// deadline on the command itself; `cancel` is the only way to abandon a
/// command that never finishes.
pub(crate) async fn run_session(
    handle: &Handle<ClientHandler>,
    line: &str,
    cancel: &CancellationToken,
) -> Result<ExecOutput, TransportError> {
    let stage = Stage::Server;
    let channel_error = |source| TransportError::Channel { stage, source };

    let mut channel = tokio::select! {
        _ = cancel.cancelled() => return Err(TransportError::Cancelled { stage }),
        channel = handle.channel_open_session() => channel.map_err(channel_error)?,
    };

    debug!("Executing remote command: {}", line);
    if let Err(e) = channel.exec(true, line).await {
        let _ = channel.close().await;
        return Err(channel_error(e));
    }

    let mut collector = OutputCollector::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = channel.close().await;
                return Err(TransportError::Cancelled { stage });
            }
            msg = channel.wait() => match msg {
                Some(msg) => collector.handle(msg),
                None => break,
            },
        }
    }

    let output = collector.finish();
    debug!(
        "Remote command finished: {} ({} bytes stdout, {} bytes stderr)",
        output.status,
        output.stdout.len(),
        output.stderr.len()
    );
    Ok(output)
}
