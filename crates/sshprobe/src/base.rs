//! Probe lifecycle shared by every probe kind

use crate::bastion::BastionRegistry;
use crate::error::ProbeError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sshprobe_ssh::CancellationToken;
use std::fmt;
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Default dial+handshake timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default interval between invocations
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Global probe settings, overridable per probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSettings {
    /// Timeout in seconds
    #[serde(default = "default_timeout", with = "duration_secs")]
    pub timeout: Duration,
    /// Interval in seconds
    #[serde(default = "default_interval", with = "duration_secs")]
    pub interval: Duration,
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl ProbeSettings {
    /// Set the global timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the global interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// `local` unless it is zero, in which case the global timeout
    pub fn timeout_for(&self, local: Duration) -> Duration {
        if local.is_zero() {
            self.timeout
        } else {
            local
        }
    }

    /// `local` unless it is zero, in which case the global interval
    pub fn interval_for(&self, local: Duration) -> Duration {
        if local.is_zero() {
            self.interval
        } else {
            local
        }
    }
}

/// Serde helper storing a [`Duration`] as whole seconds
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize as seconds
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    /// Deserialize from seconds
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Probe health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    /// Never probed
    #[default]
    Init,
    /// Last invocation passed
    Up,
    /// Last invocation failed
    Down,
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeStatus::Init => f.write_str("init"),
            ProbeStatus::Up => f.write_str("up"),
            ProbeStatus::Down => f.write_str("down"),
        }
    }
}

/// Running counters across invocations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeStats {
    /// Invocations so far
    pub total: u64,
    /// Invocations that passed
    pub up: u64,
    /// Invocations that failed
    pub down: u64,
}

/// Latest outcome of a probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Probe name
    pub name: String,
    /// What is probed, for display
    pub endpoint: String,
    /// Current status
    pub status: ProbeStatus,
    /// Status before the last invocation
    pub previous_status: ProbeStatus,
    /// Explanation from the last invocation
    pub message: String,
    /// When the last invocation started
    pub start_time: SystemTime,
    /// How long the last invocation took
    pub round_trip: Duration,
    /// Counters
    pub stats: ProbeStats,
}

impl ProbeResult {
    /// Fresh result in `Init` state
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            status: ProbeStatus::Init,
            previous_status: ProbeStatus::Init,
            message: String::new(),
            start_time: SystemTime::UNIX_EPOCH,
            round_trip: Duration::ZERO,
            stats: ProbeStats::default(),
        }
    }

    /// Whether the last invocation passed
    pub fn is_up(&self) -> bool {
        self.status == ProbeStatus::Up
    }

    /// Whether the status changed in the last invocation
    pub fn status_changed(&self) -> bool {
        self.status != self.previous_status
    }
}

/// Naming, timing and result bookkeeping owned by a probe
#[derive(Debug, Clone)]
pub struct ProbeBase {
    kind: String,
    name: String,
    endpoint: String,
    timeout: Duration,
    interval: Duration,
    result: ProbeResult,
}

impl ProbeBase {
    /// Unconfigured base with zero (inherit) timeout and interval
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            kind: kind.into(),
            result: ProbeResult::new(name.clone(), String::new()),
            name,
            endpoint: String::new(),
            timeout: Duration::ZERO,
            interval: Duration::ZERO,
        }
    }

    /// Set per-probe timeout; zero inherits the global one
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set per-probe interval; zero inherits the global one
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Apply global settings and set the display endpoint
    pub fn configure(&mut self, settings: &ProbeSettings, endpoint: impl Into<String>) {
        self.endpoint = endpoint.into();
        self.timeout = settings.timeout_for(self.timeout);
        self.interval = settings.interval_for(self.interval);
        self.result.endpoint = self.endpoint.clone();
        debug!(
            "[{} / {}] timeout {:?}, interval {:?}",
            self.kind, self.name, self.timeout, self.interval
        );
    }

    /// Probe kind
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Probe name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display endpoint
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Effective timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Effective interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Latest result
    pub fn result(&self) -> &ProbeResult {
        &self.result
    }

    /// Store the outcome of one invocation
    pub fn record(
        &mut self,
        start_time: SystemTime,
        round_trip: Duration,
        success: bool,
        message: impl Into<String>,
    ) -> &ProbeResult {
        let result = &mut self.result;
        result.previous_status = result.status;
        result.status = if success {
            ProbeStatus::Up
        } else {
            ProbeStatus::Down
        };
        result.message = message.into();
        result.start_time = start_time;
        result.round_trip = round_trip;
        result.stats.total += 1;
        if success {
            result.stats.up += 1;
        } else {
            result.stats.down += 1;
        }
        result
    }
}

/// A probe that can be prepared from settings and a bastion registry
pub trait Configurable {
    /// Validate and resolve everything needed before the first invocation
    fn configure(
        &mut self,
        settings: &ProbeSettings,
        registry: &BastionRegistry,
    ) -> Result<(), ProbeError>;
}

/// A probe that can be invoked
#[async_trait]
pub trait Probeable: Send {
    /// Probe kind
    fn kind(&self) -> &str;

    /// Probe name
    fn name(&self) -> &str;

    /// Latest result
    fn result(&self) -> &ProbeResult;

    /// Run one invocation and return the updated result
    async fn probe(&mut self, cancel: &CancellationToken) -> ProbeResult;
}
