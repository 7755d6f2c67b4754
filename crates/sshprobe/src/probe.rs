//! SSH command probe

use crate::base::{duration_secs, Configurable, ProbeBase, ProbeResult, ProbeSettings, Probeable};
use crate::bastion::BastionRegistry;
use crate::classify::{check_empty, classify, Verdict};
use crate::error::ProbeError;
use crate::metrics::{MetricsFacade, MetricsSink};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sshprobe_ssh::{
    command_line, render_command_line, CancellationToken, Endpoint, ExecOutput, Route,
    SshTransport, Transport,
};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, error, info_span, warn, Instrument};
use uuid::Uuid;


/// Probe kind, used in log context and metric names
pub const KIND: &str = "ssh";

/// One `servers` entry of the configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SshProbeConfig {
    /// Probe name
    pub name: String,

    /// Target host and credentials
    #[serde(flatten)]
    pub endpoint: Endpoint,

    /// Remote command
    #[serde(rename = "cmd")]
    pub command: String,

    /// Command arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// `NAME=VALUE` assignments exported before the command
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,

    /// Substring stdout must contain
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub contain: String,

    /// Substring stdout must not contain
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub not_contain: String,

    /// Bastion identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bastion: Option<String>,

    /// Dial+handshake timeout in seconds; 0 uses the global setting
    #[serde(default, with = "duration_secs")]
    pub timeout: Duration,

    /// Interval in seconds; 0 uses the global setting
    #[serde(default, with = "duration_secs")]
    pub interval: Duration,
}

impl SshProbeConfig {
    /// Config for `name` running `command` on `endpoint`
    pub fn new(name: impl Into<String>, endpoint: Endpoint, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint,
            command: command.into(),
            ..Default::default()
        }
    }

    /// Set the command arguments
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the environment assignments
    pub fn with_env<I, S>(mut self, env: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.env = env.into_iter().map(Into::into).collect();
        self
    }

    /// Require `contain` in stdout
    pub fn with_contain(mut self, contain: impl Into<String>) -> Self {
        self.contain = contain.into();
        self
    }

    /// Forbid `not_contain` in stdout
    pub fn with_not_contain(mut self, not_contain: impl Into<String>) -> Self {
        self.not_contain = not_contain.into();
        self
    }

    /// Relay through the bastion registered as `id`
    pub fn with_bastion(mut self, id: impl Into<String>) -> Self {
        self.bastion = Some(id.into());
        self
    }

    /// Set the per-probe timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Runs one remote command per invocation and classifies the result
pub struct SshProbe {
    endpoint: Endpoint,
    command: String,
    args: Vec<String>,
    env: Vec<String>,
    contain: String,
    not_contain: String,
    bastion_id: Option<String>,
    bastion: Option<Arc<Endpoint>>,
    base: ProbeBase,
    transport: Arc<dyn Transport>,
    metrics: Arc<dyn MetricsSink>,
    configured: bool,
    exit_code: Option<u32>,
    output_len: usize,
}

impl SshProbe {
    /// Probe over [`SshTransport`] reporting through the `metrics` facade
    pub fn new(config: SshProbeConfig) -> Self {
        let base = ProbeBase::new(KIND, config.name)
            .with_timeout(config.timeout)
            .with_interval(config.interval);
        Self {
            endpoint: config.endpoint,
            command: config.command,
            args: config.args,
            env: config.env,
            contain: config.contain,
            not_contain: config.not_contain,
            bastion_id: config.bastion.filter(|id| !id.is_empty()),
            bastion: None,
            base,
            transport: Arc::new(SshTransport::new()),
            metrics: Arc::new(MetricsFacade::new(KIND)),
            configured: false,
            exit_code: None,
            output_len: 0,
        }
    }

    /// Use another transport
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Report to another metrics sink
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Target endpoint
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Bastion the probe relays through, if one was found at configuration
    pub fn bastion(&self) -> Option<&Endpoint> {
        self.bastion.as_deref()
    }

    /// Lifecycle bookkeeping
    pub fn base(&self) -> &ProbeBase {
        &self.base
    }

    /// Exit code of the last invocation; `None` if the command never ran
    pub fn exit_code(&self) -> Option<u32> {
        self.exit_code
    }

    /// Combined stdout and stderr length of the last invocation
    pub fn output_len(&self) -> usize {
        self.output_len
    }

    /// Line sent to the server
    pub fn command_line(&self) -> String {
        render_command_line(&self.env, &self.command, &self.args)
    }

    /// Run one invocation and classify it.
    ///
    /// Command execution has no deadline; only dial and handshake are bounded
    /// by the timeout. A hung command holds the invocation until `cancel`
    /// fires.
    pub async fn do_probe(&mut self, cancel: &CancellationToken) -> Verdict {
        let span = info_span!(
            "probe",
            kind = %self.base.kind(),
            name = %self.base.name(),
            invocation = %Uuid::new_v4()
        );
        self.invoke(cancel).instrument(span).await
    }

    async fn invoke(&mut self, cancel: &CancellationToken) -> Verdict {
        let result = match self.execute(cancel).await {
            Ok(output) => Ok(output),
            Err(ProbeError::Transport(e)) => Err(e),
            Err(e) => {
                error!("{}", e);
                return Verdict {
                    success: false,
                    message: e.to_string(),
                    exit_code: None,
                };
            }
        };
        self.output_len = result.as_ref().map_or(0, ExecOutput::output_len);

        let verdict = classify(&result, &self.contain, &self.not_contain);
        self.exit_code = verdict.exit_code;
        if !verdict.success {
            error!(
                "[{} / {}] {}",
                self.base.kind(),
                self.base.name(),
                verdict.message
            );
        }

        debug!(
            "[{} / {}] - {}",
            self.base.kind(),
            self.base.name(),
            command_line(&self.command, &self.args)
        );
        if let Ok(output) = &result {
            debug!(
                "[{} / {}] - {}",
                self.base.kind(),
                self.base.name(),
                check_empty(&output.stdout_lossy())
            );
        }

        self.export_metrics();
        verdict
    }

    /// Connect, run the command line and close the connection on every path.
    ///
    /// Fails with [`ProbeError::NotConfigured`] before a successful
    /// [`Configurable::configure`].
    pub async fn execute(&self, cancel: &CancellationToken) -> Result<ExecOutput, ProbeError> {
        if !self.configured {
            return Err(ProbeError::NotConfigured {
                kind: self.base.kind().to_string(),
                name: self.base.name().to_string(),
            });
        }

        let timeout = self.base.timeout();
        let route = match self.bastion.as_deref() {
            Some(bastion) => Route::via(&self.endpoint, bastion, timeout),
            None => Route::direct(&self.endpoint, timeout),
        };

        let mut conn = self.transport.connect(route, cancel).await?;
        let line = self.command_line();
        debug!("[{} / {}] running [{}]", self.base.kind(), self.base.name(), line);

        let result = conn.run(&line, cancel).await;
        conn.close().await;
        Ok(result?)
    }

    fn export_metrics(&self) {
        let name = self.base.name();
        self.metrics.record_exit(name, self.exit_code);
        self.metrics
            .record_output_len(name, self.exit_code, self.output_len);
    }
}

impl Configurable for SshProbe {
    fn configure(
        &mut self,
        settings: &ProbeSettings,
        registry: &BastionRegistry,
    ) -> Result<(), ProbeError> {
        self.configured = false;
        let kind = self.base.kind().to_string();
        let name = self.base.name().to_string();
        self.base
            .configure(settings, command_line(&self.command, &self.args));

        self.endpoint
            .validate_credentials()
            .map_err(|source| ProbeError::Config {
                kind: kind.clone(),
                name: name.clone(),
                source,
            })?;

        self.bastion = None;
        if let Some(id) = self.bastion_id.as_deref() {
            match registry.lookup(id) {
                Some(bastion) => {
                    debug!("[{} / {}] - has the bastion [{}]", kind, name, bastion.host);
                    self.bastion = Some(bastion);
                }
                None => warn!("[{} / {}] - wrong bastion [{}]", kind, name, id),
            }
        }

        let resolved = self.endpoint.resolve().map(|_| ());
        if let Err(source) = resolved {
            return Err(ProbeError::Resolve {
                kind,
                name,
                host: self.endpoint.host.clone(),
                source,
            });
        }

        debug!("[{}] configuration: {:?}, {:?}", kind, self, self.base.result());
        self.configured = true;
        Ok(())
    }
}

#[async_trait]
impl Probeable for SshProbe {
    fn kind(&self) -> &str {
        self.base.kind()
    }

    fn name(&self) -> &str {
        self.base.name()
    }

    fn result(&self) -> &ProbeResult {
        self.base.result()
    }

    async fn probe(&mut self, cancel: &CancellationToken) -> ProbeResult {
        let start_time = SystemTime::now();
        let started = Instant::now();
        let verdict = self.do_probe(cancel).await;
        self.base
            .record(start_time, started.elapsed(), verdict.success, verdict.message)
            .clone()
    }
}

impl fmt::Debug for SshProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshProbe")
            .field("endpoint", &self.endpoint)
            .field("command", &self.command)
            .field("args", &self.args)
            .field("env", &self.env)
            .field("contain", &self.contain)
            .field("not_contain", &self.not_contain)
            .field("bastion_id", &self.bastion_id)
            .field("bastion", &self.bastion.as_ref().map(|b| &b.host))
            .field("timeout", &self.base.timeout())
            .field("configured", &self.configured)
            .finish()
    }
}
