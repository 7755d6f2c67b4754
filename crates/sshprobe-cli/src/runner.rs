//! Probe construction and concurrent execution

use crate::config::AppConfig;
use sshprobe::ssh::CancellationToken;
use sshprobe::{BastionRegistry, Configurable, ProbeResult, Probeable, SshProbe};
use tokio::task::JoinSet;
use tracing::{error, info};

/// Build the registry and configure every server.
///
/// Servers that fail configuration are logged and left out.
pub fn build_probes(config: AppConfig) -> Vec<SshProbe> {
    let registry = BastionRegistry::load(config.bastion);
    info!("{} bastion host(s) available", registry.len());

    let mut probes = Vec::with_capacity(config.servers.len());
    for server in config.servers {
        let mut probe = SshProbe::new(server);
        match probe.configure(&config.settings, &registry) {
            Ok(()) => probes.push(probe),
            Err(e) => error!("{}", e),
        }
    }
    probes
}

/// Run every probe once, concurrently, and collect the results by name
pub async fn run_all<P>(probes: Vec<P>, cancel: CancellationToken) -> Vec<ProbeResult>
where
    P: Probeable + 'static,
{
    let mut tasks = JoinSet::new();
    for mut probe in probes {
        let cancel = cancel.clone();
        tasks.spawn(async move { probe.probe(&cancel).await });
    }

    let mut results = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => error!("Probe task failed: {}", e),
        }
    }
    results.sort_by(|a, b| a.name.cmp(&b.name));
    results
}

/// One line per probe for the final report
pub fn summary_line(result: &ProbeResult) -> String {
    format!(
        "[{}] {} ({}) {:?} - {}",
        result.status, result.name, result.endpoint, result.round_trip, result.message
    )
}
