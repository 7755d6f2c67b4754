//! sshprobe binary
//!
//! Runs every configured SSH probe once and reports the results.

use anyhow::Result;
use sshprobe::ssh::CancellationToken;
use sshprobe_cli::{build_probes, run_all, summary_line, AppConfig, DEFAULT_CONFIG_PATH};
use std::path::PathBuf;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    info!("Loading configuration from {}", path.display());
    let config = AppConfig::load(&path)?;

    let probes = build_probes(config);
    if probes.is_empty() {
        error!("No probe could be configured");
        std::process::exit(1);
    }
    info!("Running {} probe(s)", probes.len());

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling probes");
                cancel.cancel();
            }
        })
    };

    let results = run_all(probes, cancel).await;
    interrupt.abort();

    for result in &results {
        println!("{}", summary_line(result));
    }

    let failed = results.iter().filter(|r| !r.is_up()).count();
    info!("{} probe(s) run, {} failed", results.len(), failed);
    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}
