//! Test targets taken from environment variables

use anyhow::{bail, Result};
use sshprobe::ssh::Endpoint;
use std::env;

/// Variable prefix for the target host
pub const TARGET_PREFIX: &str = "SSHPROBE_TEST";

/// Variable prefix for the bastion host
pub const BASTION_PREFIX: &str = "SSHPROBE_TEST_BASTION";

/// Read `{prefix}_HOST`, `{prefix}_USER`, `{prefix}_PASSWORD` and `{prefix}_KEY`.
///
/// Returns `None` when `{prefix}_HOST` is unset.
pub fn endpoint_from_env(prefix: &str) -> Result<Option<Endpoint>> {
    let host = match env::var(format!("{}_HOST", prefix)) {
        Ok(host) if !host.is_empty() => host,
        _ => return Ok(None),
    };

    let mut endpoint = Endpoint::new(host);
    if let Ok(user) = env::var(format!("{}_USER", prefix)) {
        endpoint = endpoint.with_user(user);
    }
    if let Ok(password) = env::var(format!("{}_PASSWORD", prefix)) {
        endpoint = endpoint.with_password(password);
    }
    if let Ok(key) = env::var(format!("{}_KEY", prefix)) {
        endpoint = endpoint.with_private_key(key);
    }

    if !endpoint.has_credentials() {
        bail!("{}_HOST is set but neither {}_PASSWORD nor {}_KEY is", prefix, prefix, prefix);
    }
    Ok(Some(endpoint))
}

/// The target endpoint, or `None` to skip
pub fn target() -> Result<Option<Endpoint>> {
    endpoint_from_env(TARGET_PREFIX)
}

/// The bastion endpoint, or `None` to skip relayed tests
pub fn bastion() -> Result<Option<Endpoint>> {
    endpoint_from_env(BASTION_PREFIX)
}
