//! Named bastion hosts shared by probes

use sshprobe_ssh::Endpoint;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Bastion identifier to endpoint mapping.
///
/// Built once at configuration time and handed to each probe explicitly.
/// Every entry has a resolved address.
#[derive(Debug, Clone, Default)]
pub struct BastionRegistry {
    entries: HashMap<String, Arc<Endpoint>>,
}

impl BastionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve every entry, dropping (and logging) those that fail
    pub fn load<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Endpoint)>,
    {
        let mut registry = Self::new();
        for (id, endpoint) in entries {
            registry.insert(id, endpoint);
        }
        registry
    }

    /// Resolve and add one entry; returns whether it was kept
    pub fn insert(&mut self, id: impl Into<String>, mut endpoint: Endpoint) -> bool {
        let id = id.into();
        match endpoint.resolve() {
            Ok(address) => {
                debug!("Bastion [{}] resolved to {}", id, address);
                self.entries.insert(id, Arc::new(endpoint));
                true
            }
            Err(e) => {
                error!("Bastion Host error: [{} / {}] - {}", id, endpoint.host, e);
                self.entries.remove(&id);
                false
            }
        }
    }

    /// Look up a bastion by identifier
    pub fn lookup(&self, id: &str) -> Option<Arc<Endpoint>> {
        self.entries.get(id).cloned()
    }

    /// Whether `id` is registered
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of usable bastions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no bastion survived loading
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered identifiers
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
