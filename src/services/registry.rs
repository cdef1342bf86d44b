// ABOUTME: Registry mapping service names to their collaborator implementations.
// ABOUTME: Replaces per-service string branching with a single lookup table.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::command::CommandService;
use super::ops::ServiceOps;
use crate::config::Config;
use crate::types::ServiceName;

/// Name-keyed set of service collaborators.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: BTreeMap<ServiceName, Arc<dyn ServiceOps>>,
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.services.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build command-backed collaborators for every configured service.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        for service in &config.services {
            registry.register(Arc::new(CommandService::new(
                service.clone(),
                config.verification.attempt_timeout,
            )));
        }
        registry
    }

    /// Register a collaborator under its own name, replacing any previous one.
    pub fn register(&mut self, service: Arc<dyn ServiceOps>) -> &mut Self {
        self.services.insert(service.name().clone(), service);
        self
    }

    pub fn get(&self, name: &ServiceName) -> Option<Arc<dyn ServiceOps>> {
        self.services.get(name).cloned()
    }

    pub fn contains(&self, name: &ServiceName) -> bool {
        self.services.contains_key(name)
    }

    /// Service names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &ServiceName> {
        self.services.keys()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
