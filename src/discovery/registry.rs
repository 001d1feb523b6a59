//! In-process service registries.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::config::ServiceConfig;
use crate::discovery::{DiscoveryError, ServiceDiscovery};
use crate::load_balancer::Endpoint;

/// Registry fixed at configuration time.
#[derive(Debug, Default)]
pub struct StaticServiceDiscovery {
    services: HashMap<String, Arc<Vec<Endpoint>>>,
}

impl StaticServiceDiscovery {
    pub fn from_config(services: &[ServiceConfig]) -> Self {
        let services = services
            .iter()
            .map(|s| (s.name.clone(), Arc::new(s.endpoints.clone())))
            .collect();
        Self { services }
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[async_trait]
impl ServiceDiscovery for StaticServiceDiscovery {
    async fn resolve(&self, service: &str) -> Result<Vec<Endpoint>, DiscoveryError> {
        self.services
            .get(service)
            .map(|endpoints| endpoints.as_ref().clone())
            .ok_or_else(|| DiscoveryError::UnknownService(service.to_string()))
    }
}

/// Registry whose snapshots are pushed by an external collaborator.
#[derive(Debug, Default)]
pub struct InMemoryServiceDiscovery {
    services: DashMap<String, Arc<Vec<Endpoint>>>,
}

impl InMemoryServiceDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the endpoint snapshot for a service.
    pub fn publish(&self, service: impl Into<String>, endpoints: Vec<Endpoint>) {
        let service = service.into();
        tracing::debug!(service = %service, count = endpoints.len(), "Service endpoints published");
        self.services.insert(service, Arc::new(endpoints));
    }

    /// Forget a service entirely.
    pub fn withdraw(&self, service: &str) {
        self.services.remove(service);
    }
}

#[async_trait]
impl ServiceDiscovery for InMemoryServiceDiscovery {
    async fn resolve(&self, service: &str) -> Result<Vec<Endpoint>, DiscoveryError> {
        self.services
            .get(service)
            .map(|endpoints| endpoints.as_ref().clone())
            .ok_or_else(|| DiscoveryError::UnknownService(service.to_string()))
    }
}
