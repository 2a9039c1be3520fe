use crate::clients::Appliance;
use crate::error::AgentResult;
use crate::provider::{LiveProvider, ResolvedEndpoint};
use crate::wait::WaitSettings;
use agent_common::credentials::CredentialStore;
use log::trace;
use provsys_model::ProviderDescriptor;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Turns collection-time descriptors into live providers bound to one appliance.
#[derive(Clone)]
pub struct ProviderFactory {
    appliance: Arc<dyn Appliance>,
    credentials: Arc<CredentialStore>,
    wait: WaitSettings,
}

impl ProviderFactory {
    pub fn new(appliance: Arc<dyn Appliance>, credentials: Arc<CredentialStore>) -> Self {
        Self {
            appliance,
            credentials,
            wait: WaitSettings::default(),
        }
    }

    pub fn with_wait_settings(mut self, wait: WaitSettings) -> Self {
        self.wait = wait;
        self
    }

    pub fn appliance(&self) -> &Arc<dyn Appliance> {
        &self.appliance
    }

    /// Resolve every endpoint of `descriptor`, including secondary ones such as `events`, `ssh`,
    /// `candu` and `metrics`. Fails if an endpoint names a credential the store does not have.
    pub fn materialize(&self, descriptor: Arc<ProviderDescriptor>) -> AgentResult<LiveProvider> {
        let mut endpoints = BTreeMap::new();
        for (name, endpoint) in descriptor.endpoints() {
            let credential = match &endpoint.credentials {
                Some(reference) => Some(self.credentials.get(reference)?.clone()),
                None => None,
            };
            trace!("Resolved endpoint '{}' of '{}'", name, descriptor.key());
            endpoints.insert(
                name.clone(),
                ResolvedEndpoint {
                    name: name.clone(),
                    hostname: endpoint
                        .hostname
                        .clone()
                        .or_else(|| endpoint.ipaddress.clone()),
                    port: endpoint.api_port,
                    settings: endpoint.settings.clone(),
                    credential,
                },
            );
        }
        Ok(LiveProvider::new(
            descriptor,
            endpoints,
            Arc::clone(&self.appliance),
            self.wait,
        ))
    }
}
