mod error;

pub use self::error::{IntoProviderError, ProviderError, ProviderResult, Remnant};
use crate::clients::{
    Appliance, AuthenticationPayload, ConnectionConfiguration, EndpointPayload, Interface,
    ProviderPayload, ProviderStats, RefreshStatus,
};
use crate::wait::{wait_for, WaitSettings};
use agent_common::credentials::Credential;
use log::{debug, info};
use provsys_model::{Capabilities, ProviderClass, ProviderDescriptor};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex, PoisonError};

/// Where a live provider is in its lifecycle on the appliance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderState {
    Unconfigured,
    Configuring,
    Configured,
    Deleting,
    Deleted,
}

serde_plain::derive_display_from_serialize!(ProviderState);

/// An endpoint with its credential resolved from the credential store.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEndpoint {
    pub name: String,
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub settings: Map<String, Value>,
    pub credential: Option<Credential>,
}

impl ResolvedEndpoint {
    fn payload(&self) -> ConnectionConfiguration {
        ConnectionConfiguration {
            endpoint: EndpointPayload {
                role: self.name.clone(),
                hostname: self.hostname.clone(),
                port: self.port,
                settings: self.settings.clone(),
            },
            authentication: self.credential.as_ref().map(|c| AuthenticationPayload {
                role: self.name.clone(),
                userid: c.principal.clone(),
                password: c.secret.clone(),
            }),
        }
    }
}

/// A provider that can be created on, inspected on and removed from the appliance. It wraps an
/// immutable [`ProviderDescriptor`] with resolved endpoints and a handle to the appliance.
///
/// Which operations are available depends on the provider class's [`Capabilities`]; calling an
/// unsupported operation returns an error rather than doing nothing.
pub struct LiveProvider {
    descriptor: Arc<ProviderDescriptor>,
    endpoints: BTreeMap<String, ResolvedEndpoint>,
    appliance: Arc<dyn Appliance>,
    wait: WaitSettings,
    state: Mutex<ProviderState>,
}

impl Debug for LiveProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveProvider")
            .field("key", &self.key())
            .field("class", &self.class())
            .field("state", &self.state())
            .finish()
    }
}

impl LiveProvider {
    pub(crate) fn new(
        descriptor: Arc<ProviderDescriptor>,
        endpoints: BTreeMap<String, ResolvedEndpoint>,
        appliance: Arc<dyn Appliance>,
        wait: WaitSettings,
    ) -> Self {
        Self {
            descriptor,
            endpoints,
            appliance,
            wait,
            state: Mutex::new(ProviderState::Unconfigured),
        }
    }

    pub fn key(&self) -> &str {
        self.descriptor.key()
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn class(&self) -> ProviderClass {
        self.descriptor.class()
    }

    pub fn descriptor(&self) -> &Arc<ProviderDescriptor> {
        &self.descriptor
    }

    pub fn data(&self) -> &Value {
        self.descriptor.data()
    }

    pub fn region(&self) -> Option<&str> {
        self.descriptor.region()
    }

    pub fn endpoints(&self) -> &BTreeMap<String, ResolvedEndpoint> {
        &self.endpoints
    }

    pub fn appliance(&self) -> &Arc<dyn Appliance> {
        &self.appliance
    }

    pub fn capabilities(&self) -> Capabilities {
        self.class().capabilities()
    }

    pub fn state(&self) -> ProviderState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ProviderState) {
        let mut current = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != state {
            debug!("Provider '{}' is now {}", self.key(), state);
            *current = state;
        }
    }

    fn require(&self, capable: bool, operation: &str) -> ProviderResult<()> {
        if capable {
            Ok(())
        } else {
            Err(ProviderError::new_with_context(
                Remnant::Clear,
                format!(
                    "Provider '{}' of type '{}' does not support {}",
                    self.key(),
                    self.class(),
                    operation
                ),
            ))
        }
    }

    /// The request body that creates this provider on the appliance.
    pub fn payload(&self) -> ProviderPayload {
        ProviderPayload {
            db_type: self.class().db_types()[0].to_string(),
            name: self.name().to_string(),
            region: self.region().map(String::from),
            zone: self
                .data()
                .get("zone")
                .and_then(Value::as_str)
                .map(String::from),
            connection_configurations: self
                .endpoints
                .values()
                .map(ResolvedEndpoint::payload)
                .collect(),
        }
    }

    pub async fn exists(&self) -> ProviderResult<bool> {
        self.require(self.capabilities().exists, "existence checks")?;
        self.appliance
            .provider_exists(self.name())
            .await
            .context(
                Remnant::Unknown,
                format!("Unable to check whether provider '{}' exists", self.key()),
            )
    }

    async fn create_via(&self, via: Interface) -> ProviderResult<()> {
        self.set_state(ProviderState::Configuring);
        let result = self
            .appliance
            .create_provider(&self.payload(), via)
            .await
            .context(
                Remnant::Unknown,
                format!("Unable to create provider '{}' through the {}", self.key(), via),
            );
        match result {
            Ok(()) => {
                self.set_state(ProviderState::Configured);
                Ok(())
            }
            Err(e) => {
                self.set_state(ProviderState::Unconfigured);
                Err(e)
            }
        }
    }

    /// Create the provider through the UI.
    pub async fn create(&self) -> ProviderResult<()> {
        self.require(self.capabilities().create, "creation")?;
        self.create_via(Interface::Ui).await
    }

    pub async fn create_rest(&self) -> ProviderResult<()> {
        self.require(self.capabilities().create_rest, "creation through REST")?;
        self.create_via(Interface::Rest).await
    }

    async fn delete_via(&self, via: Interface) -> ProviderResult<()> {
        self.set_state(ProviderState::Deleting);
        self.appliance
            .delete_provider(self.name(), via)
            .await
            .context(
                Remnant::Remaining,
                format!("Unable to delete provider '{}' through the {}", self.key(), via),
            )
    }

    /// Delete the provider through the UI. Deletion finishes asynchronously, see
    /// [`LiveProvider::wait_for_delete`].
    pub async fn delete(&self) -> ProviderResult<()> {
        self.require(self.capabilities().delete, "deletion")?;
        self.delete_via(Interface::Ui).await
    }

    pub async fn delete_rest(&self) -> ProviderResult<()> {
        self.require(self.capabilities().delete, "deletion")?;
        self.delete_via(Interface::Rest).await
    }

    pub async fn wait_for_delete(&self) -> ProviderResult<()> {
        self.require(self.capabilities().wait_for_delete, "waiting for deletion")?;
        info!("Waiting for provider '{}' to disappear", self.key());
        let appliance = &self.appliance;
        let name = self.name();
        wait_for(
            &format!("provider '{}' to be deleted", self.key()),
            self.wait.delete_timeout,
            self.wait.delay,
            || async move { Ok(!appliance.provider_exists(name).await?) },
        )
        .await
        .context(Remnant::Remaining, "Provider was not deleted")?;
        self.set_state(ProviderState::Deleted);
        Ok(())
    }

    /// Delete the provider and wait for it to disappear, if it is on the appliance at all.
    pub async fn delete_if_exists(&self) -> ProviderResult<bool> {
        if !self.exists().await? {
            return Ok(false);
        }
        self.delete_rest().await?;
        self.wait_for_delete().await?;
        Ok(true)
    }

    pub async fn refresh_provider_relationships(&self) -> ProviderResult<()> {
        self.require(self.capabilities().refresh, "refreshing relationships")?;
        self.appliance
            .refresh_provider(self.name())
            .await
            .context(
                Remnant::Remaining,
                format!("Unable to refresh provider '{}'", self.key()),
            )
    }

    pub async fn refresh_status(&self) -> ProviderResult<RefreshStatus> {
        self.appliance
            .refresh_status(self.name())
            .await
            .context(
                Remnant::Remaining,
                format!("Unable to read the refresh status of '{}'", self.key()),
            )
    }

    /// Whether the appliance finished a refresh after `since` (the previous refresh date, if any)
    /// without recording an error.
    pub async fn is_refreshed(&self, since: Option<&str>) -> ProviderResult<bool> {
        let status = self.refresh_status().await?;
        if let Some(error) = status.last_refresh_error.as_deref() {
            if !error.is_empty() {
                debug!("Provider '{}' refresh error: {}", self.key(), error);
                return Ok(false);
            }
        }
        Ok(match (status.last_refresh_date.as_deref(), since) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(date), Some(since)) => date != since,
        })
    }

    /// Trigger a refresh and wait until the appliance reports it done.
    pub async fn wait_for_refresh(&self) -> ProviderResult<()> {
        let before = self.refresh_status().await?.last_refresh_date;
        self.refresh_provider_relationships().await?;
        let key = self.key().to_string();
        let since = before.as_deref();
        let appliance = &self.appliance;
        let name = self.name();
        wait_for(
            &format!("provider '{}' to refresh", key),
            self.wait.refresh_timeout,
            self.wait.delay,
            || async move {
                let status = appliance.refresh_status(name).await?;
                Ok(status.last_refresh_date.is_some()
                    && status.last_refresh_date.as_deref() != since
                    && status
                        .last_refresh_error
                        .as_deref()
                        .map(str::is_empty)
                        .unwrap_or(true))
            },
        )
        .await
        .context(Remnant::Remaining, "Provider was not refreshed")
    }

    /// The inventory counters the catalog expects, from the provider's `stats` section.
    pub fn expected_stats(&self) -> ProviderStats {
        self.data()
            .get("stats")
            .and_then(Value::as_object)
            .map(|stats| {
                stats
                    .iter()
                    .filter_map(|(k, v)| v.as_u64().map(|count| (k.clone(), count)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Check that the appliance's inventory counters match `expected`.
    pub async fn validate_stats(&self, expected: &ProviderStats) -> ProviderResult<()> {
        self.require(self.capabilities().validate_stats, "stats validation")?;
        let actual = self
            .appliance
            .provider_stats(self.name())
            .await
            .context(
                Remnant::Remaining,
                format!("Unable to read the stats of '{}'", self.key()),
            )?;
        let mismatches: Vec<String> = expected
            .iter()
            .filter(|(stat, count)| actual.get(*stat) != Some(count))
            .map(|(stat, count)| {
                format!(
                    "{} expected {} found {}",
                    stat,
                    count,
                    actual
                        .get(stat)
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "nothing".to_string())
                )
            })
            .collect();
        if mismatches.is_empty() {
            Ok(())
        } else {
            Err(ProviderError::new_with_context(
                Remnant::Remaining,
                format!(
                    "Stats of provider '{}' do not match: {}",
                    self.key(),
                    mismatches.join(", ")
                ),
            ))
        }
    }

    pub async fn hosts(&self) -> ProviderResult<Vec<String>> {
        self.require(self.capabilities().hosts, "hosts")?;
        self.appliance
            .provider_hosts(self.name())
            .await
            .context(
                Remnant::Remaining,
                format!("Unable to list the hosts of '{}'", self.key()),
            )
    }

    pub async fn templates(&self) -> ProviderResult<Vec<String>> {
        self.require(self.capabilities().templates, "templates")?;
        self.appliance
            .provider_templates(self.name())
            .await
            .context(
                Remnant::Remaining,
                format!("Unable to list the templates of '{}'", self.key()),
            )
    }

    /// Bring the provider to `configured`. Does nothing if the appliance already has it, uses
    /// REST when the class supports it and the UI otherwise.
    pub async fn setup(&self) -> ProviderResult<()> {
        if self.exists().await? {
            debug!("Provider '{}' already exists", self.key());
            self.set_state(ProviderState::Configured);
            return Ok(());
        }
        if self.capabilities().create_rest {
            self.create_rest().await
        } else {
            self.create().await
        }
    }
}
