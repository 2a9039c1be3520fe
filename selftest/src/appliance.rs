use async_trait::async_trait;
use provider_agent::clients::{
    Appliance, ClientError, ClientResult, Interface, ProviderPayload, ProviderStats, RefreshStatus,
};
use provsys_model::LooseVersion;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// How creating a provider should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateFailure {
    /// The request is rejected and nothing is stored.
    Rejected,
    /// The request errors but the appliance keeps a record of the provider.
    LeftBehind,
}

/// Everything the fake appliance did, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create { name: String, via: Interface },
    Delete { name: String, via: Interface },
    Refresh { name: String },
    SetDisabledRegions { settings_key: String, regions: Vec<String> },
}

#[derive(Debug, Default)]
struct State {
    providers: BTreeMap<String, ProviderPayload>,
    failures: BTreeMap<String, (CreateFailure, Option<u32>)>,
    undeletable: BTreeSet<String>,
    disabled_regions: BTreeMap<String, Vec<String>>,
    stats: BTreeMap<String, ProviderStats>,
    refreshes: BTreeMap<String, u32>,
    calls: Vec<Call>,
    unreachable: bool,
}

/// An in-memory [`Appliance`]. Deletions take effect immediately. Failures can be injected per
/// provider name.
#[derive(Debug)]
pub struct FakeAppliance {
    version: LooseVersion,
    is_dev: bool,
    state: Mutex<State>,
}

impl Default for FakeAppliance {
    fn default() -> Self {
        Self::new("5.11.0.1")
    }
}

impl FakeAppliance {
    pub fn new(version: &str) -> Self {
        Self {
            version: LooseVersion::new(version),
            is_dev: false,
            state: Mutex::default(),
        }
    }

    pub fn dev(mut self) -> Self {
        self.is_dev = true;
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a provider as if an earlier test had set it up.
    pub fn preconfigure(&self, name: &str) {
        self.state().providers.insert(
            name.to_string(),
            ProviderPayload {
                db_type: String::new(),
                name: name.to_string(),
                region: None,
                zone: None,
                connection_configurations: Vec::new(),
            },
        );
    }

    /// Make creating `name` fail. `times` limits how often; `None` fails forever.
    pub fn fail_creation(&self, name: &str, failure: CreateFailure, times: Option<u32>) {
        self.state()
            .failures
            .insert(name.to_string(), (failure, times));
    }

    /// Make every request to delete `name` fail. The provider stays on the appliance.
    pub fn fail_deletion(&self, name: &str) {
        self.state().undeletable.insert(name.to_string());
    }

    /// Make every request fail as if the appliance were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    pub fn disable_regions(&self, settings_key: &str, regions: &[&str]) {
        self.state().disabled_regions.insert(
            settings_key.to_string(),
            regions.iter().map(|r| r.to_string()).collect(),
        );
    }

    pub fn set_stats(&self, name: &str, stats: ProviderStats) {
        self.state().stats.insert(name.to_string(), stats);
    }

    pub fn managed(&self) -> Vec<String> {
        self.state().providers.keys().cloned().collect()
    }

    pub fn payload(&self, name: &str) -> Option<ProviderPayload> {
        self.state().providers.get(name).cloned()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// The names of providers whose creation was requested, in order.
    pub fn created(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Create { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }

    /// The names of providers whose deletion was requested, in order.
    pub fn deleted(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Delete { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }

    fn check_reachable(state: &State) -> ClientResult<()> {
        if state.unreachable {
            Err(ClientError::request_failed("connection refused"))
        } else {
            Ok(())
        }
    }

    fn require_provider<'a>(state: &'a State, name: &str) -> ClientResult<&'a ProviderPayload> {
        state
            .providers
            .get(name)
            .ok_or_else(|| ClientError::missing_data(format!("No provider named '{}'", name)))
    }
}

#[async_trait]
impl Appliance for FakeAppliance {
    fn version(&self) -> LooseVersion {
        self.version.clone()
    }

    fn is_dev(&self) -> bool {
        self.is_dev
    }

    async fn managed_provider_names(&self) -> ClientResult<Vec<String>> {
        let state = self.state();
        Self::check_reachable(&state)?;
        Ok(state.providers.keys().cloned().collect())
    }

    async fn provider_exists(&self, name: &str) -> ClientResult<bool> {
        let state = self.state();
        Self::check_reachable(&state)?;
        Ok(state.providers.contains_key(name))
    }

    async fn create_provider(&self, payload: &ProviderPayload, via: Interface) -> ClientResult<()> {
        let mut state = self.state();
        Self::check_reachable(&state)?;
        state.calls.push(Call::Create {
            name: payload.name.clone(),
            via,
        });
        if let Some((failure, remaining)) = state.failures.get_mut(&payload.name) {
            let fails = match remaining {
                None => true,
                Some(0) => false,
                Some(n) => {
                    *n -= 1;
                    true
                }
            };
            if fails {
                let failure = *failure;
                if failure == CreateFailure::LeftBehind {
                    state
                        .providers
                        .insert(payload.name.clone(), payload.clone());
                }
                return Err(ClientError::request_failed(format!(
                    "Creating '{}' failed",
                    payload.name
                )));
            }
        }
        if state.providers.contains_key(&payload.name) {
            return Err(ClientError::request_failed(format!(
                "Name '{}' has already been taken",
                payload.name
            )));
        }
        state
            .providers
            .insert(payload.name.clone(), payload.clone());
        Ok(())
    }

    async fn delete_provider(&self, name: &str, via: Interface) -> ClientResult<()> {
        let mut state = self.state();
        Self::check_reachable(&state)?;
        state.calls.push(Call::Delete {
            name: name.to_string(),
            via,
        });
        if state.undeletable.contains(name) {
            return Err(ClientError::request_failed(format!(
                "Deleting '{}' failed",
                name
            )));
        }
        state
            .providers
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ClientError::missing_data(format!("No provider named '{}'", name)))
    }

    async fn refresh_provider(&self, name: &str) -> ClientResult<()> {
        let mut state = self.state();
        Self::check_reachable(&state)?;
        Self::require_provider(&state, name)?;
        state.calls.push(Call::Refresh {
            name: name.to_string(),
        });
        *state.refreshes.entry(name.to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn refresh_status(&self, name: &str) -> ClientResult<RefreshStatus> {
        let state = self.state();
        Self::check_reachable(&state)?;
        Self::require_provider(&state, name)?;
        Ok(RefreshStatus {
            last_refresh_date: state
                .refreshes
                .get(name)
                .map(|count| format!("2020-01-01T00:00:{:02}Z", count)),
            last_refresh_error: None,
        })
    }

    async fn provider_stats(&self, name: &str) -> ClientResult<ProviderStats> {
        let state = self.state();
        Self::check_reachable(&state)?;
        Self::require_provider(&state, name)?;
        Ok(state.stats.get(name).cloned().unwrap_or_default())
    }

    async fn provider_hosts(&self, name: &str) -> ClientResult<Vec<String>> {
        let state = self.state();
        Self::check_reachable(&state)?;
        Self::require_provider(&state, name)?;
        Ok(vec![format!("{}-host-1", name)])
    }

    async fn provider_templates(&self, name: &str) -> ClientResult<Vec<String>> {
        let state = self.state();
        Self::check_reachable(&state)?;
        Self::require_provider(&state, name)?;
        Ok(vec![format!("{}-template-1", name)])
    }

    async fn disabled_regions(&self, settings_key: &str) -> ClientResult<Vec<String>> {
        let state = self.state();
        Self::check_reachable(&state)?;
        Ok(state
            .disabled_regions
            .get(settings_key)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_disabled_regions(
        &self,
        settings_key: &str,
        regions: &[String],
    ) -> ClientResult<()> {
        let mut state = self.state();
        Self::check_reachable(&state)?;
        state.calls.push(Call::SetDisabledRegions {
            settings_key: settings_key.to_string(),
            regions: regions.to_vec(),
        });
        state
            .disabled_regions
            .insert(settings_key.to_string(), regions.to_vec());
        Ok(())
    }
}
