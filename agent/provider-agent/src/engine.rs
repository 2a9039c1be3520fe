/*!

The `engine` module defines the [`SetupEngine`] which brings providers to the configured state on
the appliance on behalf of tests, keeps the number of configured providers within the runner's
limit and quarantines providers that keep failing.

!*/

use crate::artifacts::SKIP_TEST_HOOK;
use crate::crud::ProviderFactory;
use crate::error::AgentResult;
use crate::outcome::{Outcome, Skip};
use crate::provider::{LiveProvider, ProviderError, ProviderResult, Remnant};
use crate::request::TestRequest;
use crate::state::HarnessState;
use futures::future::join_all;
use log::{debug, error, info, warn};
use provsys_model::{
    Catalog, ClassRef, GlobalFilters, ProviderDescriptor, ProviderFilter, RunnerOptions,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde_json::json;
use std::sync::Arc;

/// Sets up providers for tests and decides when a test has to be skipped instead.
///
/// One engine exists per worker process. The appliance is shared with every other test in the
/// worker, so the engine never assumes that a provider it configured earlier is still there.
pub struct SetupEngine {
    catalog: Arc<Catalog>,
    factory: ProviderFactory,
    options: RunnerOptions,
    global_filters: GlobalFilters,
    state: Arc<HarnessState>,
}

impl SetupEngine {
    pub fn new(catalog: Arc<Catalog>, factory: ProviderFactory, options: RunnerOptions) -> Self {
        Self {
            catalog,
            factory,
            options,
            global_filters: GlobalFilters::default(),
            state: Arc::new(HarnessState::new()),
        }
    }

    pub fn with_global_filters(mut self, global_filters: GlobalFilters) -> Self {
        self.global_filters = global_filters;
        self
    }

    /// Share failure counts and quarantine with another engine of the same worker.
    pub fn with_state(mut self, state: Arc<HarnessState>) -> Self {
        self.state = state;
        self
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn factory(&self) -> &ProviderFactory {
        &self.factory
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    pub fn global_filters(&self) -> &GlobalFilters {
        &self.global_filters
    }

    pub fn state(&self) -> &Arc<HarnessState> {
        &self.state
    }

    pub fn materialize(&self, descriptor: &ProviderDescriptor) -> AgentResult<LiveProvider> {
        self.factory.materialize(Arc::new(descriptor.clone()))
    }

    /// The providers configured on the appliance that the catalog knows about.
    pub async fn managed_known_providers(&self) -> AgentResult<Vec<LiveProvider>> {
        let names = self.factory.appliance().managed_provider_names().await?;
        let mut providers = Vec::new();
        for name in names {
            match self.catalog.by_name(&name) {
                Some(descriptor) => providers.push(self.materialize(descriptor)?),
                None => debug!("Provider '{}' on the appliance is not in the catalog", name),
            }
        }
        Ok(providers)
    }

    fn rng(&self, request: &TestRequest) -> StdRng {
        match self.options.seed_for(request.node_id()) {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Record the skip with the artifact hook and return it.
    fn skip_providers(&self, request: &TestRequest, keys: &[&str], message: String) -> Skip {
        let reason = keys.join(", ");
        request.artifacts().fire_test_hook(
            request.node_id(),
            SKIP_TEST_HOOK,
            json!({"type": "provider", "reason": reason}),
        );
        Skip::new(message)
    }

    /// Try once to bring `provider` to the configured state.
    ///
    /// Returns `Ok(false)` when setup failed, in which case the failure has been counted and the
    /// appliance cleaned. Returns `Err` when the test has to be skipped for a reason that is not
    /// the provider's fault.
    pub async fn setup_verbose(
        &self,
        request: &TestRequest,
        provider: &LiveProvider,
    ) -> Result<bool, Skip> {
        if self.state.is_quarantined(provider.key()) {
            debug!("Not setting up problematic provider '{}'", provider.key());
            return Ok(false);
        }
        if let Err(e) = self.make_room(request, provider).await {
            self.handle_failure(provider, e).await;
            return Ok(false);
        }
        self.enable_region(request, provider).await?;
        info!("Trying to set up provider '{}'", provider.key());
        match provider.setup().await {
            Ok(()) => Ok(true),
            Err(e) => {
                self.handle_failure(provider, e).await;
                Ok(false)
            }
        }
    }

    /// Delete random providers until the appliance has room for `provider`.
    async fn make_room(
        &self,
        request: &TestRequest,
        provider: &LiveProvider,
    ) -> ProviderResult<()> {
        let limit = self.options.provider_limit;
        if limit == 0 {
            return Ok(());
        }
        let maximum_current = limit - 1;
        let mut existing: Vec<LiveProvider> = self
            .managed_known_providers()
            .await
            .map_err(|e| ProviderError::new_with_source(Remnant::Clear, e))?
            .into_iter()
            .filter(|p| p.key() != provider.key())
            .collect();
        existing.shuffle(&mut self.rng(request));
        if existing.len() > maximum_current {
            let surplus = existing.split_off(maximum_current);
            info!(
                "Removing extra providers: {}",
                surplus.iter().map(LiveProvider::key).collect::<Vec<_>>().join(", ")
            );
            let mut deleting = Vec::with_capacity(surplus.len());
            for p in &surplus {
                match p.delete_rest().await {
                    Ok(()) => deleting.push(p),
                    Err(e) => warn!("Unable to remove provider '{}': {}", p.key(), e),
                }
            }
            // Request every deletion before waiting on any of them.
            let waits = join_all(deleting.iter().map(|p| p.wait_for_delete())).await;
            for (p, result) in deleting.iter().zip(waits) {
                if let Err(e) = result {
                    warn!("Provider '{}' did not disappear: {}", p.key(), e);
                }
            }
        }

        let occupied = self
            .factory
            .appliance()
            .managed_provider_names()
            .await
            .map_err(|e| ProviderError::new_with_source(Remnant::Clear, e))?
            .into_iter()
            .filter(|name| name.as_str() != provider.name())
            .count();
        if self.options.at_capacity(occupied) {
            return Err(ProviderError::new_with_context(
                Remnant::Clear,
                format!(
                    "The appliance manages {} other providers and the limit is {}",
                    occupied, limit
                ),
            ));
        }
        Ok(())
    }

    /// Re-enable the provider's region if the appliance has it disabled.
    async fn enable_region(
        &self,
        request: &TestRequest,
        provider: &LiveProvider,
    ) -> Result<(), Skip> {
        let region = match provider.region() {
            Some(region) if provider.capabilities().regions => region,
            _ => return Ok(()),
        };
        let settings_key = provider.class().settings_key();
        let appliance = self.factory.appliance();
        let disabled = appliance.disabled_regions(settings_key).await.map_err(|e| {
            self.skip_providers(
                request,
                &[provider.key()],
                format!(
                    "Unable to read disabled regions for provider {}: {}",
                    provider.key(),
                    e
                ),
            )
        })?;
        if !disabled.iter().any(|r| r.as_str() == region) {
            return Ok(());
        }
        info!("Enabling region '{}' for provider '{}'", region, provider.key());
        let remaining: Vec<String> = disabled.into_iter().filter(|r| r.as_str() != region).collect();
        appliance
            .set_disabled_regions(settings_key, &remaining)
            .await
            .map_err(|e| {
                self.skip_providers(
                    request,
                    &[provider.key()],
                    format!(
                        "Unable to enable region {} for provider {}: {}",
                        region,
                        provider.key(),
                        e
                    ),
                )
            })
    }

    /// Count the failure and make sure the provider does not stay behind half configured.
    async fn handle_failure(&self, provider: &LiveProvider, e: ProviderError) {
        error!("Unable to set up provider '{}': {}", provider.key(), e);
        self.state.record_failure(provider.key());
        if e.remnant() == Remnant::Clear {
            return;
        }
        match provider.exists().await {
            Ok(false) => {}
            Ok(true) => match Self::remove(provider).await {
                Ok(()) => warn!(
                    "Provider '{}' was deleted because it failed to set up",
                    provider.key()
                ),
                Err(e) => error!(
                    "Unable to delete provider '{}' after it failed to set up: {}",
                    provider.key(),
                    e
                ),
            },
            Err(e) => warn!(
                "Unable to check whether provider '{}' was left behind: {}",
                provider.key(),
                e
            ),
        }
    }

    async fn remove(provider: &LiveProvider) -> ProviderResult<()> {
        provider.delete_rest().await?;
        provider.wait_for_delete().await
    }

    /// Set up the given provider or skip the test.
    pub async fn setup_or_skip(
        &self,
        request: &TestRequest,
        provider: Arc<LiveProvider>,
    ) -> Outcome<Arc<LiveProvider>> {
        if self.state.is_quarantined(provider.key()) {
            return self
                .skip_providers(
                    request,
                    &[provider.key()],
                    format!("Provider {} had been marked as problematic", provider.key()),
                )
                .into();
        }
        match self.setup_verbose(request, &provider).await {
            Ok(true) => Outcome::Proceed(provider),
            Ok(false) => self
                .skip_providers(
                    request,
                    &[provider.key()],
                    format!("Unable to setup provider {}", provider.key()),
                )
                .into(),
            Err(skip) => skip.into(),
        }
    }

    /// Set up any one provider passing `filters` or skip the test. A matching provider that the
    /// appliance already has is reused. Otherwise providers not tagged `do_not_prefer` are tried
    /// first, each group in random order.
    pub async fn setup_one_or_skip(
        &self,
        request: &TestRequest,
        filters: &[ProviderFilter],
        use_global_filters: bool,
    ) -> Outcome<Arc<LiveProvider>> {
        let global = if use_global_filters {
            Some(&self.global_filters)
        } else {
            None
        };
        let candidates = self.catalog.list(filters, global);

        if candidates.is_empty() {
            // This also covers a catalog without providers.
            return if self.catalog.list(&[], global).is_empty() {
                Outcome::skip("No provider matching global filters found")
            } else {
                Outcome::skip("No provider matching test-specific filters found")
            };
        }

        let snapshot = self.state.snapshot();
        let keys: Vec<&str> = candidates.iter().map(|p| p.key()).collect();
        if keys.iter().all(|key| snapshot.is_quarantined(key)) {
            return self
                .skip_providers(
                    request,
                    &keys,
                    format!("All providers marked as problematic: {:?}", keys),
                )
                .into();
        }

        let mut live = Vec::with_capacity(candidates.len());
        for descriptor in &candidates {
            match self.materialize(descriptor) {
                Ok(provider) => live.push(Arc::new(provider)),
                Err(e) => error!("Unable to use provider '{}': {}", descriptor.key(), e),
            }
        }

        let mut absent = Vec::with_capacity(live.len());
        for provider in live {
            match provider.exists().await {
                Ok(true) => {
                    debug!("Reusing provider '{}'", provider.key());
                    return Outcome::Proceed(provider);
                }
                Ok(false) => absent.push(provider),
                Err(e) => {
                    warn!("{}", e);
                    absent.push(provider);
                }
            }
        }

        let (mut preferred, mut not_preferred): (Vec<_>, Vec<_>) = absent
            .into_iter()
            .filter(|p| !snapshot.is_quarantined(p.key()))
            .partition(|p| p.descriptor().is_preferred());
        let mut rng = self.rng(request);
        preferred.shuffle(&mut rng);
        not_preferred.shuffle(&mut rng);
        let attempts: Vec<Arc<LiveProvider>> =
            preferred.into_iter().chain(not_preferred).collect();

        for provider in &attempts {
            match self.setup_verbose(request, provider).await {
                Ok(true) => return Outcome::Proceed(Arc::clone(provider)),
                Ok(false) => continue,
                Err(skip) => return skip.into(),
            }
        }

        let attempted: Vec<&str> = attempts.iter().map(|p| p.key()).collect();
        let reported = if attempted.is_empty() { &keys } else { &attempted };
        self.skip_providers(
            request,
            reported,
            format!("Failed to set up any matching providers: {:?}", keys),
        )
        .into()
    }

    /// [`SetupEngine::setup_one_or_skip`] with a single filter on the provider class.
    pub async fn setup_one_by_class_or_skip(
        &self,
        request: &TestRequest,
        class: ClassRef,
    ) -> Outcome<Arc<LiveProvider>> {
        let filter = ProviderFilter::default().classes(vec![class]);
        self.setup_one_or_skip(request, &[filter], true).await
    }

    /// Delete every known provider of `class` from the appliance and wait until they are gone.
    /// Returns the keys of the deleted providers.
    pub async fn clear_providers(&self, class: ClassRef) -> AgentResult<Vec<String>> {
        let providers: Vec<LiveProvider> = self
            .managed_known_providers()
            .await?
            .into_iter()
            .filter(|p| p.class().is_a(&class))
            .collect();
        if providers.is_empty() {
            return Ok(Vec::new());
        }
        info!(
            "Clearing providers: {}",
            providers.iter().map(LiveProvider::key).collect::<Vec<_>>().join(", ")
        );
        for provider in &providers {
            provider.delete_rest().await?;
        }
        for result in join_all(providers.iter().map(|p| p.wait_for_delete())).await {
            result?;
        }
        Ok(providers.iter().map(|p| p.key().to_string()).collect())
    }
}
