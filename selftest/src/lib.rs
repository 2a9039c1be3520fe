/*!

Provides in-memory stand-ins for the appliance, the template tracker, the persistent cache and the
artifact reporter, plus sample catalogs, so that the provider harness can be tested end to end
without any external system. We call this testing modality `selftest`.

!*/

mod appliance;
mod catalog;
mod sink;
mod test_settings;
mod tracker;

pub use appliance::{Call, CreateFailure, FakeAppliance};
pub use catalog::{
    credentials, sample_catalog, scenario_catalog, CREDENTIALS, EXTRA_PROVIDERS, SCENARIO_CATALOG,
};
pub use sink::{HookEvent, RecordingSink};
pub use test_settings::TestSettings;
pub use tracker::{record, FakeTracker, MemoryCache};

use provider_agent::{ProviderFactory, SetupEngine, TestRequest, WaitSettings};
use provsys_model::{Catalog, GlobalFilters, RunnerOptions};
use std::sync::Arc;

/// A setup engine wired to fakes.
pub struct Harness {
    pub appliance: Arc<FakeAppliance>,
    pub sink: Arc<RecordingSink>,
    pub engine: SetupEngine,
}

impl Harness {
    /// An engine over `catalog` with the given provider limit, a seeded shuffle and the default
    /// global filters.
    pub fn new(catalog: Catalog, provider_limit: usize) -> Self {
        let options = RunnerOptions {
            provider_limit,
            seed: Some(TestSettings::seed()),
            ..RunnerOptions::default()
        };
        Self::with_options(catalog, options, GlobalFilters::default())
    }

    pub fn with_options(catalog: Catalog, options: RunnerOptions, global: GlobalFilters) -> Self {
        let appliance = Arc::new(FakeAppliance::default());
        let factory = ProviderFactory::new(appliance.clone(), Arc::new(credentials()))
            .with_wait_settings(WaitSettings::immediate());
        let engine =
            SetupEngine::new(Arc::new(catalog), factory, options).with_global_filters(global);
        Self {
            appliance,
            sink: Arc::new(RecordingSink::default()),
            engine,
        }
    }

    /// A request from the test `node_id` whose artifact hooks land in [`Harness::sink`].
    pub fn request(&self, node_id: &str) -> TestRequest {
        TestRequest::new(node_id, self.sink.clone())
    }

    /// The display name of the catalog provider `key`.
    pub fn name_of(&self, key: &str) -> String {
        self.engine
            .catalog()
            .get(key)
            .map(|p| p.name().to_string())
            .unwrap_or_else(|_| key.to_string())
    }

    /// Register the catalog provider `key` on the fake appliance.
    pub fn preconfigure(&self, key: &str) {
        self.appliance.preconfigure(&self.name_of(key));
    }
}
