use agent_common::credentials::CredentialStore;
use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use provsys_model::constants::{ENV_SEED, ENV_TRACKERBOT_URL};
use provsys_model::{Catalog, GlobalFilters, LooseVersion, RunnerOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Options that change how tests are parametrized and providers are set up.
#[derive(Debug, Parser)]
pub(crate) struct RunnerArgs {
    /// Use provider keys as test ids.
    #[clap(long = "legacy-ids")]
    legacy_ids: bool,

    /// Parametrize with every matching provider and use the plain provider id.
    #[clap(long = "disable-selectors")]
    disable_selectors: bool,

    /// How many providers may be configured on the appliance at once, 0 for no limit.
    #[clap(long = "provider-limit", default_value = "1")]
    provider_limit: usize,

    /// Use template lists cached by an earlier run instead of asking the tracker.
    #[clap(long = "use-template-cache")]
    use_template_cache: bool,

    /// Seed for shuffling providers.
    #[clap(long = "seed", env = ENV_SEED)]
    seed: Option<u64>,

    /// The trackerbot API, e.g. `http://trackerbot.example.com/api/`.
    #[clap(long = "trackerbot-url", env = ENV_TRACKERBOT_URL)]
    trackerbot_url: Option<String>,

    /// Only consider providers that support this appliance version.
    #[clap(long = "appliance-version")]
    appliance_version: Option<String>,
}

impl RunnerArgs {
    fn options(&self) -> RunnerOptions {
        RunnerOptions {
            legacy_ids: self.legacy_ids,
            disable_selectors: self.disable_selectors,
            provider_limit: self.provider_limit,
            use_template_cache: self.use_template_cache,
            seed: self.seed,
            trackerbot_url: self.trackerbot_url.clone(),
        }
    }
}

/// Everything the subcommands share: the catalog, the credentials and the runner options.
pub(crate) struct Workspace {
    pub(crate) catalog: Arc<Catalog>,
    pub(crate) credentials: Arc<CredentialStore>,
    pub(crate) options: RunnerOptions,
    pub(crate) global_filters: GlobalFilters,
}

impl Workspace {
    pub(crate) fn load(
        conf: &[PathBuf],
        credentials: Option<&Path>,
        runner: RunnerArgs,
    ) -> Result<Self> {
        let catalog = Catalog::from_files(conf)
            .with_context(|| format!("Unable to load the catalog from {:?}", conf))?;
        let credentials = match credentials {
            Some(path) => CredentialStore::from_file(path)
                .with_context(|| format!("Unable to load credentials from '{}'", path.display()))?,
            None => CredentialStore::default(),
        };
        let mut global_filters = GlobalFilters::default();
        if let Some(version) = &runner.appliance_version {
            global_filters.restrict_to_appliance_version(LooseVersion::new(version.as_str()));
        }
        info!(
            "Loaded {} providers and {} credentials",
            catalog.len(),
            credentials.len()
        );
        Ok(Self {
            catalog: Arc::new(catalog),
            credentials: Arc::new(credentials),
            options: runner.options(),
            global_filters,
        })
    }
}
