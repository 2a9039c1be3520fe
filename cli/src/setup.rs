use crate::Workspace;
use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use provider_agent::clients::{Appliance, RestAppliance};
use provider_agent::{ProviderFactory, SetupEngine, TestRequest};
use provsys_model::{ClassRef, CredentialRef, ProviderFilter};
use std::sync::Arc;

/// Set up a provider on an appliance.
#[derive(Debug, Parser)]
pub(crate) struct Setup {
    /// The appliance, e.g. `https://10.0.0.1`.
    #[clap(long = "appliance-url")]
    appliance_url: String,

    /// The credential store entry used to log in to the appliance.
    #[clap(long = "appliance-credential", default_value = "default")]
    appliance_credential: String,

    /// The appliance runs from a development checkout.
    #[clap(long = "dev")]
    dev: bool,

    /// Set up this catalog provider, even if the global filters hide it.
    #[clap(long = "key", conflicts_with = "class")]
    key: Option<String>,

    /// Set up any one provider of this category or type.
    #[clap(long = "class")]
    class: Option<ClassRef>,

    /// Remove every provider of `--class`, or every known provider, instead.
    #[clap(long = "clear", conflicts_with = "key")]
    clear: bool,
}

impl Setup {
    pub(crate) async fn run(self, workspace: Workspace) -> Result<()> {
        let credential = workspace
            .credentials
            .get(&CredentialRef::new(self.appliance_credential.as_str()))
            .context("Unable to find the appliance credential")?
            .clone();
        let appliance = RestAppliance::connect(&self.appliance_url, credential, self.dev)
            .await
            .with_context(|| format!("Unable to connect to '{}'", self.appliance_url))?;
        let mut global_filters = workspace.global_filters.clone();
        global_filters.restrict_to_appliance_version(appliance.version());

        let factory = ProviderFactory::new(Arc::new(appliance), workspace.credentials.clone());
        let engine = SetupEngine::new(workspace.catalog.clone(), factory, workspace.options)
            .with_global_filters(global_filters);
        let class = self.class.unwrap_or(ClassRef::Base);

        if self.clear {
            let cleared = engine
                .clear_providers(class)
                .await
                .context("Unable to clear providers")?;
            info!("Cleared {} providers", cleared.len());
            for key in cleared {
                println!("{}", key);
            }
            return Ok(());
        }

        let request = TestRequest::logged("provsys-setup");
        let outcome = match &self.key {
            Some(key) => {
                let filter = ProviderFilter::default().keys(vec![key.clone()]);
                engine.setup_one_or_skip(&request, &[filter], false).await
            }
            None => engine.setup_one_by_class_or_skip(&request, class).await,
        };
        let provider = outcome
            .into_result()
            .context("No provider was set up")?;
        println!("{}", provider.key());
        Ok(())
    }
}
