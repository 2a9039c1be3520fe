use crate::Workspace;
use anyhow::{Context, Result};
use clap::Parser;
use log::warn;
use provider_agent::clients::{FileCache, Tracker, TrackerbotClient};
use provider_agent::{LoadContext, TemplateLoader};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tabled::{Style, Table, Tabled};

/// Load the templates usable on each provider.
#[derive(Debug, Parser)]
pub(crate) struct Templates {
    /// The directory of the persistent cache.
    #[clap(long = "cache-dir", default_value = ".provsys_cache")]
    cache_dir: PathBuf,

    /// Output the templates in JSON format.
    #[clap(long = "json")]
    json: bool,
}

impl Templates {
    pub(crate) async fn run(self, workspace: &Workspace) -> Result<()> {
        let tracker: Option<Arc<dyn Tracker>> = match &workspace.options.trackerbot_url {
            Some(url) => Some(Arc::new(
                TrackerbotClient::new(url)
                    .with_context(|| format!("Unable to create tracker client for '{}'", url))?,
            )),
            None => None,
        };
        let loader = TemplateLoader::new(
            tracker,
            Arc::new(FileCache::new(&self.cache_dir)),
            workspace.options.use_template_cache,
        );
        let templates = loader
            .load(&LoadContext::default(), &workspace.catalog)
            .await;
        if templates.is_empty() {
            warn!("No templates were loaded, every template name will be accepted");
        }

        let rows: Vec<TemplateRow> = templates
            .iter()
            .map(|(key, records)| TemplateRow {
                provider: key.clone(),
                templates: records
                    .iter()
                    .map(|record| record.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
            .collect();
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&rows)
                    .context("Could not create string from templates.")?
            );
        } else {
            println!("{}", Table::new(rows).with(Style::blank()));
        }
        Ok(())
    }
}

#[derive(Tabled, Serialize)]
struct TemplateRow {
    #[tabled(rename = "PROVIDER")]
    provider: String,
    #[tabled(rename = "TEMPLATES")]
    templates: String,
}
