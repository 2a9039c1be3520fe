use crate::Workspace;
use anyhow::{Context, Result};
use clap::Parser;
use provsys_model::{ClassRef, ProviderDescriptor, ProviderFilter, Selector};
use serde::Serialize;
use tabled::{Style, Table, Tabled};

/// List catalog providers.
#[derive(Debug, Parser)]
pub(crate) struct List {
    /// Only providers of this category or type. Repeat to allow several.
    #[clap(long = "class")]
    classes: Vec<ClassRef>,

    /// Only these provider keys.
    #[clap(long = "key")]
    keys: Vec<String>,

    /// Only providers whose data has this dotted path, e.g. `templates.small_template`.
    #[clap(long = "required-field")]
    required_fields: Vec<String>,

    #[clap(long = "required-tag")]
    required_tags: Vec<String>,

    #[clap(long = "required-flag")]
    required_flags: Vec<String>,

    /// How to reduce the matching providers
    /// [ALL|ONE|LATEST|ONE_PER_TYPE|ONE_PER_CATEGORY|ONE_PER_VERSION].
    #[clap(long = "selector", default_value = "ALL")]
    selector: Selector,

    /// Also list providers the global filters hide, e.g. those tagged `disabled`.
    #[clap(long = "no-global-filters")]
    no_global_filters: bool,

    /// Output the providers in JSON format.
    #[clap(long = "json")]
    json: bool,
}

impl List {
    fn filters(&self) -> Vec<ProviderFilter> {
        let mut filters = Vec::new();
        if !self.classes.is_empty() {
            filters.push(ProviderFilter::default().classes(self.classes.iter().copied()));
        }
        if !self.keys.is_empty() {
            filters.push(ProviderFilter::default().keys(self.keys.clone()));
        }
        if !self.required_fields.is_empty() {
            filters.push(
                ProviderFilter::default()
                    .required_fields(self.required_fields.iter().map(String::as_str)),
            );
        }
        if !self.required_tags.is_empty() {
            filters.push(ProviderFilter::default().required_tags(self.required_tags.clone()));
        }
        if !self.required_flags.is_empty() {
            filters.push(ProviderFilter::default().required_flags(self.required_flags.clone()));
        }
        filters
    }

    pub(crate) fn run(self, workspace: &Workspace) -> Result<()> {
        let filters = self.filters();
        let global = if self.no_global_filters {
            None
        } else {
            Some(&workspace.global_filters)
        };
        let listed = workspace.catalog.list(&filters, global);
        let type_constrained = filters.iter().any(ProviderFilter::constrains_type);
        let rows: Vec<ProviderRow> = self
            .selector
            .select(&listed)
            .into_iter()
            .map(|provider| {
                let id = if workspace.options.legacy_ids {
                    provider.key().to_string()
                } else {
                    self.selector.id(provider, type_constrained)
                };
                ProviderRow::new(provider, id)
            })
            .collect();

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&rows)
                    .context("Could not create string from providers.")?
            );
        } else {
            println!("{}", Table::new(rows).with(Style::blank()));
        }
        Ok(())
    }
}

#[derive(Tabled, Serialize)]
struct ProviderRow {
    #[tabled(rename = "KEY")]
    key: String,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "TYPE")]
    #[serde(rename = "type")]
    type_name: String,
    #[tabled(rename = "CATEGORY")]
    category: String,
    #[tabled(rename = "VERSION")]
    version: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "TAGS")]
    tags: String,
}

impl ProviderRow {
    fn new(provider: &ProviderDescriptor, id: String) -> Self {
        Self {
            key: provider.key().to_string(),
            name: provider.name().to_string(),
            type_name: provider.type_name().to_string(),
            category: provider.category().to_string(),
            version: provider.version().unwrap_or_default().to_string(),
            id,
            tags: provider
                .tags()
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}
