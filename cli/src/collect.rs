use crate::Workspace;
use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tabled::{Style, Table, Tabled};
use test_agent::{Collector, Metafunc, Parametrization, ProviderMarker, Scope};

/// Preview the parametrization of a test.
#[derive(Debug, Parser)]
pub(crate) struct Collect {
    /// A provider marker in YAML, e.g. `{classes: [vmware], selector: LATEST}`. Repeat for
    /// several markers, the closest one first.
    #[clap(long = "marker", required = true)]
    markers: Vec<String>,

    /// A fixture the test requests.
    #[clap(long = "fixture", default_value = "provider")]
    fixtures: Vec<String>,

    /// A flag the test declares, e.g. `provision`.
    #[clap(long = "test-flag")]
    test_flags: Vec<String>,

    /// The test name used in messages.
    #[clap(long = "name", default_value = "test_preview")]
    name: String,

    /// Output the generated tests in JSON format.
    #[clap(long = "json")]
    json: bool,
}

impl Collect {
    pub(crate) fn run(self, workspace: &Workspace) -> Result<()> {
        let markers = self
            .markers
            .iter()
            .map(|yaml| ProviderMarker::from_yaml(&self.name, yaml))
            .collect::<Result<Vec<_>, _>>()
            .context("Unable to read provider markers")?;
        let mut preview = Preview {
            name: self.name,
            fixtures: self.fixtures,
            markers,
            test_flags: self.test_flags,
            rows: Vec::new(),
            uncollected: None,
        };
        Collector::new(workspace.catalog.clone(), workspace.options.clone())
            .with_global_filters(workspace.global_filters.clone())
            .collect(&mut preview)
            .context("Collection failed")?;

        if let Some(reason) = &preview.uncollected {
            println!("Uncollected: {}", reason);
            return Ok(());
        }
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&preview.rows)
                    .context("Could not create string from the parametrization.")?
            );
        } else if preview.rows.is_empty() {
            println!("{} is not parametrized", preview.name);
        } else {
            println!("{}", Table::new(preview.rows).with(Style::blank()));
        }
        Ok(())
    }
}

#[derive(Tabled, Serialize)]
struct GeneratedTest {
    #[tabled(rename = "TEST")]
    test: String,
    #[tabled(rename = "FIXTURE")]
    fixture: String,
    #[tabled(rename = "PROVIDER")]
    provider: String,
    #[tabled(rename = "SCOPE")]
    scope: Scope,
}

/// A test that exists only on the command line.
struct Preview {
    name: String,
    fixtures: Vec<String>,
    markers: Vec<ProviderMarker>,
    test_flags: Vec<String>,
    rows: Vec<GeneratedTest>,
    uncollected: Option<String>,
}

impl Metafunc for Preview {
    fn function_name(&self) -> &str {
        &self.name
    }

    fn fixture_names(&self) -> &[String] {
        &self.fixtures
    }

    fn markers(&self) -> &[ProviderMarker] {
        &self.markers
    }

    fn test_flags(&self) -> &[String] {
        &self.test_flags
    }

    fn parametrize(&mut self, parametrization: Parametrization, scope: Scope, _indirect: bool) {
        for (id, row) in parametrization.ids.iter().zip(&parametrization.argvalues) {
            for (fixture, provider) in parametrization.argnames.iter().zip(row) {
                self.rows.push(GeneratedTest {
                    test: format!("{}[{}]", self.name, id),
                    fixture: fixture.clone(),
                    provider: provider.key().to_string(),
                    scope,
                });
            }
        }
    }

    fn uncollect(&mut self, reason: String) {
        self.uncollected = Some(reason);
    }

    fn is_uncollected(&self) -> bool {
        self.uncollected.is_some()
    }
}
