/*!

Collection-time parametrization. For every collected test the runner hands a [`Metafunc`] to the
[`Collector`], which reads the test's provider markers, lists and selects matching providers from
the catalog and either parametrizes the test with them or marks it uncollected.

Nothing here touches the appliance.

!*/

use crate::error::{self, CollectionResult};
use crate::marker::{ProviderMarker, Scope};
use log::{debug, warn};
use provsys_model::constants::PROVIDER_FIXTURE_NAME;
use provsys_model::{
    Catalog, GlobalFilters, ProviderDescriptor, ProviderFilter, RunnerOptions, Selector,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// The runner's view of a test function while it is being collected.
pub trait Metafunc {
    fn module_name(&self) -> Option<&str> {
        None
    }

    fn class_name(&self) -> Option<&str> {
        None
    }

    fn function_name(&self) -> &str;

    /// Every fixture the test requests, directly or through other fixtures.
    fn fixture_names(&self) -> &[String];

    /// Provider markers that apply to the test, the closest one first.
    fn markers(&self) -> &[ProviderMarker];

    /// Flags the test declares about itself, e.g. `provision`.
    fn test_flags(&self) -> &[String] {
        &[]
    }

    fn parametrize(&mut self, parametrization: Parametrization, scope: Scope, indirect: bool);

    fn uncollect(&mut self, reason: String);

    fn is_uncollected(&self) -> bool;

    fn test_name(&self) -> String {
        self.module_name()
            .into_iter()
            .chain(self.class_name())
            .chain(Some(self.function_name()))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn uses_fixture(&self, name: &str) -> bool {
        self.fixture_names().iter().any(|fixture| fixture == name)
    }
}

/// Argument names, one row of values per generated test and one id per row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parametrization {
    pub argnames: Vec<String>,
    pub argvalues: Vec<Vec<Arc<ProviderDescriptor>>>,
    pub ids: Vec<String>,
}

impl Parametrization {
    /// The provider of each generated test for the argument `name`.
    pub fn column(&self, name: &str) -> Vec<&Arc<ProviderDescriptor>> {
        match self.argnames.iter().position(|argname| argname == name) {
            Some(index) => self
                .argvalues
                .iter()
                .filter_map(|row| row.get(index))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Drop the argnames, and their values, that are not among `fixture_names`.
    fn retain_used(&mut self, fixture_names: &[String]) {
        let keep: Vec<bool> = self
            .argnames
            .iter()
            .map(|argname| fixture_names.contains(argname))
            .collect();
        let mut index = 0;
        self.argnames.retain(|_| {
            let kept = keep.get(index).copied().unwrap_or(false);
            index += 1;
            kept
        });
        for row in &mut self.argvalues {
            let mut index = 0;
            row.retain(|_| {
                let kept = keep.get(index).copied().unwrap_or(false);
                index += 1;
                kept
            });
        }
    }
}

/// Parametrizes tests with providers from the catalog.
#[derive(Debug, Clone)]
pub struct Collector {
    catalog: Arc<Catalog>,
    global_filters: GlobalFilters,
    options: RunnerOptions,
}

impl Collector {
    pub fn new(catalog: Arc<Catalog>, options: RunnerOptions) -> Self {
        Self {
            catalog,
            global_filters: GlobalFilters::default(),
            options,
        }
    }

    pub fn with_global_filters(mut self, global_filters: GlobalFilters) -> Self {
        self.global_filters = global_filters;
        self
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// Providers passing `filters`, the global filters and the test's flags, reduced by
    /// `selector`, as a parametrization of `fixture_name`.
    pub fn providers(
        &self,
        metafunc: &dyn Metafunc,
        filters: &[ProviderFilter],
        selector: Selector,
        fixture_name: &str,
    ) -> Parametrization {
        let mut filters = filters.to_vec();
        if !metafunc.test_flags().is_empty() {
            filters.push(ProviderFilter::default().required_flags(metafunc.test_flags().to_vec()));
        }
        let potential = self.catalog.list(&filters, Some(&self.global_filters));
        let type_constrained = filters.iter().any(ProviderFilter::constrains_type);

        let mut parametrization = Parametrization::default();
        for provider in selector.select(&potential) {
            parametrization.ids.push(self.id_for(selector, provider, type_constrained));
            parametrization.argvalues.push(vec![Arc::new(provider.clone())]);
        }
        if !parametrization.argvalues.is_empty() {
            parametrization.argnames.push(fixture_name.to_string());
        }
        debug!(
            "Test '{}' parametrized with {:?}",
            metafunc.test_name(),
            parametrization.ids
        );
        parametrization
    }

    fn id_for(
        &self,
        selector: Selector,
        provider: &ProviderDescriptor,
        type_constrained: bool,
    ) -> String {
        if self.options.legacy_ids {
            provider.key().to_string()
        } else if self.options.disable_selectors {
            provider.the_id()
        } else {
            selector.id(provider, type_constrained)
        }
    }

    /// Parametrize `metafunc` from its provider markers. Tests that end up without providers are
    /// uncollected, not failed. Badly written markers are errors.
    pub fn collect(&self, metafunc: &mut dyn Metafunc) -> CollectionResult<()> {
        let markers = closest_markers(&*metafunc)?;
        if markers.is_empty() {
            if metafunc.uses_fixture(PROVIDER_FIXTURE_NAME) {
                return error::MissingFixtureSnafu {
                    function: metafunc.test_name(),
                    fixture: PROVIDER_FIXTURE_NAME,
                }
                .fail();
            }
            return Ok(());
        }

        for marker in markers {
            let mut parametrization = (marker.gen_func)(self, &*metafunc, &marker);
            if marker.filter_unused {
                parametrization.retain_used(metafunc.fixture_names());
            } else if let Some(unused) = parametrization
                .argnames
                .iter()
                .find(|argname| !metafunc.uses_fixture(argname))
            {
                return error::MissingFixtureSnafu {
                    function: metafunc.test_name(),
                    fixture: unused.clone(),
                }
                .fail();
            }
            apply(metafunc, parametrization, &marker);
        }
        Ok(())
    }
}

/// The default marker generator: providers of the marker's classes that have its required fields
/// and flags.
pub fn providers_by_class(
    collector: &Collector,
    metafunc: &dyn Metafunc,
    marker: &ProviderMarker,
) -> Parametrization {
    let mut filters = vec![ProviderFilter::default().classes(marker.classes.iter().copied())];
    if !marker.required_fields.is_empty() {
        filters.push(ProviderFilter::default().required_fields(marker.required_fields.clone()));
    }
    if !marker.required_flags.is_empty() {
        filters.push(ProviderFilter::default().required_flags(marker.required_flags.clone()));
    }
    collector.providers(metafunc, &filters, marker.selector, &marker.fixture_name)
}

/// One marker per fixture name. Several markers for the same fixture are only allowed when one of
/// them overrides the rest, and then the closest overriding marker is used.
fn closest_markers(metafunc: &dyn Metafunc) -> CollectionResult<Vec<ProviderMarker>> {
    let mut by_fixture: BTreeMap<&str, Vec<&ProviderMarker>> = BTreeMap::new();
    for marker in metafunc.markers() {
        by_fixture
            .entry(marker.fixture_name.as_str())
            .or_default()
            .push(marker);
    }

    let mut markers = Vec::new();
    for (fixture, candidates) in by_fixture {
        let chosen = match candidates.as_slice() {
            [only] => *only,
            _ => match candidates.iter().find(|marker| marker.override_others) {
                Some(marker) => *marker,
                None => {
                    return error::DuplicateProviderMarkersSnafu {
                        function: metafunc.test_name(),
                        fixture,
                    }
                    .fail()
                }
            },
        };
        markers.push(chosen.clone());
    }
    Ok(markers)
}

fn apply(metafunc: &mut dyn Metafunc, parametrization: Parametrization, marker: &ProviderMarker) {
    if parametrization.argnames.is_empty() {
        if metafunc.uses_fixture(&marker.fixture_name) && !metafunc.is_uncollected() {
            metafunc.uncollect(format!(
                "{} was not parametrized did you forget --use-provider?",
                marker.fixture_name
            ));
        }
        return;
    }
    if parametrization.argvalues.is_empty() {
        let reason = format!("Parametrization for {} yielded no values", metafunc.test_name());
        warn!("{}", reason);
        metafunc.uncollect(reason);
        return;
    }
    metafunc.parametrize(parametrization, marker.scope, marker.indirect);
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unused_argnames_are_dropped_with_their_values() {
        let a = Arc::new(selftest::scenario_catalog().get("vc1").unwrap().clone());
        let mut parametrization = Parametrization {
            argnames: vec!["provider".into(), "other".into()],
            argvalues: vec![vec![a.clone(), a.clone()]],
            ids: vec!["a".into()],
        };
        parametrization.retain_used(&["other".to_string()]);
        assert_eq!(parametrization.argnames, vec!["other".to_string()]);
        assert_eq!(parametrization.column("other"), vec![&a]);
        assert_eq!(parametrization.argvalues, vec![vec![a]]);
        assert!(parametrization.column("provider").is_empty());
    }
}
