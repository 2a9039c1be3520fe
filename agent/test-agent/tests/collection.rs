/*!

These tests collect fake test functions against the sample catalogs and check how they are
parametrized, uncollected or rejected.

!*/

use provsys_model::{Catalog, Category, ClassRef, ProviderClass, RunnerOptions, Selector};
use selftest::scenario_catalog;
use std::sync::Arc;
use test_agent::{
    CollectionError, Collector, Metafunc, Parametrization, ProviderMarker, Scope,
};

const VMWARE: ClassRef = ClassRef::Type(ProviderClass::VirtualCenter);
const RHEV: ClassRef = ClassRef::Type(ProviderClass::Rhevm);

#[derive(Default)]
struct FakeMetafunc {
    function: String,
    fixtures: Vec<String>,
    markers: Vec<ProviderMarker>,
    flags: Vec<String>,
    parametrized: Vec<(Parametrization, Scope, bool)>,
    uncollected: Option<String>,
}

impl FakeMetafunc {
    fn new(function: &str, fixtures: &[&str]) -> Self {
        Self {
            function: function.to_string(),
            fixtures: fixtures.iter().map(|f| f.to_string()).collect(),
            ..Self::default()
        }
    }

    fn marked(mut self, marker: ProviderMarker) -> Self {
        self.markers.push(marker);
        self
    }

    fn flagged(mut self, flag: &str) -> Self {
        self.flags.push(flag.to_string());
        self
    }

    fn only_parametrization(&self) -> &Parametrization {
        assert_eq!(self.parametrized.len(), 1, "uncollected: {:?}", self.uncollected);
        &self.parametrized[0].0
    }

    fn keys(&self) -> Vec<String> {
        self.only_parametrization()
            .column("provider")
            .iter()
            .map(|p| p.key().to_string())
            .collect()
    }
}

impl Metafunc for FakeMetafunc {
    fn module_name(&self) -> Option<&str> {
        Some("test_provisioning")
    }

    fn function_name(&self) -> &str {
        &self.function
    }

    fn fixture_names(&self) -> &[String] {
        &self.fixtures
    }

    fn markers(&self) -> &[ProviderMarker] {
        &self.markers
    }

    fn test_flags(&self) -> &[String] {
        &self.flags
    }

    fn parametrize(&mut self, parametrization: Parametrization, scope: Scope, indirect: bool) {
        self.parametrized.push((parametrization, scope, indirect));
    }

    fn uncollect(&mut self, reason: String) {
        self.uncollected = Some(reason);
    }

    fn is_uncollected(&self) -> bool {
        self.uncollected.is_some()
    }
}

fn collector() -> Collector {
    Collector::new(Arc::new(scenario_catalog()), RunnerOptions::default())
}

fn collector_with(options: RunnerOptions) -> Collector {
    Collector::new(Arc::new(scenario_catalog()), options)
}

#[test]
fn latest_vmware_provider() {
    let mut metafunc = FakeMetafunc::new("test_vm", &["provider"])
        .marked(ProviderMarker::new(vec![VMWARE]).selector(Selector::Latest));

    collector().collect(&mut metafunc).unwrap();

    assert_eq!(metafunc.only_parametrization().ids, vec!["virtualcenter"]);
    assert_eq!(metafunc.keys(), vec!["vc2"]);
}

#[test]
fn one_provider_per_type() {
    let mut metafunc = FakeMetafunc::new("test_vm", &["provider", "appliance"])
        .marked(ProviderMarker::new(vec![VMWARE, RHEV]).selector(Selector::OnePerType));

    collector().collect(&mut metafunc).unwrap();

    let parametrization = metafunc.only_parametrization();
    assert_eq!(parametrization.argnames, vec!["provider"]);
    assert_eq!(parametrization.ids, vec!["virtualcenter", "rhevm"]);
    assert_eq!(metafunc.keys(), vec!["vc1", "rhv1"]);
}

#[test]
fn scope_and_indirect_are_passed_to_the_runner() {
    let mut metafunc = FakeMetafunc::new("test_vm", &["provider"]).marked(
        ProviderMarker::new(vec![RHEV])
            .scope(Scope::Module)
            .indirect(),
    );

    collector().collect(&mut metafunc).unwrap();

    let (_, scope, indirect) = &metafunc.parametrized[0];
    assert_eq!(*scope, Scope::Module);
    assert!(*indirect);
}

#[test]
fn duplicate_markers_are_rejected() {
    let mut metafunc = FakeMetafunc::new("test_duplicate", &["provider"])
        .marked(ProviderMarker::new(vec![VMWARE]))
        .marked(ProviderMarker::new(vec![RHEV]));

    let error = collector().collect(&mut metafunc).unwrap_err();

    assert!(matches!(
        error,
        CollectionError::DuplicateProviderMarkers { .. }
    ));
    assert!(error.to_string().contains("test_provisioning.test_duplicate"));
    assert!(metafunc.parametrized.is_empty());
}

#[test]
fn closest_overriding_marker_wins() {
    let mut metafunc = FakeMetafunc::new("test_override", &["provider"])
        .marked(ProviderMarker::new(vec![RHEV]).overriding())
        .marked(ProviderMarker::new(vec![VMWARE]).overriding())
        .marked(ProviderMarker::new(vec![ClassRef::Base]));

    collector().collect(&mut metafunc).unwrap();

    assert_eq!(metafunc.keys(), vec!["rhv1"]);
    assert_eq!(metafunc.only_parametrization().ids, vec!["rhv1"]);
}

#[test]
fn markers_for_other_fixtures_are_collected_separately() {
    let mut metafunc = FakeMetafunc::new("test_migration", &["provider", "second_provider"])
        .marked(ProviderMarker::new(vec![VMWARE]).selector(Selector::One))
        .marked(
            ProviderMarker::new(vec![RHEV])
                .selector(Selector::One)
                .fixture_name("second_provider"),
        );

    collector().collect(&mut metafunc).unwrap();

    let argnames: Vec<&str> = metafunc
        .parametrized
        .iter()
        .flat_map(|(p, _, _)| p.argnames.iter().map(String::as_str))
        .collect();
    assert_eq!(argnames, vec!["provider", "second_provider"]);
}

#[test]
fn no_matching_providers_uncollects_the_test() {
    let mut metafunc = FakeMetafunc::new("test_cloud", &["provider"])
        .marked(ProviderMarker::new(vec![ClassRef::Category(Category::Cloud)]));

    collector().collect(&mut metafunc).unwrap();

    assert!(metafunc.parametrized.is_empty());
    assert_eq!(
        metafunc.uncollected.as_deref(),
        Some("provider was not parametrized did you forget --use-provider?")
    );
}

#[test]
fn tests_without_the_fixture_are_left_alone() {
    let mut metafunc = FakeMetafunc::new("test_appliance_only", &["appliance"])
        .marked(ProviderMarker::new(vec![VMWARE]));

    collector().collect(&mut metafunc).unwrap();

    assert!(metafunc.parametrized.is_empty());
    assert!(metafunc.uncollected.is_none());
}

#[test]
fn provider_fixture_without_marker_is_an_error() {
    let mut metafunc = FakeMetafunc::new("test_unmarked", &["provider"]);
    let error = collector().collect(&mut metafunc).unwrap_err();
    assert!(matches!(error, CollectionError::MissingFixture { .. }));

    let mut unused = FakeMetafunc::new("test_unused", &["appliance"])
        .marked(ProviderMarker::new(vec![VMWARE]).keep_unused());
    let error = collector().collect(&mut unused).unwrap_err();
    assert!(error.to_string().contains("provider"));
}

#[test]
fn generators_without_values_uncollect_with_the_test_name() {
    fn nothing(
        _: &Collector,
        _: &dyn Metafunc,
        marker: &ProviderMarker,
    ) -> Parametrization {
        Parametrization {
            argnames: vec![marker.fixture_name.clone()],
            ..Parametrization::default()
        }
    }
    let mut metafunc = FakeMetafunc::new("test_nothing", &["provider"])
        .marked(ProviderMarker::new(vec![VMWARE]).gen_func(nothing));

    collector().collect(&mut metafunc).unwrap();

    assert_eq!(
        metafunc.uncollected.as_deref(),
        Some("Parametrization for test_provisioning.test_nothing yielded no values")
    );
}

#[test]
fn ids_follow_the_runner_options() {
    let marker = ProviderMarker::new(vec![VMWARE, RHEV]).selector(Selector::OnePerType);

    let mut legacy = FakeMetafunc::new("test_vm", &["provider"]).marked(marker.clone());
    collector_with(RunnerOptions {
        legacy_ids: true,
        ..RunnerOptions::default()
    })
    .collect(&mut legacy)
    .unwrap();
    assert_eq!(legacy.only_parametrization().ids, vec!["vc1", "rhv1"]);

    let mut plain = FakeMetafunc::new("test_vm", &["provider"]).marked(marker);
    collector_with(RunnerOptions {
        disable_selectors: true,
        ..RunnerOptions::default()
    })
    .collect(&mut plain)
    .unwrap();
    assert_eq!(plain.keys(), vec!["vc1", "rhv1"]);
    assert_eq!(
        plain.only_parametrization().ids,
        vec!["virtualcenter-6.7", "rhevm-4.3"]
    );
}

#[test]
fn disabled_selectors_still_select() {
    let catalog = Catalog::from_yaml_str(
        r#"
management_systems:
  vc1:
    name: vsphere-a
    type: virtualcenter
    version: '7.0'
    endpoints:
      default: {hostname: vc1.example.com}
  vc2:
    name: vsphere-b
    type: virtualcenter
    version: '7.0'
    endpoints:
      default: {hostname: vc2.example.com}
  rhv1:
    name: rhv-43
    type: rhevm
    version: '4.3'
    endpoints:
      default: {hostname: rhv1.example.com}
"#,
    )
    .unwrap();
    let collector = Collector::new(
        Arc::new(catalog),
        RunnerOptions {
            disable_selectors: true,
            ..RunnerOptions::default()
        },
    );
    let mut metafunc = FakeMetafunc::new("test_vm", &["provider"])
        .marked(ProviderMarker::new(vec![ClassRef::Base]).selector(Selector::OnePerType));

    collector.collect(&mut metafunc).unwrap();

    assert_eq!(metafunc.keys(), vec!["vc1", "rhv1"]);
    assert_eq!(
        metafunc.only_parametrization().ids,
        vec!["virtualcenter-7.0", "rhevm-4.3"]
    );
}

#[test]
fn ids_are_stable_between_collections() {
    let marker = ProviderMarker::new(vec![ClassRef::Base]).selector(Selector::OnePerVersion);
    let mut first = FakeMetafunc::new("test_vm", &["provider"]).marked(marker.clone());
    let mut second = FakeMetafunc::new("test_vm", &["provider"]).marked(marker);

    collector().collect(&mut first).unwrap();
    collector().collect(&mut second).unwrap();

    assert_eq!(
        first.only_parametrization().ids,
        second.only_parametrization().ids
    );
    assert_eq!(first.keys(), second.keys());
}

#[test]
fn test_flags_narrow_the_providers() {
    let catalog = Catalog::from_yaml_str(
        r#"
test_flags: provision, v2v
management_systems:
  vc1:
    name: vsphere-67
    type: virtualcenter
    version: '6.7'
    endpoints:
      default: {hostname: vc1.example.com, credentials: vsphere}
  rhv1:
    name: rhv-43
    type: rhevm
    version: '4.3'
    excluded_test_flags: provision
    endpoints:
      default: {hostname: rhv1.example.com, credentials: rhv}
"#,
    )
    .unwrap();
    let collector = Collector::new(Arc::new(catalog), RunnerOptions::default());

    let mut provisioning = FakeMetafunc::new("test_provision", &["provider"])
        .marked(ProviderMarker::new(vec![ClassRef::Base]))
        .flagged("provision");
    collector.collect(&mut provisioning).unwrap();
    assert_eq!(provisioning.keys(), vec!["vc1"]);

    let mut migration = FakeMetafunc::new("test_migrate", &["provider"])
        .marked(ProviderMarker::new(vec![ClassRef::Base]))
        .flagged("v2v");
    collector.collect(&mut migration).unwrap();
    assert_eq!(migration.keys(), vec!["vc1", "rhv1"]);
}
