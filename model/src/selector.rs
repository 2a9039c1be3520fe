use crate::descriptor::ProviderDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How a filtered list of providers is reduced before a test is parametrized with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Selector {
    /// Every provider.
    All,
    /// The first provider.
    One,
    /// The provider with the highest version.
    Latest,
    OnePerType,
    OnePerCategory,
    /// The first provider for each version of each provider type.
    OnePerVersion,
}

serde_plain::derive_display_from_serialize!(Selector);
serde_plain::derive_fromstr_from_deserialize!(Selector);

impl Default for Selector {
    fn default() -> Self {
        Selector::OnePerVersion
    }
}

impl Selector {
    /// Reduce `providers`. The result keeps the input order of the providers it retains and
    /// selecting from a selection changes nothing.
    pub fn select<'a>(&self, providers: &[&'a ProviderDescriptor]) -> Vec<&'a ProviderDescriptor> {
        match self {
            Selector::All => providers.to_vec(),
            Selector::One => providers.iter().take(1).copied().collect(),
            Selector::Latest => {
                let mut latest: Option<&'a ProviderDescriptor> = None;
                for provider in providers {
                    // `>=` so that the later entry wins a tie.
                    let newer = latest
                        .map(|l| provider.loose_version() >= l.loose_version())
                        .unwrap_or(true);
                    if newer {
                        latest = Some(*provider);
                    }
                }
                latest.into_iter().collect()
            }
            Selector::OnePerType => {
                first_per(providers, |p| p.type_name().to_string())
            }
            Selector::OnePerCategory => {
                first_per(providers, |p| p.category().to_string())
            }
            Selector::OnePerVersion => first_per(providers, |p| {
                (
                    p.type_name().to_string(),
                    p.version().unwrap_or_default().to_string(),
                )
            }),
        }
    }

    /// The test id for a selected provider. `type_constrained` tells whether the filters that
    /// produced the candidates named a concrete provider type.
    pub fn id(&self, provider: &ProviderDescriptor, type_constrained: bool) -> String {
        match self {
            Selector::All => provider.key().to_string(),
            Selector::One | Selector::Latest => {
                if type_constrained {
                    provider.type_name().to_string()
                } else {
                    provider.category().to_string()
                }
            }
            Selector::OnePerCategory => provider.category().to_string(),
            Selector::OnePerType => provider.type_name().to_string(),
            Selector::OnePerVersion => provider.the_id(),
        }
    }
}

fn first_per<'a, K, F>(providers: &[&'a ProviderDescriptor], key: F) -> Vec<&'a ProviderDescriptor>
where
    K: Ord,
    F: Fn(&ProviderDescriptor) -> K,
{
    let mut seen = BTreeSet::new();
    providers
        .iter()
        .filter(|p| seen.insert(key(**p)))
        .copied()
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Catalog;

    fn catalog() -> Catalog {
        Catalog::from_yaml_str(
            r#"
management_systems:
  vc1: {type: virtualcenter, version: "6.7", endpoints: {default: {hostname: vc1}}}
  vc2: {type: virtualcenter, version: "7.0", endpoints: {default: {hostname: vc2}}}
  vc3: {type: virtualcenter, version: "7.0", endpoints: {default: {hostname: vc3}}}
  rhv1: {type: rhevm, version: "4.3", endpoints: {default: {hostname: rhv1}}}
  osp1: {type: openstack, version: "13", endpoints: {default: {hostname: osp1}}}
  ec2: {type: ec2, endpoints: {default: {credentials: aws}}}
"#,
        )
        .unwrap()
    }

    const ALL_SELECTORS: [Selector; 6] = [
        Selector::All,
        Selector::One,
        Selector::Latest,
        Selector::OnePerType,
        Selector::OnePerCategory,
        Selector::OnePerVersion,
    ];

    fn keys(providers: &[&ProviderDescriptor]) -> Vec<String> {
        providers.iter().map(|p| p.key().to_string()).collect()
    }

    #[test]
    fn selections() {
        let catalog = catalog();
        let all: Vec<_> = catalog.all().iter().collect();
        assert_eq!(keys(&Selector::All.select(&all)), catalog.keys());
        assert_eq!(keys(&Selector::One.select(&all)), vec!["vc1"]);
        assert_eq!(keys(&Selector::Latest.select(&all)), vec!["osp1"]);
        assert_eq!(
            keys(&Selector::OnePerType.select(&all)),
            vec!["vc1", "rhv1", "osp1", "ec2"]
        );
        assert_eq!(
            keys(&Selector::OnePerCategory.select(&all)),
            vec!["vc1", "osp1"]
        );
        assert_eq!(
            keys(&Selector::OnePerVersion.select(&all)),
            vec!["vc1", "vc2", "rhv1", "osp1", "ec2"]
        );
    }

    #[test]
    fn empty_input_selects_nothing() {
        for selector in ALL_SELECTORS.iter() {
            assert!(selector.select(&[]).is_empty());
        }
    }

    #[test]
    fn latest_breaks_ties_by_later_entry() {
        let catalog = catalog();
        let vmware: Vec<_> = catalog
            .all()
            .iter()
            .filter(|p| p.type_name() == "virtualcenter")
            .collect();
        assert_eq!(keys(&Selector::Latest.select(&vmware)), vec!["vc3"]);
    }

    #[test]
    fn latest_is_at_least_every_other_version() {
        let catalog = catalog();
        let all: Vec<_> = catalog.all().iter().collect();
        let latest = Selector::Latest.select(&all);
        assert_eq!(latest.len(), 1);
        for provider in &all {
            assert!(latest[0].loose_version() >= provider.loose_version());
        }
    }

    #[test]
    fn selection_is_idempotent() {
        let catalog = catalog();
        let all: Vec<_> = catalog.all().iter().collect();
        for selector in ALL_SELECTORS.iter() {
            let once = selector.select(&all);
            assert_eq!(selector.select(&once), once, "{} is not idempotent", selector);
        }
    }

    #[test]
    fn one_per_type_covers_every_type_once() {
        let catalog = catalog();
        let all: Vec<_> = catalog.all().iter().collect();
        let selected = Selector::OnePerType.select(&all);
        let input_types: BTreeSet<_> = all.iter().map(|p| p.type_name()).collect();
        let selected_types: Vec<_> = selected.iter().map(|p| p.type_name()).collect();
        assert_eq!(selected_types.len(), input_types.len());
        assert_eq!(
            selected_types.iter().copied().collect::<BTreeSet<_>>(),
            input_types
        );
    }

    #[test]
    fn ids() {
        let catalog = catalog();
        let vc2 = catalog.get("vc2").unwrap();
        let ec2 = catalog.get("ec2").unwrap();
        assert_eq!(Selector::All.id(vc2, true), "vc2");
        assert_eq!(Selector::One.id(vc2, true), "virtualcenter");
        assert_eq!(Selector::One.id(vc2, false), "infra");
        assert_eq!(Selector::Latest.id(ec2, false), "cloud");
        assert_eq!(Selector::OnePerCategory.id(ec2, true), "cloud");
        assert_eq!(Selector::OnePerType.id(vc2, false), "virtualcenter");
        assert_eq!(Selector::OnePerVersion.id(vc2, false), "virtualcenter-7.0");
        assert_eq!(Selector::OnePerVersion.id(ec2, false), "ec2");
    }

    #[test]
    fn parses_marker_names() {
        assert_eq!("ONE_PER_TYPE".parse::<Selector>().unwrap(), Selector::OnePerType);
        assert_eq!(Selector::Latest.to_string(), "LATEST");
        assert_eq!(Selector::default(), Selector::OnePerVersion);
        assert!("SECOND".parse::<Selector>().is_err());
    }
}
