use crate::class::ClassRef;
use crate::constants::TAG_DISABLED;
use crate::descriptor::ProviderDescriptor;
use crate::error::{self, Result};
use crate::version::LooseVersion;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A path into a provider's data that must resolve, optionally to a specific value.
///
/// In marker and CLI input a path is written either as a dotted string (`templates.small_template`)
/// or as a mapping with `path` and `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RequiredFieldRepr", into = "RequiredFieldRepr")]
pub struct RequiredField {
    pub path: Vec<String>,
    pub value: Option<Value>,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RequiredFieldRepr {
    Dotted(String),
    Segments(Vec<String>),
    WithValue { path: String, value: Value },
}

impl From<RequiredFieldRepr> for RequiredField {
    fn from(repr: RequiredFieldRepr) -> Self {
        match repr {
            RequiredFieldRepr::Dotted(path) => RequiredField::dotted(&path),
            RequiredFieldRepr::Segments(path) => RequiredField { path, value: None },
            RequiredFieldRepr::WithValue { path, value } => {
                RequiredField::dotted(&path).with_value(value)
            }
        }
    }
}

impl From<RequiredField> for RequiredFieldRepr {
    fn from(field: RequiredField) -> Self {
        let path = field.path.join(".");
        match field.value {
            Some(value) => RequiredFieldRepr::WithValue { path, value },
            None => RequiredFieldRepr::Dotted(path),
        }
    }
}

impl From<&str> for RequiredField {
    fn from(path: &str) -> Self {
        RequiredField::dotted(path)
    }
}

impl RequiredField {
    pub fn dotted(path: &str) -> Self {
        Self {
            path: path.split('.').map(String::from).collect(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    fn is_satisfied_by(&self, provider: &ProviderDescriptor) -> bool {
        match (provider.lookup(&self.path), &self.value) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(found), Some(expected)) => found == expected,
        }
    }
}

/// Used to obtain only providers matching given requirements.
///
/// Every requirement is optional; a requirement that is not set does not take part in the
/// decision. The results of the requirements that are set are combined with `all` when the filter
/// is `conjunctive` (the default) or with `any` otherwise, and the answer is flipped when the
/// filter is `inverted`.
///
/// ```
/// use provsys_model::{ClassRef, ProviderFilter};
/// // All VMware providers that have a small template defined.
/// let vmware = ProviderFilter::default()
///     .classes(vec!["vmware".parse::<ClassRef>().unwrap()])
///     .required_fields(vec!["templates.small_template"]);
/// // Everything not tagged `disabled`.
/// let enabled = ProviderFilter::default().required_tags(vec!["disabled"]).inverted();
/// # let _ = (vmware, enabled);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderFilter {
    pub keys: Option<Vec<String>>,
    pub classes: Option<Vec<ClassRef>>,
    pub required_fields: Option<Vec<RequiredField>>,
    pub required_tags: Option<Vec<String>>,
    pub required_flags: Option<Vec<String>>,
    /// The appliance version to check the provider's `since_version`/`restricted_version`
    /// against.
    pub restrict_version: Option<LooseVersion>,
    pub inverted: bool,
    pub conjunctive: bool,
}

impl Default for ProviderFilter {
    fn default() -> Self {
        Self {
            keys: None,
            classes: None,
            required_fields: None,
            required_tags: None,
            required_flags: None,
            restrict_version: None,
            inverted: false,
            conjunctive: true,
        }
    }
}

impl ProviderFilter {
    pub fn keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn classes<I>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = ClassRef>,
    {
        self.classes = Some(classes.into_iter().collect());
        self
    }

    pub fn required_fields<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<RequiredField>,
    {
        self.required_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn required_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn required_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_flags = Some(flags.into_iter().map(|s| s.into().trim().to_string()).collect());
        self
    }

    pub fn restrict_version(mut self, appliance_version: LooseVersion) -> Self {
        self.restrict_version = Some(appliance_version);
        self
    }

    pub fn inverted(mut self) -> Self {
        self.inverted = true;
        self
    }

    pub fn disjunctive(mut self) -> Self {
        self.conjunctive = false;
        self
    }

    /// Whether the filter constrains candidates to a concrete provider type.
    pub fn constrains_type(&self) -> bool {
        self.classes
            .as_ref()
            .map(|classes| classes.iter().any(ClassRef::is_concrete))
            .unwrap_or(false)
    }

    fn filter_keys(&self, provider: &ProviderDescriptor) -> Option<bool> {
        self.keys
            .as_ref()
            .map(|keys| keys.iter().any(|k| k == provider.key()))
    }

    fn filter_classes(&self, provider: &ProviderDescriptor) -> Option<bool> {
        self.classes.as_ref().map(|classes| {
            classes
                .iter()
                .any(|class_ref| provider.class().is_a(class_ref))
        })
    }

    fn filter_required_fields(&self, provider: &ProviderDescriptor) -> Option<bool> {
        self.required_fields
            .as_ref()
            .map(|fields| fields.iter().all(|field| field.is_satisfied_by(provider)))
    }

    fn filter_required_tags(&self, provider: &ProviderDescriptor) -> Option<bool> {
        self.required_tags
            .as_ref()
            .map(|tags| tags.iter().all(|tag| provider.has_tag(tag)))
    }

    fn filter_required_flags(&self, provider: &ProviderDescriptor) -> Option<bool> {
        let flags = self.required_flags.as_ref()?;
        let missing: Vec<&String> = flags
            .iter()
            .filter(|flag| !provider.flags().contains(*flag))
            .collect();
        if !missing.is_empty() {
            debug!(
                "Filtering provider {} out because its flags {:?} do not contain {:?}",
                provider.key(),
                provider.flags(),
                missing
            );
            return Some(false);
        }
        Some(true)
    }

    fn filter_restricted_version(&self, provider: &ProviderDescriptor) -> Option<bool> {
        let appliance_version = self.restrict_version.as_ref()?;
        let mut restrictions = Vec::new();
        if let Some(since) = provider.data().get("since_version").and_then(as_text) {
            restrictions.push(format!(">= {}", since));
        }
        if let Some(restricted) = provider.data().get("restricted_version").and_then(as_text) {
            restrictions.push(restricted);
        }
        for restriction in restrictions {
            match VersionRestriction::parse(&restriction) {
                Ok(r) if !r.allows(appliance_version) => return Some(false),
                Ok(_) => {}
                Err(e) => {
                    debug!("Ignoring restriction of provider {}: {}", provider.key(), e);
                }
            }
        }
        Some(true)
    }

    /// Applies this filter to a given provider. Returns `true` if the provider passed and was not
    /// filtered out, `false` otherwise. The result is the opposite when `inverted` is set.
    pub fn matches(&self, provider: &ProviderDescriptor) -> bool {
        let relevant: Vec<bool> = [
            self.filter_keys(provider),
            self.filter_classes(provider),
            self.filter_required_fields(provider),
            self.filter_required_tags(provider),
            self.filter_required_flags(provider),
            self.filter_restricted_version(provider),
        ]
        .iter()
        .flatten()
        .copied()
        .collect();
        let passed = if self.conjunctive {
            relevant.iter().all(|r| *r)
        } else {
            relevant.iter().any(|r| *r)
        };
        passed != self.inverted
    }
}

fn as_text(value: &Value) -> Option<String> {
    crate::descriptor::scalar_to_string(value)
}

/// Apply a list of filters to providers: a provider remains when it passes every filter. The
/// input order is kept.
pub fn apply_filters<'a, I>(filters: &[ProviderFilter], providers: I) -> Vec<&'a ProviderDescriptor>
where
    I: IntoIterator<Item = &'a ProviderDescriptor>,
{
    providers
        .into_iter()
        .filter(|provider| filters.iter().all(|f| f.matches(provider)))
        .collect()
}

/// Process-level filters that are applied to every provider listing unless the caller opts out.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalFilters {
    filters: BTreeMap<String, ProviderFilter>,
}

impl Default for GlobalFilters {
    fn default() -> Self {
        let mut filters = BTreeMap::new();
        // Only providers without the 'disabled' tag.
        filters.insert(
            "enabled_only".to_string(),
            ProviderFilter::default()
                .required_tags(vec![TAG_DISABLED])
                .inverted(),
        );
        Self { filters }
    }
}

impl GlobalFilters {
    pub fn empty() -> Self {
        Self {
            filters: BTreeMap::new(),
        }
    }

    pub fn insert<S: Into<String>>(&mut self, name: S, filter: ProviderFilter) {
        self.filters.insert(name.into(), filter);
    }

    pub fn remove(&mut self, name: &str) -> Option<ProviderFilter> {
        self.filters.remove(name)
    }

    /// Only providers relevant for the given appliance version.
    pub fn restrict_to_appliance_version(&mut self, appliance_version: LooseVersion) {
        self.insert(
            "restrict_version",
            ProviderFilter::default().restrict_version(appliance_version),
        );
    }

    pub fn filters(&self) -> impl Iterator<Item = &ProviderFilter> {
        self.filters.values()
    }
}

/// A single `<op> <version>` restriction from a provider's data.
#[derive(Debug, Clone, PartialEq)]
struct VersionRestriction {
    op: &'static str,
    version: LooseVersion,
}

impl VersionRestriction {
    // Two-character operators first so that `>=` is not read as `>`.
    const OPERATORS: [&'static str; 6] = [">=", "<=", "==", "!=", ">", "<"];

    fn parse(restriction: &str) -> Result<Self> {
        for op in Self::OPERATORS.iter() {
            if let Some((_, version)) = restriction.split_once(op) {
                let version = version.trim();
                if version.is_empty() {
                    break;
                }
                return Ok(Self {
                    op: *op,
                    version: LooseVersion::new(version),
                });
            }
        }
        error::InvalidVersionRestrictionSnafu { restriction }
            .fail()
            .map_err(Into::into)
    }

    fn allows(&self, current: &LooseVersion) -> bool {
        match self.op {
            ">=" => current >= &self.version,
            "<=" => current <= &self.version,
            "==" => current == &self.version,
            "!=" => current != &self.version,
            ">" => current > &self.version,
            _ => current < &self.version,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::class::{Category, ProviderClass};
    use crate::Catalog;
    use serde_json::json;

    fn catalog() -> Catalog {
        Catalog::from_yaml_str(
            r#"
test_flags: provision, v2v
management_systems:
  vc1:
    name: vc1
    type: virtualcenter
    version: "6.7"
    since_version: "5.10"
    endpoints: {default: {hostname: vc1, credentials: vsphere}}
    templates: {small_template: {name: small_vm, creds: ssh}}
  vc2:
    name: vc2
    type: virtualcenter
    version: "7.0"
    tags: [disabled]
    endpoints: {default: {hostname: vc2, credentials: vsphere}}
  rhv1:
    name: rhv1
    type: rhevm
    version: "4.3"
    excluded_test_flags: v2v
    tags: [perf, do_not_prefer]
    restricted_version: "< 5.11"
    endpoints: {default: {hostname: rhv1, credentials: rhv}}
  ec2:
    name: ec2
    type: ec2
    endpoints: {default: {credentials: aws}}
"#,
        )
        .unwrap()
    }

    fn keys(providers: &[&ProviderDescriptor]) -> Vec<String> {
        providers.iter().map(|p| p.key().to_string()).collect()
    }

    #[test]
    fn classes_match_subclasses() {
        let catalog = catalog();
        let infra = ProviderFilter::default().classes(vec![ClassRef::Category(Category::Infra)]);
        assert_eq!(
            keys(&apply_filters(&[infra], catalog.all())),
            vec!["vc1", "vc2", "rhv1"]
        );
        let rhv = ProviderFilter::default().classes(vec![ClassRef::Type(ProviderClass::Rhevm)]);
        assert_eq!(keys(&apply_filters(&[rhv], catalog.all())), vec!["rhv1"]);
    }

    #[test]
    fn required_fields_with_and_without_values() {
        let catalog = catalog();
        let small = ProviderFilter::default().required_fields(vec![RequiredField::dotted(
            "templates.small_template",
        )]);
        assert_eq!(keys(&apply_filters(&[small], catalog.all())), vec!["vc1"]);
        let named = ProviderFilter::default().required_fields(vec![RequiredField::dotted(
            "templates.small_template.name",
        )
        .with_value(json!("big_vm"))]);
        assert!(apply_filters(&[named], catalog.all()).is_empty());
    }

    #[test]
    fn tags_use_containment() {
        let catalog = catalog();
        let both = ProviderFilter::default().required_tags(vec!["perf", "do_not_prefer"]);
        assert_eq!(keys(&apply_filters(&[both], catalog.all())), vec!["rhv1"]);
        let missing = ProviderFilter::default().required_tags(vec!["perf", "disabled"]);
        assert!(apply_filters(&[missing], catalog.all()).is_empty());
    }

    #[test]
    fn flags_honor_exclusions() {
        let catalog = catalog();
        let v2v = ProviderFilter::default().required_flags(vec!["v2v"]);
        assert_eq!(
            keys(&apply_filters(&[v2v], catalog.all())),
            vec!["vc1", "vc2", "ec2"]
        );
    }

    #[test]
    fn inverted_and_disjunctive() {
        let catalog = catalog();
        let not_disabled = ProviderFilter::default()
            .required_tags(vec!["disabled"])
            .inverted();
        assert_eq!(
            keys(&apply_filters(&[not_disabled], catalog.all())),
            vec!["vc1", "rhv1", "ec2"]
        );
        let either = ProviderFilter::default()
            .keys(vec!["ec2"])
            .classes(vec![ClassRef::Type(ProviderClass::Rhevm)])
            .disjunctive();
        assert_eq!(
            keys(&apply_filters(&[either], catalog.all())),
            vec!["rhv1", "ec2"]
        );
    }

    #[test]
    fn version_restrictions() {
        let catalog = catalog();
        let old = ProviderFilter::default().restrict_version(LooseVersion::new("5.9"));
        assert_eq!(
            keys(&apply_filters(&[old], catalog.all())),
            vec!["vc2", "rhv1", "ec2"]
        );
        let new = ProviderFilter::default().restrict_version(LooseVersion::new("5.11.1"));
        assert_eq!(
            keys(&apply_filters(&[new], catalog.all())),
            vec!["vc1", "vc2", "ec2"]
        );
    }

    #[test]
    fn filtering_is_an_idempotent_subsequence() {
        let catalog = catalog();
        let filters = vec![
            ProviderFilter::default().classes(vec![ClassRef::Category(Category::Infra)]),
            ProviderFilter::default()
                .required_tags(vec!["disabled"])
                .inverted(),
        ];
        let once = apply_filters(&filters, catalog.all());
        let twice = apply_filters(&filters, once.iter().copied());
        assert_eq!(once, twice);
        let all = keys(&catalog.all().iter().collect::<Vec<_>>());
        let mut positions = keys(&once)
            .into_iter()
            .map(|k| all.iter().position(|a| *a == k).unwrap());
        let mut last = positions.next().unwrap();
        for p in positions {
            assert!(p > last);
            last = p;
        }
    }

    #[test]
    fn default_global_filters_hide_disabled_providers() {
        let catalog = catalog();
        let listed = catalog.list(&[], Some(&GlobalFilters::default()));
        assert_eq!(keys(&listed), vec!["vc1", "rhv1", "ec2"]);
        let unrestricted = catalog.list(&[], None);
        assert_eq!(unrestricted.len(), 4);
    }

    #[test]
    fn filters_deserialize_from_yaml() {
        let filter: ProviderFilter = serde_yaml::from_str(
            r#"
classes: [vmware, rhev]
required_fields: ["templates.small_template", {path: "version", value: "6.7"}]
"#,
        )
        .unwrap();
        assert!(filter.conjunctive);
        assert!(!filter.inverted);
        assert!(filter.constrains_type());
        let catalog = catalog();
        assert_eq!(keys(&apply_filters(&[filter], catalog.all())), vec!["vc1"]);
    }
}
